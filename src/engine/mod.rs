//! Core engine: price fetching, the round clock, the round state machine
//! and the session driver that runs them on the tokio timeline.

pub mod fetcher;
pub mod clock;
pub mod round;
pub mod session;
