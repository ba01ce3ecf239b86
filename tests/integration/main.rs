//! Integration tests: whole rounds and sessions driven on virtual time
//! against scripted price sources.

mod mock_source;
mod round_lifecycle;
