//! Round and session scenarios on virtual time.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use blitz::engine::fetcher::{FetchPolicy, ResilientFetcher};
use blitz::engine::round::{RoundConfig, RoundStateMachine};
use blitz::engine::session::{GameEvent, NextStep, Session, SessionConfig};
use blitz::sources::ValueSource;
use blitz::storage::MemoryStore;
use blitz::types::{Direction, Phase};

use crate::mock_source::MockSource;

const STATIC_DEFAULT: f64 = 92_350.0;

fn fetcher(sources: Vec<Arc<dyn ValueSource>>) -> Arc<ResilientFetcher> {
    let policy = FetchPolicy {
        max_retries_per_source: 2,
        retry_delay: Duration::from_millis(300),
        source_order: sources,
    };
    Arc::new(ResilientFetcher::new(policy, STATIC_DEFAULT))
}

fn session(
    sources: Vec<Arc<dyn ValueSource>>,
    high_score: u32,
) -> (Session, mpsc::UnboundedReceiver<GameEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let s = Session::new(
        fetcher(sources),
        RoundConfig::default(),
        SessionConfig::default(),
        Box::new(MemoryStore::new(high_score)),
        tx,
    );
    (s, rx)
}

/// Send `direction` after `delay` of virtual time.
fn guess_after(delay: Duration, direction: Direction) -> mpsc::Receiver<Direction> {
    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        time::sleep(delay).await;
        let _ = tx.send(direction).await;
        // keep the channel open so later rounds see no input rather than EOF
        time::sleep(Duration::from_secs(3600)).await;
    });
    rx
}

fn drain(rx: &mut mpsc::UnboundedReceiver<GameEvent>) -> Vec<GameEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn higher_guess_wins_when_price_rises() {
    let source = MockSource::stepped("primary", 90_000.0, 91_000.0, Duration::from_millis(4500));
    let (mut s, mut events) = session(vec![Arc::new(source)], 0);
    let mut guesses = guess_after(Duration::from_secs(1), Direction::Higher);

    let outcome = s.play_round(&mut guesses).await.unwrap();
    assert!(outcome.won);
    assert!(outcome.guess_made);
    assert_eq!(outcome.guess, Some(Direction::Higher));
    assert_eq!(outcome.start_value, 90_000.0);
    assert_eq!(outcome.final_value, 91_000.0);
    assert!(!outcome.degraded);

    assert_eq!(s.streak(), 0);
    let next = s.record_outcome(&outcome);
    assert_eq!(next, NextStep::NextRound(Duration::from_millis(1500)));
    assert_eq!(s.streak(), 1);
    assert_eq!(s.high_score(), 1);

    let evs = drain(&mut events);
    assert!(evs.contains(&GameEvent::GuessAccepted(Direction::Higher)));
    assert!(evs.contains(&GameEvent::Resolving));
    assert!(evs.contains(&GameEvent::NewHighScore { score: 1 }));
    assert!(evs.iter().any(|e| matches!(
        e,
        GameEvent::Outcome { status, .. } if status == "CORRECT! Streak: 1"
    )));
}

#[tokio::test(start_paused = true)]
async fn no_guess_loses_even_when_price_moves() {
    let source = MockSource::stepped("primary", 90_000.0, 95_000.0, Duration::from_millis(2000));
    let (mut s, _events) = session(vec![Arc::new(source)], 3);
    let (_tx, mut guesses) = mpsc::channel::<Direction>(1);

    let outcome = s.play_round(&mut guesses).await.unwrap();
    assert!(!outcome.won);
    assert!(!outcome.guess_made);
    assert_eq!(outcome.final_value, 95_000.0);

    assert_eq!(
        s.record_outcome(&outcome),
        NextStep::ReturnToMenu(Duration::from_millis(3000))
    );
    assert_eq!(s.high_score(), 3);
}

#[tokio::test(start_paused = true)]
async fn lower_guess_loses_on_flat_price() {
    let (mut s, _events) = session(vec![Arc::new(MockSource::fixed("flat", 90_000.0))], 0);
    let mut guesses = guess_after(Duration::from_millis(500), Direction::Lower);

    let outcome = s.play_round(&mut guesses).await.unwrap();
    assert!(outcome.guess_made);
    assert!(!outcome.won);
}

#[tokio::test(start_paused = true)]
async fn only_first_guess_counts() {
    let source = MockSource::stepped("primary", 90_000.0, 89_000.0, Duration::from_millis(4500));
    let (mut s, mut events) = session(vec![Arc::new(source)], 0);

    let (tx, mut guesses) = mpsc::channel(8);
    tokio::spawn(async move {
        time::sleep(Duration::from_millis(500)).await;
        let _ = tx.send(Direction::Lower).await;
        time::sleep(Duration::from_millis(500)).await;
        let _ = tx.send(Direction::Higher).await;
        time::sleep(Duration::from_secs(3600)).await;
    });

    let outcome = s.play_round(&mut guesses).await.unwrap();
    assert_eq!(outcome.guess, Some(Direction::Lower));
    assert!(outcome.won);

    let accepted: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, GameEvent::GuessAccepted(_)))
        .collect();
    assert_eq!(accepted, vec![GameEvent::GuessAccepted(Direction::Lower)]);
}

#[tokio::test(start_paused = true)]
async fn all_sources_down_degrades_to_static_default() {
    let a = MockSource::down("a");
    let b = MockSource::down("b");
    let (a_calls, b_calls) = (a.call_counter(), b.call_counter());
    let (mut s, mut events) = session(vec![Arc::new(a), Arc::new(b)], 0);
    let mut guesses = guess_after(Duration::from_secs(1), Direction::Higher);

    let outcome = s.play_round(&mut guesses).await.unwrap();
    assert_eq!(outcome.start_value, STATIC_DEFAULT);
    assert_eq!(outcome.final_value, STATIC_DEFAULT);
    assert!(outcome.degraded);
    assert!(!outcome.won);

    // start and final fetches each exhaust both retries on both sources
    assert!(a_calls.load(Ordering::SeqCst) >= 4);
    assert!(b_calls.load(Ordering::SeqCst) >= 4);

    assert!(drain(&mut events).contains(&GameEvent::StartValue {
        value: STATIC_DEFAULT,
        degraded: true,
    }));
}

#[tokio::test(start_paused = true)]
async fn backup_source_serves_when_primary_down() {
    let primary = MockSource::down("primary");
    let backup = MockSource::stepped("backup", 90_000.0, 91_000.0, Duration::from_millis(4500));
    let (mut s, _events) = session(vec![Arc::new(primary), Arc::new(backup)], 0);
    let mut guesses = guess_after(Duration::from_secs(1), Direction::Higher);

    let outcome = s.play_round(&mut guesses).await.unwrap();
    assert!(!outcome.degraded);
    assert_eq!(outcome.start_value, 90_000.0);
    assert!(outcome.won);
}

#[tokio::test(start_paused = true)]
async fn clock_does_not_wait_for_slow_start_value() {
    let source = MockSource::stepped("slow", 90_000.0, 91_000.0, Duration::from_secs(8))
        .with_latency(Duration::from_secs(6));
    let calls = source.call_counter();
    let (mut s, mut events) = session(vec![Arc::new(source)], 0);
    let mut guesses = guess_after(Duration::from_secs(1), Direction::Higher);

    let started = Instant::now();
    let outcome = s.play_round(&mut guesses).await.unwrap();

    // clock expired at 5s, start value landed at 6s, final value at 12s
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(12) && elapsed < Duration::from_millis(12_100));
    assert_eq!(outcome.start_value, 90_000.0);
    assert_eq!(outcome.final_value, 91_000.0);
    assert!(outcome.won);

    // live refreshes were skipped while the start fetch was in flight
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let evs = drain(&mut events);
    let resolving = evs.iter().position(|e| *e == GameEvent::Resolving).unwrap();
    let start = evs
        .iter()
        .position(|e| matches!(e, GameEvent::StartValue { .. }))
        .unwrap();
    assert!(resolving < start);
}

#[tokio::test(start_paused = true)]
async fn session_runs_until_first_loss() {
    let source = MockSource::stepped("primary", 90_000.0, 91_000.0, Duration::from_millis(4500));
    let (mut s, mut events) = session(vec![Arc::new(source)], 0);
    let mut guesses = guess_after(Duration::from_secs(1), Direction::Higher);

    let summary = s.run(&mut guesses).await.unwrap();
    assert_eq!(summary.rounds_played, 2);
    assert_eq!(summary.best_streak, 1);
    assert_eq!(summary.high_score, 1);
    assert_eq!(s.streak(), 0);

    let evs = drain(&mut events);
    assert!(matches!(evs.last(), Some(GameEvent::SessionOver(_))));
    let statuses: Vec<_> = evs
        .iter()
        .filter_map(|e| match e {
            GameEvent::Outcome { status, .. } => Some(status.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec!["CORRECT! Streak: 1", "Too slow! No guess."]);
}

#[tokio::test(start_paused = true)]
async fn late_fetch_from_superseded_round_is_ignored() {
    let slow = MockSource::fixed("slow", 10.0).with_latency(Duration::from_secs(2));
    let fetcher = fetcher(vec![Arc::new(slow)]);

    let mut machine = RoundStateMachine::new();
    let old = machine.begin_round(&RoundConfig::default());
    let in_flight = {
        let fetcher = Arc::clone(&fetcher);
        tokio::spawn(async move { fetcher.fetch(None).await })
    };

    let new = machine.begin_round(&RoundConfig::default());
    machine.submit_guess(Direction::Higher);

    let late = in_flight.await.unwrap();
    assert!(!machine.apply_start_value(old, &late));
    assert!(!machine.apply_live_value(old, &late));
    assert!(machine.resolve(old, &late).is_none());

    let round = machine.round().unwrap();
    assert_eq!(round.phase, Phase::Collecting);
    assert_eq!(round.start_value, None);
    assert_eq!(round.guess, Some(Direction::Higher));
    assert_eq!(machine.last_known(), None);
    assert!(machine.is_current(new));
}
