//! BLITZ — terminal front end.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the price source chain and runs the menu → session loop.
//! Game output goes to stdout, logs to stderr.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use blitz::config::AppConfig;
use blitz::engine::fetcher::ResilientFetcher;
use blitz::engine::session::{GameEvent, Session};
use blitz::sources::http::HttpPriceSource;
use blitz::sources::ValueSource;
use blitz::storage::JsonFileStore;
use blitz::types::{format_price, format_remaining, Direction};

const BANNER: &str = r#"
 ____  _     ___ _____ _____
| __ )| |   |_ _|_   _|__  /
|  _ \| |    | |  | |   / /
| |_) | |___ | |  | |  / /_
|____/|_____|___| |_| /____|

  Higher or lower? You have five seconds.
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let config_path = std::env::var("BLITZ_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = if Path::new(&config_path).exists() {
        AppConfig::load(&config_path)?
    } else {
        warn!(path = %config_path, "Config file not found, using built-in defaults");
        AppConfig::default()
    };

    println!("{BANNER}");

    let fetcher = Arc::new(build_fetcher(&cfg)?);
    info!(
        sources = ?fetcher.policy(),
        static_default = cfg.fetch.static_default,
        "Price sources ready"
    );

    let store = JsonFileStore::new(&cfg.storage.high_score_file, &cfg.storage.high_score_key);

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    tokio::spawn(render(event_rx));

    let mut session = Session::new(
        fetcher,
        cfg.round_config(),
        cfg.session_config(),
        Box::new(store),
        event_tx,
    );

    let (line_tx, mut line_rx) = mpsc::channel::<String>(16);
    tokio::spawn(read_lines(line_tx));

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        println!("High score: {}", session.high_score());
        println!("Press Enter to start, q to quit.");

        let line = tokio::select! {
            line = line_rx.recv() => line,
            _ = &mut shutdown => None,
        };
        match line {
            None => break,
            Some(l) if l.trim().eq_ignore_ascii_case("q") => break,
            Some(_) => {}
        }

        let (guess_tx, mut guess_rx) = mpsc::channel::<Direction>(16);
        let forward = async {
            while let Some(line) = line_rx.recv().await {
                match line.parse::<Direction>() {
                    Ok(direction) => {
                        if guess_tx.send(direction).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!(error = %e, "Ignoring input"),
                }
            }
        };

        tokio::select! {
            result = session.run(&mut guess_rx) => {
                result?;
            }
            _ = forward => {
                info!("Input closed");
                break;
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!(high_score = session.high_score(), "BLITZ shut down cleanly.");
    Ok(())
}

/// Build the ordered source chain from the enabled `[[sources]]` entries.
fn build_fetcher(cfg: &AppConfig) -> Result<ResilientFetcher> {
    let timeout = cfg.request_timeout();
    let sources = cfg
        .enabled_sources()
        .map(|s| HttpPriceSource::from_config(s, timeout).map(|src| Arc::new(src) as Arc<dyn ValueSource>))
        .collect::<Result<Vec<_>>>()?;

    let policy = cfg.fetch_policy(sources);
    Ok(ResilientFetcher::new(policy, cfg.fetch.static_default))
}

/// Forward stdin lines until EOF.
async fn read_lines(tx: mpsc::Sender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        }
    }
}

/// Print game events as they arrive.
async fn render(mut events: mpsc::UnboundedReceiver<GameEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            GameEvent::RoundStarted { round } => {
                println!();
                println!("--- Round {round} --- type h (higher) or l (lower), then Enter");
            }
            GameEvent::StartValue { value, degraded } => {
                let note = if degraded { " (offline)" } else { "" };
                println!("Start price: {}{note}", format_price(value));
            }
            GameEvent::LiveValue { value, .. } => println!("  live {}", format_price(value)),
            GameEvent::Remaining(remaining) => {
                if remaining.as_millis() % 1000 == 0 {
                    println!("  {}s", format_remaining(remaining));
                }
            }
            GameEvent::GuessAccepted(direction) => println!("Locked in: {direction}"),
            GameEvent::Resolving => println!("Time! Fetching final price..."),
            GameEvent::Outcome { outcome, status } => {
                println!(
                    "{} → {}  {status}",
                    format_price(outcome.start_value),
                    format_price(outcome.final_value)
                );
            }
            GameEvent::StreakChanged { streak } => println!("Streak: {streak}"),
            GameEvent::NewHighScore { score } => println!("New high score: {score}!"),
            GameEvent::SessionOver(summary) => {
                println!(
                    "Game over after {} round(s). Best streak {}.",
                    summary.rounds_played, summary.best_streak
                );
            }
        }
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("blitz=info"));

    let json_logging = std::env::var("BLITZ_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
