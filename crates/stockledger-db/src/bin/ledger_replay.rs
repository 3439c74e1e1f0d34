//! # Ledger Replay
//!
//! Applies a JSON Lines feed of movement events to a ledger database.
//!
//! ## Usage
//! ```bash
//! # Replay a feed into ./ledger_dev.db
//! cargo run -p stockledger-db --bin ledger-replay -- --events movements.jsonl
//!
//! # Specify database path and config
//! cargo run -p stockledger-db --bin ledger-replay -- \
//!     --db ./data/ledger.db --events movements.jsonl --config ledger.toml
//! ```
//!
//! ## Input Format
//! One `MovementEvent` per line; blank lines and `#` comments are skipped:
//! ```text
//! {"source_event_id":"po-1","entity_key":"SKU-1","location_key":"WH-1","quantity":"10","direction":"increase"}
//! {"source_event_id":"so-1","entity_key":"SKU-1","quantity":4,"direction":"out","reference":"SO-1"}
//! ```
//!
//! Replaying the same feed twice is safe: every line is keyed by its
//! `source_event_id`, so the second run reports only replays.

use std::collections::BTreeSet;
use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use stockledger_core::MovementEvent;
use stockledger_db::{AppendOutcome, Database, LedgerAppender, LedgerConfig, LedgerError};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut db_path: Option<PathBuf> = None;
    let mut events_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--events" | "-e" => {
                if i + 1 < args.len() {
                    events_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                print_help();
                return Ok(());
            }
        }
        i += 1;
    }

    let Some(events_path) = events_path else {
        eprintln!("Missing --events <FILE>");
        print_help();
        return Ok(());
    };

    let mut config = LedgerConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = Some(path);
    } else if config.database.path.is_none() {
        config.database.path = Some(PathBuf::from("./ledger_dev.db"));
    }

    println!("Stock Ledger Replay");
    println!("===================");
    println!("Database: {}", config.database_path()?.display());
    println!("Events:   {}", events_path.display());
    println!();

    let db = Database::new(config.db_config()?).await?;
    let ledger = LedgerAppender::from_config(db, &config);

    println!("✓ Connected to database");
    println!("✓ Migrations applied");
    println!();

    let reader = BufReader::new(File::open(&events_path)?);

    let mut applied = 0usize;
    let mut replayed = 0usize;
    let mut rejected = 0usize;
    let mut touched = BTreeSet::new();
    let start = std::time::Instant::now();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let event: MovementEvent = match serde_json::from_str(trimmed) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed event");
                rejected += 1;
                continue;
            }
        };

        match ledger.append_detailed(&event).await {
            Ok(AppendOutcome::Applied(entry)) => {
                debug!(line = line_no, entry_id = %entry.id, "Applied");
                touched.insert(entry.entity_key);
                applied += 1;
            }
            Ok(AppendOutcome::Replayed(entry)) => {
                debug!(line = line_no, entry_id = %entry.id, "Replayed");
                touched.insert(entry.entity_key);
                replayed += 1;
            }
            Err(e @ LedgerError::Storage(_)) => {
                // Storage failures abort the run; rerunning resumes safely.
                eprintln!("Storage failure at line {}: {}", line_no, e);
                return Err(e.into());
            }
            Err(e) => {
                warn!(
                    line = line_no,
                    source_event_id = %event.source_event_id,
                    error = %e,
                    "Movement rejected"
                );
                rejected += 1;
            }
        }
    }

    let elapsed = start.elapsed();
    println!(
        "✓ Processed {} events in {:?} ({} applied, {} replayed, {} rejected)",
        applied + replayed + rejected,
        elapsed,
        applied,
        replayed,
        rejected
    );

    if touched.is_empty() {
        return Ok(());
    }

    println!();
    println!("Final balances:");
    let keys: Vec<String> = touched.into_iter().collect();
    for (key, balance) in ledger.balances(&keys).await? {
        let report = ledger.verify_chain(&key).await?;
        let marker = if report.is_consistent() { "✓" } else { "⚠" };
        println!("  {} {:<24} {:>16}", marker, key, balance.to_string());
    }

    Ok(())
}

fn print_help() {
    println!("Stock Ledger Replay");
    println!();
    println!("Usage: ledger-replay --events <FILE> [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -e, --events <FILE>   JSON Lines file of movement events");
    println!("  -d, --db <PATH>       Database file path (default: ./ledger_dev.db)");
    println!("  -c, --config <FILE>   ledger.toml (default: platform config dir)");
    println!("  -h, --help            Show this help message");
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=stockledger=trace` - Show trace for the ledger crates only
/// - Default: INFO, DEBUG for ledger crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stockledger=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
