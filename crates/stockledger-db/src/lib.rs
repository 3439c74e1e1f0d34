//! # stockledger-db: Storage Layer for the Stock Ledger
//!
//! This crate persists the ledger in SQLite and owns its only write path,
//! the [`LedgerAppender`].
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stock Ledger Data Flow                           │
//! │                                                                         │
//! │  MovementEvent (receiving, sales, stock count)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  stockledger-db (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │ LedgerAppender│    │  Repositories │    │  Migrations  │  │   │
//! │  │   │ (appender.rs) │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ EntryRepo     │    │              │  │   │
//! │  │   │ KeyLocks      │───►│ BalanceRepo   │    │ 001_ledger   │  │   │
//! │  │   │ Guard, audit  │    │               │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │          ledger_entries (append-only) + ledger_balances         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`appender`] - Validated, serialized, transactional append + queries
//! - [`lock`] - Per-entity-key critical sections
//! - [`audit`] - Entry chain verification
//! - [`config`] - TOML + environment configuration
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Storage, append and config error types
//! - [`repository`] - Entry and balance repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockledger_db::{Database, DbConfig, LedgerAppender};
//! use stockledger_core::{Direction, MovementEvent, Quantity};
//!
//! let db = Database::new(DbConfig::new("ledger.db")).await?;
//! let ledger = LedgerAppender::new(db);
//!
//! let event = MovementEvent::new("po-17-line-1", "SKU-1", Direction::Increase, Quantity::from_units(10));
//! let entry = ledger.append(&event).await?;
//! assert_eq!(ledger.balance("SKU-1").await?, entry.balance_after);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod appender;
pub mod audit;
pub mod config;
pub mod error;
pub mod lock;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use appender::{AppendOutcome, LedgerAppender};
pub use audit::{ChainReport, ChainViolation};
pub use config::LedgerConfig;
pub use error::{ConfigError, DbError, LedgerError, LedgerResult};
pub use lock::{KeyGuard, KeyLocks};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::balance::BalanceRepository;
pub use repository::entry::EntryRepository;
