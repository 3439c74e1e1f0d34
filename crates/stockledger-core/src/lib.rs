//! # stockledger-core: Pure Ledger Logic
//!
//! This crate is the **heart** of the stock ledger. It contains the movement
//! rules, quantity arithmetic and balance invariants as pure functions with
//! zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Stock Ledger Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          Producers (receiving, sales, stock counts)             │   │
//! │  │                 emit MovementEvent values                       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ stockledger-core (THIS CRATE) ★                 │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ quantity  │  │   guard   │  │ validation│  │   │
//! │  │   │  Entry    │  │ Quantity  │  │ NonNeg    │  │ movement  │  │   │
//! │  │   │  Balance  │  │ (milli)   │  │ Cap       │  │ paging    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                stockledger-db (Storage Layer)                   │   │
//! │  │      SQLite log + balances, key locks, the appender             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (MovementEvent, LedgerEntry, BalanceRecord, etc.)
//! - [`quantity`] - Fixed-point quantity with integer arithmetic (no floating point!)
//! - [`guard`] - Balance invariants checked before every write
//! - [`error`] - Domain error types
//! - [`validation`] - Movement and query validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Quantities**: Stored as thousandths (i64), never floats
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use stockledger_core::{ConsistencyGuard, Quantity};
//!
//! let guard = ConsistencyGuard::default();
//! let prior: Quantity = "3".parse().unwrap();
//! let delta: Quantity = "-5".parse().unwrap();
//!
//! // Selling 5 with 3 on hand is rejected before anything is written
//! assert!(guard.check("SKU-1", prior, delta).is_err());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod guard;
pub mod quantity;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use stockledger_core::Quantity` instead of
// `use stockledger_core::quantity::Quantity`

pub use error::{ConsistencyError, ValidationError};
pub use guard::{BalanceCap, BalanceRule, ConsistencyGuard, NonNegative};
pub use quantity::Quantity;
pub use types::*;
pub use validation::{MovementPolicy, ValidatedMovement};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of entity keys, group keys and source event ids.
pub const MAX_KEY_LENGTH: usize = 64;

/// Maximum length of a movement's document reference.
pub const MAX_REFERENCE_LENGTH: usize = 64;

/// Page size used when the caller does not pick one.
pub const DEFAULT_PAGE_LIMIT: u32 = 100;

/// Largest page a single listing call may return.
pub const MAX_PAGE_LIMIT: u32 = 500;
