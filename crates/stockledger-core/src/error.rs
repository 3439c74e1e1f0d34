//! # Error Types
//!
//! Domain-specific error types for stockledger-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockledger-core errors (this file)                                   │
//! │  ├── ValidationError   - Malformed movement or query input             │
//! │  └── ConsistencyError  - Applying the movement breaks an invariant     │
//! │                                                                         │
//! │  stockledger-db errors (separate crate)                                │
//! │  ├── DbError           - Storage failures (transient, retryable)       │
//! │  └── LedgerError       - What Append callers see                       │
//! │                                                                         │
//! │  Flow: ValidationError ─┐                                              │
//! │        ConsistencyError ┼──► LedgerError ──► caller                    │
//! │        DbError ─────────┘                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (entity key, field name)
//! 3. Errors are enum variants, never String

use thiserror::Error;

use crate::quantity::Quantity;

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any state is touched. The caller must fix the payload and
/// resubmit; retrying the same payload fails the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or blank.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be zero.
    #[error("{field} must not be zero")]
    MustBeNonZero { field: String },

    /// Invalid format (unparseable quantity, inverted time range).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    /// Creates a Required error for the given field.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }
}

// =============================================================================
// Consistency Error
// =============================================================================

/// Balance invariant violations.
///
/// A business-rule rejection, not a fault: nothing was written, and
/// resubmitting the same movement fails again until upstream state changes.
///
/// ## User Workflow
/// ```text
/// Sale of 5 units, stock on hand = 3
///      │
///      ▼
/// prior 3.000 + delta -5.000 = -2.000
///      │
///      ▼
/// InsufficientBalance { entity_key: "SKU-1", balance: 3.000, delta: -5.000 }
///      │
///      ▼
/// Caller shows: "Only 3 in stock"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    /// The movement would drive the balance below zero.
    #[error("Insufficient balance for {entity_key}: balance {balance}, delta {delta}")]
    InsufficientBalance {
        entity_key: String,
        balance: Quantity,
        delta: Quantity,
    },

    /// The movement would push the balance over a configured cap.
    #[error("Balance cap exceeded for {entity_key}: candidate {candidate}, cap {cap}")]
    CapExceeded {
        entity_key: String,
        candidate: Quantity,
        cap: Quantity,
    },
}

impl ConsistencyError {
    /// Entity key the rejected movement targeted.
    pub fn entity_key(&self) -> &str {
        match self {
            ConsistencyError::InsufficientBalance { entity_key, .. }
            | ConsistencyError::CapExceeded { entity_key, .. } => entity_key,
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Result type for invariant checks.
pub type ConsistencyResult<T> = Result<T, ConsistencyError>;

// =============================================================================
// Unit Tests
// =============================================================================
