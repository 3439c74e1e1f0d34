//! # Domain Types
//!
//! Core domain types used throughout the stock ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  MovementEvent  │   │   LedgerEntry   │   │  BalanceRecord  │       │
//! │  │  ─────────────  │──►│  ─────────────  │──►│  ─────────────  │       │
//! │  │  source_event_id│   │  id (UUID)      │   │  entity_key     │       │
//! │  │  entity_key     │   │  delta          │   │  balance        │       │
//! │  │  quantity       │   │  balance_after  │   │  updated_at     │       │
//! │  │  direction      │   │  created_at     │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                              │
//! │   (external input)      (immutable, append-only) (mutable snapshot)    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Direction    │   │     Reason      │   │  LedgerFilter   │       │
//! │  │  Increase       │   │  Receipt, Sale  │   │  Pagination     │       │
//! │  │  Decrease       │   │  Adjustment ... │   │  Page<T>        │       │
//! │  │  Adjust         │   └─────────────────┘   └─────────────────┘       │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::quantity::Quantity;
use crate::DEFAULT_PAGE_LIMIT;

// =============================================================================
// Direction
// =============================================================================

/// Which way a movement moves the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Stock comes in (receipt, return). Quantity is a magnitude.
    #[serde(alias = "in", alias = "IN")]
    Increase,
    /// Stock goes out (sale, write-off). Quantity is a magnitude.
    #[serde(alias = "out", alias = "OUT")]
    Decrease,
    /// Quantity is an already-signed delta.
    #[serde(alias = "ADJUST")]
    Adjust,
}

impl Direction {
    /// Turns the event quantity into the signed ledger delta.
    ///
    /// ## Example
    /// ```rust
    /// use stockledger_core::{Direction, Quantity};
    ///
    /// let q = Quantity::from_units(4);
    /// assert_eq!(Direction::Increase.signed_delta(q), Quantity::from_units(4));
    /// assert_eq!(Direction::Decrease.signed_delta(q), Quantity::from_units(-4));
    /// assert_eq!(Direction::Adjust.signed_delta(-q), Quantity::from_units(-4));
    /// ```
    pub fn signed_delta(self, quantity: Quantity) -> Quantity {
        match self {
            Direction::Increase => quantity.abs(),
            Direction::Decrease => -quantity.abs(),
            Direction::Adjust => quantity,
        }
    }

    /// Reason recorded when the event does not name one.
    pub fn default_reason(self) -> Reason {
        match self {
            Direction::Increase => Reason::Receipt,
            Direction::Decrease => Reason::Sale,
            Direction::Adjust => Reason::Adjustment,
        }
    }

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Increase => "increase",
            Direction::Decrease => "decrease",
            Direction::Adjust => "adjust",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "increase" | "in" => Ok(Direction::Increase),
            "decrease" | "out" => Ok(Direction::Decrease),
            "adjust" => Ok(Direction::Adjust),
            _ => Err(ValidationError::NotAllowed {
                field: "direction".to_string(),
                allowed: vec![
                    "increase".to_string(),
                    "decrease".to_string(),
                    "adjust".to_string(),
                ],
            }),
        }
    }
}

// =============================================================================
// Reason
// =============================================================================

/// Categorical cause of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Goods received from a supplier.
    Receipt,
    /// Goods sold to a customer.
    Sale,
    /// Goods returned by a customer.
    Return,
    /// Stock count adjustment.
    Adjustment,
    /// Correction of an earlier, wrong entry.
    Correction,
    /// Moved between locations.
    Transfer,
    /// Damaged, expired or lost.
    WriteOff,
}

impl Reason {
    /// Every reason, in declaration order.
    pub const ALL: [Reason; 7] = [
        Reason::Receipt,
        Reason::Sale,
        Reason::Return,
        Reason::Adjustment,
        Reason::Correction,
        Reason::Transfer,
        Reason::WriteOff,
    ];

    /// Snake-case code, identical to the stored value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Receipt => "receipt",
            Reason::Sale => "sale",
            Reason::Return => "return",
            Reason::Adjustment => "adjustment",
            Reason::Correction => "correction",
            Reason::Transfer => "transfer",
            Reason::WriteOff => "write_off",
        }
    }

    /// Whether this reason may justify an `adjust` movement.
    pub fn justifies_adjustment(&self) -> bool {
        matches!(self, Reason::Adjustment | Reason::Correction)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive. Movement type codes (`IN`, `OUT`, `ADJUST`) are
/// accepted as aliases so legacy producers keep working.
impl FromStr for Reason {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "receipt" | "in" => Ok(Reason::Receipt),
            "sale" | "out" => Ok(Reason::Sale),
            "return" => Ok(Reason::Return),
            "adjustment" | "adjust" => Ok(Reason::Adjustment),
            "correction" => Ok(Reason::Correction),
            "transfer" => Ok(Reason::Transfer),
            "write_off" | "writeoff" => Ok(Reason::WriteOff),
            _ => Err(ValidationError::NotAllowed {
                field: "reason".to_string(),
                allowed: Reason::ALL.iter().map(|r| r.as_str().to_string()).collect(),
            }),
        }
    }
}

// =============================================================================
// Movement Event
// =============================================================================

/// A stock movement produced by an external collaborator (receiving,
/// sales, stock counts). The only input the appender accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MovementEvent {
    /// Idempotency key. Replaying the same id never applies twice.
    pub source_event_id: String,

    /// Balance being moved (product id).
    pub entity_key: String,

    /// Optional secondary dimension (batch id).
    #[serde(default)]
    pub group_key: Option<String>,

    /// Where the stock sits (warehouse id). Recorded on the entry and
    /// filterable; the balance stays per entity key.
    #[serde(default, alias = "warehouse_id")]
    pub location_key: Option<String>,

    /// Magnitude for increase/decrease, signed delta for adjust.
    #[ts(as = "String")]
    pub quantity: Quantity,

    pub direction: Direction,

    /// Cause code; empty means "derive from direction".
    #[serde(default)]
    pub reason: String,

    /// Originating document (order id, receipt id).
    #[serde(default)]
    pub reference: Option<String>,
}

impl MovementEvent {
    /// Creates an event with no group, default reason and no reference.
    pub fn new(
        source_event_id: impl Into<String>,
        entity_key: impl Into<String>,
        direction: Direction,
        quantity: Quantity,
    ) -> Self {
        MovementEvent {
            source_event_id: source_event_id.into(),
            entity_key: entity_key.into(),
            group_key: None,
            location_key: None,
            quantity,
            direction,
            reason: String::new(),
            reference: None,
        }
    }

    /// Sets the group (batch) key.
    pub fn with_group(mut self, group_key: impl Into<String>) -> Self {
        self.group_key = Some(group_key.into());
        self
    }

    /// Sets the location (warehouse) key.
    pub fn with_location(mut self, location_key: impl Into<String>) -> Self {
        self.location_key = Some(location_key.into());
        self
    }

    /// Sets the reason code.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Sets the originating document reference.
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

// =============================================================================
// Ledger Entry
// =============================================================================

/// One immutable record per applied movement.
///
/// Never updated, never deleted. Corrections are new entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LedgerEntry {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub entity_key: String,

    pub group_key: Option<String>,

    pub location_key: Option<String>,

    /// Idempotency key copied from the movement.
    pub source_event_id: String,

    /// Signed change; never zero.
    #[ts(as = "String")]
    pub delta: Quantity,

    /// Entity balance right after this entry; never negative.
    #[ts(as = "String")]
    pub balance_after: Quantity,

    pub reason: Reason,

    pub reference: Option<String>,

    /// Strictly increasing per entity key.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Balance Record
// =============================================================================

/// Current materialized balance for one entity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct BalanceRecord {
    pub entity_key: String,

    #[ts(as = "String")]
    pub balance: Quantity,

    /// Timestamp of the latest entry for this key.
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Balance of one `(entity_key, group_key)` pair, summed from the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct GroupBalance {
    pub entity_key: String,

    pub group_key: String,

    #[ts(as = "String")]
    pub balance: Quantity,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Queries
// =============================================================================

/// Filter for listing ledger entries. Every field is optional; an empty
/// filter matches the whole log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerFilter {
    pub entity_key: Option<String>,
    pub group_key: Option<String>,
    pub location_key: Option<String>,
    pub reason: Option<Reason>,
    /// Inclusive lower bound on `created_at`.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub to: Option<DateTime<Utc>>,
}

impl LedgerFilter {
    pub fn for_entity(entity_key: impl Into<String>) -> Self {
        LedgerFilter {
            entity_key: Some(entity_key.into()),
            ..Default::default()
        }
    }

    pub fn group(mut self, group_key: impl Into<String>) -> Self {
        self.group_key = Some(group_key.into());
        self
    }

    pub fn location(mut self, location_key: impl Into<String>) -> Self {
        self.location_key = Some(location_key.into());
        self
    }

    pub fn reason(mut self, reason: Reason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }
}

/// Limit/offset window. Build with [`crate::validation::validate_pagination`]
/// to get range checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

/// One page of results plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

impl<T> Page<T> {
    /// Whether more matches exist after this page.
    pub fn has_more(&self) -> bool {
        (self.offset as u64 + self.items.len() as u64) < self.total
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_parsing() {
        assert_eq!("increase".parse::<Direction>().unwrap(), Direction::Increase);
        assert_eq!("OUT".parse::<Direction>().unwrap(), Direction::Decrease);
        assert_eq!(" Adjust ".parse::<Direction>().unwrap(), Direction::Adjust);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_reason_parsing_and_aliases() {
        assert_eq!("receipt".parse::<Reason>().unwrap(), Reason::Receipt);
        assert_eq!("IN".parse::<Reason>().unwrap(), Reason::Receipt);
        assert_eq!("write-off".parse::<Reason>().unwrap(), Reason::WriteOff);
        assert_eq!("Write Off".parse::<Reason>().unwrap(), Reason::WriteOff);
        assert!("theft?".parse::<Reason>().is_err());

        for reason in Reason::ALL {
            assert_eq!(reason.as_str().parse::<Reason>().unwrap(), reason);
        }
    }

    #[test]
    fn test_event_json_shape() {
        let json = r#"{
            "source_event_id": "mv-1",
            "entity_key": "SKU-1",
            "quantity": "2.5",
            "direction": "out"
        }"#;
        let event: MovementEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.direction, Direction::Decrease);
        assert_eq!(event.quantity, Quantity::from_milli(2_500));
        assert!(event.reason.is_empty());
        assert!(event.group_key.is_none());
        assert!(event.location_key.is_none());
    }

    #[test]
    fn test_event_accepts_warehouse_alias() {
        let json = r#"{
            "source_event_id": "mv-2",
            "entity_key": "SKU-1",
            "warehouse_id": "WH-NORTH",
            "quantity": 3,
            "direction": "in"
        }"#;
        let event: MovementEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.location_key.as_deref(), Some("WH-NORTH"));
    }

    #[test]
    fn test_reason_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Reason::WriteOff).unwrap(), "\"write_off\"");
    }

    #[test]
    fn test_page_has_more() {
        let page = Page {
            items: vec![1, 2],
            total: 5,
            limit: 2,
            offset: 2,
        };
        assert!(page.has_more());

        let last = Page {
            items: vec![5],
            total: 5,
            limit: 2,
            offset: 4,
        };
        assert!(!last.has_more());
    }
}
