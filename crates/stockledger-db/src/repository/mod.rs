//! # Repository Module
//!
//! Database repository implementations for the stock ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  LedgerAppender                                                        │
//! │       │                                                                 │
//! │       │  reads: db.balances().get_balance("SKU-1")                     │
//! │       │  writes: balance::claim(&mut tx, ..) inside the unit of work   │
//! │       ▼                                                                 │
//! │  BalanceRepository            EntryRepository                          │
//! │  ├── get / get_balance        ├── get_by_id / get_by_source_event     │
//! │  ├── get_many                 ├── query (filter + page)               │
//! │  └── list                     ├── group_balances                      │
//! │                               └── entries_for (audit)                 │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Write functions take `&mut SqliteConnection` and are crate-private:   │
//! │  the only way to mutate the ledger is through the appender's          │
//! │  transaction.                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`BalanceRepository`](balance::BalanceRepository) - Materialized balances
//! - [`EntryRepository`](entry::EntryRepository) - Append-only entry log

use chrono::{DateTime, Duration, SubsecRound, Utc};

pub mod balance;
pub mod entry;

/// Encodes a timestamp the way it is stored: RFC 3339, UTC, exactly six
/// fractional digits. Fixed width keeps TEXT comparison chronological.
pub(crate) fn sql_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Encodes an inclusive lower bound. Sub-microsecond precision rounds up to
/// the next stored microsecond, so nothing earlier than `ts` compares `>=`.
pub(crate) fn sql_lower_bound(ts: &DateTime<Utc>) -> String {
    let truncated = ts.trunc_subsecs(6);
    if truncated < *ts {
        sql_timestamp(&(truncated + Duration::microseconds(1)))
    } else {
        sql_timestamp(&truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sql_timestamp_is_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let fractional = whole + chrono::Duration::microseconds(1);

        assert_eq!(sql_timestamp(&whole), "2024-03-01T12:00:00.000000Z");
        assert_eq!(sql_timestamp(&fractional), "2024-03-01T12:00:00.000001Z");
        assert!(sql_timestamp(&whole) < sql_timestamp(&fractional));
    }

    #[test]
    fn test_lower_bound_rounds_up_sub_microseconds() {
        let whole = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        assert_eq!(sql_lower_bound(&whole), "2024-03-01T12:00:00.000000Z");

        let half_micro = whole + chrono::Duration::nanoseconds(500);
        assert_eq!(sql_timestamp(&half_micro), "2024-03-01T12:00:00.000000Z");
        assert_eq!(sql_lower_bound(&half_micro), "2024-03-01T12:00:00.000001Z");

        let one_nano = whole + chrono::Duration::nanoseconds(1);
        assert_eq!(sql_lower_bound(&one_nano), "2024-03-01T12:00:00.000001Z");
    }
}
