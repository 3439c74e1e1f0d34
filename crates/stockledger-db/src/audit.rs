//! # Chain Audit
//!
//! Replays one key's entries oldest-first and checks that the log and the
//! materialized balance tell the same story.
//!
//! ```text
//! entries:   +10 (after 10)   -4 (after 6)   -1 (after 5)
//! running:    10               6              5        stored balance: 5  ✓
//! ```
//!
//! Findings are data, not errors: an auditor wants the full list.

use chrono::{DateTime, Utc};
use serde::Serialize;

use stockledger_core::{LedgerEntry, Quantity};

/// One discrepancy found while replaying a key's entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainViolation {
    /// `balance_after` differs from the running total of deltas.
    BalanceMismatch {
        entry_id: String,
        expected: Quantity,
        recorded: Quantity,
    },

    /// The running total went below zero.
    NegativeBalance { entry_id: String, balance: Quantity },

    /// `created_at` did not strictly increase.
    NonIncreasingTimestamp {
        entry_id: String,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    /// Sum of deltas differs from the stored balance record.
    StoredBalanceMismatch { computed: Quantity, stored: Quantity },
}

/// Result of auditing one entity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    pub entity_key: String,
    pub entries: usize,
    /// Sum of all deltas.
    pub computed: Quantity,
    /// Materialized balance (zero when no record exists).
    pub stored: Quantity,
    pub violations: Vec<ChainViolation>,
}

impl ChainReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Audits `entries` (oldest first) against the `stored` balance.
pub fn audit_chain(entity_key: &str, entries: &[LedgerEntry], stored: Quantity) -> ChainReport {
    let mut violations = Vec::new();
    let mut running = Quantity::zero();
    let mut previous: Option<DateTime<Utc>> = None;

    for entry in entries {
        running = match running.checked_add(entry.delta) {
            Some(next) => next,
            None => {
                violations.push(ChainViolation::BalanceMismatch {
                    entry_id: entry.id.clone(),
                    expected: running,
                    recorded: entry.balance_after,
                });
                entry.balance_after
            }
        };

        if entry.balance_after != running {
            violations.push(ChainViolation::BalanceMismatch {
                entry_id: entry.id.clone(),
                expected: running,
                recorded: entry.balance_after,
            });
        }

        if running.is_negative() {
            violations.push(ChainViolation::NegativeBalance {
                entry_id: entry.id.clone(),
                balance: running,
            });
        }

        if let Some(prev) = previous {
            if entry.created_at <= prev {
                violations.push(ChainViolation::NonIncreasingTimestamp {
                    entry_id: entry.id.clone(),
                    previous: prev,
                    current: entry.created_at,
                });
            }
        }
        previous = Some(entry.created_at);
    }

    if running != stored {
        violations.push(ChainViolation::StoredBalanceMismatch {
            computed: running,
            stored,
        });
    }

    ChainReport {
        entity_key: entity_key.to_string(),
        entries: entries.len(),
        computed: running,
        stored,
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stockledger_core::Reason;

    fn chain(deltas_and_afters: &[(i64, i64)]) -> Vec<LedgerEntry> {
        let start = Utc::now();
        deltas_and_afters
            .iter()
            .enumerate()
            .map(|(i, (delta, after))| LedgerEntry {
                id: format!("e{i}"),
                entity_key: "SKU-1".to_string(),
                group_key: None,
                location_key: None,
                source_event_id: format!("ev{i}"),
                delta: Quantity::from_units(*delta),
                balance_after: Quantity::from_units(*after),
                reason: Reason::Receipt,
                reference: None,
                created_at: start + Duration::microseconds(i as i64),
            })
            .collect()
    }

    #[test]
    fn test_consistent_chain() {
        let entries = chain(&[(10, 10), (-4, 6), (-1, 5)]);
        let report = audit_chain("SKU-1", &entries, Quantity::from_units(5));

        assert!(report.is_consistent());
        assert_eq!(report.entries, 3);
        assert_eq!(report.computed, Quantity::from_units(5));
    }

    #[test]
    fn test_empty_chain_matches_zero() {
        assert!(audit_chain("SKU-1", &[], Quantity::zero()).is_consistent());
    }

    #[test]
    fn test_detects_broken_link_and_stored_mismatch() {
        let entries = chain(&[(10, 10), (-4, 7)]);
        let report = audit_chain("SKU-1", &entries, Quantity::from_units(7));

        assert_eq!(
            report.violations,
            vec![
                ChainViolation::BalanceMismatch {
                    entry_id: "e1".to_string(),
                    expected: Quantity::from_units(6),
                    recorded: Quantity::from_units(7),
                },
                ChainViolation::StoredBalanceMismatch {
                    computed: Quantity::from_units(6),
                    stored: Quantity::from_units(7),
                },
            ]
        );
    }

    #[test]
    fn test_detects_negative_and_time_order() {
        let mut entries = chain(&[(1, 1), (-2, -1)]);
        entries[1].created_at = entries[0].created_at;

        let report = audit_chain("SKU-1", &entries, Quantity::from_units(-1));

        assert!(report
            .violations
            .iter()
            .any(|v| matches!(v, ChainViolation::NegativeBalance { .. })));
        assert!(report
            .violations
            .iter()
            .any(|v| matches!(v, ChainViolation::NonIncreasingTimestamp { .. })));
    }
}
