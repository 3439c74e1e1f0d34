//! # Consistency Guard
//!
//! Invariants a candidate balance must satisfy before a movement is written.
//!
//! ```text
//! prior balance ──┐
//!                 ├──► candidate = prior + delta ──► rules ──► Ok(candidate)
//! delta ──────────┘                                   │
//!                                                     └──► ConsistencyError
//! ```
//!
//! The guard is a pure decision. It never reads or writes state; the
//! appender calls it inside the per-key critical section with the balance
//! it just read.

use std::fmt;
use std::sync::Arc;

use crate::error::{ConsistencyError, ConsistencyResult};
use crate::quantity::Quantity;

/// One balance invariant.
pub trait BalanceRule: Send + Sync + fmt::Debug {
    fn check(
        &self,
        entity_key: &str,
        prior: Quantity,
        delta: Quantity,
        candidate: Quantity,
    ) -> ConsistencyResult<()>;
}

/// Balance may never go below zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonNegative;

impl BalanceRule for NonNegative {
    fn check(
        &self,
        entity_key: &str,
        prior: Quantity,
        delta: Quantity,
        candidate: Quantity,
    ) -> ConsistencyResult<()> {
        if candidate.is_negative() {
            return Err(ConsistencyError::InsufficientBalance {
                entity_key: entity_key.to_string(),
                balance: prior,
                delta,
            });
        }
        Ok(())
    }
}

/// Balance may never exceed a fixed ceiling.
#[derive(Debug, Clone, Copy)]
pub struct BalanceCap(pub Quantity);

impl BalanceRule for BalanceCap {
    fn check(
        &self,
        entity_key: &str,
        _prior: Quantity,
        _delta: Quantity,
        candidate: Quantity,
    ) -> ConsistencyResult<()> {
        if candidate > self.0 {
            return Err(ConsistencyError::CapExceeded {
                entity_key: entity_key.to_string(),
                candidate,
                cap: self.0,
            });
        }
        Ok(())
    }
}

/// Ordered set of [`BalanceRule`]s. The first failing rule wins.
///
/// ## Example
/// ```rust
/// use stockledger_core::{BalanceCap, ConsistencyGuard, Quantity};
///
/// let guard = ConsistencyGuard::default().with_rule(BalanceCap(Quantity::from_units(100)));
///
/// let ok = guard.check("SKU-1", Quantity::from_units(10), Quantity::from_units(-4));
/// assert_eq!(ok.unwrap(), Quantity::from_units(6));
///
/// assert!(guard.check("SKU-1", Quantity::from_units(99), Quantity::from_units(2)).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ConsistencyGuard {
    rules: Vec<Arc<dyn BalanceRule>>,
}

impl Default for ConsistencyGuard {
    /// Non-negative balances only.
    fn default() -> Self {
        ConsistencyGuard {
            rules: vec![Arc::new(NonNegative)],
        }
    }
}

impl ConsistencyGuard {
    /// A guard that accepts any representable balance.
    pub fn permissive() -> Self {
        ConsistencyGuard { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: impl BalanceRule + 'static) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    /// Computes `prior + delta` and runs every rule against it.
    ///
    /// Returns the candidate balance when all rules pass. A sum that does
    /// not fit the quantity range is reported as a cap violation at the
    /// representable maximum.
    pub fn check(
        &self,
        entity_key: &str,
        prior: Quantity,
        delta: Quantity,
    ) -> ConsistencyResult<Quantity> {
        let candidate = match prior.checked_add(delta) {
            Some(candidate) => candidate,
            None if delta.is_negative() => {
                return Err(ConsistencyError::InsufficientBalance {
                    entity_key: entity_key.to_string(),
                    balance: prior,
                    delta,
                })
            }
            None => {
                return Err(ConsistencyError::CapExceeded {
                    entity_key: entity_key.to_string(),
                    candidate: Quantity::from_milli(i64::MAX),
                    cap: Quantity::from_milli(i64::MAX),
                })
            }
        };

        for rule in &self.rules {
            rule.check(entity_key, prior, delta, candidate)?;
        }

        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn q(units: i64) -> Quantity {
        Quantity::from_units(units)
    }

    #[test]
    fn test_non_negative_rejects_oversell() {
        let guard = ConsistencyGuard::default();

        assert_eq!(guard.check("SKU-1", q(10), q(-4)).unwrap(), q(6));
        assert_eq!(guard.check("SKU-1", q(6), q(-6)).unwrap(), Quantity::zero());

        let err = guard.check("SKU-1", q(6), q(-7)).unwrap_err();
        assert_eq!(
            err,
            ConsistencyError::InsufficientBalance {
                entity_key: "SKU-1".to_string(),
                balance: q(6),
                delta: q(-7),
            }
        );
    }

    #[test]
    fn test_cap_rule() {
        let guard = ConsistencyGuard::default().with_rule(BalanceCap(q(50)));

        assert!(guard.check("SKU-1", q(40), q(10)).is_ok());
        assert!(matches!(
            guard.check("SKU-1", q(40), q(11)),
            Err(ConsistencyError::CapExceeded { .. })
        ));
    }

    #[test]
    fn test_first_failing_rule_wins() {
        let guard = ConsistencyGuard::default().with_rule(BalanceCap(q(-1)));

        assert!(matches!(
            guard.check("SKU-1", q(1), q(-2)),
            Err(ConsistencyError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_permissive_allows_negative() {
        let guard = ConsistencyGuard::permissive();
        assert_eq!(guard.check("SKU-1", q(1), q(-3)).unwrap(), q(-2));
    }

    #[test]
    fn test_overflow_is_rejected() {
        let guard = ConsistencyGuard::permissive();
        let max = Quantity::from_milli(i64::MAX);

        assert!(matches!(
            guard.check("SKU-1", max, Quantity::from_milli(1)),
            Err(ConsistencyError::CapExceeded { .. })
        ));
    }

    proptest! {
        #[test]
        fn accepted_balances_never_negative(
            start in 0i64..1_000_000,
            deltas in proptest::collection::vec(-500_000i64..500_000, 0..50),
        ) {
            let guard = ConsistencyGuard::default();
            let mut balance = Quantity::from_milli(start);

            for delta in deltas {
                if let Ok(next) = guard.check("SKU-P", balance, Quantity::from_milli(delta)) {
                    balance = next;
                }
                prop_assert!(!balance.is_negative());
            }
        }
    }
}
