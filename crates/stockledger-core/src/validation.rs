//! # Validation Module
//!
//! Input validation for movements and ledger queries.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Producer (receiving, sales, stock count)                     │
//! │  └── Deserialization into MovementEvent                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (before any state access)                        │
//! │  ├── Keys present and bounded                                          │
//! │  ├── Quantity sign per direction                                       │
//! │  ├── Reason code + adjustment policy                                   │
//! │  └── Produces the signed delta                                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: ConsistencyGuard (inside the critical section)               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: Database (UNIQUE source_event_id, CHECK balance >= 0)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};

use crate::error::{ValidationError, ValidationResult};
use crate::quantity::Quantity;
use crate::types::{Direction, MovementEvent, Pagination, Reason};
use crate::{MAX_KEY_LENGTH, MAX_PAGE_LIMIT, MAX_REFERENCE_LENGTH};

// =============================================================================
// Movement Policy
// =============================================================================

/// Rules for movements beyond basic shape checks.
///
/// ## Adjustments
/// An `adjust` movement carries an arbitrary signed delta, so it must say
/// why: its reason has to be `adjustment` or `correction`, and with
/// `require_adjustment_reference` it must also point at the document (stock
/// count sheet, incident id) that justifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementPolicy {
    pub require_adjustment_reference: bool,
}

impl Default for MovementPolicy {
    fn default() -> Self {
        MovementPolicy {
            require_adjustment_reference: true,
        }
    }
}

/// A movement that passed validation, reduced to what gets written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedMovement {
    /// Signed change to apply.
    pub delta: Quantity,
    pub reason: Reason,
    /// `None` when absent or blank.
    pub group_key: Option<String>,
    /// `None` when absent or blank.
    pub location_key: Option<String>,
    /// `None` when absent or blank.
    pub reference: Option<String>,
}

/// Validates a movement and computes its signed delta.
///
/// ## Rules
/// - `source_event_id`, `entity_key`: required, at most 64 characters
/// - `group_key`, `location_key`, `reference`: optional, at most 64 characters
/// - increase/decrease: quantity strictly positive
/// - adjust: quantity non-zero (it is the signed delta)
/// - reason: empty → derived from direction, otherwise must parse
/// - adjust: reason must justify an adjustment (see [`MovementPolicy`])
///
/// ## Example
/// ```rust
/// use stockledger_core::{Direction, MovementEvent, Quantity, Reason};
/// use stockledger_core::validation::{validate_movement, MovementPolicy};
///
/// let event = MovementEvent::new("mv-1", "SKU-1", Direction::Decrease, Quantity::from_units(4));
/// let valid = validate_movement(&event, &MovementPolicy::default()).unwrap();
/// assert_eq!(valid.delta, Quantity::from_units(-4));
/// assert_eq!(valid.reason, Reason::Sale);
/// ```
pub fn validate_movement(
    event: &MovementEvent,
    policy: &MovementPolicy,
) -> ValidationResult<ValidatedMovement> {
    validate_key("source_event_id", &event.source_event_id)?;
    validate_key("entity_key", &event.entity_key)?;

    let group_key = non_blank(event.group_key.as_deref());
    if let Some(group) = group_key.as_deref() {
        validate_key("group_key", group)?;
    }

    let location_key = non_blank(event.location_key.as_deref());
    if let Some(location) = location_key.as_deref() {
        validate_key("location_key", location)?;
    }

    let reference = non_blank(event.reference.as_deref());
    if let Some(reference) = reference.as_deref() {
        if reference.chars().count() > MAX_REFERENCE_LENGTH {
            return Err(ValidationError::TooLong {
                field: "reference".to_string(),
                max: MAX_REFERENCE_LENGTH,
            });
        }
    }

    match event.direction {
        Direction::Increase | Direction::Decrease => {
            if !event.quantity.is_positive() {
                return Err(ValidationError::MustBePositive {
                    field: "quantity".to_string(),
                });
            }
        }
        Direction::Adjust => {
            if event.quantity.is_zero() {
                return Err(ValidationError::MustBeNonZero {
                    field: "quantity".to_string(),
                });
            }
        }
    }

    let reason = if event.reason.trim().is_empty() {
        event.direction.default_reason()
    } else {
        event.reason.parse::<Reason>()?
    };

    if event.direction == Direction::Adjust {
        if !reason.justifies_adjustment() {
            return Err(ValidationError::NotAllowed {
                field: "reason".to_string(),
                allowed: vec![
                    Reason::Adjustment.as_str().to_string(),
                    Reason::Correction.as_str().to_string(),
                ],
            });
        }
        if policy.require_adjustment_reference && reference.is_none() {
            return Err(ValidationError::required("reference"));
        }
    }

    Ok(ValidatedMovement {
        delta: event.direction.signed_delta(event.quantity),
        reason,
        group_key,
        location_key,
        reference,
    })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Key Validators
// =============================================================================

/// Validates an identifier (entity key, event id, group key).
///
/// ## Rules
/// - Must not be blank
/// - At most 64 characters
pub fn validate_key(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.chars().count() > MAX_KEY_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_KEY_LENGTH,
        });
    }

    Ok(())
}

// =============================================================================
// Query Validators
// =============================================================================

/// Validates a limit/offset pair and builds a [`Pagination`].
///
/// ## Rules
/// - `limit` between 1 and 500
/// - `offset` non-negative
pub fn validate_pagination(limit: i64, offset: i64) -> ValidationResult<Pagination> {
    if !(1..=MAX_PAGE_LIMIT as i64).contains(&limit) {
        return Err(ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max: MAX_PAGE_LIMIT as i64,
        });
    }

    let offset = u32::try_from(offset).map_err(|_| ValidationError::OutOfRange {
        field: "offset".to_string(),
        min: 0,
        max: u32::MAX as i64,
    })?;

    Ok(Pagination {
        limit: limit as u32,
        offset,
    })
}

/// Validates that an inclusive time window is not inverted.
pub fn validate_time_range(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> ValidationResult<()> {
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(ValidationError::InvalidFormat {
                field: "time_range".to_string(),
                reason: "from must not be after to".to_string(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(direction: Direction, milli: i64) -> MovementEvent {
        MovementEvent::new("mv-1", "SKU-1", direction, Quantity::from_milli(milli))
    }

    #[test]
    fn test_signed_deltas() {
        let policy = MovementPolicy::default();

        let valid = validate_movement(&event(Direction::Increase, 10_000), &policy).unwrap();
        assert_eq!(valid.delta.milli(), 10_000);
        assert_eq!(valid.reason, Reason::Receipt);

        let valid = validate_movement(&event(Direction::Decrease, 4_000), &policy).unwrap();
        assert_eq!(valid.delta.milli(), -4_000);
        assert_eq!(valid.reason, Reason::Sale);

        let adjust = event(Direction::Adjust, -1_000).with_reference("count-7");
        let valid = validate_movement(&adjust, &policy).unwrap();
        assert_eq!(valid.delta.milli(), -1_000);
        assert_eq!(valid.reason, Reason::Adjustment);
    }

    #[test]
    fn test_quantity_sign_rules() {
        let policy = MovementPolicy::default();

        assert!(matches!(
            validate_movement(&event(Direction::Increase, 0), &policy),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(matches!(
            validate_movement(&event(Direction::Decrease, -5), &policy),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(matches!(
            validate_movement(&event(Direction::Adjust, 0).with_reference("x"), &policy),
            Err(ValidationError::MustBeNonZero { .. })
        ));
    }

    #[test]
    fn test_required_keys() {
        let policy = MovementPolicy::default();

        let mut missing_key = event(Direction::Increase, 1);
        missing_key.entity_key = "  ".to_string();
        assert_eq!(
            validate_movement(&missing_key, &policy),
            Err(ValidationError::required("entity_key"))
        );

        let mut missing_id = event(Direction::Increase, 1);
        missing_id.source_event_id.clear();
        assert_eq!(
            validate_movement(&missing_id, &policy),
            Err(ValidationError::required("source_event_id"))
        );

        let mut long_key = event(Direction::Increase, 1);
        long_key.entity_key = "K".repeat(65);
        assert!(matches!(
            validate_movement(&long_key, &policy),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_blank_optionals_become_none() {
        let policy = MovementPolicy::default();
        let e = event(Direction::Increase, 1)
            .with_group(" ")
            .with_location("\t")
            .with_reference("");

        let valid = validate_movement(&e, &policy).unwrap();
        assert_eq!(valid.group_key, None);
        assert_eq!(valid.location_key, None);
        assert_eq!(valid.reference, None);
    }

    #[test]
    fn test_location_is_trimmed_and_bounded() {
        let policy = MovementPolicy::default();

        let e = event(Direction::Increase, 1).with_location(" WH-1 ");
        let valid = validate_movement(&e, &policy).unwrap();
        assert_eq!(valid.location_key.as_deref(), Some("WH-1"));

        let long = event(Direction::Increase, 1).with_location("W".repeat(65));
        assert!(matches!(
            validate_movement(&long, &policy),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_unknown_reason_rejected() {
        let policy = MovementPolicy::default();
        let e = event(Direction::Increase, 1).with_reason("gift");

        assert!(matches!(
            validate_movement(&e, &policy),
            Err(ValidationError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_adjustment_policy() {
        let strict = MovementPolicy::default();
        let lenient = MovementPolicy {
            require_adjustment_reference: false,
        };

        let no_reference = event(Direction::Adjust, 2_000);
        assert_eq!(
            validate_movement(&no_reference, &strict),
            Err(ValidationError::required("reference"))
        );
        assert!(validate_movement(&no_reference, &lenient).is_ok());

        let sale_reason = event(Direction::Adjust, 2_000)
            .with_reason("sale")
            .with_reference("doc-1");
        assert!(matches!(
            validate_movement(&sale_reason, &lenient),
            Err(ValidationError::NotAllowed { .. })
        ));

        let correction = event(Direction::Adjust, -500)
            .with_reason("correction")
            .with_reference("doc-1");
        assert_eq!(
            validate_movement(&correction, &strict).unwrap().reason,
            Reason::Correction
        );
    }

    #[test]
    fn test_validate_pagination() {
        assert_eq!(
            validate_pagination(100, 0).unwrap(),
            Pagination {
                limit: 100,
                offset: 0
            }
        );
        assert!(validate_pagination(500, 10).is_ok());
        assert!(validate_pagination(0, 0).is_err());
        assert!(validate_pagination(501, 0).is_err());
        assert!(validate_pagination(10, -1).is_err());
    }

    #[test]
    fn test_validate_time_range() {
        let now = Utc::now();
        assert!(validate_time_range(Some(now), Some(now)).is_ok());
        assert!(validate_time_range(None, Some(now)).is_ok());
        assert!(validate_time_range(Some(now), Some(now - Duration::seconds(1))).is_err());
    }
}
