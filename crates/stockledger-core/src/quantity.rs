//! # Quantity Module
//!
//! Provides the `Quantity` type for stock amounts and ledger deltas.
//!
//! ## Why Fixed-Point Quantities?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Stock is counted in units, kilograms, litres:                          │
//! │    0.1 kg + 0.2 kg = 0.30000000000000004 kg  ❌ WRONG!                  │
//! │                                                                         │
//! │  A ledger must replay to the exact same balance every time.            │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Thousandths                                     │
//! │    "0.1" → 100, "0.2" → 200, sum = 300 → "0.300"                       │
//! │    Three decimal places, same precision the storage schema keeps       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockledger_core::quantity::Quantity;
//!
//! let received: Quantity = "12.5".parse().unwrap();
//! assert_eq!(received.milli(), 12_500);
//!
//! let sold = Quantity::from_units(4);
//! assert_eq!((received - sold).to_string(), "8.500");
//! ```

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use crate::error::ValidationError;

/// Number of thousandths in one whole unit.
pub const SCALE: i64 = 1_000;

/// Number of fractional digits a quantity keeps.
pub const SCALE_DIGITS: usize = 3;

// =============================================================================
// Quantity Type
// =============================================================================

/// A signed stock quantity in thousandths of a unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: the same type carries magnitudes (event quantities)
///   and signed ledger deltas (`-4.000` for a sale)
/// - **Three decimals**: matches `NUMERIC(12,3)` style storage; more precision
///   is rejected at parse time instead of silently rounded
/// - **String serialization**: `"12.500"` survives JSON round trips through
///   languages that only have doubles
///
/// ## Where Quantity Flows
/// ```text
/// MovementEvent.quantity ──► signed delta ──► LedgerEntry.delta
///                                  │
///                                  ▼
///              prior balance + delta ──► LedgerEntry.balance_after
///                                  │
///                                  ▼
///                         BalanceRecord.balance
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
pub struct Quantity(i64);

impl Quantity {
    /// Creates a quantity from thousandths of a unit.
    ///
    /// ## Example
    /// ```rust
    /// use stockledger_core::quantity::Quantity;
    ///
    /// let q = Quantity::from_milli(1_250); // 1.250
    /// assert_eq!(q.to_string(), "1.250");
    /// ```
    #[inline]
    pub const fn from_milli(milli: i64) -> Self {
        Quantity(milli)
    }

    /// Creates a quantity from whole units.
    ///
    /// ## Example
    /// ```rust
    /// use stockledger_core::quantity::Quantity;
    ///
    /// assert_eq!(Quantity::from_units(-3).milli(), -3_000);
    /// ```
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Quantity(units * SCALE)
    }

    /// Returns the raw value in thousandths.
    #[inline]
    pub const fn milli(&self) -> i64 {
        self.0
    }

    /// Returns the zero quantity.
    #[inline]
    pub const fn zero() -> Self {
        Quantity(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is strictly positive.
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative.
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    ///
    /// Saturates at `i64::MAX` thousandths for the single value whose
    /// magnitude does not fit.
    #[inline]
    pub const fn abs(&self) -> Self {
        Quantity(self.0.saturating_abs())
    }

    /// Adds two quantities, returning `None` on overflow.
    ///
    /// The append path uses this for `prior + delta` so that an absurd
    /// balance is rejected instead of wrapping around.
    #[inline]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Quantity(v)),
            None => None,
        }
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parses a decimal string such as `"12"`, `"12.5"`, `"-0.125"` or `"+3."`.
///
/// ## Rules
/// - Optional leading sign
/// - ASCII digits only, at most one decimal point
/// - At most three fractional digits
/// - Must fit in i64 thousandths
impl FromStr for Quantity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();

        let (negative, unsigned) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw.strip_prefix('+').unwrap_or(raw)),
        };

        let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));

        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid_quantity("must be a decimal number"));
        }

        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(whole) || !all_digits(fraction) {
            return Err(invalid_quantity("must be a decimal number"));
        }

        if fraction.len() > SCALE_DIGITS {
            return Err(invalid_quantity("at most 3 decimal places are supported"));
        }

        let whole_value: i64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| invalid_quantity("value is out of range"))?
        };

        // "5" → 500, "25" → 250, "125" → 125
        let mut fraction_value: i64 = 0;
        for digit in fraction.bytes() {
            fraction_value = fraction_value * 10 + i64::from(digit - b'0');
        }
        for _ in fraction.len()..SCALE_DIGITS {
            fraction_value *= 10;
        }

        let milli = whole_value
            .checked_mul(SCALE)
            .and_then(|v| v.checked_add(fraction_value))
            .ok_or_else(|| invalid_quantity("value is out of range"))?;

        Ok(Quantity(if negative { -milli } else { milli }))
    }
}

fn invalid_quantity(reason: &str) -> ValidationError {
    ValidationError::InvalidFormat {
        field: "quantity".to_string(),
        reason: reason.to_string(),
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Always renders three fractional digits: `"12.500"`, `"-0.125"`, `"0.000"`.
impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let scale = SCALE as u64;
        write!(f, "{}{}.{:03}", sign, magnitude / scale, magnitude % scale)
    }
}

impl Add for Quantity {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Quantity(self.0 + other.0)
    }
}

impl AddAssign for Quantity {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Quantity {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Quantity(self.0 - other.0)
    }
}

impl SubAssign for Quantity {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Quantity {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Quantity(-self.0)
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::zero(), |acc, q| acc + q)
    }
}

impl<'a> Sum<&'a Quantity> for Quantity {
    fn sum<I: Iterator<Item = &'a Quantity>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Serde
// =============================================================================

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(QuantityVisitor)
    }
}

/// Accepts `"12.5"` or a JSON integer `12`. Floats are refused: `12.5` as
/// a double has already lost the exactness this type exists for.
struct QuantityVisitor;

impl<'de> Visitor<'de> for QuantityVisitor {
    type Value = Quantity;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal string with at most 3 fractional digits, or an integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Quantity, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Quantity, E> {
        v.checked_mul(SCALE)
            .map(Quantity)
            .ok_or_else(|| E::custom("quantity is out of range"))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Quantity, E> {
        let v = i64::try_from(v).map_err(|_| E::custom("quantity is out of range"))?;
        self.visit_i64(v)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
