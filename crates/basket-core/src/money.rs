//! # Money Module
//!
//! Integer money and percentage rates.
//!
//! ## Units
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Money        i64 cents               2700  = 27.00                     │
//! │  Percentage   hundredths of a percent 1000  = 10.00%                    │
//! │                                                                         │
//! │  Percentage of money rounds half up to the cent:                        │
//! │    (cents × hundredths + 5000) / 10000                                  │
//! │    1999 × 10.00%  = 199.9  → 200                                        │
//! │    1005 × 5.00%   = 50.25  → 50                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use basket_core::money::Money;
//!
//! let price = Money::from_cents(1099);
//! let line = price.multiply_quantity(3);
//! assert_eq!(line.cents(), 3297);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// Signed so intermediate math (refund lines, subtraction) never wraps,
/// but every stored cart and order amount is non-negative.
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                    Where Money is Used                                  │
/// │                                                                         │
/// │  unit_price × quantity ──► line total ──► subtotal                     │
/// │                                              │                          │
/// │                         discount evaluator ◄─┤                          │
/// │                                              ▼                          │
/// │            subtotal + tax + shipping − discount ──► total               │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use basket_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts only the major unit carries the sign:
    /// `from_major_minor(-5, 50)` is -5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Major unit portion, truncated toward zero.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies a unit price by a quantity.
    ///
    /// ```rust
    /// use basket_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299);
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Clamps negative values to zero.
    #[inline]
    pub const fn non_negative(self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            self
        }
    }

    /// Renders the amount as a plain decimal string ("27.00").
    ///
    /// Currency symbols are left to the caller; the engine only knows the
    /// ISO code stored in settings.
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

// =============================================================================
// Percentage
// =============================================================================

/// A rate in hundredths of a percent (1000 = 10.00%, 10000 = 100%).
///
/// Discount values of percentage type are stored in this unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Percentage(u32);

impl Percentage {
    /// 100.00%
    pub const FULL: Percentage = Percentage(10_000);

    /// Creates a rate, capped at 100%.
    #[inline]
    pub const fn from_hundredths(hundredths: u32) -> Self {
        if hundredths > 10_000 {
            Percentage(10_000)
        } else {
            Percentage(hundredths)
        }
    }

    #[inline]
    pub const fn hundredths(&self) -> u32 {
        self.0
    }

    /// Applies this rate to an amount, rounding half up to the cent.
    ///
    /// ```rust
    /// use basket_core::money::{Money, Percentage};
    ///
    /// let rate = Percentage::from_hundredths(1000);
    /// assert_eq!(rate.of(Money::from_cents(1999)).cents(), 200);
    /// ```
    pub fn of(&self, amount: Money) -> Money {
        // i128 so large subtotals cannot overflow before the division
        let cents = (amount.cents() as i128 * self.0 as i128 + 5000) / 10000;
        Money::from_cents(cents as i64)
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal_string())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(2700).to_string(), "27.00");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
    }

    #[test]
    fn test_percentage_rounds_half_up() {
        let ten = Percentage::from_hundredths(1000);
        assert_eq!(ten.of(Money::from_cents(3000)).cents(), 300);
        assert_eq!(ten.of(Money::from_cents(1999)).cents(), 200);

        // 12.5 cents rounds up to 13
        let five = Percentage::from_hundredths(500);
        assert_eq!(five.of(Money::from_cents(250)).cents(), 13);
        // 50.25 cents rounds down to 50
        assert_eq!(five.of(Money::from_cents(1005)).cents(), 50);
    }

    #[test]
    fn test_percentage_is_capped() {
        assert_eq!(Percentage::from_hundredths(25_000), Percentage::FULL);
        assert_eq!(Percentage::FULL.of(Money::from_cents(1234)).cents(), 1234);
        assert_eq!(Percentage::from_hundredths(1250).to_string(), "12.50%");
    }

    #[test]
    fn test_sum_and_clamp() {
        let lines = [Money::from_cents(1000), Money::from_cents(2000)];
        let total: Money = lines.iter().sum();
        assert_eq!(total.cents(), 3000);
        assert_eq!((Money::from_cents(100) - total).non_negative(), Money::zero());
    }
}
