//! Money types
//!
//! Cash and price amounts are `rust_decimal::Decimal` values, never
//! floating point. Cash carries 2 fractional digits, price carries 4.
//! Both newtypes reject negative construction and expose only checked
//! arithmetic: private fields, every mutation validated, nothing
//! silently clamped.

use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

pub const CASH_SCALE: u32 = 2;
pub const PRICE_SCALE: u32 = 4;

/// A non-negative monetary amount, rescaled to [`CASH_SCALE`] fractional
/// digits on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cash(Decimal);

/// A non-negative per-share price, rescaled to [`PRICE_SCALE`] fractional
/// digits on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Cash {
    pub const ZERO: Cash = Cash(Decimal::ZERO);

    /// Construct from a `Decimal`, rounding half-away-from-zero to the
    /// cash scale. Returns `None` for negative input.
    pub fn new(value: Decimal) -> Option<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return None;
        }
        Some(Cash(
            value.round_dp_with_strategy(CASH_SCALE, RoundingStrategy::MidpointAwayFromZero),
        ))
    }

    pub fn inner(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, other: Cash) -> Option<Cash> {
        Cash::new(self.0 + other.0)
    }

    /// Subtraction that rejects results that would go negative.
    pub fn checked_sub(self, other: Cash) -> Option<Cash> {
        if self.0 < other.0 {
            return None;
        }
        Cash::new(self.0 - other.0)
    }
}

impl Price {
    /// Construct from a `Decimal`, rescaled to the price scale without
    /// rounding loss (orders place at an exact limit price). Returns
    /// `None` for non-positive input.
    pub fn new(value: Decimal) -> Option<Self> {
        if value <= Decimal::ZERO {
            return None;
        }
        Some(Price(value.round_dp(PRICE_SCALE)))
    }

    pub fn inner(self) -> Decimal {
        self.0
    }

    /// Multiply by an integer quantity to produce a cash amount, rounded
    /// half-away-from-zero to cash scale as a fill price settles against
    /// the ledger.
    pub fn times_qty(self, qty: u64) -> Cash {
        let total = self.0 * Decimal::from(qty);
        Cash(total.round_dp_with_strategy(CASH_SCALE, RoundingStrategy::MidpointAwayFromZero))
    }
}

impl fmt::Display for Cash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Cash {
    type Output = Cash;
    fn add(self, rhs: Cash) -> Cash {
        self.checked_add(rhs).expect("cash addition overflowed scale")
    }
}

impl Sub for Cash {
    type Output = Cash;
    fn sub(self, rhs: Cash) -> Cash {
        self.checked_sub(rhs)
            .expect("cash subtraction would go negative")
    }
}

impl Sum for Cash {
    fn sum<I: Iterator<Item = Cash>>(iter: I) -> Self {
        iter.fold(Cash::ZERO, |acc, c| acc + c)
    }
}

/// Quantity-weighted average, used for `avgFillPrice` and `avgCost`.
/// `prior_qty`/`prior_value` describe the existing basis; `add_qty`/
/// `add_value` describe the increment.
pub fn weighted_average(
    prior_qty: u64,
    prior_value: Decimal,
    add_qty: u64,
    add_value: Decimal,
) -> Decimal {
    let total_qty = prior_qty + add_qty;
    if total_qty == 0 {
        return Decimal::ZERO;
    }
    (prior_value * Decimal::from(prior_qty) + add_value * Decimal::from(add_qty))
        / Decimal::from(total_qty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn cash_rejects_negative() {
        assert!(Cash::new(dec!(-1.00)).is_none());
        assert!(Cash::new(dec!(0.00)).is_some());
    }

    #[test]
    fn cash_rounds_half_away_from_zero() {
        let c = Cash::new(dec!(10.005)).unwrap();
        assert_eq!(c.inner(), dec!(10.01));
    }

    #[test]
    fn price_times_qty_rounds_to_cash_scale() {
        let p = Price::new(dec!(33.333)).unwrap();
        assert_eq!(p.times_qty(3).inner(), dec!(100.00));
    }

    #[test]
    fn checked_sub_rejects_negative_result() {
        let a = Cash::new(dec!(5.00)).unwrap();
        let b = Cash::new(dec!(10.00)).unwrap();
        assert!(a.checked_sub(b).is_none());
    }

    #[test]
    fn weighted_average_basic() {
        // 3 @ 100 then 1 @ 104 -> (300+104)/4 = 101
        let avg = weighted_average(3, dec!(100), 1, dec!(104));
        assert_eq!(avg, dec!(101));
    }
}
