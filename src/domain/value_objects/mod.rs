//! Value Objects for the storefront

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

/// Money value object.
///
/// Full precision is kept while aggregating; call [`Money::rounded`] at the point a
/// value is shown to a customer or written to the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self { Self(amount) }
    pub fn zero() -> Self { Self::ZERO }
    /// Builds an amount from integer cents, e.g. `Money::from_cents(4400)` is 44.00.
    pub fn from_cents(cents: i64) -> Self { Self(Decimal::new(cents, 2)) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }

    /// Rounds half away from zero to two decimal places.
    pub fn rounded(&self) -> Money {
        Money(self.0.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    pub fn multiply(&self, qty: u32) -> Money { Money(self.0 * Decimal::from(qty)) }

    /// Price after taking `pct` off.
    pub fn discounted_by(&self, pct: Percentage) -> Money {
        Money(self.0 * (Decimal::ONE - pct.fraction()))
    }

    /// The `pct` share of this amount.
    pub fn percent_of(&self, pct: Percentage) -> Money { Money(self.0 * pct.fraction()) }

    pub fn min(self, other: Money) -> Money { if self <= other { self } else { other } }

    /// Clamps negative amounts to zero.
    pub fn non_negative(self) -> Money { if self.is_negative() { Money::ZERO } else { self } }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money { Money(self.0 - rhs.0) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, |acc, m| acc + m) }
}

impl From<Decimal> for Money {
    fn from(d: Decimal) -> Self { Money(d) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.rounded().0) }
}

/// A percentage in `0..=100`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percentage(Decimal);

impl Percentage {
    pub fn new(value: Decimal) -> Result<Self, ValueError> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(ValueError::PercentageOutOfRange(value));
        }
        Ok(Self(value))
    }
    pub fn value(&self) -> Decimal { self.0 }
    pub fn fraction(&self) -> Decimal { self.0 / Decimal::ONE_HUNDRED }
}

impl TryFrom<Decimal> for Percentage {
    type Error = ValueError;
    fn try_from(value: Decimal) -> Result<Self, Self::Error> { Percentage::new(value) }
}

impl From<Percentage> for Decimal {
    fn from(p: Percentage) -> Decimal { p.0 }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}%", self.0.normalize()) }
}

/// Star rating, 1 through 5.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub fn new(value: u8) -> Result<Self, ValueError> {
        if !(1..=5).contains(&value) { return Err(ValueError::RatingOutOfRange(value)); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u8 { self.0 }
}

impl TryFrom<u8> for Rating {
    type Error = ValueError;
    fn try_from(value: u8) -> Result<Self, Self::Error> { Rating::new(value) }
}

impl From<Rating> for u8 {
    fn from(r: Rating) -> u8 { r.0 }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueError { PercentageOutOfRange(Decimal), RatingOutOfRange(u8) }
impl std::error::Error for ValueError {}
impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PercentageOutOfRange(v) => write!(f, "percentage {v} must be between 0 and 100"),
            Self::RatingOutOfRange(v) => write!(f, "rating {v} must be between 1 and 5"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_rounding() {
        assert_eq!(Money::new(dec!(8.805)).rounded(), Money::new(dec!(8.81)));
        assert_eq!(Money::new(dec!(-8.805)).rounded(), Money::new(dec!(-8.81)));
        assert_eq!(Money::new(dec!(44)).to_string(), "44.00");
    }

    #[test]
    fn test_money_discount() {
        let pct = Percentage::new(dec!(20)).unwrap();
        assert_eq!(Money::new(dec!(55)).discounted_by(pct), Money::new(dec!(44)));
        assert_eq!(Money::new(dec!(88)).percent_of(Percentage::new(dec!(10)).unwrap()), Money::new(dec!(8.8)));
    }

    #[test]
    fn test_money_sum_and_clamp() {
        let total: Money = [Money::from_cents(150), Money::from_cents(250)].into_iter().sum();
        assert_eq!(total, Money::new(dec!(4)));
        assert_eq!((Money::from_cents(100) - Money::from_cents(300)).non_negative(), Money::ZERO);
    }

    #[test]
    fn test_percentage_bounds() {
        assert!(Percentage::new(dec!(0)).is_ok());
        assert!(Percentage::new(dec!(100)).is_ok());
        assert!(Percentage::new(dec!(100.01)).is_err());
        assert!(Percentage::new(dec!(-1)).is_err());
        assert!(serde_json::from_str::<Percentage>("\"150\"").is_err());
    }

    #[test]
    fn test_rating_bounds() {
        assert!(Rating::new(0).is_err());
        assert_eq!(Rating::new(5).unwrap().value(), 5);
        assert!(serde_json::from_str::<Rating>("6").is_err());
    }
}
