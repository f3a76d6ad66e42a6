//! Coupon Aggregate

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::{Money, Percentage};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType { Percentage, Fixed }

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Percentage => "percentage", Self::Fixed => "fixed" }
    }
}

impl FromStr for DiscountType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(Self::Percentage),
            "fixed" => Ok(Self::Fixed),
            other => Err(format!("unknown discount type `{other}`")),
        }
    }
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub minimum_purchase: Option<Money>,
    pub expiry_date: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    pub fn create(code: &str, discount_type: DiscountType, discount_value: Decimal) -> Self {
        Self {
            id: Uuid::now_v7(), code: normalize_code(code), discount_type, discount_value,
            minimum_purchase: None, expiry_date: None, is_active: true, created_at: Utc::now(),
        }
    }

    pub fn with_minimum_purchase(mut self, amount: Money) -> Self { self.minimum_purchase = Some(amount); self }
    pub fn expires_on(mut self, date: NaiveDate) -> Self { self.expiry_date = Some(date); self }

    /// Expired once the expiry day has passed; the expiry day itself still redeems.
    pub fn is_expired(&self, as_of: DateTime<Utc>) -> bool {
        self.expiry_date.is_some_and(|d| d < as_of.date_naive())
    }

    /// Discount this coupon grants on `subtotal`. Fixed amounts never exceed the subtotal.
    pub fn discount_for(&self, subtotal: Money) -> Money {
        match self.discount_type {
            DiscountType::Percentage => match Percentage::new(self.discount_value) {
                Ok(pct) => subtotal.percent_of(pct),
                Err(_) => subtotal,
            },
            DiscountType::Fixed => Money::new(self.discount_value).non_negative().min(subtotal.non_negative()),
        }
    }
}

/// Codes are compared trimmed and case-insensitively.
pub fn normalize_code(code: &str) -> String { code.trim().to_uppercase() }

/// Why a code could not be redeemed, checked in declaration order.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CouponRejection {
    #[error("Coupon code not found")]
    NotFound,
    #[error("This coupon is no longer active")]
    Inactive,
    #[error("This coupon expired on {0}")]
    Expired(NaiveDate),
    #[error("A minimum purchase of {minimum} is required for this coupon")]
    BelowMinimum { minimum: Money },
}

/// A coupon that passed validation against a subtotal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppliedCoupon {
    pub coupon_id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub discount_amount: Money,
    pub message: String,
}

/// Validate a looked-up coupon against the cart subtotal.
pub fn validate_coupon(coupon: Option<&Coupon>, cart_subtotal: Money, as_of: DateTime<Utc>) -> Result<AppliedCoupon, CouponRejection> {
    let coupon = coupon.ok_or(CouponRejection::NotFound)?;
    if !coupon.is_active { return Err(CouponRejection::Inactive); }
    if let Some(expiry) = coupon.expiry_date.filter(|_| coupon.is_expired(as_of)) {
        return Err(CouponRejection::Expired(expiry));
    }
    if let Some(minimum) = coupon.minimum_purchase {
        if cart_subtotal < minimum { return Err(CouponRejection::BelowMinimum { minimum }); }
    }
    let discount_amount = coupon.discount_for(cart_subtotal);
    let message = match coupon.discount_type {
        DiscountType::Percentage => format!("{} applied: {}% off", coupon.code, coupon.discount_value.normalize()),
        DiscountType::Fixed => format!("{} applied: {} off", coupon.code, Money::new(coupon.discount_value)),
    };
    Ok(AppliedCoupon {
        coupon_id: coupon.id, code: coupon.code.clone(), discount_type: coupon.discount_type,
        discount_value: coupon.discount_value, discount_amount, message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_percentage_coupon() {
        let c = Coupon::create("welcome10", DiscountType::Percentage, dec!(10)).with_minimum_purchase(Money::ZERO);
        assert_eq!(c.code, "WELCOME10");
        let applied = validate_coupon(Some(&c), Money::new(dec!(88.00)), Utc::now()).unwrap();
        assert_eq!(applied.discount_amount.rounded(), Money::new(dec!(8.80)));
        assert_eq!((Money::new(dec!(88.00)) - applied.discount_amount).rounded(), Money::new(dec!(79.20)));
    }

    #[test]
    fn test_fixed_coupon_clamped_to_subtotal() {
        let c = Coupon::create("TWENTY", DiscountType::Fixed, dec!(20));
        let applied = validate_coupon(Some(&c), Money::new(dec!(15)), Utc::now()).unwrap();
        assert_eq!(applied.discount_amount, Money::new(dec!(15)));
        assert_eq!(Money::new(dec!(15)) - applied.discount_amount, Money::ZERO);
    }

    #[test]
    fn test_rejections_in_order() {
        let now = Utc::now();
        assert_eq!(validate_coupon(None, Money::ZERO, now), Err(CouponRejection::NotFound));

        let mut c = Coupon::create("SPRING", DiscountType::Percentage, dec!(5))
            .with_minimum_purchase(Money::new(dec!(100)))
            .expires_on(now.date_naive() - Duration::days(1));
        c.is_active = false;
        assert_eq!(validate_coupon(Some(&c), Money::ZERO, now), Err(CouponRejection::Inactive));
        c.is_active = true;
        assert!(matches!(validate_coupon(Some(&c), Money::ZERO, now), Err(CouponRejection::Expired(_))));
        c.expiry_date = None;
        assert_eq!(
            validate_coupon(Some(&c), Money::new(dec!(99.99)), now),
            Err(CouponRejection::BelowMinimum { minimum: Money::new(dec!(100)) })
        );
        assert!(validate_coupon(Some(&c), Money::new(dec!(100)), now).is_ok());
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let today = Coupon::create("TODAY", DiscountType::Fixed, dec!(1)).expires_on(now.date_naive());
        let yesterday = Coupon::create("YDAY", DiscountType::Fixed, dec!(1)).expires_on(now.date_naive() - Duration::days(1));
        assert!(validate_coupon(Some(&today), Money::new(dec!(10)), now).is_ok());
        assert!(validate_coupon(Some(&yesterday), Money::new(dec!(10)), now).is_err());
    }
}
