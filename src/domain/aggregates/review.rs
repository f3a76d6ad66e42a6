//! Review Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::Order;
use crate::domain::value_objects::Rating;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub rating: Rating,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn create(product_id: Uuid, user_id: Uuid, rating: Rating, comment: impl Into<String>) -> Self {
        Self { id: Uuid::now_v7(), product_id, user_id, rating, comment: comment.into(), created_at: Utc::now() }
    }
}

/// Why a customer may not review a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewBlock {
    /// The customer already reviewed this product.
    Duplicate,
    /// No delivered order of theirs contains the product.
    NotPurchased,
}

/// A customer may review a product once, and only after an order containing it was delivered.
pub fn review_eligibility(product_id: Uuid, orders: &[Order], existing: &[Review], user_id: Uuid) -> Result<(), ReviewBlock> {
    if existing.iter().any(|r| r.user_id == user_id && r.product_id == product_id) {
        return Err(ReviewBlock::Duplicate);
    }
    let delivered = orders
        .iter()
        .any(|o| o.user_id == user_id && o.status.permits_reviews() && o.contains_product(product_id));
    if !delivered { return Err(ReviewBlock::NotPurchased); }
    Ok(())
}

/// Mean rating to two decimal places, `None` without reviews.
pub fn average_rating(reviews: &[Review]) -> Option<Decimal> {
    if reviews.is_empty() { return None; }
    let sum: u32 = reviews.iter().map(|r| u32::from(r.rating.value())).sum();
    Some((Decimal::from(sum) / Decimal::from(reviews.len())).round_dp(2))
}
