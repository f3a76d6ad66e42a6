//! Product reviews: one per shopper per product, gated on a delivered order.

use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::Context;
use crate::domain::aggregates::{average_rating, review_eligibility, Review};
use crate::domain::events::{CatalogEvent, DomainEvent};
use crate::domain::value_objects::Rating;
use crate::store::StoreError;
use crate::{Result, StorefrontError};

#[derive(Debug, Deserialize, Validate)]
pub struct NewReview {
    #[validate(range(min = 1, max = 5))]
    pub rating: u8,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub comment: String,
}

#[derive(Clone)]
pub struct ReviewService {
    ctx: Context,
}

impl ReviewService {
    pub fn new(ctx: Context) -> Self { Self { ctx } }

    /// One review per customer and product, and only once an order containing
    /// the product has been delivered to them.
    #[instrument(skip(self, input))]
    pub async fn submit(&self, user_id: Uuid, product_id: Uuid, input: NewReview) -> Result<Review> {
        input.validate()?;
        let rating = Rating::new(input.rating)?;
        if self.ctx.store.get_product(product_id).await?.is_none() {
            return Err(StorefrontError::not_found("product", product_id));
        }
        let existing: Vec<Review> = self.ctx.store.find_review(user_id, product_id).await?.into_iter().collect();
        let orders = self.ctx.store.orders_for_user(user_id).await?;
        review_eligibility(product_id, &orders, &existing, user_id)?;

        let review = Review::create(product_id, user_id, rating, input.comment.trim());
        match self.ctx.store.insert_review(&review).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(StorefrontError::DuplicateReview),
            Err(e) => return Err(e.into()),
        }

        let all = self.ctx.store.reviews_for_product(product_id).await?;
        let average = average_rating(&all);
        self.ctx.store.set_average_rating(product_id, average).await?;
        info!(review_id = %review.id, %product_id, ?average, "review submitted");

        self.ctx
            .publish_all(vec![DomainEvent::Catalog(CatalogEvent::ReviewSubmitted {
                review_id: review.id,
                product_id,
                rating: rating.value(),
            })])
            .await;
        Ok(review)
    }
}
