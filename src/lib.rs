//! Storefront - sale-aware pricing, coupons, carts and orders
//!
//! Backend for a storefront and its admin console over a hosted Postgres
//! database.
//!
//! ## Features
//! - Price resolution against scheduled percentage sales
//! - Coupon validation (percentage and fixed discounts)
//! - Cart and wishlist aggregation for signed-in and anonymous shoppers
//! - Checkout and the order status workflow
//! - Reviews gated on delivered orders
//! - Admin management of products, variations, sales, coupons, orders and customers

pub mod clock;
pub mod config;
pub mod domain;
pub mod http;
pub mod notify;
pub mod services;
pub mod session;
pub mod store;

use thiserror::Error;

use domain::aggregates::{CartError, CouponRejection, OrderError, ProductError, ReviewBlock, TransitionError};
use domain::value_objects::ValueError;
use store::StoreError;

// =============================================================================
// Errors
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Coupon(#[from] CouponRejection),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("You have already reviewed this product")]
    DuplicateReview,

    #[error("Only customers with a delivered order containing this product can review it")]
    NotEligibleToReview,

    #[error("Quantity must be between 1 and {}", crate::domain::aggregates::MAX_LINE_QUANTITY)]
    InvalidQuantity,

    #[error("Your cart is empty")]
    EmptyCart,

    #[error("Sign in to continue")]
    AuthenticationRequired,

    #[error("Item not found")]
    ItemNotFound,
}

impl StorefrontError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StorefrontError::NotFound { entity, id: id.to_string() }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, StorefrontError::Store(e) if e.is_permission_denied())
    }
}

impl From<ReviewBlock> for StorefrontError {
    fn from(block: ReviewBlock) -> Self {
        match block {
            ReviewBlock::Duplicate => StorefrontError::DuplicateReview,
            ReviewBlock::NotPurchased => StorefrontError::NotEligibleToReview,
        }
    }
}

impl From<CartError> for StorefrontError {
    fn from(_: CartError) -> Self { StorefrontError::ItemNotFound }
}

impl From<OrderError> for StorefrontError {
    fn from(_: OrderError) -> Self { StorefrontError::EmptyCart }
}

impl From<ValueError> for StorefrontError {
    fn from(e: ValueError) -> Self { StorefrontError::InvalidInput(e.to_string()) }
}

impl From<ProductError> for StorefrontError {
    fn from(e: ProductError) -> Self { StorefrontError::InvalidInput(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, StorefrontError>;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use domain::aggregates::{Cart, Coupon, Order, OrderStatus, Product, Sale, StatusPolicy};
pub use domain::value_objects::{Money, Percentage, Rating};
pub use notify::{Notifier, Severity};
pub use session::{Identity, Session, SessionRegistry, Storefront};
