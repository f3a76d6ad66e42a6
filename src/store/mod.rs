//! Persistence collaborators.
//!
//! The remote store is the hosted relational database; [`postgres::PgStore`]
//! talks to it, [`memory::MemoryStore`] stands in for it in tests. Device
//! storage for anonymous shoppers lives in [`local`].

pub mod entries;
pub mod local;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{
    CartEntry, Coupon, Customer, Order, OrderStatus, Product, ProductVariation, Review, Sale,
    ShippingAddress, WishlistEntry,
};

/// SQLSTATE raised when row-level security or a grant rejects the session.
pub const PERMISSION_DENIED_CODE: &str = "42501";
/// SQLSTATE for a unique constraint violation.
pub const UNIQUE_VIOLATION_CODE: &str = "23505";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Record not found")]
    NotFound,

    #[error("Conflicts with an existing record: {0}")]
    Conflict(String),

    #[error("Stored data is invalid: {0}")]
    Corrupt(String),

    #[error("Storage error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_permission_denied(&self) -> bool { matches!(self, StoreError::PermissionDenied(_)) }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.code().as_deref() == Some(PERMISSION_DENIED_CODE) => {
                StoreError::PermissionDenied(db.message().to_string())
            }
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION_CODE) => {
                StoreError::Conflict(db.message().to_string())
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self { StoreError::Corrupt(e.to_string()) }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

impl ProductSort {
    pub(crate) fn order_by(&self) -> &'static str {
        match self {
            ProductSort::Newest => "created_at DESC",
            ProductSort::PriceAsc => "base_price ASC, created_at DESC",
            ProductSort::PriceDesc => "base_price DESC, created_at DESC",
            ProductSort::Name => "name ASC",
        }
    }
}

/// Listing filter for the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProductQuery {
    pub category: Option<String>,
    /// Case-insensitive substring match on the product name.
    pub search: Option<String>,
    pub sort: ProductSort,
    pub page: u32,
    pub per_page: u32,
}

impl Default for ProductQuery {
    fn default() -> Self { Self { category: None, search: None, sort: ProductSort::Newest, page: 1, per_page: 20 } }
}

impl ProductQuery {
    pub fn page(&self) -> u32 { self.page.max(1) }
    pub fn limit(&self) -> u32 { self.per_page.clamp(1, 100) }
    pub fn offset(&self) -> u32 { (self.page() - 1) * self.limit() }
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Matching products for one page, plus the total match count.
    async fn list_products(&self, query: &ProductQuery) -> StoreResult<(Vec<Product>, i64)>;
    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>>;
    async fn products_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Product>>;
    async fn insert_product(&self, product: &Product) -> StoreResult<()>;
    async fn update_product(&self, product: &Product) -> StoreResult<bool>;
    async fn delete_product(&self, id: Uuid) -> StoreResult<bool>;
    async fn set_average_rating(&self, product_id: Uuid, rating: Option<Decimal>) -> StoreResult<()>;

    async fn variations_for(&self, product_id: Uuid) -> StoreResult<Vec<ProductVariation>>;
    async fn variations_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<ProductVariation>>;
    async fn insert_variation(&self, variation: &ProductVariation) -> StoreResult<()>;
    async fn update_variation(&self, variation: &ProductVariation) -> StoreResult<bool>;
    async fn delete_variation(&self, id: Uuid) -> StoreResult<bool>;
    async fn delete_variations_for(&self, product_id: Uuid) -> StoreResult<u64>;

    /// Every sale, active or not, on any of `product_ids`.
    async fn sales_for_products(&self, product_ids: &[Uuid]) -> StoreResult<Vec<Sale>>;
    async fn list_sales(&self) -> StoreResult<Vec<Sale>>;
    async fn get_sale(&self, id: Uuid) -> StoreResult<Option<Sale>>;
    /// Deactivates every active sale on the new sale's (product, variation) and
    /// inserts it, atomically. Returns how many sales were deactivated.
    async fn replace_active_sale(&self, sale: &Sale) -> StoreResult<u64>;
    async fn set_sale_active(&self, id: Uuid, active: bool) -> StoreResult<bool>;
    async fn delete_sale(&self, id: Uuid) -> StoreResult<bool>;
    async fn delete_sales_for(&self, product_id: Uuid) -> StoreResult<u64>;
}

#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn list_coupons(&self) -> StoreResult<Vec<Coupon>>;
    /// `code` is already normalized.
    async fn find_coupon_by_code(&self, code: &str) -> StoreResult<Option<Coupon>>;
    async fn get_coupon(&self, id: Uuid) -> StoreResult<Option<Coupon>>;
    async fn insert_coupon(&self, coupon: &Coupon) -> StoreResult<()>;
    async fn update_coupon(&self, coupon: &Coupon) -> StoreResult<bool>;
    async fn delete_coupon(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn cart_entries(&self, user_id: Uuid) -> StoreResult<Vec<CartEntry>>;
    async fn upsert_cart_entry(&self, user_id: Uuid, entry: &CartEntry) -> StoreResult<()>;
    async fn delete_cart_entry(&self, user_id: Uuid, id: Uuid) -> StoreResult<()>;
    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait WishlistRepository: Send + Sync {
    async fn wishlist_entries(&self, user_id: Uuid) -> StoreResult<Vec<WishlistEntry>>;
    async fn upsert_wishlist_entry(&self, user_id: Uuid, entry: &WishlistEntry) -> StoreResult<()>;
    async fn delete_wishlist_entry(&self, user_id: Uuid, id: Uuid) -> StoreResult<()>;
    async fn clear_wishlist(&self, user_id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Writes the order and its items atomically.
    async fn insert_order(&self, order: &Order) -> StoreResult<()>;
    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>>;
    async fn orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>>;
    async fn list_orders(&self, status: Option<OrderStatus>) -> StoreResult<Vec<Order>>;
    async fn update_order_status(&self, order: &Order) -> StoreResult<bool>;
}

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    async fn reviews_for_product(&self, product_id: Uuid) -> StoreResult<Vec<Review>>;
    async fn find_review(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<Option<Review>>;
    async fn insert_review(&self, review: &Review) -> StoreResult<()>;
}

#[async_trait]
pub trait AddressRepository: Send + Sync {
    async fn addresses_for(&self, user_id: Uuid) -> StoreResult<Vec<ShippingAddress>>;
    async fn get_address(&self, user_id: Uuid, id: Uuid) -> StoreResult<Option<ShippingAddress>>;
    async fn insert_address(&self, address: &ShippingAddress) -> StoreResult<()>;
    async fn update_address(&self, address: &ShippingAddress) -> StoreResult<bool>;
    async fn delete_address(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool>;
    /// Unsets every other default for the user, then sets this one, atomically.
    async fn set_default_address(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn list_customers(&self) -> StoreResult<Vec<Customer>>;
    async fn get_customer(&self, id: Uuid) -> StoreResult<Option<Customer>>;
}

/// Everything the remote store offers.
pub trait Store:
    CatalogRepository
    + CouponRepository
    + CartRepository
    + WishlistRepository
    + OrderRepository
    + ReviewRepository
    + AddressRepository
    + CustomerRepository
{
}

impl<T> Store for T where
    T: CatalogRepository
        + CouponRepository
        + CartRepository
        + WishlistRepository
        + OrderRepository
        + ReviewRepository
        + AddressRepository
        + CustomerRepository
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_query_paging() {
        let q = ProductQuery { page: 0, per_page: 500, ..Default::default() };
        assert_eq!(q.page(), 1);
        assert_eq!(q.limit(), 100);
        assert_eq!(q.offset(), 0);
        let q = ProductQuery { page: 3, per_page: 20, ..Default::default() };
        assert_eq!(q.offset(), 40);
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(matches!(StoreError::from(sqlx::Error::RowNotFound), StoreError::NotFound));
        assert!(StoreError::PermissionDenied("rls".into()).is_permission_denied());
    }
}
