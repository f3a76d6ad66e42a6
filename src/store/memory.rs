//! In-memory remote store, used by tests and local demos.
//!
//! Writes can be made to fail with a permission or a general error to exercise
//! the callers' error handling.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    AddressRepository, CartRepository, CatalogRepository, CouponRepository, CustomerRepository,
    OrderRepository, ProductQuery, ProductSort, ReviewRepository, StoreError, StoreResult,
    WishlistRepository,
};
use crate::domain::aggregates::{
    CartEntry, Coupon, Customer, Order, OrderStatus, Product, ProductVariation, Review, Sale,
    ShippingAddress, WishlistEntry,
};

#[derive(Default)]
struct Tables {
    products: Vec<Product>,
    variations: Vec<ProductVariation>,
    sales: Vec<Sale>,
    coupons: Vec<Coupon>,
    carts: HashMap<Uuid, Vec<CartEntry>>,
    wishlists: HashMap<Uuid, Vec<WishlistEntry>>,
    orders: Vec<Order>,
    reviews: Vec<Review>,
    addresses: Vec<ShippingAddress>,
    customers: Vec<Customer>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// Reject writes as row-level security would.
    pub deny_writes: AtomicBool,
    /// Fail writes with a general backend error.
    pub fail_writes: AtomicBool,
    pub write_calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub async fn add_customer(&self, customer: Customer) { self.tables.lock().await.customers.push(customer); }

    fn check_write(&self) -> StoreResult<()> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        if self.deny_writes.load(Ordering::Relaxed) {
            return Err(StoreError::PermissionDenied("new row violates row-level security policy".into()));
        }
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Backend("connection reset".into()));
        }
        Ok(())
    }
}

fn replace<T: Clone>(rows: &mut [T], row: &T, same: impl Fn(&T) -> bool) -> bool {
    match rows.iter_mut().find(|r| same(r)) {
        Some(existing) => { *existing = row.clone(); true }
        None => false,
    }
}

fn remove_where<T>(rows: &mut Vec<T>, pred: impl Fn(&T) -> bool) -> u64 {
    let before = rows.len();
    rows.retain(|r| !pred(r));
    (before - rows.len()) as u64
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn list_products(&self, query: &ProductQuery) -> StoreResult<(Vec<Product>, i64)> {
        let t = self.tables.lock().await;
        let needle = query.search.as_deref().map(str::to_lowercase);
        let mut matched: Vec<Product> = t.products.iter()
            .filter(|p| query.category.is_none() || p.category == query.category)
            .filter(|p| needle.as_deref().map_or(true, |n| p.name.to_lowercase().contains(n)))
            .cloned()
            .collect();
        match query.sort {
            ProductSort::Newest => matched.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            ProductSort::PriceAsc => matched.sort_by(|a, b| a.base_price.cmp(&b.base_price)),
            ProductSort::PriceDesc => matched.sort_by(|a, b| b.base_price.cmp(&a.base_price)),
            ProductSort::Name => matched.sort_by(|a, b| a.name.cmp(&b.name)),
        }
        let total = matched.len() as i64;
        let page = matched.into_iter().skip(query.offset() as usize).take(query.limit() as usize).collect();
        Ok((page, total))
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.tables.lock().await.products.iter().find(|p| p.id == id).cloned())
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Product>> {
        Ok(self.tables.lock().await.products.iter().filter(|p| ids.contains(&p.id)).cloned().collect())
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        self.check_write()?;
        self.tables.lock().await.products.push(product.clone());
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> StoreResult<bool> {
        self.check_write()?;
        Ok(replace(&mut self.tables.lock().await.products, product, |p| p.id == product.id))
    }

    async fn delete_product(&self, id: Uuid) -> StoreResult<bool> {
        self.check_write()?;
        let mut t = self.tables.lock().await;
        let removed = remove_where(&mut t.products, |p| p.id == id) > 0;
        // Mirrors ON DELETE CASCADE on cart, wishlist and review rows.
        for entries in t.carts.values_mut() { entries.retain(|e| e.product_id != id); }
        for entries in t.wishlists.values_mut() { entries.retain(|e| e.product_id != id); }
        t.reviews.retain(|r| r.product_id != id);
        Ok(removed)
    }

    async fn set_average_rating(&self, product_id: Uuid, rating: Option<Decimal>) -> StoreResult<()> {
        self.check_write()?;
        if let Some(p) = self.tables.lock().await.products.iter_mut().find(|p| p.id == product_id) {
            p.average_rating = rating;
        }
        Ok(())
    }

    async fn variations_for(&self, product_id: Uuid) -> StoreResult<Vec<ProductVariation>> {
        Ok(self.tables.lock().await.variations.iter().filter(|v| v.product_id == product_id).cloned().collect())
    }

    async fn variations_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<ProductVariation>> {
        Ok(self.tables.lock().await.variations.iter().filter(|v| ids.contains(&v.id)).cloned().collect())
    }

    async fn insert_variation(&self, variation: &ProductVariation) -> StoreResult<()> {
        self.check_write()?;
        self.tables.lock().await.variations.push(variation.clone());
        Ok(())
    }

    async fn update_variation(&self, variation: &ProductVariation) -> StoreResult<bool> {
        self.check_write()?;
        Ok(replace(&mut self.tables.lock().await.variations, variation, |v| v.id == variation.id))
    }

    async fn delete_variation(&self, id: Uuid) -> StoreResult<bool> {
        self.check_write()?;
        Ok(remove_where(&mut self.tables.lock().await.variations, |v| v.id == id) > 0)
    }

    async fn delete_variations_for(&self, product_id: Uuid) -> StoreResult<u64> {
        self.check_write()?;
        Ok(remove_where(&mut self.tables.lock().await.variations, |v| v.product_id == product_id))
    }

    async fn sales_for_products(&self, product_ids: &[Uuid]) -> StoreResult<Vec<Sale>> {
        Ok(self.tables.lock().await.sales.iter().filter(|s| product_ids.contains(&s.product_id)).cloned().collect())
    }

    async fn list_sales(&self) -> StoreResult<Vec<Sale>> {
        let mut sales = self.tables.lock().await.sales.clone();
        sales.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(sales)
    }

    async fn get_sale(&self, id: Uuid) -> StoreResult<Option<Sale>> {
        Ok(self.tables.lock().await.sales.iter().find(|s| s.id == id).cloned())
    }

    async fn replace_active_sale(&self, sale: &Sale) -> StoreResult<u64> {
        self.check_write()?;
        let mut t = self.tables.lock().await;
        let mut deactivated = 0;
        for s in t.sales.iter_mut().filter(|s| s.is_active && s.scope() == sale.scope()) {
            s.is_active = false;
            deactivated += 1;
        }
        t.sales.push(sale.clone());
        Ok(deactivated)
    }

    async fn set_sale_active(&self, id: Uuid, active: bool) -> StoreResult<bool> {
        self.check_write()?;
        let mut t = self.tables.lock().await;
        Ok(t.sales.iter_mut().find(|s| s.id == id).map(|s| s.is_active = active).is_some())
    }

    async fn delete_sale(&self, id: Uuid) -> StoreResult<bool> {
        self.check_write()?;
        Ok(remove_where(&mut self.tables.lock().await.sales, |s| s.id == id) > 0)
    }

    async fn delete_sales_for(&self, product_id: Uuid) -> StoreResult<u64> {
        self.check_write()?;
        Ok(remove_where(&mut self.tables.lock().await.sales, |s| s.product_id == product_id))
    }
}

#[async_trait]
impl CouponRepository for MemoryStore {
    async fn list_coupons(&self) -> StoreResult<Vec<Coupon>> { Ok(self.tables.lock().await.coupons.clone()) }

    async fn find_coupon_by_code(&self, code: &str) -> StoreResult<Option<Coupon>> {
        Ok(self.tables.lock().await.coupons.iter().filter(|c| c.code == code).max_by_key(|c| c.created_at).cloned())
    }

    async fn get_coupon(&self, id: Uuid) -> StoreResult<Option<Coupon>> {
        Ok(self.tables.lock().await.coupons.iter().find(|c| c.id == id).cloned())
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> StoreResult<()> {
        self.check_write()?;
        self.tables.lock().await.coupons.push(coupon.clone());
        Ok(())
    }

    async fn update_coupon(&self, coupon: &Coupon) -> StoreResult<bool> {
        self.check_write()?;
        Ok(replace(&mut self.tables.lock().await.coupons, coupon, |c| c.id == coupon.id))
    }

    async fn delete_coupon(&self, id: Uuid) -> StoreResult<bool> {
        self.check_write()?;
        Ok(remove_where(&mut self.tables.lock().await.coupons, |c| c.id == id) > 0)
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn cart_entries(&self, user_id: Uuid) -> StoreResult<Vec<CartEntry>> {
        Ok(self.tables.lock().await.carts.get(&user_id).cloned().unwrap_or_default())
    }

    async fn upsert_cart_entry(&self, user_id: Uuid, entry: &CartEntry) -> StoreResult<()> {
        self.check_write()?;
        let mut t = self.tables.lock().await;
        let rows = t.carts.entry(user_id).or_default();
        if !replace(rows, entry, |e| e.id == entry.id) { rows.push(entry.clone()); }
        Ok(())
    }

    async fn delete_cart_entry(&self, user_id: Uuid, id: Uuid) -> StoreResult<()> {
        self.check_write()?;
        if let Some(rows) = self.tables.lock().await.carts.get_mut(&user_id) { rows.retain(|e| e.id != id); }
        Ok(())
    }

    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<()> {
        self.check_write()?;
        self.tables.lock().await.carts.remove(&user_id);
        Ok(())
    }
}

#[async_trait]
impl WishlistRepository for MemoryStore {
    async fn wishlist_entries(&self, user_id: Uuid) -> StoreResult<Vec<WishlistEntry>> {
        Ok(self.tables.lock().await.wishlists.get(&user_id).cloned().unwrap_or_default())
    }

    async fn upsert_wishlist_entry(&self, user_id: Uuid, entry: &WishlistEntry) -> StoreResult<()> {
        self.check_write()?;
        let mut t = self.tables.lock().await;
        let rows = t.wishlists.entry(user_id).or_default();
        if !rows.iter().any(|e| e.id == entry.id) { rows.push(entry.clone()); }
        Ok(())
    }

    async fn delete_wishlist_entry(&self, user_id: Uuid, id: Uuid) -> StoreResult<()> {
        self.check_write()?;
        if let Some(rows) = self.tables.lock().await.wishlists.get_mut(&user_id) { rows.retain(|e| e.id != id); }
        Ok(())
    }

    async fn clear_wishlist(&self, user_id: Uuid) -> StoreResult<()> {
        self.check_write()?;
        self.tables.lock().await.wishlists.remove(&user_id);
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        self.check_write()?;
        let mut stored = order.clone();
        stored.take_events();
        self.tables.lock().await.orders.push(stored);
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.tables.lock().await.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<Order> = self.tables.lock().await.orders.iter().filter(|o| o.user_id == user_id).cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<Order> = self.tables.lock().await.orders.iter()
            .filter(|o| status.map_or(true, |s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_order_status(&self, order: &Order) -> StoreResult<bool> {
        self.check_write()?;
        let mut t = self.tables.lock().await;
        Ok(t.orders.iter_mut().find(|o| o.id == order.id).map(|o| {
            o.status = order.status;
            o.updated_at = order.updated_at;
        }).is_some())
    }
}

#[async_trait]
impl ReviewRepository for MemoryStore {
    async fn reviews_for_product(&self, product_id: Uuid) -> StoreResult<Vec<Review>> {
        Ok(self.tables.lock().await.reviews.iter().filter(|r| r.product_id == product_id).cloned().collect())
    }

    async fn find_review(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<Option<Review>> {
        Ok(self.tables.lock().await.reviews.iter().find(|r| r.user_id == user_id && r.product_id == product_id).cloned())
    }

    async fn insert_review(&self, review: &Review) -> StoreResult<()> {
        self.check_write()?;
        let mut t = self.tables.lock().await;
        if t.reviews.iter().any(|r| r.user_id == review.user_id && r.product_id == review.product_id) {
            return Err(StoreError::Conflict("reviews_user_product_key".into()));
        }
        t.reviews.push(review.clone());
        Ok(())
    }
}

#[async_trait]
impl AddressRepository for MemoryStore {
    async fn addresses_for(&self, user_id: Uuid) -> StoreResult<Vec<ShippingAddress>> {
        Ok(self.tables.lock().await.addresses.iter().filter(|a| a.user_id == user_id).cloned().collect())
    }

    async fn get_address(&self, user_id: Uuid, id: Uuid) -> StoreResult<Option<ShippingAddress>> {
        Ok(self.tables.lock().await.addresses.iter().find(|a| a.id == id && a.user_id == user_id).cloned())
    }

    async fn insert_address(&self, address: &ShippingAddress) -> StoreResult<()> {
        self.check_write()?;
        self.tables.lock().await.addresses.push(address.clone());
        Ok(())
    }

    async fn update_address(&self, address: &ShippingAddress) -> StoreResult<bool> {
        self.check_write()?;
        let mut t = self.tables.lock().await;
        Ok(t.addresses.iter_mut().find(|a| a.id == address.id && a.user_id == address.user_id).map(|a| {
            a.address = address.address.clone();
        }).is_some())
    }

    async fn delete_address(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool> {
        self.check_write()?;
        Ok(remove_where(&mut self.tables.lock().await.addresses, |a| a.id == id && a.user_id == user_id) > 0)
    }

    async fn set_default_address(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool> {
        self.check_write()?;
        let mut t = self.tables.lock().await;
        let mut mine: Vec<&mut ShippingAddress> = t.addresses.iter_mut().filter(|a| a.user_id == user_id).collect();
        if !mine.iter().any(|a| a.id == id) { return Ok(false); }
        for a in mine.iter_mut() { a.is_default = a.id == id; }
        Ok(true)
    }
}

#[async_trait]
impl CustomerRepository for MemoryStore {
    async fn list_customers(&self) -> StoreResult<Vec<Customer>> { Ok(self.tables.lock().await.customers.clone()) }

    async fn get_customer(&self, id: Uuid) -> StoreResult<Option<Customer>> {
        Ok(self.tables.lock().await.customers.iter().find(|c| c.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{Money, Percentage};
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_replace_active_sale_keeps_one_active() {
        let store = MemoryStore::new();
        let product = Product::create("Lamp", Money::new(dec!(30)));
        store.insert_product(&product).await.unwrap();
        let now = Utc::now();
        let first = Sale::create(product.id, None, Percentage::new(dec!(10)).unwrap(), now, now + Duration::days(1));
        let second = Sale::create(product.id, None, Percentage::new(dec!(15)).unwrap(), now, now + Duration::days(1));
        assert_eq!(store.replace_active_sale(&first).await.unwrap(), 0);
        assert_eq!(store.replace_active_sale(&second).await.unwrap(), 1);
        let active: Vec<Sale> = store.sales_for_products(&[product.id]).await.unwrap().into_iter().filter(|s| s.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
    }

    #[tokio::test]
    async fn test_write_failures() {
        let store = MemoryStore::new();
        store.deny_writes.store(true, Ordering::Relaxed);
        let err = store.clear_cart(Uuid::now_v7()).await.unwrap_err();
        assert!(err.is_permission_denied());
        store.deny_writes.store(false, Ordering::Relaxed);
        store.fail_writes.store(true, Ordering::Relaxed);
        assert!(matches!(store.clear_cart(Uuid::now_v7()).await, Err(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn test_product_search() {
        let store = MemoryStore::new();
        let mut lamp = Product::create("Desk Lamp", Money::new(dec!(30)));
        lamp.category = Some("lighting".into());
        store.insert_product(&lamp).await.unwrap();
        store.insert_product(&Product::create("Mug", Money::new(dec!(8)))).await.unwrap();
        let q = ProductQuery { search: Some("lamp".into()), ..Default::default() };
        let (found, total) = store.list_products(&q).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].id, lamp.id);
        let q = ProductQuery { sort: ProductSort::PriceAsc, ..Default::default() };
        assert_eq!(store.list_products(&q).await.unwrap().0[0].name, "Mug");
    }

    #[tokio::test]
    async fn test_one_review_per_user_and_product() {
        let store = MemoryStore::new();
        let (product, user) = (Uuid::now_v7(), Uuid::now_v7());
        let rating = crate::domain::value_objects::Rating::new(4).unwrap();
        store.insert_review(&Review::create(product, user, rating, "good")).await.unwrap();
        let err = store.insert_review(&Review::create(product, user, rating, "again")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        store.insert_review(&Review::create(product, Uuid::now_v7(), rating, "")).await.unwrap();
    }
}
