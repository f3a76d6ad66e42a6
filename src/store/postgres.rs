//! Postgres-backed remote store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

use super::{
    AddressRepository, CartRepository, CatalogRepository, CouponRepository, CustomerRepository,
    OrderRepository, ProductQuery, ReviewRepository, StoreError, StoreResult, WishlistRepository,
};
use crate::domain::aggregates::{
    AddressSnapshot, CartEntry, Coupon, Customer, Order, OrderItem, OrderStatus, Product,
    ProductVariation, Review, Sale, ShippingAddress, WishlistEntry,
};
use crate::domain::value_objects::{Money, Percentage, Rating};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool { &self.pool }

    async fn attach_items(&self, rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let items = sqlx::query_as::<_, OrderItemRow>("SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY id")
            .bind(&ids).fetch_all(&self.pool).await?;
        let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for item in items {
            let item = OrderItem::try_from(item)?;
            grouped.entry(item.order_id).or_default().push(item);
        }
        rows.into_iter()
            .map(|row| { let items = grouped.remove(&row.id).unwrap_or_default(); row.into_order(items) })
            .collect()
    }
}

fn quantity_to_db(q: u32) -> StoreResult<i32> {
    i32::try_from(q).map_err(|_| StoreError::Corrupt(format!("quantity {q} out of range")))
}

fn quantity_from_db(q: i32) -> StoreResult<u32> {
    u32::try_from(q).map_err(|_| StoreError::Corrupt(format!("negative quantity {q}")))
}

fn convert<R, T: TryFrom<R, Error = StoreError>>(rows: Vec<R>) -> StoreResult<Vec<T>> {
    rows.into_iter().map(T::try_from).collect()
}

// =============================================================================
// Rows
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, name: String, description: String, base_price: Decimal, images: Vec<String>,
    category: Option<String>, average_rating: Option<Decimal>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;
    fn try_from(r: ProductRow) -> StoreResult<Self> {
        Ok(Product {
            id: r.id, name: r.name, description: r.description, base_price: Money::new(r.base_price),
            images: r.images, category: r.category, average_rating: r.average_rating,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VariationRow { id: Uuid, product_id: Uuid, variation_type: String, name: String, price_adjustment: Decimal, stock: i32 }

impl TryFrom<VariationRow> for ProductVariation {
    type Error = StoreError;
    fn try_from(r: VariationRow) -> StoreResult<Self> {
        Ok(ProductVariation {
            id: r.id, product_id: r.product_id,
            variation_type: r.variation_type.parse().map_err(|e: crate::domain::aggregates::ProductError| StoreError::Corrupt(e.to_string()))?,
            name: r.name, price_adjustment: Money::new(r.price_adjustment), stock: r.stock,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SaleRow {
    id: Uuid, product_id: Uuid, variation_id: Option<Uuid>, discount_percentage: Decimal,
    start_date: DateTime<Utc>, end_date: DateTime<Utc>, is_active: bool,
}

impl TryFrom<SaleRow> for Sale {
    type Error = StoreError;
    fn try_from(r: SaleRow) -> StoreResult<Self> {
        Ok(Sale {
            id: r.id, product_id: r.product_id, variation_id: r.variation_id,
            discount: Percentage::new(r.discount_percentage).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            start_date: r.start_date, end_date: r.end_date, is_active: r.is_active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: Uuid, code: String, discount_type: String, discount_value: Decimal, minimum_purchase: Option<Decimal>,
    expiry_date: Option<NaiveDate>, is_active: bool, created_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = StoreError;
    fn try_from(r: CouponRow) -> StoreResult<Self> {
        Ok(Coupon {
            id: r.id, code: r.code, discount_type: r.discount_type.parse().map_err(StoreError::Corrupt)?,
            discount_value: r.discount_value, minimum_purchase: r.minimum_purchase.map(Money::new),
            expiry_date: r.expiry_date, is_active: r.is_active, created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, order_number: String, user_id: Uuid, status: String, subtotal: Decimal, discount_amount: Decimal,
    coupon_id: Option<Uuid>, total: Decimal, shipping_address: Json<AddressSnapshot>,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> StoreResult<Order> {
        Ok(Order {
            id: self.id, order_number: self.order_number, user_id: self.user_id,
            status: self.status.parse::<OrderStatus>().map_err(|e| StoreError::Corrupt(e.to_string()))?,
            subtotal: Money::new(self.subtotal), discount_amount: Money::new(self.discount_amount),
            coupon_id: self.coupon_id, total: Money::new(self.total), shipping_address: self.shipping_address.0,
            items, created_at: self.created_at, updated_at: self.updated_at, events: vec![],
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid, order_id: Uuid, product_id: Uuid, variation_id: Option<Uuid>, product_name: String,
    variation_name: Option<String>, unit_price: Decimal, quantity: i32,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = StoreError;
    fn try_from(r: OrderItemRow) -> StoreResult<Self> {
        Ok(OrderItem {
            id: r.id, order_id: r.order_id, product_id: r.product_id, variation_id: r.variation_id,
            product_name: r.product_name, variation_name: r.variation_name,
            unit_price: Money::new(r.unit_price), quantity: quantity_from_db(r.quantity)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CartRow { id: Uuid, product_id: Uuid, variation_id: Option<Uuid>, quantity: i32, created_at: DateTime<Utc> }

impl TryFrom<CartRow> for CartEntry {
    type Error = StoreError;
    fn try_from(r: CartRow) -> StoreResult<Self> {
        Ok(CartEntry { id: r.id, product_id: r.product_id, variation_id: r.variation_id, quantity: quantity_from_db(r.quantity)?, added_at: r.created_at })
    }
}

#[derive(sqlx::FromRow)]
struct WishlistRow { id: Uuid, product_id: Uuid, created_at: DateTime<Utc> }

impl TryFrom<WishlistRow> for WishlistEntry {
    type Error = StoreError;
    fn try_from(r: WishlistRow) -> StoreResult<Self> { Ok(WishlistEntry { id: r.id, product_id: r.product_id, added_at: r.created_at }) }
}

#[derive(sqlx::FromRow)]
struct ReviewRow { id: Uuid, product_id: Uuid, user_id: Uuid, rating: i16, comment: String, created_at: DateTime<Utc> }

impl TryFrom<ReviewRow> for Review {
    type Error = StoreError;
    fn try_from(r: ReviewRow) -> StoreResult<Self> {
        let rating = u8::try_from(r.rating).ok().and_then(|v| Rating::new(v).ok())
            .ok_or_else(|| StoreError::Corrupt(format!("rating {} out of range", r.rating)))?;
        Ok(Review { id: r.id, product_id: r.product_id, user_id: r.user_id, rating, comment: r.comment, created_at: r.created_at })
    }
}

#[derive(sqlx::FromRow)]
struct AddressRow {
    id: Uuid, user_id: Uuid, recipient: String, street: String, city: String, state: Option<String>,
    postal_code: String, country: String, phone: Option<String>, is_default: bool,
}

impl TryFrom<AddressRow> for ShippingAddress {
    type Error = StoreError;
    fn try_from(r: AddressRow) -> StoreResult<Self> {
        Ok(ShippingAddress {
            id: r.id, user_id: r.user_id, is_default: r.is_default,
            address: AddressSnapshot {
                recipient: r.recipient, street: r.street, city: r.city, state: r.state,
                postal_code: r.postal_code, country: r.country, phone: r.phone,
            },
        })
    }
}

#[derive(sqlx::FromRow)]
struct CustomerRow { id: Uuid, email: String, full_name: Option<String>, created_at: DateTime<Utc> }

impl TryFrom<CustomerRow> for Customer {
    type Error = StoreError;
    fn try_from(r: CustomerRow) -> StoreResult<Self> { Ok(Customer { id: r.id, email: r.email, full_name: r.full_name, created_at: r.created_at }) }
}

// =============================================================================
// Repositories
// =============================================================================

#[async_trait]
impl CatalogRepository for PgStore {
    #[instrument(skip(self))]
    async fn list_products(&self, query: &ProductQuery) -> StoreResult<(Vec<Product>, i64)> {
        let filter = "WHERE ($1::text IS NULL OR category = $1) AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%')";
        let sql = format!("SELECT * FROM products {filter} ORDER BY {} LIMIT $3 OFFSET $4", query.sort.order_by());
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(&query.category).bind(&query.search)
            .bind(i64::from(query.limit())).bind(i64::from(query.offset()))
            .fetch_all(&self.pool).await?;
        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM products {filter}"))
            .bind(&query.category).bind(&query.search)
            .fetch_one(&self.pool).await?;
        Ok((convert(rows)?, total.0))
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?.map(Product::try_from).transpose()
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = ANY($1)")
            .bind(ids).fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn insert_product(&self, p: &Product) -> StoreResult<()> {
        sqlx::query("INSERT INTO products (id, name, description, base_price, images, category, average_rating, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
            .bind(p.id).bind(&p.name).bind(&p.description).bind(p.base_price.amount()).bind(&p.images)
            .bind(&p.category).bind(p.average_rating).bind(p.created_at).bind(p.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn update_product(&self, p: &Product) -> StoreResult<bool> {
        let done = sqlx::query("UPDATE products SET name = $2, description = $3, base_price = $4, images = $5, category = $6, updated_at = $7 WHERE id = $1")
            .bind(p.id).bind(&p.name).bind(&p.description).bind(p.base_price.amount()).bind(&p.images)
            .bind(&p.category).bind(p.updated_at)
            .execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn delete_product(&self, id: Uuid) -> StoreResult<bool> {
        let done = sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn set_average_rating(&self, product_id: Uuid, rating: Option<Decimal>) -> StoreResult<()> {
        sqlx::query("UPDATE products SET average_rating = $2 WHERE id = $1")
            .bind(product_id).bind(rating).execute(&self.pool).await?;
        Ok(())
    }

    async fn variations_for(&self, product_id: Uuid) -> StoreResult<Vec<ProductVariation>> {
        let rows = sqlx::query_as::<_, VariationRow>("SELECT * FROM product_variations WHERE product_id = $1 ORDER BY variation_type, name")
            .bind(product_id).fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn variations_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<ProductVariation>> {
        let rows = sqlx::query_as::<_, VariationRow>("SELECT * FROM product_variations WHERE id = ANY($1)")
            .bind(ids).fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn insert_variation(&self, v: &ProductVariation) -> StoreResult<()> {
        sqlx::query("INSERT INTO product_variations (id, product_id, variation_type, name, price_adjustment, stock) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(v.id).bind(v.product_id).bind(v.variation_type.as_str()).bind(&v.name)
            .bind(v.price_adjustment.amount()).bind(v.stock)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn update_variation(&self, v: &ProductVariation) -> StoreResult<bool> {
        let done = sqlx::query("UPDATE product_variations SET variation_type = $2, name = $3, price_adjustment = $4, stock = $5 WHERE id = $1")
            .bind(v.id).bind(v.variation_type.as_str()).bind(&v.name).bind(v.price_adjustment.amount()).bind(v.stock)
            .execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn delete_variation(&self, id: Uuid) -> StoreResult<bool> {
        let done = sqlx::query("DELETE FROM product_variations WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn delete_variations_for(&self, product_id: Uuid) -> StoreResult<u64> {
        let done = sqlx::query("DELETE FROM product_variations WHERE product_id = $1").bind(product_id).execute(&self.pool).await?;
        Ok(done.rows_affected())
    }

    async fn sales_for_products(&self, product_ids: &[Uuid]) -> StoreResult<Vec<Sale>> {
        let rows = sqlx::query_as::<_, SaleRow>("SELECT * FROM product_sales WHERE product_id = ANY($1)")
            .bind(product_ids).fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn list_sales(&self) -> StoreResult<Vec<Sale>> {
        let rows = sqlx::query_as::<_, SaleRow>("SELECT * FROM product_sales ORDER BY start_date DESC")
            .fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn get_sale(&self, id: Uuid) -> StoreResult<Option<Sale>> {
        sqlx::query_as::<_, SaleRow>("SELECT * FROM product_sales WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?.map(Sale::try_from).transpose()
    }

    #[instrument(skip(self, sale), fields(product_id = %sale.product_id))]
    async fn replace_active_sale(&self, sale: &Sale) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let deactivated = sqlx::query("UPDATE product_sales SET is_active = FALSE WHERE product_id = $1 AND variation_id IS NOT DISTINCT FROM $2 AND is_active")
            .bind(sale.product_id).bind(sale.variation_id)
            .execute(&mut *tx).await?
            .rows_affected();
        sqlx::query("INSERT INTO product_sales (id, product_id, variation_id, discount_percentage, start_date, end_date, is_active) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(sale.id).bind(sale.product_id).bind(sale.variation_id).bind(sale.discount.value())
            .bind(sale.start_date).bind(sale.end_date).bind(sale.is_active)
            .execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(deactivated)
    }

    async fn set_sale_active(&self, id: Uuid, active: bool) -> StoreResult<bool> {
        let done = sqlx::query("UPDATE product_sales SET is_active = $2 WHERE id = $1")
            .bind(id).bind(active).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn delete_sale(&self, id: Uuid) -> StoreResult<bool> {
        let done = sqlx::query("DELETE FROM product_sales WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn delete_sales_for(&self, product_id: Uuid) -> StoreResult<u64> {
        let done = sqlx::query("DELETE FROM product_sales WHERE product_id = $1").bind(product_id).execute(&self.pool).await?;
        Ok(done.rows_affected())
    }
}

#[async_trait]
impl CouponRepository for PgStore {
    async fn list_coupons(&self) -> StoreResult<Vec<Coupon>> {
        let rows = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons ORDER BY created_at DESC").fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn find_coupon_by_code(&self, code: &str) -> StoreResult<Option<Coupon>> {
        // Codes are not unique in the table; the newest one wins.
        sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE code = $1 ORDER BY created_at DESC LIMIT 1")
            .bind(code).fetch_optional(&self.pool).await?.map(Coupon::try_from).transpose()
    }

    async fn get_coupon(&self, id: Uuid) -> StoreResult<Option<Coupon>> {
        sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?.map(Coupon::try_from).transpose()
    }

    async fn insert_coupon(&self, c: &Coupon) -> StoreResult<()> {
        sqlx::query("INSERT INTO coupons (id, code, discount_type, discount_value, minimum_purchase, expiry_date, is_active, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(c.id).bind(&c.code).bind(c.discount_type.as_str()).bind(c.discount_value)
            .bind(c.minimum_purchase.map(|m| m.amount())).bind(c.expiry_date).bind(c.is_active).bind(c.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn update_coupon(&self, c: &Coupon) -> StoreResult<bool> {
        let done = sqlx::query("UPDATE coupons SET code = $2, discount_type = $3, discount_value = $4, minimum_purchase = $5, expiry_date = $6, is_active = $7 WHERE id = $1")
            .bind(c.id).bind(&c.code).bind(c.discount_type.as_str()).bind(c.discount_value)
            .bind(c.minimum_purchase.map(|m| m.amount())).bind(c.expiry_date).bind(c.is_active)
            .execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn delete_coupon(&self, id: Uuid) -> StoreResult<bool> {
        let done = sqlx::query("DELETE FROM coupons WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }
}

#[async_trait]
impl CartRepository for PgStore {
    async fn cart_entries(&self, user_id: Uuid) -> StoreResult<Vec<CartEntry>> {
        let rows = sqlx::query_as::<_, CartRow>("SELECT id, product_id, variation_id, quantity, created_at FROM cart_items WHERE user_id = $1 ORDER BY created_at")
            .bind(user_id).fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn upsert_cart_entry(&self, user_id: Uuid, e: &CartEntry) -> StoreResult<()> {
        sqlx::query("INSERT INTO cart_items (id, user_id, product_id, variation_id, quantity, created_at) VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (id) DO UPDATE SET quantity = EXCLUDED.quantity")
            .bind(e.id).bind(user_id).bind(e.product_id).bind(e.variation_id).bind(quantity_to_db(e.quantity)?).bind(e.added_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_cart_entry(&self, user_id: Uuid, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2").bind(id).bind(user_id).execute(&self.pool).await?;
        Ok(())
    }

    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1").bind(user_id).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl WishlistRepository for PgStore {
    async fn wishlist_entries(&self, user_id: Uuid) -> StoreResult<Vec<WishlistEntry>> {
        let rows = sqlx::query_as::<_, WishlistRow>("SELECT id, product_id, created_at FROM wishlist_items WHERE user_id = $1 ORDER BY created_at")
            .bind(user_id).fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn upsert_wishlist_entry(&self, user_id: Uuid, e: &WishlistEntry) -> StoreResult<()> {
        sqlx::query("INSERT INTO wishlist_items (id, user_id, product_id, created_at) VALUES ($1, $2, $3, $4) ON CONFLICT (id) DO NOTHING")
            .bind(e.id).bind(user_id).bind(e.product_id).bind(e.added_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_wishlist_entry(&self, user_id: Uuid, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM wishlist_items WHERE id = $1 AND user_id = $2").bind(id).bind(user_id).execute(&self.pool).await?;
        Ok(())
    }

    async fn clear_wishlist(&self, user_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1").bind(user_id).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO orders (id, order_number, user_id, status, subtotal, discount_amount, coupon_id, total, shipping_address, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)")
            .bind(order.id).bind(&order.order_number).bind(order.user_id).bind(order.status.as_str())
            .bind(order.subtotal.amount()).bind(order.discount_amount.amount()).bind(order.coupon_id)
            .bind(order.total.amount()).bind(Json(&order.shipping_address)).bind(order.created_at).bind(order.updated_at)
            .execute(&mut *tx).await?;
        for item in &order.items {
            sqlx::query("INSERT INTO order_items (id, order_id, product_id, variation_id, product_name, variation_name, unit_price, quantity) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
                .bind(item.id).bind(item.order_id).bind(item.product_id).bind(item.variation_id)
                .bind(&item.product_name).bind(&item.variation_name).bind(item.unit_price.amount()).bind(quantity_to_db(item.quantity)?)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let Some(row) = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(&self.pool).await? else {
            return Ok(None);
        };
        Ok(self.attach_items(vec![row]).await?.pop())
    }

    async fn orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id).fetch_all(&self.pool).await?;
        self.attach_items(rows).await
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC")
            .bind(status.map(|s| s.as_str())).fetch_all(&self.pool).await?;
        self.attach_items(rows).await
    }

    async fn update_order_status(&self, order: &Order) -> StoreResult<bool> {
        let done = sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order.id).bind(order.status.as_str()).bind(order.updated_at)
            .execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }
}

#[async_trait]
impl ReviewRepository for PgStore {
    async fn reviews_for_product(&self, product_id: Uuid) -> StoreResult<Vec<Review>> {
        let rows = sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE product_id = $1 ORDER BY created_at DESC")
            .bind(product_id).fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn find_review(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<Option<Review>> {
        sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE user_id = $1 AND product_id = $2 LIMIT 1")
            .bind(user_id).bind(product_id).fetch_optional(&self.pool).await?.map(Review::try_from).transpose()
    }

    async fn insert_review(&self, r: &Review) -> StoreResult<()> {
        sqlx::query("INSERT INTO reviews (id, product_id, user_id, rating, comment, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(r.id).bind(r.product_id).bind(r.user_id).bind(i16::from(r.rating.value())).bind(&r.comment).bind(r.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AddressRepository for PgStore {
    async fn addresses_for(&self, user_id: Uuid) -> StoreResult<Vec<ShippingAddress>> {
        let rows = sqlx::query_as::<_, AddressRow>("SELECT * FROM shipping_addresses WHERE user_id = $1 ORDER BY is_default DESC, id")
            .bind(user_id).fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn get_address(&self, user_id: Uuid, id: Uuid) -> StoreResult<Option<ShippingAddress>> {
        sqlx::query_as::<_, AddressRow>("SELECT * FROM shipping_addresses WHERE id = $1 AND user_id = $2")
            .bind(id).bind(user_id).fetch_optional(&self.pool).await?.map(ShippingAddress::try_from).transpose()
    }

    async fn insert_address(&self, a: &ShippingAddress) -> StoreResult<()> {
        let s = &a.address;
        sqlx::query("INSERT INTO shipping_addresses (id, user_id, recipient, street, city, state, postal_code, country, phone, is_default) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
            .bind(a.id).bind(a.user_id).bind(&s.recipient).bind(&s.street).bind(&s.city).bind(&s.state)
            .bind(&s.postal_code).bind(&s.country).bind(&s.phone).bind(a.is_default)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn update_address(&self, a: &ShippingAddress) -> StoreResult<bool> {
        let s = &a.address;
        let done = sqlx::query("UPDATE shipping_addresses SET recipient = $3, street = $4, city = $5, state = $6, postal_code = $7, country = $8, phone = $9 WHERE id = $1 AND user_id = $2")
            .bind(a.id).bind(a.user_id).bind(&s.recipient).bind(&s.street).bind(&s.city).bind(&s.state)
            .bind(&s.postal_code).bind(&s.country).bind(&s.phone)
            .execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn delete_address(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let done = sqlx::query("DELETE FROM shipping_addresses WHERE id = $1 AND user_id = $2").bind(id).bind(user_id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn set_default_address(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE shipping_addresses SET is_default = FALSE WHERE user_id = $1 AND id <> $2")
            .bind(user_id).bind(id).execute(&mut *tx).await?;
        let done = sqlx::query("UPDATE shipping_addresses SET is_default = TRUE WHERE id = $1 AND user_id = $2")
            .bind(id).bind(user_id).execute(&mut *tx).await?;
        if done.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl CustomerRepository for PgStore {
    async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        let rows = sqlx::query_as::<_, CustomerRow>("SELECT id, email, full_name, created_at FROM users ORDER BY created_at DESC")
            .fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn get_customer(&self, id: Uuid) -> StoreResult<Option<Customer>> {
        sqlx::query_as::<_, CustomerRow>("SELECT id, email, full_name, created_at FROM users WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?.map(Customer::try_from).transpose()
    }
}
