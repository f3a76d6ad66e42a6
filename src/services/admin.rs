//! Admin console operations: catalog, sales, coupons, orders and customers.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::catalog::{CatalogService, ProductPage};
use super::orders::OrderService;
use super::Context;
use crate::domain::aggregates::{normalize_code, Coupon, Customer, DiscountType, Order, OrderStatus, Product, ProductVariation, Sale, VariationType};
use crate::domain::events::{CatalogEvent, DomainEvent};
use crate::domain::value_objects::{Money, Percentage};
use crate::store::ProductQuery;
use crate::{Result, StorefrontError};

fn non_negative(value: &Decimal) -> std::result::Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("negative_amount"));
    }
    Ok(())
}

fn positive(value: &Decimal) -> std::result::Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("not_positive"));
    }
    Ok(())
}

fn percentage(value: &Decimal) -> std::result::Result<(), ValidationError> {
    Percentage::new(*value).map(|_| ()).map_err(|_| ValidationError::new("percentage_out_of_range"))
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[validate(custom = "non_negative")]
    pub base_price: Decimal,
    #[serde(default)]
    pub images: Vec<String>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VariationInput {
    pub variation_type: VariationType,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    pub price_adjustment: Decimal,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub stock: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "sale_window"))]
pub struct SaleInput {
    pub product_id: Uuid,
    pub variation_id: Option<Uuid>,
    #[validate(custom = "percentage")]
    pub discount_percentage: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

fn sale_window(input: &SaleInput) -> std::result::Result<(), ValidationError> {
    if input.end_date < input.start_date {
        return Err(ValidationError::new("end_before_start"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "coupon_value"))]
pub struct CouponInput {
    #[validate(length(min = 1, max = 40))]
    pub code: String,
    pub discount_type: DiscountType,
    #[validate(custom = "positive")]
    pub discount_value: Decimal,
    #[validate(custom = "non_negative")]
    pub minimum_purchase: Option<Decimal>,
    pub expiry_date: Option<NaiveDate>,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

fn active_by_default() -> bool { true }

fn coupon_value(input: &CouponInput) -> std::result::Result<(), ValidationError> {
    if input.discount_type == DiscountType::Percentage && input.discount_value > Decimal::ONE_HUNDRED {
        return Err(ValidationError::new("percentage_out_of_range"));
    }
    if normalize_code(&input.code).is_empty() {
        return Err(ValidationError::new("blank_code"));
    }
    Ok(())
}

impl CouponInput {
    fn apply(self, coupon: &mut Coupon) {
        coupon.code = normalize_code(&self.code);
        coupon.discount_type = self.discount_type;
        coupon.discount_value = self.discount_value;
        coupon.minimum_purchase = self.minimum_purchase.map(Money::new);
        coupon.expiry_date = self.expiry_date;
        coupon.is_active = self.is_active;
    }
}

#[derive(Debug, Serialize)]
pub struct CustomerDetail {
    #[serde(flatten)]
    pub customer: Customer,
    pub orders: Vec<Order>,
}

#[derive(Clone)]
pub struct AdminService {
    ctx: Context,
    catalog: CatalogService,
    orders: OrderService,
}

impl AdminService {
    pub fn new(ctx: Context) -> Self {
        Self { catalog: CatalogService::new(ctx.clone()), orders: OrderService::new(ctx.clone()), ctx }
    }

    // ---- products ----

    pub async fn list_products(&self, query: &ProductQuery) -> Result<ProductPage> { self.catalog.list(query).await }

    #[instrument(skip(self, input))]
    pub async fn create_product(&self, input: ProductInput) -> Result<Product> {
        input.validate()?;
        let mut product = Product::create(input.name.trim(), Money::new(input.base_price));
        product.description = input.description;
        product.images = input.images;
        product.category = input.category;
        self.ctx.store.insert_product(&product).await?;
        info!(product_id = %product.id, "product created");
        Ok(product)
    }

    pub async fn update_product(&self, id: Uuid, input: ProductInput) -> Result<Product> {
        input.validate()?;
        let mut product = self.product(id).await?;
        let base_price = Money::new(input.base_price);
        for variation in self.ctx.store.variations_for(id).await? {
            check_resolved_price(base_price, &variation)?;
        }
        product.name = input.name.trim().to_string();
        product.description = input.description;
        product.base_price = base_price;
        product.images = input.images;
        product.category = input.category;
        product.touch();
        self.ctx.store.update_product(&product).await?;
        Ok(product)
    }

    /// Removes the product's sales and variations before the product itself.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<()> {
        self.product(id).await?;
        let sales = self.ctx.store.delete_sales_for(id).await?;
        let variations = self.ctx.store.delete_variations_for(id).await?;
        self.ctx.store.delete_product(id).await?;
        info!(product_id = %id, sales, variations, "product deleted");
        Ok(())
    }

    async fn product(&self, id: Uuid) -> Result<Product> {
        self.ctx.store.get_product(id).await?.ok_or_else(|| StorefrontError::not_found("product", id))
    }

    // ---- variations ----

    pub async fn variations(&self, product_id: Uuid) -> Result<Vec<ProductVariation>> {
        Ok(self.ctx.store.variations_for(product_id).await?)
    }

    pub async fn create_variation(&self, product_id: Uuid, input: VariationInput) -> Result<ProductVariation> {
        input.validate()?;
        let product = self.product(product_id).await?;
        let variation = ProductVariation::create(product_id, input.variation_type, input.name.trim(), Money::new(input.price_adjustment), input.stock);
        check_resolved_price(product.base_price, &variation)?;
        self.ctx.store.insert_variation(&variation).await?;
        Ok(variation)
    }

    pub async fn update_variation(&self, id: Uuid, input: VariationInput) -> Result<ProductVariation> {
        input.validate()?;
        let mut variation = self.variation(id).await?;
        variation.variation_type = input.variation_type;
        variation.name = input.name.trim().to_string();
        variation.price_adjustment = Money::new(input.price_adjustment);
        variation.stock = input.stock;
        check_resolved_price(self.product(variation.product_id).await?.base_price, &variation)?;
        self.ctx.store.update_variation(&variation).await?;
        Ok(variation)
    }

    /// Sales scoped to the variation go with it.
    pub async fn delete_variation(&self, id: Uuid) -> Result<()> {
        let variation = self.variation(id).await?;
        for sale in self.ctx.store.sales_for_products(&[variation.product_id]).await? {
            if sale.variation_id == Some(id) {
                self.ctx.store.delete_sale(sale.id).await?;
            }
        }
        self.ctx.store.delete_variation(id).await?;
        Ok(())
    }

    async fn variation(&self, id: Uuid) -> Result<ProductVariation> {
        self.ctx
            .store
            .variations_by_ids(&[id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorefrontError::not_found("variation", id))
    }

    // ---- sales ----

    pub async fn sales(&self) -> Result<Vec<Sale>> { Ok(self.ctx.store.list_sales().await?) }

    /// Creates a sale, deactivating any active sale on the same
    /// (product, variation) in the same write.
    #[instrument(skip(self, input), fields(product_id = %input.product_id))]
    pub async fn create_sale(&self, input: SaleInput) -> Result<Sale> {
        input.validate()?;
        self.product(input.product_id).await?;
        if let Some(vid) = input.variation_id {
            let variation = self.variation(vid).await?;
            if variation.product_id != input.product_id {
                return Err(StorefrontError::InvalidInput(format!("variation {vid} belongs to another product")));
            }
        }
        let discount = Percentage::new(input.discount_percentage)?;
        let sale = Sale::create(input.product_id, input.variation_id, discount, input.start_date, input.end_date);
        let replaced = self.ctx.store.replace_active_sale(&sale).await?;
        info!(sale_id = %sale.id, replaced, "sale activated");
        self.ctx
            .publish_all(vec![DomainEvent::Catalog(CatalogEvent::SaleActivated {
                sale_id: sale.id,
                product_id: sale.product_id,
                variation_id: sale.variation_id,
                discount,
                replaced,
            })])
            .await;
        Ok(sale)
    }

    pub async fn deactivate_sale(&self, id: Uuid) -> Result<()> {
        if !self.ctx.store.set_sale_active(id, false).await? {
            return Err(StorefrontError::not_found("sale", id));
        }
        Ok(())
    }

    pub async fn delete_sale(&self, id: Uuid) -> Result<()> {
        if !self.ctx.store.delete_sale(id).await? {
            return Err(StorefrontError::not_found("sale", id));
        }
        Ok(())
    }

    // ---- coupons ----

    pub async fn coupons(&self) -> Result<Vec<Coupon>> { Ok(self.ctx.store.list_coupons().await?) }

    #[instrument(skip(self, input))]
    pub async fn create_coupon(&self, input: CouponInput) -> Result<Coupon> {
        input.validate()?;
        let code = normalize_code(&input.code);
        if self.ctx.store.find_coupon_by_code(&code).await?.is_some() {
            return Err(StorefrontError::InvalidInput(format!("coupon code {code} already exists")));
        }
        let mut coupon = Coupon::create(&code, input.discount_type, input.discount_value);
        input.apply(&mut coupon);
        self.ctx.store.insert_coupon(&coupon).await?;
        Ok(coupon)
    }

    pub async fn update_coupon(&self, id: Uuid, input: CouponInput) -> Result<Coupon> {
        input.validate()?;
        let mut coupon = self.coupon(id).await?;
        let code = normalize_code(&input.code);
        if let Some(other) = self.ctx.store.find_coupon_by_code(&code).await? {
            if other.id != id {
                return Err(StorefrontError::InvalidInput(format!("coupon code {code} already exists")));
            }
        }
        input.apply(&mut coupon);
        self.ctx.store.update_coupon(&coupon).await?;
        Ok(coupon)
    }

    pub async fn toggle_coupon(&self, id: Uuid) -> Result<Coupon> {
        let mut coupon = self.coupon(id).await?;
        coupon.is_active = !coupon.is_active;
        self.ctx.store.update_coupon(&coupon).await?;
        Ok(coupon)
    }

    pub async fn delete_coupon(&self, id: Uuid) -> Result<()> {
        if !self.ctx.store.delete_coupon(id).await? {
            return Err(StorefrontError::not_found("coupon", id));
        }
        Ok(())
    }

    async fn coupon(&self, id: Uuid) -> Result<Coupon> {
        self.ctx.store.get_coupon(id).await?.ok_or_else(|| StorefrontError::not_found("coupon", id))
    }

    // ---- orders ----

    pub async fn orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> { self.orders.list(status).await }

    pub async fn order(&self, id: Uuid) -> Result<Order> { self.orders.get(id).await }

    pub async fn set_order_status(&self, id: Uuid, status: OrderStatus) -> Result<Order> { self.orders.set_status(id, status).await }

    // ---- customers ----

    pub async fn customers(&self) -> Result<Vec<Customer>> { Ok(self.ctx.store.list_customers().await?) }

    pub async fn customer(&self, id: Uuid) -> Result<CustomerDetail> {
        let customer = self.ctx.store.get_customer(id).await?.ok_or_else(|| StorefrontError::not_found("customer", id))?;
        let orders = self.ctx.store.orders_for_user(id).await?;
        Ok(CustomerDetail { customer, orders })
    }
}

/// A variation may discount the base price but never below zero.
fn check_resolved_price(base_price: Money, variation: &ProductVariation) -> Result<()> {
    if (base_price + variation.price_adjustment).is_negative() {
        return Err(StorefrontError::InvalidInput(format!("variation `{}` would be priced below zero", variation.name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::services::testing::harness;
    use crate::store::CatalogRepository;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn product_input(name: &str, price: Decimal) -> ProductInput {
        ProductInput { name: name.into(), description: String::new(), base_price: price, images: vec![], category: Some("home".into()) }
    }

    fn coupon_input(code: &str, kind: DiscountType, value: Decimal) -> CouponInput {
        CouponInput { code: code.into(), discount_type: kind, discount_value: value, minimum_purchase: None, expiry_date: None, is_active: true }
    }

    #[tokio::test]
    async fn test_new_sale_replaces_active_one() {
        let h = harness();
        let admin = AdminService::new(h.ctx.clone());
        let now = h.clock.now();
        let product = admin.create_product(product_input("Chair", dec!(80))).await.unwrap();
        let sale = |pct| SaleInput { product_id: product.id, variation_id: None, discount_percentage: pct, start_date: now, end_date: now + Duration::days(7) };

        let first = admin.create_sale(sale(dec!(10))).await.unwrap();
        let second = admin.create_sale(sale(dec!(20))).await.unwrap();

        let sales = admin.sales().await.unwrap();
        assert!(!sales.iter().find(|s| s.id == first.id).unwrap().is_active);
        assert!(sales.iter().find(|s| s.id == second.id).unwrap().is_active);
        assert!(matches!(
            h.events.events().last(),
            Some(DomainEvent::Catalog(CatalogEvent::SaleActivated { replaced: 1, .. }))
        ));
    }

    #[tokio::test]
    async fn test_sale_input_is_validated() {
        let h = harness();
        let admin = AdminService::new(h.ctx.clone());
        let now = h.clock.now();
        let product = admin.create_product(product_input("Chair", dec!(80))).await.unwrap();
        let backwards = SaleInput { product_id: product.id, variation_id: None, discount_percentage: dec!(10), start_date: now, end_date: now - Duration::days(1) };
        assert!(matches!(admin.create_sale(backwards).await, Err(StorefrontError::Validation(_))));
        let too_deep = SaleInput { product_id: product.id, variation_id: None, discount_percentage: dec!(120), start_date: now, end_date: now };
        assert!(matches!(admin.create_sale(too_deep).await, Err(StorefrontError::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_product_cascades() {
        let h = harness();
        let admin = AdminService::new(h.ctx.clone());
        let now = h.clock.now();
        let product = admin.create_product(product_input("Desk", dec!(200))).await.unwrap();
        let variation = admin
            .create_variation(product.id, VariationInput { variation_type: VariationType::Color, name: "Oak".into(), price_adjustment: dec!(15), stock: 2 })
            .await
            .unwrap();
        admin
            .create_sale(SaleInput { product_id: product.id, variation_id: Some(variation.id), discount_percentage: dec!(5), start_date: now, end_date: now })
            .await
            .unwrap();

        admin.delete_product(product.id).await.unwrap();
        assert!(h.store.variations_for(product.id).await.unwrap().is_empty());
        assert!(h.store.sales_for_products(&[product.id]).await.unwrap().is_empty());
        assert!(matches!(admin.delete_product(product.id).await, Err(StorefrontError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_variation_price_never_negative() {
        let h = harness();
        let admin = AdminService::new(h.ctx.clone());
        let product = admin.create_product(product_input("Stool", dec!(40))).await.unwrap();
        let input = |adjustment| VariationInput { variation_type: VariationType::Size, name: "Mini".into(), price_adjustment: adjustment, stock: 1 };

        assert!(matches!(admin.create_variation(product.id, input(dec!(-40.01))).await, Err(StorefrontError::InvalidInput(_))));
        let mini = admin.create_variation(product.id, input(dec!(-40))).await.unwrap();
        assert!(matches!(admin.update_variation(mini.id, input(dec!(-50))).await, Err(StorefrontError::InvalidInput(_))));
        let mini = admin.update_variation(mini.id, input(dec!(-25))).await.unwrap();
        assert_eq!(mini.price_adjustment, Money::new(dec!(-25)));

        assert!(matches!(admin.update_product(product.id, product_input("Stool", dec!(20))).await, Err(StorefrontError::InvalidInput(_))));
        assert_eq!(h.store.get_product(product.id).await.unwrap().unwrap().base_price, Money::new(dec!(40)));
        admin.update_product(product.id, product_input("Stool", dec!(25))).await.unwrap();
    }

    #[tokio::test]
    async fn test_coupon_crud() {
        let h = harness();
        let admin = AdminService::new(h.ctx.clone());
        let coupon = admin.create_coupon(coupon_input(" save5 ", DiscountType::Fixed, dec!(5))).await.unwrap();
        assert_eq!(coupon.code, "SAVE5");
        assert!(admin.create_coupon(coupon_input("SAVE5", DiscountType::Fixed, dec!(7))).await.is_err());
        assert!(matches!(
            admin.create_coupon(coupon_input("HALF", DiscountType::Percentage, dec!(150))).await,
            Err(StorefrontError::Validation(_))
        ));

        let toggled = admin.toggle_coupon(coupon.id).await.unwrap();
        assert!(!toggled.is_active);
        let mut update = coupon_input("SAVE5", DiscountType::Fixed, dec!(6));
        update.minimum_purchase = Some(dec!(30));
        let updated = admin.update_coupon(coupon.id, update).await.unwrap();
        assert_eq!(updated.minimum_purchase, Some(Money::new(dec!(30))));
        admin.delete_coupon(coupon.id).await.unwrap();
        assert!(admin.coupons().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_customer_detail() {
        let h = harness();
        let admin = AdminService::new(h.ctx.clone());
        let id = Uuid::now_v7();
        h.store.add_customer(Customer { id, email: "lin@example.com".into(), full_name: Some("Lin".into()), created_at: Utc::now() }).await;
        let detail = admin.customer(id).await.unwrap();
        assert_eq!(detail.customer.email, "lin@example.com");
        assert!(detail.orders.is_empty());
        assert_eq!(admin.customers().await.unwrap().len(), 1);
        assert!(admin.customer(Uuid::now_v7()).await.is_err());
    }
}
