//! Checkout and the order status workflow.

use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use super::cart::CartService;
use super::Context;
use crate::domain::aggregates::{normalize_code, validate_coupon, AppliedCoupon, Cart, Order, OrderStatus, StatusPolicy, TransitionError};
use crate::domain::value_objects::Money;
use crate::{Result, StorefrontError};

/// Totals for the cart as it stands, with an optional coupon applied.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Checkout {
    pub item_count: u32,
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
    pub coupon: Option<AppliedCoupon>,
}

/// Every status change passes through here.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrderWorkflow {
    policy: StatusPolicy,
}

impl OrderWorkflow {
    pub fn new(policy: StatusPolicy) -> Self { Self { policy } }

    pub fn policy(&self) -> StatusPolicy { self.policy }

    /// `Ok(false)` when the order already has `to`.
    pub fn transition(&self, order: &mut Order, to: OrderStatus) -> std::result::Result<bool, TransitionError> {
        order.transition(to, self.policy)
    }
}

#[derive(Clone)]
pub struct OrderService {
    ctx: Context,
    workflow: OrderWorkflow,
}

impl OrderService {
    pub fn new(ctx: Context) -> Self {
        let workflow = OrderWorkflow::new(ctx.status_policy);
        Self { ctx, workflow }
    }

    pub fn workflow(&self) -> OrderWorkflow { self.workflow }

    /// Looks up and validates a code against `subtotal`.
    pub async fn apply_coupon(&self, code: &str, subtotal: Money) -> Result<AppliedCoupon> {
        let coupon = self.ctx.store.find_coupon_by_code(&normalize_code(code)).await?;
        Ok(validate_coupon(coupon.as_ref(), subtotal, self.ctx.clock.now())?)
    }

    pub async fn preview(&self, cart: &Cart, coupon_code: Option<&str>) -> Result<Checkout> {
        let subtotal = cart.subtotal().rounded();
        let coupon = match coupon_code.filter(|c| !c.trim().is_empty()) {
            Some(code) => Some(self.apply_coupon(code, subtotal).await?),
            None => None,
        };
        let discount = coupon.as_ref().map(|c| c.discount_amount.rounded()).unwrap_or_default();
        Ok(Checkout {
            item_count: cart.total_item_count(),
            subtotal,
            discount,
            total: (subtotal - discount).non_negative().rounded(),
            coupon,
        })
    }

    /// Freezes the cart into a pending order shipped to one of the user's
    /// saved addresses, then empties the cart. The cart stays locked until
    /// the order is stored and the cart cleared.
    #[instrument(skip(self, cart))]
    pub async fn place_order(&self, user_id: Uuid, cart: &CartService, address_id: Uuid, coupon_code: Option<&str>) -> Result<Order> {
        let mut order = cart
            .checkout(|snapshot| async move {
                let address = self
                    .ctx
                    .store
                    .get_address(user_id, address_id)
                    .await?
                    .ok_or_else(|| StorefrontError::not_found("address", address_id))?;
                let checkout = self.preview(&snapshot, coupon_code).await?;
                let order = Order::place(
                    user_id,
                    snapshot.lines(),
                    address.address,
                    checkout.discount,
                    checkout.coupon.as_ref().map(|c| c.coupon_id),
                )?;
                self.ctx.store.insert_order(&order).await?;
                Ok::<_, StorefrontError>(order)
            })
            .await?;
        info!(order_id = %order.id, order_number = %order.order_number, total = %order.total, "order placed");
        self.ctx.publish_all(order.take_events()).await;
        Ok(order)
    }

    pub async fn my_orders(&self, user_id: Uuid) -> Result<Vec<Order>> {
        Ok(self.ctx.store.orders_for_user(user_id).await?)
    }

    /// Another user's order is reported as not found.
    pub async fn order(&self, user_id: Uuid, id: Uuid) -> Result<Order> {
        self.ctx
            .store
            .get_order(id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| StorefrontError::not_found("order", id))
    }

    pub async fn list(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        Ok(self.ctx.store.list_orders(status).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Order> {
        self.ctx.store.get_order(id).await?.ok_or_else(|| StorefrontError::not_found("order", id))
    }

    #[instrument(skip(self))]
    pub async fn set_status(&self, id: Uuid, status: OrderStatus) -> Result<Order> {
        let mut order = self.get(id).await?;
        let from = order.status;
        if self.workflow.transition(&mut order, status)? {
            if !self.ctx.store.update_order_status(&order).await? {
                return Err(StorefrontError::not_found("order", id));
            }
            info!(order_id = %id, %from, to = %status, "order status changed");
            self.ctx.publish_all(order.take_events()).await;
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{AddressSnapshot, Coupon, DiscountType, Product, Sale, ShippingAddress};
    use crate::clock::Clock;
    use crate::domain::value_objects::Percentage;
    use chrono::Duration;
    use crate::domain::events::{DomainEvent, OrderEvent};
    use crate::services::testing::{harness, Harness};
    use crate::store::entries::RemoteCartEntries;
    use crate::store::{AddressRepository, CartRepository, CatalogRepository, CouponRepository};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    struct Shop {
        h: Harness,
        user: Uuid,
        address: ShippingAddress,
        cart: CartService,
        orders: OrderService,
    }

    async fn shop(policy: StatusPolicy) -> Shop {
        let mut h = harness();
        h.ctx.status_policy = policy;
        let user = Uuid::now_v7();
        let address = ShippingAddress::create(user, AddressSnapshot { recipient: "Ada".into(), street: "1 Main St".into(), city: "Springfield".into(), postal_code: "12345".into(), country: "US".into(), ..Default::default() }, true);
        h.store.insert_address(&address).await.unwrap();
        let cart = CartService::new(h.ctx.clone(), Arc::new(RemoteCartEntries::new(h.ctx.store.clone(), user)));
        let orders = OrderService::new(h.ctx.clone());
        Shop { h, user, address, cart, orders }
    }

    async fn fill_cart(s: &Shop) -> Product {
        let bag = Product::create("Bag", Money::new(dec!(44)));
        s.h.store.insert_product(&bag).await.unwrap();
        s.cart.add_item(bag.id, 2, None).await.unwrap();
        bag
    }

    #[tokio::test]
    async fn test_preview_applies_percentage_coupon() {
        let s = shop(StatusPolicy::Permissive).await;
        fill_cart(&s).await;
        s.h.store.insert_coupon(&Coupon::create("WELCOME10", DiscountType::Percentage, dec!(10))).await.unwrap();

        let checkout = s.orders.preview(&s.cart.snapshot().await, Some(" welcome10 ")).await.unwrap();
        assert_eq!(checkout.subtotal, Money::new(dec!(88)));
        assert_eq!(checkout.discount, Money::new(dec!(8.80)));
        assert_eq!(checkout.total, Money::new(dec!(79.20)));

        let err = s.orders.preview(&s.cart.snapshot().await, Some("NOPE")).await.unwrap_err();
        assert!(matches!(err, StorefrontError::Coupon(_)));
    }

    #[tokio::test]
    async fn test_place_order_clears_cart_and_raises_event() {
        let s = shop(StatusPolicy::Permissive).await;
        let bag = fill_cart(&s).await;

        let order = s.orders.place_order(s.user, &s.cart, s.address.id, None).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total, Money::new(dec!(88)));
        assert!(order.contains_product(bag.id));
        assert_eq!(order.shipping_address.city, "Springfield");
        assert!(s.cart.snapshot().await.is_empty());
        assert!(s.h.store.cart_entries(s.user).await.unwrap().is_empty());
        assert!(matches!(s.h.events.events().as_slice(), [DomainEvent::Order(OrderEvent::Placed { .. })]));

        assert_eq!(s.orders.my_orders(s.user).await.unwrap().len(), 1);
        assert!(s.orders.order(Uuid::now_v7(), order.id).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_cart_and_unknown_address() {
        let s = shop(StatusPolicy::Permissive).await;
        assert!(matches!(s.orders.place_order(s.user, &s.cart, s.address.id, None).await, Err(StorefrontError::EmptyCart)));
        fill_cart(&s).await;
        let err = s.orders.place_order(s.user, &s.cart, Uuid::now_v7(), None).await.unwrap_err();
        assert!(matches!(err, StorefrontError::NotFound { entity: "address", .. }));
    }

    #[tokio::test]
    async fn test_strict_policy_rejects_backwards_moves() {
        let s = shop(StatusPolicy::Strict).await;
        fill_cart(&s).await;
        let order = s.orders.place_order(s.user, &s.cart, s.address.id, None).await.unwrap();

        for status in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
            s.orders.set_status(order.id, status).await.unwrap();
        }
        let err = s.orders.set_status(order.id, OrderStatus::Pending).await.unwrap_err();
        assert!(matches!(err, StorefrontError::Transition(TransitionError::NotAllowed { .. })));
        assert_eq!(s.orders.get(order.id).await.unwrap().status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn test_permissive_policy_and_same_status_noop() {
        let s = shop(StatusPolicy::Permissive).await;
        fill_cart(&s).await;
        let order = s.orders.place_order(s.user, &s.cart, s.address.id, None).await.unwrap();

        s.orders.set_status(order.id, OrderStatus::Delivered).await.unwrap();
        s.orders.set_status(order.id, OrderStatus::Pending).await.unwrap();
        let before = s.h.events.events().len();
        s.orders.set_status(order.id, OrderStatus::Pending).await.unwrap();
        assert_eq!(s.h.events.events().len(), before);
        assert_eq!(s.orders.list(Some(OrderStatus::Pending)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_order_totals_match_preview_with_fractional_sale_price() {
        let s = shop(StatusPolicy::Permissive).await;
        let scarf = Product::create("Scarf", Money::new(dec!(19.99)));
        s.h.store.insert_product(&scarf).await.unwrap();
        let now = s.h.clock.now();
        let sale = Sale::create(scarf.id, None, Percentage::new(dec!(25)).unwrap(), now - Duration::days(1), now + Duration::days(1));
        s.h.store.replace_active_sale(&sale).await.unwrap();
        s.cart.add_item(scarf.id, 2, None).await.unwrap();

        let preview = s.orders.preview(&s.cart.snapshot().await, None).await.unwrap();
        let order = s.orders.place_order(s.user, &s.cart, s.address.id, None).await.unwrap();
        assert_eq!(preview.subtotal, Money::new(dec!(29.99)));
        assert_eq!(order.subtotal, preview.subtotal);
        assert_eq!(order.total, preview.total);
    }

    #[tokio::test]
    async fn test_item_added_during_checkout_is_not_lost() {
        let s = shop(StatusPolicy::Permissive).await;
        let bag = fill_cart(&s).await;
        let mug = Product::create("Mug", Money::new(dec!(9)));
        s.h.store.insert_product(&mug).await.unwrap();

        let (placed, added) = tokio::join!(
            s.orders.place_order(s.user, &s.cart, s.address.id, None),
            s.cart.add_item(mug.id, 1, None),
        );
        let order = placed.unwrap();
        added.unwrap();
        assert!(order.contains_product(bag.id));
        let in_order = order.contains_product(mug.id);
        let in_cart = s.cart.snapshot().await.find(mug.id, None).is_some();
        assert!(in_order != in_cart);
        assert_eq!(s.h.store.cart_entries(s.user).await.unwrap().len(), usize::from(in_cart));
    }
}
