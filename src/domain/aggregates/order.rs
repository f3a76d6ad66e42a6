//! Order Aggregate and status workflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::aggregates::{AddressSnapshot, CartLine};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::Money;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending, OrderStatus::Processing, OrderStatus::Shipped,
        OrderStatus::Delivered, OrderStatus::Cancelled, OrderStatus::Returned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Returned => "returned",
        }
    }

    /// Orders in this status unlock reviews for their products.
    pub fn permits_reviews(&self) -> bool { matches!(self, OrderStatus::Delivered) }
}

impl FromStr for OrderStatus {
    type Err = TransitionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| TransitionError::UnknownStatus(s.to_string()))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Which status changes an admin may make.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusPolicy {
    /// Any status may be set from any other.
    #[default]
    Permissive,
    /// Only moves listed in [`StatusPolicy::strict_targets`].
    Strict,
}

impl StatusPolicy {
    pub fn strict_targets(from: OrderStatus) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match from {
            Pending => &[Processing, Cancelled],
            Processing => &[Shipped, Cancelled],
            Shipped => &[Delivered, Returned],
            Delivered => &[Returned],
            Cancelled | Returned => &[],
        }
    }

    pub fn allows(&self, from: OrderStatus, to: OrderStatus) -> bool {
        from == to || match self {
            StatusPolicy::Permissive => true,
            StatusPolicy::Strict => Self::strict_targets(from).contains(&to),
        }
    }
}

impl FromStr for StatusPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "permissive" => Ok(StatusPolicy::Permissive),
            "strict" => Ok(StatusPolicy::Strict),
            other => Err(format!("unknown order status policy `{other}`")),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransitionError {
    #[error("Order cannot move from {from} to {to}")]
    NotAllowed { from: OrderStatus, to: OrderStatus },
    #[error("Unknown order status `{0}`")]
    UnknownStatus(String),
}

/// Snapshot of a purchased line, decoupled from the live catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variation_id: Option<Uuid>,
    pub product_name: String,
    pub variation_name: Option<String>,
    pub unit_price: Money,
    pub quantity: u32,
}

impl OrderItem {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub subtotal: Money,
    pub discount_amount: Money,
    pub coupon_id: Option<Uuid>,
    pub total: Money,
    pub shipping_address: AddressSnapshot,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

impl Order {
    /// Freezes cart lines into a pending order.
    ///
    /// The subtotal is the full-precision sum of the cart lines, rounded once,
    /// so it matches the checkout preview. Item unit prices are stored rounded.
    pub fn place(user_id: Uuid, lines: &[CartLine], shipping_address: AddressSnapshot, discount: Money, coupon_id: Option<Uuid>) -> Result<Self, OrderError> {
        if lines.is_empty() { return Err(OrderError::NoItems); }
        let id = Uuid::now_v7();
        let now = Utc::now();
        let items: Vec<OrderItem> = lines.iter().map(|l| OrderItem {
            id: Uuid::now_v7(), order_id: id, product_id: l.entry.product_id, variation_id: l.entry.variation_id,
            product_name: l.product_name.clone(), variation_name: l.variation_name.clone(),
            unit_price: l.unit_price.rounded(), quantity: l.quantity(),
        }).collect();
        let subtotal = lines.iter().map(CartLine::line_total).sum::<Money>().rounded();
        let discount_amount = discount.rounded().min(subtotal);
        let total = (subtotal - discount_amount).non_negative().rounded();
        let mut order = Self {
            id, order_number: generate_order_number(), user_id, status: OrderStatus::Pending,
            subtotal, discount_amount, coupon_id, total, shipping_address, items,
            created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed { order_id: id, user_id, total }));
        Ok(order)
    }

    pub fn item_count(&self) -> u32 { self.items.iter().fold(0u32, |n, i| n.saturating_add(i.quantity)) }
    pub fn contains_product(&self, product_id: Uuid) -> bool { self.items.iter().any(|i| i.product_id == product_id) }

    /// The single place an order's status changes.
    pub fn transition(&mut self, to: OrderStatus, policy: StatusPolicy) -> Result<bool, TransitionError> {
        let from = self.status;
        if !policy.allows(from, to) { return Err(TransitionError::NotAllowed { from, to }); }
        if from == to { return Ok(false); }
        self.status = to;
        self.updated_at = Utc::now();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to }));
        Ok(true)
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

fn generate_order_number() -> String {
    format!("ORD-{}-{:06}", Utc::now().format("%Y%m%d"), rand::random::<u32>() % 1_000_000)
}

#[derive(Debug, Clone, PartialEq)] pub enum OrderError { NoItems }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::NoItems => write!(f, "No items") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::CartEntry;
    use crate::domain::pricing::PriceQuote;
    use rust_decimal_macros::dec;

    fn lines() -> Vec<CartLine> {
        let quote = PriceQuote { list_price: Money::new(dec!(55)), unit_price: Money::new(dec!(44)), sale_discount: None };
        vec![CartLine::priced(CartEntry::new(Uuid::now_v7(), None, 2), "Hoodie".into(), Some("L".into()), None, quote)]
    }

    #[test]
    fn test_order_placement_totals() {
        let order = Order::place(Uuid::now_v7(), &lines(), AddressSnapshot::default(), Money::new(dec!(8.80)), None).unwrap();
        assert_eq!(order.subtotal, Money::new(dec!(88)));
        assert_eq!(order.total, Money::new(dec!(79.20)));
        assert_eq!(order.item_count(), 2);
        assert_eq!(order.items[0].variation_name.as_deref(), Some("L"));
        assert!(Order::place(Uuid::now_v7(), &[], AddressSnapshot::default(), Money::ZERO, None).is_err());
    }

    #[test]
    fn test_subtotal_rounds_once_over_fractional_cents() {
        // 19.99 at 25% off is 14.9925 a unit.
        let quote = PriceQuote { list_price: Money::new(dec!(19.99)), unit_price: Money::new(dec!(14.9925)), sale_discount: None };
        let lines = vec![CartLine::priced(CartEntry::new(Uuid::now_v7(), None, 2), "Scarf".into(), None, None, quote)];
        let order = Order::place(Uuid::now_v7(), &lines, AddressSnapshot::default(), Money::ZERO, None).unwrap();
        assert_eq!(order.subtotal, Money::new(dec!(29.99)));
        assert_eq!(order.total, Money::new(dec!(29.99)));
        assert_eq!(order.items[0].unit_price, Money::new(dec!(14.99)));
    }

    #[test]
    fn test_permissive_policy_allows_anything() {
        let mut order = Order::place(Uuid::now_v7(), &lines(), AddressSnapshot::default(), Money::ZERO, None).unwrap();
        order.take_events();
        assert_eq!(order.transition(OrderStatus::Delivered, StatusPolicy::Permissive), Ok(true));
        assert_eq!(order.transition(OrderStatus::Pending, StatusPolicy::Permissive), Ok(true));
        assert_eq!(order.transition(OrderStatus::Pending, StatusPolicy::Permissive), Ok(false));
        assert_eq!(order.take_events().len(), 2);
    }

    #[test]
    fn test_strict_policy_table() {
        let mut order = Order::place(Uuid::now_v7(), &lines(), AddressSnapshot::default(), Money::ZERO, None).unwrap();
        assert!(order.transition(OrderStatus::Shipped, StatusPolicy::Strict).is_err());
        for next in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
            order.transition(next, StatusPolicy::Strict).unwrap();
        }
        assert_eq!(
            order.transition(OrderStatus::Pending, StatusPolicy::Strict),
            Err(TransitionError::NotAllowed { from: OrderStatus::Delivered, to: OrderStatus::Pending })
        );
        assert!(order.status.permits_reviews());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("returned".parse::<OrderStatus>().unwrap(), OrderStatus::Returned);
        assert!("lost".parse::<OrderStatus>().is_err());
        assert_eq!("Strict".parse::<StatusPolicy>().unwrap(), StatusPolicy::Strict);
    }
}
