//! Domain events
use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::{Money, Percentage};
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Catalog(CatalogEvent),
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            DomainEvent::Order(OrderEvent::Placed { .. }) => "storefront.orders.placed",
            DomainEvent::Order(OrderEvent::StatusChanged { .. }) => "storefront.orders.status_changed",
            DomainEvent::Catalog(CatalogEvent::SaleActivated { .. }) => "storefront.catalog.sale_activated",
            DomainEvent::Catalog(CatalogEvent::ReviewSubmitted { .. }) => "storefront.catalog.review_submitted",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: Uuid, total: Money },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CatalogEvent {
    SaleActivated { sale_id: Uuid, product_id: Uuid, variation_id: Option<Uuid>, discount: Percentage, replaced: u64 },
    ReviewSubmitted { review_id: Uuid, product_id: Uuid, rating: u8 },
}
