//! Business operations over the store, one service per concern.

pub mod addresses;
pub mod admin;
pub mod cart;
pub mod catalog;
pub mod orders;
pub mod reviews;
pub mod wishlist;

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::domain::aggregates::StatusPolicy;
use crate::domain::events::DomainEvent;
use crate::notify::Notifier;
use crate::store::Store;

pub use addresses::AddressService;
pub use admin::AdminService;
pub use cart::CartService;
pub use catalog::CatalogService;
pub use orders::{Checkout, OrderService};
pub use reviews::ReviewService;
pub use wishlist::WishlistService;

/// Collaborators every service draws on.
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn Notifier>,
    pub events: Arc<dyn EventPublisher>,
    pub status_policy: StatusPolicy,
}

impl Context {
    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in &events {
            self.events.publish(event).await;
        }
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Best effort; failures are logged, never returned.
    async fn publish(&self, event: &DomainEvent);
}

/// Publishes events as JSON on their NATS subject.
pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &DomainEvent) {
        let payload = match serde_json::to_vec(event) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode event");
                return;
            }
        };
        if let Err(e) = self.client.publish(event.subject().to_string(), payload.into()).await {
            tracing::warn!(subject = event.subject(), error = %e, "failed to publish event");
        }
    }
}

/// Used when no broker is configured.
#[derive(Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &DomainEvent) {
        tracing::debug!(subject = event.subject(), "event raised");
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &DomainEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::clock::FixedClock;
    use crate::notify::RecordingNotifier;
    use crate::store::memory::MemoryStore;
    use chrono::{TimeZone, Utc};

    pub struct Harness {
        pub store: Arc<MemoryStore>,
        pub clock: Arc<FixedClock>,
        pub notifier: Arc<RecordingNotifier>,
        pub events: Arc<RecordingPublisher>,
        pub ctx: Context,
    }

    pub fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()));
        let notifier = Arc::new(RecordingNotifier::new());
        let events = Arc::new(RecordingPublisher::default());
        let ctx = Context {
            store: store.clone(),
            clock: clock.clone(),
            notifier: notifier.clone(),
            events: events.clone(),
            status_policy: StatusPolicy::Permissive,
        };
        Harness { store, clock, notifier, events, ctx }
    }
}
