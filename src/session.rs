//! Session lifecycle.
//!
//! [`Storefront`] owns the long-lived collaborators. Opening a session picks
//! where that shopper's cart and wishlist live and loads both; closing it
//! drops them. Nothing here is global.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::domain::aggregates::{CartEntry, Order, Review, StatusPolicy, WishlistEntry};
use crate::notify::{Notifier, TracingNotifier};
use crate::services::orders::Checkout;
use crate::services::reviews::NewReview;
use crate::services::{
    AddressService, AdminService, CartService, CatalogService, Context, EventPublisher, LogPublisher, OrderService,
    ReviewService, WishlistService,
};
use crate::store::entries::{EntryStore, LocalEntries, RemoteCartEntries, RemoteWishlistEntries};
use crate::store::local::KeyValueStore;
use crate::store::Store;
use crate::{Result, StorefrontError};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Not signed in; collections live in device storage.
    Anonymous { device_id: String },
    Authenticated { user_id: Uuid },
}

impl Identity {
    /// Device ids become storage keys, so only `[A-Za-z0-9_-]` is accepted.
    pub fn anonymous(device_id: &str) -> Result<Self> {
        let device_id = device_id.trim();
        let valid = !device_id.is_empty()
            && device_id.len() <= 128
            && device_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StorefrontError::InvalidInput("device id must be 1-128 characters of letters, digits, '-' or '_'".into()));
        }
        Ok(Identity::Anonymous { device_id: device_id.to_string() })
    }

    pub fn authenticated(user_id: Uuid) -> Self { Identity::Authenticated { user_id } }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Identity::Authenticated { user_id } => Some(*user_id),
            Identity::Anonymous { .. } => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Anonymous { device_id } => write!(f, "device:{device_id}"),
            Identity::Authenticated { user_id } => write!(f, "user:{user_id}"),
        }
    }
}

/// Dependency root for the storefront and admin console.
#[derive(Clone)]
pub struct Storefront {
    ctx: Context,
    device: Arc<dyn KeyValueStore>,
}

impl Storefront {
    pub fn new(store: Arc<dyn Store>, device: Arc<dyn KeyValueStore>) -> Self {
        let ctx = Context {
            store,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(TracingNotifier),
            events: Arc::new(LogPublisher),
            status_policy: StatusPolicy::default(),
        };
        Self { ctx, device }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.ctx.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.ctx.notifier = notifier;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.ctx.events = events;
        self
    }

    pub fn with_status_policy(mut self, policy: StatusPolicy) -> Self {
        self.ctx.status_policy = policy;
        self
    }

    pub fn context(&self) -> &Context { &self.ctx }

    pub fn catalog(&self) -> CatalogService { CatalogService::new(self.ctx.clone()) }
    pub fn orders(&self) -> OrderService { OrderService::new(self.ctx.clone()) }
    pub fn reviews(&self) -> ReviewService { ReviewService::new(self.ctx.clone()) }
    pub fn addresses(&self) -> AddressService { AddressService::new(self.ctx.clone()) }
    pub fn admin(&self) -> AdminService { AdminService::new(self.ctx.clone()) }

    /// Builds the session's cart and wishlist over the right storage and loads both.
    #[instrument(skip(self, identity), fields(identity = %identity))]
    pub async fn open_session(&self, identity: Identity) -> Result<Session> {
        let (cart_entries, wishlist_entries): (Arc<dyn EntryStore<CartEntry>>, Arc<dyn EntryStore<WishlistEntry>>) = match &identity {
            Identity::Authenticated { user_id } => (
                Arc::new(RemoteCartEntries::new(self.ctx.store.clone(), *user_id)),
                Arc::new(RemoteWishlistEntries::new(self.ctx.store.clone(), *user_id)),
            ),
            Identity::Anonymous { device_id } => (
                Arc::new(LocalEntries::<CartEntry>::new(self.device.clone(), format!("cart:{device_id}"))),
                Arc::new(LocalEntries::<WishlistEntry>::new(self.device.clone(), format!("wishlist:{device_id}"))),
            ),
        };
        let session = Session {
            cart: CartService::new(self.ctx.clone(), cart_entries),
            wishlist: WishlistService::new(self.ctx.clone(), wishlist_entries),
            orders: self.orders(),
            reviews: self.reviews(),
            identity,
        };
        session.cart.load().await?;
        session.wishlist.load().await?;
        info!(backend = session.cart.backend(), items = session.cart.summary().item_count, "session opened");
        Ok(session)
    }
}

/// One shopper's cart and wishlist plus the operations that need them.
pub struct Session {
    identity: Identity,
    cart: CartService,
    wishlist: WishlistService,
    orders: OrderService,
    reviews: ReviewService,
}

impl Session {
    pub fn identity(&self) -> &Identity { &self.identity }
    pub fn cart(&self) -> &CartService { &self.cart }
    pub fn wishlist(&self) -> &WishlistService { &self.wishlist }

    pub fn user_id(&self) -> Result<Uuid> { self.identity.user_id().ok_or(StorefrontError::AuthenticationRequired) }

    pub async fn preview_checkout(&self, coupon_code: Option<&str>) -> Result<Checkout> {
        self.orders.preview(&self.cart.snapshot().await, coupon_code).await
    }

    pub async fn place_order(&self, address_id: Uuid, coupon_code: Option<&str>) -> Result<Order> {
        let user_id = self.user_id()?;
        self.orders.place_order(user_id, &self.cart, address_id, coupon_code).await
    }

    pub async fn my_orders(&self) -> Result<Vec<Order>> { self.orders.my_orders(self.user_id()?).await }

    pub async fn order(&self, id: Uuid) -> Result<Order> { self.orders.order(self.user_id()?, id).await }

    pub async fn submit_review(&self, product_id: Uuid, input: NewReview) -> Result<Review> {
        self.reviews.submit(self.user_id()?, product_id, input).await
    }

    /// Re-reads both collections from storage.
    pub async fn refresh(&self) -> Result<()> {
        self.cart.load().await?;
        self.wishlist.load().await
    }

    pub fn close(self) {
        info!(identity = %self.identity, "session closed");
    }
}

pub const DEFAULT_SESSION_CAPACITY: usize = 10_000;
pub const DEFAULT_SESSION_IDLE_MINUTES: i64 = 30;

struct OpenSession {
    session: Arc<Session>,
    last_used: DateTime<Utc>,
}

/// Open sessions by identity, so a session outlives a single request.
///
/// Sessions idle longer than `idle` are dropped, and once `capacity` sessions
/// are open the least recently used one makes room. Opening a session loads
/// storage, so it runs without the registry lock held.
pub struct SessionRegistry {
    storefront: Storefront,
    sessions: Mutex<HashMap<Identity, OpenSession>>,
    capacity: usize,
    idle: Duration,
}

impl SessionRegistry {
    pub fn new(storefront: Storefront) -> Self {
        Self::with_limits(storefront, DEFAULT_SESSION_CAPACITY, Duration::minutes(DEFAULT_SESSION_IDLE_MINUTES))
    }

    pub fn with_limits(storefront: Storefront, capacity: usize, idle: Duration) -> Self {
        Self { storefront, sessions: Mutex::new(HashMap::new()), capacity: capacity.max(1), idle }
    }

    pub fn storefront(&self) -> &Storefront { &self.storefront }

    pub async fn session(&self, identity: Identity) -> Result<Arc<Session>> {
        let now = self.storefront.ctx.clock.now();
        {
            let mut sessions = self.sessions.lock().await;
            self.evict_idle(&mut sessions, now);
            if let Some(open) = sessions.get_mut(&identity) {
                open.last_used = now;
                return Ok(open.session.clone());
            }
        }

        let opened = Arc::new(self.storefront.open_session(identity.clone()).await?);
        let mut sessions = self.sessions.lock().await;
        self.evict_idle(&mut sessions, now);
        if !sessions.contains_key(&identity) && sessions.len() >= self.capacity {
            let oldest = sessions.iter().min_by_key(|(_, open)| open.last_used).map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                sessions.remove(&oldest);
                debug!(identity = %oldest, "least recently used session evicted");
            }
        }
        // A concurrent request for the same identity may have won; keep its session.
        let open = sessions.entry(identity).or_insert(OpenSession { session: opened, last_used: now });
        open.last_used = now;
        Ok(open.session.clone())
    }

    /// Sign-out. Returns false if no session was open.
    pub async fn close(&self, identity: &Identity) -> bool {
        let removed = self.sessions.lock().await.remove(identity);
        match removed.map(|open| Arc::try_unwrap(open.session)) {
            Some(Ok(session)) => {
                session.close();
                true
            }
            Some(Err(_)) => true,
            None => false,
        }
    }

    pub async fn len(&self) -> usize { self.sessions.lock().await.len() }

    fn evict_idle(&self, sessions: &mut HashMap<Identity, OpenSession>, now: DateTime<Utc>) {
        let before = sessions.len();
        sessions.retain(|_, open| now - open.last_used <= self.idle);
        if sessions.len() < before {
            debug!(evicted = before - sessions.len(), "idle sessions evicted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Product;
    use crate::domain::value_objects::Money;
    use crate::store::local::MemoryKeyValueStore;
    use crate::store::memory::MemoryStore;
    use crate::store::CatalogRepository;
    use rust_decimal_macros::dec;

    use crate::clock::FixedClock;

    async fn storefront() -> (Storefront, Product) {
        let store = Arc::new(MemoryStore::new());
        let mug = Product::create("Mug", Money::new(dec!(9)));
        store.insert_product(&mug).await.unwrap();
        (Storefront::new(store, Arc::new(MemoryKeyValueStore::new())), mug)
    }

    #[test]
    fn test_device_ids_are_checked() {
        assert!(Identity::anonymous("abc-123_x").is_ok());
        assert!(Identity::anonymous("../etc").is_err());
        assert!(Identity::anonymous("  ").is_err());
    }

    #[tokio::test]
    async fn test_anonymous_session_reopens_with_cart() {
        let (storefront, mug) = storefront().await;
        let identity = Identity::anonymous("tablet-1").unwrap();
        let session = storefront.open_session(identity.clone()).await.unwrap();
        session.cart().add_item(mug.id, 2, None).await.unwrap();
        session.close();

        let reopened = storefront.open_session(identity).await.unwrap();
        assert_eq!(reopened.cart().summary().item_count, 2);
        assert!(matches!(reopened.my_orders().await, Err(StorefrontError::AuthenticationRequired)));
    }

    #[tokio::test]
    async fn test_registry_shares_sessions() {
        let (storefront, mug) = storefront().await;
        let registry = SessionRegistry::new(storefront);
        let user = Identity::authenticated(Uuid::now_v7());

        registry.session(user.clone()).await.unwrap().cart().add_item(mug.id, 1, None).await.unwrap();
        let again = registry.session(user.clone()).await.unwrap();
        assert_eq!(again.cart().summary().item_count, 1);
        assert_eq!(registry.len().await, 1);
        drop(again);

        assert!(registry.close(&user).await);
        assert!(!registry.close(&user).await);
        let fresh = registry.session(user).await.unwrap();
        assert_eq!(fresh.cart().summary().item_count, 1);
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let (storefront, mug) = storefront().await;
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let registry = SessionRegistry::with_limits(storefront.with_clock(clock.clone()), 10, Duration::minutes(30));
        let shopper = Identity::anonymous("kiosk-7").unwrap();
        let other = Identity::anonymous("kiosk-8").unwrap();

        let first = registry.session(shopper.clone()).await.unwrap();
        first.cart().add_item(mug.id, 3, None).await.unwrap();
        registry.session(other.clone()).await.unwrap();
        clock.advance(Duration::minutes(20));
        registry.session(shopper.clone()).await.unwrap();
        assert_eq!(registry.len().await, 2);

        clock.advance(Duration::minutes(31));
        let reopened = registry.session(shopper).await.unwrap();
        assert_eq!(registry.len().await, 1);
        assert!(!Arc::ptr_eq(&first, &reopened));
        assert_eq!(reopened.cart().summary().item_count, 3);
        assert!(!registry.close(&other).await);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let (storefront, _) = storefront().await;
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let registry = SessionRegistry::with_limits(storefront.with_clock(clock.clone()), 2, Duration::hours(1));
        let a = Identity::anonymous("a").unwrap();
        let b = Identity::anonymous("b").unwrap();
        let c = Identity::anonymous("c").unwrap();

        registry.session(a.clone()).await.unwrap();
        clock.advance(Duration::seconds(1));
        registry.session(b.clone()).await.unwrap();
        clock.advance(Duration::seconds(1));
        registry.session(a.clone()).await.unwrap();
        clock.advance(Duration::seconds(1));
        registry.session(c.clone()).await.unwrap();

        assert_eq!(registry.len().await, 2);
        assert!(!registry.close(&b).await);
        assert!(registry.close(&a).await);
        assert!(registry.close(&c).await);
    }

    #[tokio::test]
    async fn test_concurrent_opens_share_one_session() {
        let (storefront, _) = storefront().await;
        let registry = SessionRegistry::new(storefront);
        let user = Identity::authenticated(Uuid::now_v7());
        let (x, y) = tokio::join!(registry.session(user.clone()), registry.session(user.clone()));
        assert!(Arc::ptr_eq(&x.unwrap(), &y.unwrap()));
        assert_eq!(registry.len().await, 1);
    }
}
