//! Cart aggregation for one session.
//!
//! Every mutation writes through the session's [`EntryStore`] first and only
//! then updates the in-memory cart. A permission denial from the remote store
//! is not fatal: the local view still changes and the shopper gets a warning
//! toast. Any other storage failure is returned and the cart is left as it was.
//!
//! Mutations are serialized by a per-session mutex held across the write, so
//! two concurrent adds of the same item merge into one line.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::catalog::CatalogService;
use super::Context;
use crate::domain::aggregates::{Cart, CartEntry, CartLine, CartSummary, MAX_LINE_QUANTITY};
use crate::notify::{Notifier, Severity};
use crate::store::entries::EntryStore;
use crate::store::StoreResult;
use crate::{Result, StorefrontError};

const TOAST_MS: u64 = 3000;

pub struct CartService {
    catalog: CatalogService,
    notifier: Arc<dyn Notifier>,
    entries: Arc<dyn EntryStore<CartEntry>>,
    cart: Mutex<Cart>,
    summary: watch::Sender<CartSummary>,
}

impl CartService {
    pub fn new(ctx: Context, entries: Arc<dyn EntryStore<CartEntry>>) -> Self {
        let (summary, _) = watch::channel(CartSummary::default());
        Self {
            catalog: CatalogService::new(ctx.clone()),
            notifier: ctx.notifier,
            entries,
            cart: Mutex::new(Cart::new()),
            summary,
        }
    }

    pub fn backend(&self) -> &'static str { self.entries.backend_tag() }

    /// Re-reads stored entries and prices them against the current catalog.
    #[instrument(skip(self), fields(backend = self.backend()))]
    pub async fn load(&self) -> Result<()> {
        let mut cart = self.cart.lock().await;
        let entries = self.entries.load().await?;
        let lines = self.catalog.enrich_cart(entries).await?;
        *cart = Cart::from_lines(lines);
        self.publish(&cart);
        Ok(())
    }

    pub async fn snapshot(&self) -> Cart { self.cart.lock().await.clone() }

    pub fn summary(&self) -> CartSummary { *self.summary.borrow() }

    pub fn subscribe(&self) -> watch::Receiver<CartSummary> { self.summary.subscribe() }

    /// Adds `quantity` of a product, merging with an existing line for the
    /// same (product, variation). The unit price is taken now.
    #[instrument(skip(self))]
    pub async fn add_item(&self, product_id: Uuid, quantity: u32, variation_id: Option<Uuid>) -> Result<CartLine> {
        if quantity == 0 { return Err(StorefrontError::InvalidQuantity); }
        let mut cart = self.cart.lock().await;
        let (product, variation, price) = self.catalog.price_item(product_id, variation_id).await?;
        let entry = cart.plan_add(product_id, variation_id, quantity);
        if entry.quantity > MAX_LINE_QUANTITY { return Err(StorefrontError::InvalidQuantity); }
        self.write(self.entries.upsert(&entry).await)?;

        let line = CartLine::priced(entry, product.name.clone(), variation.map(|v| v.name), product.thumbnail().map(str::to_string), price);
        cart.upsert(line.clone());
        info!(line_id = %line.id(), quantity = line.quantity(), "cart line saved");
        self.publish(&cart);
        self.notifier.notify(&format!("{} added to cart", product.name), Severity::Success, Some(TOAST_MS));
        Ok(line)
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, item_id: Uuid) -> Result<()> {
        let mut cart = self.cart.lock().await;
        if cart.line(item_id).is_none() { return Err(StorefrontError::ItemNotFound); }
        self.write(self.entries.remove(item_id).await)?;
        cart.remove(item_id)?;
        self.publish(&cart);
        self.notifier.notify("Item removed from cart", Severity::Info, Some(TOAST_MS));
        Ok(())
    }

    /// Sets a line's quantity; zero removes the line.
    #[instrument(skip(self))]
    pub async fn update_quantity(&self, item_id: Uuid, quantity: u32) -> Result<()> {
        if quantity > MAX_LINE_QUANTITY { return Err(StorefrontError::InvalidQuantity); }
        let mut cart = self.cart.lock().await;
        let line = cart.line(item_id).ok_or(StorefrontError::ItemNotFound)?;
        if quantity == 0 {
            self.write(self.entries.remove(item_id).await)?;
        } else {
            let entry = CartEntry { quantity, ..line.entry.clone() };
            self.write(self.entries.upsert(&entry).await)?;
        }
        cart.set_quantity(item_id, quantity)?;
        self.publish(&cart);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        let mut cart = self.cart.lock().await;
        self.write(self.entries.clear().await)?;
        cart.clear();
        self.publish(&cart);
        Ok(())
    }

    /// Runs `place` on the current cart and empties the cart once it succeeds.
    ///
    /// The cart lock is held throughout, so lines added meanwhile wait and are
    /// never swept up by the clear. If the stored entries cannot be removed
    /// after `place` succeeded, the local cart is still emptied and the
    /// shopper is warned; the outcome of `place` is returned either way.
    pub(crate) async fn checkout<T, F, Fut>(&self, place: F) -> Result<T>
    where
        F: FnOnce(Cart) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut cart = self.cart.lock().await;
        if cart.is_empty() { return Err(StorefrontError::EmptyCart); }
        let placed = place(cart.clone()).await?;
        if let Err(e) = self.write(self.entries.clear().await) {
            warn!(backend = self.backend(), error = %e, "checked out but stored cart was not cleared");
            self.notifier.notify("Your order was placed but your saved cart could not be emptied", Severity::Warning, Some(5000));
        }
        cart.clear();
        self.publish(&cart);
        Ok(placed)
    }

    fn write(&self, result: StoreResult<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_permission_denied() => {
                warn!(backend = self.backend(), error = %e, "cart write denied, keeping local change");
                self.notifier.notify("Your cart could not be saved to your account", Severity::Warning, Some(5000));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn publish(&self, cart: &Cart) { self.summary.send_replace(cart.summary()); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Product, ProductVariation, VariationType};
    use crate::domain::value_objects::Money;
    use crate::services::testing::{harness, Harness};
    use crate::store::entries::{LocalEntries, RemoteCartEntries};
    use crate::store::local::{KeyValueStore, MemoryKeyValueStore};
    use crate::store::CatalogRepository;
    use rust_decimal_macros::dec;
    use std::sync::atomic::Ordering;

    async fn seeded(h: &Harness, name: &str, price: Money) -> Product {
        let product = Product::create(name, price);
        h.store.insert_product(&product).await.unwrap();
        product
    }

    fn remote_cart(h: &Harness, user_id: Uuid) -> CartService {
        CartService::new(h.ctx.clone(), Arc::new(RemoteCartEntries::new(h.ctx.store.clone(), user_id)))
    }

    #[tokio::test]
    async fn test_add_merges_same_item() {
        let h = harness();
        let mug = seeded(&h, "Mug", Money::new(dec!(12.50))).await;
        let cart = remote_cart(&h, Uuid::now_v7());
        let first = cart.add_item(mug.id, 1, None).await.unwrap();
        let second = cart.add_item(mug.id, 2, None).await.unwrap();
        assert_eq!(first.id(), second.id());

        let snapshot = cart.snapshot().await;
        assert_eq!(snapshot.lines().len(), 1);
        assert_eq!(snapshot.total_item_count(), 3);
        assert_eq!(cart.summary().subtotal, Money::new(dec!(37.50)));
    }

    #[tokio::test]
    async fn test_variations_are_separate_lines() {
        let h = harness();
        let shirt = seeded(&h, "Shirt", Money::new(dec!(20))).await;
        let large = ProductVariation::create(shirt.id, VariationType::Size, "L", Money::new(dec!(2)), 5);
        h.store.insert_variation(&large).await.unwrap();
        let cart = remote_cart(&h, Uuid::now_v7());
        cart.add_item(shirt.id, 1, None).await.unwrap();
        let line = cart.add_item(shirt.id, 1, Some(large.id)).await.unwrap();
        assert_eq!(line.variation_name.as_deref(), Some("L"));
        assert_eq!(cart.summary().line_count, 2);
        assert_eq!(cart.summary().subtotal, Money::new(dec!(42)));
    }

    #[tokio::test]
    async fn test_concurrent_adds_merge() {
        let h = harness();
        let mug = seeded(&h, "Mug", Money::new(dec!(10))).await;
        let cart = Arc::new(remote_cart(&h, Uuid::now_v7()));
        let (a, b) = tokio::join!(cart.add_item(mug.id, 1, None), cart.add_item(mug.id, 1, None));
        a.unwrap();
        b.unwrap();
        let snapshot = cart.snapshot().await;
        assert_eq!(snapshot.lines().len(), 1);
        assert_eq!(snapshot.total_item_count(), 2);
    }

    #[tokio::test]
    async fn test_permission_denied_keeps_local_change() {
        let h = harness();
        let mug = seeded(&h, "Mug", Money::new(dec!(10))).await;
        let cart = remote_cart(&h, Uuid::now_v7());
        h.store.deny_writes.store(true, Ordering::Relaxed);

        cart.add_item(mug.id, 2, None).await.unwrap();
        assert_eq!(cart.summary().item_count, 2);
        assert_eq!(h.notifier.count(Severity::Warning), 1);
    }

    #[tokio::test]
    async fn test_backend_failure_leaves_cart_unchanged() {
        let h = harness();
        let mug = seeded(&h, "Mug", Money::new(dec!(10))).await;
        let cart = remote_cart(&h, Uuid::now_v7());
        let line = cart.add_item(mug.id, 1, None).await.unwrap();
        h.store.fail_writes.store(true, Ordering::Relaxed);

        assert!(matches!(cart.add_item(mug.id, 1, None).await, Err(StorefrontError::Store(_))));
        assert!(cart.update_quantity(line.id(), 5).await.is_err());
        assert!(cart.clear().await.is_err());
        assert_eq!(cart.summary().item_count, 1);
    }

    #[tokio::test]
    async fn test_anonymous_cart_survives_reopen() {
        let h = harness();
        let mug = seeded(&h, "Mug", Money::new(dec!(10))).await;
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let open = || CartService::new(h.ctx.clone(), Arc::new(LocalEntries::<CartEntry>::new(kv.clone(), "cart:device-7")));

        let cart = open();
        cart.add_item(mug.id, 3, None).await.unwrap();
        assert_eq!(cart.backend(), "device");

        let reopened = open();
        reopened.load().await.unwrap();
        assert_eq!(reopened.summary().item_count, 3);
        assert_eq!(h.store.write_calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_update_quantity() {
        let h = harness();
        let mug = seeded(&h, "Mug", Money::new(dec!(4))).await;
        let cart = remote_cart(&h, Uuid::now_v7());
        let mut rx = cart.subscribe();
        let line = cart.add_item(mug.id, 2, None).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().subtotal, Money::new(dec!(8)));

        cart.update_quantity(line.id(), 2).await.unwrap();
        assert_eq!(cart.summary().subtotal, Money::new(dec!(8)));

        cart.update_quantity(line.id(), 0).await.unwrap();
        assert!(cart.snapshot().await.is_empty());
        assert!(matches!(cart.update_quantity(line.id(), 1).await, Err(StorefrontError::ItemNotFound)));
        assert!(matches!(cart.add_item(mug.id, 0, None).await, Err(StorefrontError::InvalidQuantity)));
    }

    #[tokio::test]
    async fn test_quantity_is_bounded() {
        let h = harness();
        let mug = seeded(&h, "Mug", Money::new(dec!(4))).await;
        let cart = remote_cart(&h, Uuid::now_v7());
        assert!(matches!(cart.add_item(mug.id, u32::MAX, None).await, Err(StorefrontError::InvalidQuantity)));

        let line = cart.add_item(mug.id, MAX_LINE_QUANTITY, None).await.unwrap();
        assert!(matches!(cart.add_item(mug.id, 1, None).await, Err(StorefrontError::InvalidQuantity)));
        assert!(matches!(cart.update_quantity(line.id(), MAX_LINE_QUANTITY + 1).await, Err(StorefrontError::InvalidQuantity)));
        assert_eq!(cart.summary().item_count, MAX_LINE_QUANTITY);
    }
}
