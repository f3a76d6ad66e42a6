//! Per-session wishlist, stored the same way as the cart.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::cart::CartService;
use super::catalog::CatalogService;
use super::Context;
use crate::domain::aggregates::{CartLine, Wishlist, WishlistEntry, WishlistLine};
use crate::notify::{Notifier, Severity};
use crate::store::entries::EntryStore;
use crate::store::StoreResult;
use crate::{Result, StorefrontError};

/// Wishlist for one session. Same storage rules as the cart.
pub struct WishlistService {
    catalog: CatalogService,
    notifier: Arc<dyn Notifier>,
    entries: Arc<dyn EntryStore<WishlistEntry>>,
    wishlist: Mutex<Wishlist>,
}

impl WishlistService {
    pub fn new(ctx: Context, entries: Arc<dyn EntryStore<WishlistEntry>>) -> Self {
        Self {
            catalog: CatalogService::new(ctx.clone()),
            notifier: ctx.notifier,
            entries,
            wishlist: Mutex::new(Wishlist::default()),
        }
    }

    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<()> {
        let mut wishlist = self.wishlist.lock().await;
        let lines = self.catalog.enrich_wishlist(self.entries.load().await?).await?;
        *wishlist = Wishlist::from_lines(lines);
        Ok(())
    }

    pub async fn snapshot(&self) -> Wishlist { self.wishlist.lock().await.clone() }

    pub async fn contains(&self, product_id: Uuid) -> bool { self.wishlist.lock().await.contains(product_id) }

    /// Adding a product already on the list returns the existing line.
    #[instrument(skip(self))]
    pub async fn add(&self, product_id: Uuid) -> Result<WishlistLine> {
        let mut wishlist = self.wishlist.lock().await;
        if let Some(line) = wishlist.lines().iter().find(|l| l.entry.product_id == product_id) {
            return Ok(line.clone());
        }
        let (product, _, price) = self.catalog.price_item(product_id, None).await?;
        let entry = WishlistEntry::new(product_id);
        self.write(self.entries.upsert(&entry).await)?;
        let line = WishlistLine { entry, product_name: product.name, image: product.images.into_iter().next(), price };
        wishlist.push(line.clone());
        self.notifier.notify(&format!("{} saved to wishlist", line.product_name), Severity::Success, Some(3000));
        Ok(line)
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, item_id: Uuid) -> Result<()> {
        let mut wishlist = self.wishlist.lock().await;
        if wishlist.line(item_id).is_none() { return Err(StorefrontError::ItemNotFound); }
        self.write(self.entries.remove(item_id).await)?;
        wishlist.remove(item_id)?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        let mut wishlist = self.wishlist.lock().await;
        self.write(self.entries.clear().await)?;
        wishlist.clear();
        Ok(())
    }

    /// Drops the item from the wishlist and adds one of it to the cart. If the
    /// cart add fails the stored wishlist entry is put back, so the item ends
    /// up in exactly one of the two.
    #[instrument(skip(self, cart))]
    pub async fn move_to_cart(&self, item_id: Uuid, cart: &CartService) -> Result<CartLine> {
        let mut wishlist = self.wishlist.lock().await;
        let entry = wishlist.line(item_id).map(|l| l.entry.clone()).ok_or(StorefrontError::ItemNotFound)?;
        self.write(self.entries.remove(item_id).await)?;
        match cart.add_item(entry.product_id, 1, None).await {
            Ok(line) => {
                wishlist.remove(item_id)?;
                Ok(line)
            }
            Err(e) => {
                if let Err(restore) = self.entries.upsert(&entry).await {
                    warn!(item_id = %item_id, error = %restore, "could not restore wishlist entry after failed move");
                }
                Err(e)
            }
        }
    }

    fn write(&self, result: StoreResult<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_permission_denied() => {
                warn!(backend = self.entries.backend_tag(), error = %e, "wishlist write denied, keeping local change");
                self.notifier.notify("Your wishlist could not be saved to your account", Severity::Warning, Some(5000));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Product, MAX_LINE_QUANTITY};
    use crate::domain::value_objects::Money;
    use crate::services::testing::harness;
    use crate::store::entries::{RemoteCartEntries, RemoteWishlistEntries};
    use crate::store::{CatalogRepository, WishlistRepository};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_add_is_idempotent_and_move_to_cart() {
        let h = harness();
        let user = Uuid::now_v7();
        let lamp = Product::create("Lamp", Money::new(dec!(30)));
        h.store.insert_product(&lamp).await.unwrap();
        let wishlist = WishlistService::new(h.ctx.clone(), Arc::new(RemoteWishlistEntries::new(h.ctx.store.clone(), user)));
        let cart = CartService::new(h.ctx.clone(), Arc::new(RemoteCartEntries::new(h.ctx.store.clone(), user)));

        let first = wishlist.add(lamp.id).await.unwrap();
        let again = wishlist.add(lamp.id).await.unwrap();
        assert_eq!(first.id(), again.id());
        assert_eq!(h.store.wishlist_entries(user).await.unwrap().len(), 1);
        assert!(wishlist.contains(lamp.id).await);

        let line = wishlist.move_to_cart(first.id(), &cart).await.unwrap();
        assert_eq!(line.quantity(), 1);
        assert!(!wishlist.contains(lamp.id).await);
        assert!(h.store.wishlist_entries(user).await.unwrap().is_empty());
        assert_eq!(cart.summary().subtotal, Money::new(dec!(30)));
    }

    #[tokio::test]
    async fn test_failed_move_keeps_wishlist_entry() {
        let h = harness();
        let user = Uuid::now_v7();
        let lamp = Product::create("Lamp", Money::new(dec!(30)));
        h.store.insert_product(&lamp).await.unwrap();
        let wishlist = WishlistService::new(h.ctx.clone(), Arc::new(RemoteWishlistEntries::new(h.ctx.store.clone(), user)));
        let cart = CartService::new(h.ctx.clone(), Arc::new(RemoteCartEntries::new(h.ctx.store.clone(), user)));
        let line = wishlist.add(lamp.id).await.unwrap();
        cart.add_item(lamp.id, MAX_LINE_QUANTITY, None).await.unwrap();

        let moved = wishlist.move_to_cart(line.id(), &cart).await;
        assert!(matches!(moved, Err(StorefrontError::InvalidQuantity)));
        assert!(wishlist.contains(lamp.id).await);
        assert_eq!(h.store.wishlist_entries(user).await.unwrap().len(), 1);
        assert_eq!(cart.snapshot().await.total_item_count(), MAX_LINE_QUANTITY);
    }

    #[tokio::test]
    async fn test_remove_unknown_item() {
        let h = harness();
        let wishlist = WishlistService::new(h.ctx.clone(), Arc::new(RemoteWishlistEntries::new(h.ctx.store.clone(), Uuid::now_v7())));
        assert!(matches!(wishlist.remove(Uuid::now_v7()).await, Err(StorefrontError::ItemNotFound)));
    }
}
