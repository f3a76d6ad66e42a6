//! Where cart and wishlist entries live for a session.
//!
//! Authenticated shoppers keep entries in the remote store keyed by user;
//! anonymous shoppers keep a serialized collection in device storage. Both sit
//! behind [`EntryStore`] so the aggregators never ask who is signed in.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

use super::local::KeyValueStore;
use super::{Store, StoreResult};
use crate::domain::aggregates::{CartEntry, WishlistEntry};

pub trait Identified {
    fn id(&self) -> Uuid;
}

impl Identified for CartEntry {
    fn id(&self) -> Uuid { self.id }
}

impl Identified for WishlistEntry {
    fn id(&self) -> Uuid { self.id }
}

#[async_trait]
pub trait EntryStore<E>: Send + Sync {
    fn backend_tag(&self) -> &'static str;
    async fn load(&self) -> StoreResult<Vec<E>>;
    async fn upsert(&self, entry: &E) -> StoreResult<()>;
    async fn remove(&self, id: Uuid) -> StoreResult<()>;
    async fn clear(&self) -> StoreResult<()>;
}

/// Entries serialized as one JSON array under `key`, rewritten on every mutation.
pub struct LocalEntries<E> {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    _entry: PhantomData<fn() -> E>,
}

impl<E> LocalEntries<E> {
    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self { kv, key: key.into(), _entry: PhantomData }
    }
}

impl<E> LocalEntries<E>
where
    E: Serialize + DeserializeOwned + Identified + Clone + Send + Sync,
{
    async fn write(&self, entries: &[E]) -> StoreResult<()> {
        if entries.is_empty() { return self.kv.remove(&self.key).await; }
        self.kv.set(&self.key, serde_json::to_string(entries)?).await
    }
}

#[async_trait]
impl<E> EntryStore<E> for LocalEntries<E>
where
    E: Serialize + DeserializeOwned + Identified + Clone + Send + Sync,
{
    fn backend_tag(&self) -> &'static str { "device" }

    async fn load(&self) -> StoreResult<Vec<E>> {
        match self.kv.get(&self.key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn upsert(&self, entry: &E) -> StoreResult<()> {
        let mut entries = self.load().await?;
        match entries.iter_mut().find(|e| e.id() == entry.id()) {
            Some(existing) => *existing = entry.clone(),
            None => entries.push(entry.clone()),
        }
        self.write(&entries).await
    }

    async fn remove(&self, id: Uuid) -> StoreResult<()> {
        let mut entries = self.load().await?;
        entries.retain(|e| e.id() != id);
        self.write(&entries).await
    }

    async fn clear(&self) -> StoreResult<()> { self.kv.remove(&self.key).await }
}

pub struct RemoteCartEntries {
    repo: Arc<dyn Store>,
    user_id: Uuid,
}

impl RemoteCartEntries {
    pub fn new(repo: Arc<dyn Store>, user_id: Uuid) -> Self { Self { repo, user_id } }
}

#[async_trait]
impl EntryStore<CartEntry> for RemoteCartEntries {
    fn backend_tag(&self) -> &'static str { "remote" }
    async fn load(&self) -> StoreResult<Vec<CartEntry>> { self.repo.cart_entries(self.user_id).await }
    async fn upsert(&self, entry: &CartEntry) -> StoreResult<()> { self.repo.upsert_cart_entry(self.user_id, entry).await }
    async fn remove(&self, id: Uuid) -> StoreResult<()> { self.repo.delete_cart_entry(self.user_id, id).await }
    async fn clear(&self) -> StoreResult<()> { self.repo.clear_cart(self.user_id).await }
}

pub struct RemoteWishlistEntries {
    repo: Arc<dyn Store>,
    user_id: Uuid,
}

impl RemoteWishlistEntries {
    pub fn new(repo: Arc<dyn Store>, user_id: Uuid) -> Self { Self { repo, user_id } }
}

#[async_trait]
impl EntryStore<WishlistEntry> for RemoteWishlistEntries {
    fn backend_tag(&self) -> &'static str { "remote" }
    async fn load(&self) -> StoreResult<Vec<WishlistEntry>> { self.repo.wishlist_entries(self.user_id).await }
    async fn upsert(&self, entry: &WishlistEntry) -> StoreResult<()> { self.repo.upsert_wishlist_entry(self.user_id, entry).await }
    async fn remove(&self, id: Uuid) -> StoreResult<()> { self.repo.delete_wishlist_entry(self.user_id, id).await }
    async fn clear(&self) -> StoreResult<()> { self.repo.clear_wishlist(self.user_id).await }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::local::MemoryKeyValueStore;

    #[tokio::test]
    async fn test_local_entries_persist_collection() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let store: LocalEntries<CartEntry> = LocalEntries::new(kv.clone(), "cart:device-1");
        let mut entry = CartEntry::new(Uuid::now_v7(), None, 1);
        store.upsert(&entry).await.unwrap();
        entry.quantity = 4;
        store.upsert(&entry).await.unwrap();

        let reopened: LocalEntries<CartEntry> = LocalEntries::new(kv.clone(), "cart:device-1");
        let loaded = reopened.load().await.unwrap();
        assert_eq!(loaded, vec![entry.clone()]);

        reopened.remove(entry.id).await.unwrap();
        assert!(kv.get("cart:device-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_device_storage_is_reported() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        kv.set("wishlist:d", "not json".into()).await.unwrap();
        let store: LocalEntries<WishlistEntry> = LocalEntries::new(kv, "wishlist:d");
        assert!(store.load().await.is_err());
    }
}
