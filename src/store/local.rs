//! Device storage: a string-keyed key/value store for anonymous shoppers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::{StoreError, StoreResult};

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;
    async fn set(&self, key: &str, value: String) -> StoreResult<()>;
    async fn remove(&self, key: &str) -> StoreResult<()>;
}

#[derive(Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> { Ok(self.values.lock().await.get(key).cloned()) }

    async fn set(&self, key: &str, value: String) -> StoreResult<()> {
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.values.lock().await.remove(key);
        Ok(())
    }
}

/// One file per key under a root directory.
pub struct FileKeyValueStore {
    root: PathBuf,
}

impl FileKeyValueStore {
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| StoreError::Backend(format!("create {}: {e}", root.display())))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path { &self.root }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')) || key.starts_with('.') {
            return Err(StoreError::Corrupt(format!("invalid storage key `{key}`")));
        }
        Ok(self.root.join(format!("{}.json", key.replace(':', "__"))))
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)?).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Backend(format!("read {key}: {e}"))),
        }
    }

    async fn set(&self, key: &str, value: String) -> StoreResult<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await.map_err(|e| StoreError::Backend(format!("write {key}: {e}")))?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| StoreError::Backend(format!("write {key}: {e}")))
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        match tokio::fs::remove_file(self.path_for(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Backend(format!("remove {key}: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempdir().unwrap();
        let kv = FileKeyValueStore::open(dir.path().join("device")).await.unwrap();
        assert_eq!(kv.get("cart:abc").await.unwrap(), None);
        kv.set("cart:abc", "[1,2]".into()).await.unwrap();
        assert_eq!(kv.get("cart:abc").await.unwrap().as_deref(), Some("[1,2]"));
        kv.remove("cart:abc").await.unwrap();
        kv.remove("cart:abc").await.unwrap();
        assert_eq!(kv.get("cart:abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_rejects_traversal() {
        let dir = tempdir().unwrap();
        let kv = FileKeyValueStore::open(dir.path()).await.unwrap();
        assert!(kv.set("../escape", "x".into()).await.is_err());
        assert!(kv.get("a/b").await.is_err());
    }
}
