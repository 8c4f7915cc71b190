//! In-memory storage backend implementation.
//!
//! This module provides [`MemoryStore`], an in-memory implementation of
//! [`KeyValueStore`] suitable for testing and for embeddings that do not
//! need persistence across restarts.
//!
//! # Features
//!
//! - **Thread-safe**: uses [`parking_lot::RwLock`] for concurrent access
//! - **Ordered storage**: families and keys live in [`BTreeMap`]s, so
//!   enumeration is deterministic
//!
//! # Limitations
//!
//! Data is not persisted; all entries are lost when the process exits. Use
//! [`DiskStore`](crate::DiskStore) where state must survive a restart.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::{backend::KeyValueStore, error::StorageResult};

type FamilyMap = BTreeMap<String, BTreeMap<String, Bytes>>;

/// In-memory family/key store backed by nested [`BTreeMap`]s.
///
/// # Cloning
///
/// `MemoryStore` is cheaply cloneable via [`Arc`]. All clones share the
/// same underlying data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<FamilyMap>>,
}

impl MemoryStore {
    /// Creates a new, empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self { data: Arc::new(RwLock::new(BTreeMap::new())) }
    }

    /// Returns the number of keys currently stored in `family`.
    #[must_use]
    pub fn family_len(&self, family: &str) -> usize {
        self.data.read().get(family).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn put(&self, family: &str, key: &str, value: &[u8]) -> StorageResult<()> {
        let mut data = self.data.write();
        data.entry(family.to_string())
            .or_default()
            .insert(key.to_string(), Bytes::copy_from_slice(value));
        Ok(())
    }

    async fn get(&self, family: &str, key: &str) -> StorageResult<Option<Bytes>> {
        let data = self.data.read();
        Ok(data.get(family).and_then(|keys| keys.get(key).cloned()))
    }

    async fn delete(&self, family: &str, key: &str) -> StorageResult<()> {
        let mut data = self.data.write();
        if let Some(keys) = data.get_mut(family) {
            keys.remove(key);
            if keys.is_empty() {
                data.remove(family);
            }
        }
        Ok(())
    }

    async fn delete_family(&self, family: &str) -> StorageResult<()> {
        self.data.write().remove(family);
        Ok(())
    }

    async fn entries(&self, family: &str) -> StorageResult<Vec<(String, Bytes)>> {
        let data = self.data.read();
        Ok(data
            .get(family)
            .map(|keys| keys.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = MemoryStore::new();
        store.put("fam", "key", b"value").await.unwrap();

        let value = store.get("fam", "key").await.unwrap();
        assert_eq!(value.as_deref(), Some(b"value".as_slice()));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = MemoryStore::new();
        assert!(store.get("fam", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clones_share_data() {
        let store = MemoryStore::new();
        let clone = store.clone();

        store.put("fam", "key", b"value").await.unwrap();
        assert!(clone.get("fam", "key").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_family_drops_all_keys() {
        let store = MemoryStore::new();
        store.put("fam", "a", b"1").await.unwrap();
        store.put("fam", "b", b"2").await.unwrap();
        store.put("other", "c", b"3").await.unwrap();

        store.delete_family("fam").await.unwrap();

        assert!(store.get("fam", "a").await.unwrap().is_none());
        assert!(store.get("fam", "b").await.unwrap().is_none());
        assert!(store.get("other", "c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_entries_ordered_by_key() {
        let store = MemoryStore::new();
        store.put("fam", "b", b"2").await.unwrap();
        store.put("fam", "a", b"1").await.unwrap();

        let entries = store.entries("fam").await.unwrap();
        let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
