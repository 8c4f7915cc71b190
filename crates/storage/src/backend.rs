//! Storage backend trait definition.
//!
//! This module defines the [`KeyValueStore`] trait, the core abstraction for
//! the engine's persisted state. Keys are grouped into *families* — opaque
//! ASCII namespace strings — and every operation addresses a `(family, key)`
//! pair. The key index builds its URL→digest and per-digest subtrees on top
//! of this interface.
//!
//! # Design Philosophy
//!
//! - **Values are bytes**: no assumptions about serialization format
//! - **Async by default**: backends may block on disk or the network
//! - **Soft misses**: a missing key is `Ok(None)`, never an error
//! - **Per-operation atomicity**: a single put/get/delete is atomic; no
//!   cross-operation transactions are promised
//!
//! # Implementing a Backend
//!
//! 1. Implement the [`KeyValueStore`] trait
//! 2. Map backend-specific errors to [`StorageError`](crate::StorageError)
//! 3. Make every write durable before the call returns
//!
//! See [`MemoryStore`](crate::MemoryStore) for a reference implementation.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;

/// Abstract family/key value store.
///
/// Backends are expected to be thread-safe (`Send + Sync`) and support
/// concurrent operations. A write must be observable by any read issued
/// after the write call returns.
///
/// # Example
///
/// ```
/// use stir_shaken_storage::{KeyValueStore, MemoryStore};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store = MemoryStore::new();
///
/// store.put("family", "key", b"value").await.unwrap();
/// let value = store.get("family", "key").await.unwrap();
/// assert_eq!(value.as_deref(), Some(b"value".as_slice()));
/// # });
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Stores a value under `(family, key)`, overwriting any existing value.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn put(&self, family: &str, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Retrieves the value stored under `(family, key)`.
    ///
    /// Returns `Ok(None)` when the key does not exist.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, family: &str, key: &str) -> StorageResult<Option<Bytes>>;

    /// Deletes `(family, key)`. Deleting a missing key is a no-op.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, family: &str, key: &str) -> StorageResult<()>;

    /// Deletes an entire family and every key under it.
    ///
    /// Deleting a missing family is a no-op.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete_family(&self, family: &str) -> StorageResult<()>;

    /// Enumerates all `(key, value)` pairs in a family, in key order.
    ///
    /// Returns an empty vector for a missing family.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn entries(&self, family: &str) -> StorageResult<Vec<(String, Bytes)>>;
}
