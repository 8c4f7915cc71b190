//! Durable on-disk storage backend.
//!
//! [`DiskStore`] keeps the full family/key map in memory and mirrors every
//! write to a JSON snapshot file, so stored entries survive a process
//! restart. Writes are persisted atomically (temp file + rename) before the
//! call returns, which gives the durability the key index relies on: a
//! binding written by one step of an operation is visible to every later
//! read, even across a crash between the two.
//!
//! Values are base64-encoded in the snapshot because JSON cannot carry raw
//! bytes.
//!
//! # Limitations
//!
//! The snapshot is rewritten in full on each mutation. That is the right
//! trade-off for this store's workload (a bounded public-key index, a few
//! short strings per entry), not for bulk data.

use std::{collections::BTreeMap, io::Write, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    backend::KeyValueStore,
    error::{StorageError, StorageResult},
};

type FamilyMap = BTreeMap<String, BTreeMap<String, Bytes>>;

/// Serialized snapshot layout: family → key → base64(value).
#[derive(Default, Serialize, Deserialize)]
struct Snapshot(BTreeMap<String, BTreeMap<String, String>>);

/// Durable family/key store backed by a JSON snapshot file.
///
/// # Cloning
///
/// `DiskStore` is cheaply cloneable via [`Arc`]. All clones share the same
/// in-memory map and snapshot file.
#[derive(Clone, Debug)]
pub struct DiskStore {
    path: Arc<PathBuf>,
    data: Arc<RwLock<FamilyMap>>,
}

impl DiskStore {
    /// Opens a store at `path`, loading the existing snapshot if present.
    ///
    /// A missing snapshot file yields an empty store. Parent directories
    /// are created as needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the snapshot cannot be read and
    /// [`StorageError::Serialization`] if it exists but cannot be decoded.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::io_with_source(format!("create {}", parent.display()), e)
            })?;
        }

        let data = match std::fs::read(&path) {
            Ok(bytes) => decode_snapshot(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FamilyMap::new(),
            Err(e) => {
                return Err(StorageError::io_with_source(format!("read {}", path.display()), e));
            },
        };

        tracing::debug!(path = %path.display(), families = data.len(), "opened disk store");
        Ok(Self { path: Arc::new(path), data: Arc::new(RwLock::new(data)) })
    }

    /// Serializes the current map and atomically replaces the snapshot file.
    ///
    /// Called with the write lock held so snapshots never interleave.
    fn persist(&self, data: &FamilyMap) -> StorageResult<()> {
        let snapshot = Snapshot(
            data.iter()
                .map(|(family, keys)| {
                    let encoded =
                        keys.iter().map(|(k, v)| (k.clone(), STANDARD.encode(v))).collect();
                    (family.clone(), encoded)
                })
                .collect(),
        );

        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| StorageError::serialization_with_source("encode snapshot", e))?;

        let tmp = self.path.with_extension("tmp");
        let mut file = std::fs::File::create(&tmp)
            .map_err(|e| StorageError::io_with_source(format!("create {}", tmp.display()), e))?;
        file.write_all(&bytes)
            .map_err(|e| StorageError::io_with_source(format!("write {}", tmp.display()), e))?;
        file.sync_all()
            .map_err(|e| StorageError::io_with_source(format!("sync {}", tmp.display()), e))?;
        std::fs::rename(&tmp, self.path.as_ref()).map_err(|e| {
            StorageError::io_with_source(format!("rename into {}", self.path.display()), e)
        })?;

        Ok(())
    }
}

fn decode_snapshot(bytes: &[u8]) -> StorageResult<FamilyMap> {
    let snapshot: Snapshot = serde_json::from_slice(bytes)
        .map_err(|e| StorageError::serialization_with_source("decode snapshot", e))?;

    let mut data = FamilyMap::new();
    for (family, keys) in snapshot.0 {
        let mut decoded = BTreeMap::new();
        for (key, value) in keys {
            let raw = STANDARD.decode(&value).map_err(|e| {
                StorageError::serialization_with_source(
                    format!("decode value for '{family}/{key}'"),
                    e,
                )
            })?;
            decoded.insert(key, Bytes::from(raw));
        }
        data.insert(family, decoded);
    }
    Ok(data)
}

#[async_trait]
impl KeyValueStore for DiskStore {
    async fn put(&self, family: &str, key: &str, value: &[u8]) -> StorageResult<()> {
        let mut data = self.data.write();
        data.entry(family.to_string())
            .or_default()
            .insert(key.to_string(), Bytes::copy_from_slice(value));
        self.persist(&data)
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
            return self.persist(&data);
        }
        Ok(())
    }

    async fn delete_family(&self, family: &str) -> StorageResult<()> {
        let mut data = self.data.write();
        if data.remove(family).is_some() {
            return self.persist(&data);
        }
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
