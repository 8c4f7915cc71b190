//! Persistent public-key index.
//!
//! [`KeyIndex`] binds each public-key URL to its downloaded file path and
//! expiration, layered over a [`KeyValueStore`] so the bindings survive a
//! restart. Two logical families are used:
//!
//! - the reverse family `STIR_SHAKEN` maps `url → digest`, making known
//!   URLs enumerable without scanning every digest subtree;
//! - one family per digest (the family name is the digest itself) holds the
//!   sub-keys `path`, `expiration`, and `last_used`.
//!
//! Reads are soft — a missing or unreadable binding is reported as an empty
//! path or a zero expiration, never an error. Writes are fire-and-forget
//! from the caller's perspective: a storage failure is logged and the
//! operation continues, at worst costing a re-fetch on the next request.

use std::{path::Path, sync::Arc};

use stir_shaken_storage::KeyValueStore;

use crate::digest::url_digest;

/// Family holding the `url → digest` reverse mapping.
pub const REVERSE_FAMILY: &str = "STIR_SHAKEN";

const PATH_KEY: &str = "path";
const EXPIRATION_KEY: &str = "expiration";
const LAST_USED_KEY: &str = "last_used";

/// URL → {path, expiration} bindings over a persistent store.
///
/// # Cloning
///
/// `KeyIndex` is cheaply cloneable; clones share the same backing store.
#[derive(Clone)]
pub struct KeyIndex {
    store: Arc<dyn KeyValueStore>,
}

impl KeyIndex {
    /// Creates an index over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Records the downloaded file path for `url` and the reverse mapping.
    ///
    /// Does not touch the expiration; stamp it separately with
    /// [`set_expiration`](Self::set_expiration).
    pub async fn put(&self, url: &str, path: &Path) {
        let digest = url_digest(url);
        let path_bytes = path.to_string_lossy();

        if let Err(e) = self.store.put(&digest, PATH_KEY, path_bytes.as_bytes()).await {
            tracing::warn!(url, error = %e, "failed to record public key path");
        }
        if let Err(e) = self.store.put(REVERSE_FAMILY, url, digest.as_bytes()).await {
            tracing::warn!(url, error = %e, "failed to record reverse URL mapping");
        }
        self.touch(url).await;
    }

    /// Returns the recorded file path for `url`, or the empty string when
    /// the index has no binding. Never fails.
    ///
    /// A successful lookup refreshes the entry's `last_used` stamp.
    pub async fn get_path(&self, url: &str) -> String {
        let digest = url_digest(url);

        let path = match self.store.get(&digest, PATH_KEY).await {
            Ok(Some(bytes)) => String::from_utf8(bytes.to_vec()).unwrap_or_default(),
            Ok(None) => String::new(),
            Err(e) => {
                tracing::warn!(url, error = %e, "public key path read failed, treating as miss");
                String::new()
            },
        };

        if !path.is_empty() {
            self.touch(url).await;
        }
        path
    }

    /// Stamps the absolute expiration (epoch seconds) for `url`.
    pub async fn set_expiration(&self, url: &str, abs_seconds: i64) {
        let digest = url_digest(url);
        let value = abs_seconds.to_string();

        if let Err(e) = self.store.put(&digest, EXPIRATION_KEY, value.as_bytes()).await {
            tracing::warn!(url, error = %e, "failed to record public key expiration");
        }
    }

    /// Returns the recorded expiration for `url` in epoch seconds.
    ///
    /// Returns 0 when the binding is absent or unparseable, which callers
    /// treat as "expired, re-fetch".
    pub async fn get_expiration(&self, url: &str) -> i64 {
        let digest = url_digest(url);

        match self.store.get(&digest, EXPIRATION_KEY).await {
            Ok(Some(bytes)) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(url, error = %e, "expiration read failed, treating as expired");
                0
            },
        }
    }

    /// Removes every binding for `url` and unlinks its key file.
    ///
    /// The unlink is best-effort; a missing file is not an error.
    pub async fn remove(&self, url: &str) {
        let digest = url_digest(url);

        if let Ok(Some(bytes)) = self.store.get(&digest, PATH_KEY).await
            && let Ok(path) = String::from_utf8(bytes.to_vec())
            && !path.is_empty()
            && let Err(e) = tokio::fs::remove_file(&path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(url, path, error = %e, "failed to unlink cached public key file");
        }

        if let Err(e) = self.store.delete(REVERSE_FAMILY, url).await {
            tracing::warn!(url, error = %e, "failed to delete reverse URL mapping");
        }
        if let Err(e) = self.store.delete_family(&digest).await {
            tracing::warn!(url, error = %e, "failed to delete public key subtree");
        }
    }

    /// Returns all URLs currently known to the index.
    pub async fn urls(&self) -> Vec<String> {
        match self.store.entries(REVERSE_FAMILY).await {
            Ok(entries) => entries.into_iter().map(|(url, _)| url).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to enumerate known URLs");
                Vec::new()
            },
        }
    }

    /// Returns the number of URLs currently known to the index.
    pub async fn len(&self) -> usize {
        self.urls().await.len()
    }

    /// Returns `true` when the index holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns the least-recently-used URL, skipping `exclude`.
    ///
    /// Entries with no `last_used` stamp sort oldest. Ties break on URL
    /// order so eviction is deterministic.
    pub async fn least_recently_used(&self, exclude: &str) -> Option<String> {
        let mut oldest: Option<(i64, String)> = None;

        for url in self.urls().await {
            if url == exclude {
                continue;
            }
            let stamp = self.last_used(&url).await;
            let candidate = (stamp, url);
            if oldest.as_ref().is_none_or(|current| candidate < *current) {
                oldest = Some(candidate);
            }
        }

        oldest.map(|(_, url)| url)
    }

    /// Refreshes the `last_used` stamp for `url`.
    async fn touch(&self, url: &str) {
        let digest = url_digest(url);
        let now = chrono::Utc::now().timestamp().to_string();

        if let Err(e) = self.store.put(&digest, LAST_USED_KEY, now.as_bytes()).await {
            tracing::warn!(url, error = %e, "failed to stamp last_used");
        }
    }

    async fn last_used(&self, url: &str) -> i64 {
        let digest = url_digest(url);

        match self.store.get(&digest, LAST_USED_KEY).await {
            Ok(Some(bytes)) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .unwrap_or(0),
            _ => 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use stir_shaken_storage::MemoryStore;

    use super::*;

    fn index() -> (KeyIndex, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (KeyIndex::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_put_then_get_path() {
        let (index, _) = index();
        let url = "https://ex.test/keys/abc.pub";

        index.put(url, Path::new("/data/keys/stir_shaken/abc.pub")).await;

        assert_eq!(index.get_path(url).await, "/data/keys/stir_shaken/abc.pub");
    }

    #[tokio::test]
    async fn test_get_path_missing_is_empty() {
        let (index, _) = index();
        assert_eq!(index.get_path("https://ex.test/none.pub").await, "");
    }

    #[tokio::test]
    async fn test_put_records_reverse_mapping() {
        let (index, store) = index();
        let url = "https://ex.test/keys/abc.pub";

        index.put(url, Path::new("/data/abc.pub")).await;

        let digest = store.get(REVERSE_FAMILY, url).await.unwrap().expect("reverse entry");
        assert_eq!(digest.as_ref(), url_digest(url).as_bytes());
        assert_eq!(index.urls().await, vec![url.to_string()]);
    }

    #[tokio::test]
    async fn test_expiration_round_trip() {
        let (index, _) = index();
        let url = "https://ex.test/keys/abc.pub";

        assert_eq!(index.get_expiration(url).await, 0);
        index.set_expiration(url, 1_900_000_000).await;
        assert_eq!(index.get_expiration(url).await, 1_900_000_000);
    }

    #[tokio::test]
    async fn test_unparseable_expiration_is_zero() {
        let (index, store) = index();
        let url = "https://ex.test/keys/abc.pub";

        store.put(&url_digest(url), "expiration", b"not-a-number").await.unwrap();

        assert_eq!(index.get_expiration(url).await, 0);
    }

    #[tokio::test]
    async fn test_remove_unlinks_file_and_drops_bindings() {
        let (index, store) = index();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("abc.pub");
        std::fs::write(&file, b"key material").unwrap();

        let url = "https://ex.test/keys/abc.pub";
        index.put(url, &file).await;
        index.set_expiration(url, 1_900_000_000).await;

        index.remove(url).await;

        assert!(!file.exists(), "remove must unlink the key file");
        assert_eq!(index.get_path(url).await, "");
        assert_eq!(index.get_expiration(url).await, 0);
        assert!(store.get(REVERSE_FAMILY, url).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_with_missing_file_is_not_an_error() {
        let (index, _) = index();
        let url = "https://ex.test/keys/gone.pub";

        index.put(url, Path::new("/nonexistent/dir/gone.pub")).await;
        index.remove(url).await;

        assert_eq!(index.get_path(url).await, "");
    }

    #[tokio::test]
    async fn test_remove_unknown_url_is_noop() {
        let (index, _) = index();
        index.remove("https://ex.test/never-seen.pub").await;
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn test_least_recently_used_prefers_unstamped_then_oldest() {
        let (index, store) = index();

        index.put("https://ex.test/a.pub", Path::new("/data/a.pub")).await;
        index.put("https://ex.test/b.pub", Path::new("/data/b.pub")).await;
        index.put("https://ex.test/c.pub", Path::new("/data/c.pub")).await;

        // Force distinct stamps without sleeping.
        store.put(&url_digest("https://ex.test/a.pub"), "last_used", b"100").await.unwrap();
        store.put(&url_digest("https://ex.test/b.pub"), "last_used", b"50").await.unwrap();
        store.put(&url_digest("https://ex.test/c.pub"), "last_used", b"200").await.unwrap();

        assert_eq!(
            index.least_recently_used("").await.as_deref(),
            Some("https://ex.test/b.pub"),
        );
        assert_eq!(
            index.least_recently_used("https://ex.test/b.pub").await.as_deref(),
            Some("https://ex.test/a.pub"),
        );
    }
}
