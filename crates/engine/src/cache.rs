//! Public-key cache manager.
//!
//! [`KeyCache`] composes the URL digest, the persistent index, and the
//! fetcher into one contract: *give me a valid local key file for this
//! URL*. A call walks a small state machine — cold miss, freshness check,
//! parse check — and an explicit `already_fetched` flag bounds the whole
//! operation to **at most one network fetch**. A second fetch need is an
//! error, not a retry.
//!
//! # Freshness
//!
//! Expiration is stamped from the fetch response: `Cache-Control`
//! `s-maxage` (preferred) or `max-age` wins over `Expires`; with neither
//! header the entry expires at the fetch timestamp itself, forcing a
//! re-fetch on the next request without failing the current one. An entry
//! is considered expired once the wall clock has moved past its stamp, so
//! a key stamped "now" stays usable for the remainder of the current
//! second only.
//!
//! # Concurrency
//!
//! No cross-operation locking. Two concurrent calls for the same cold URL
//! may both fetch; the second writer wins and neither observes the other's
//! partial state.

use std::{path::PathBuf, sync::Arc};

use crate::{
    crypto::read_public_key,
    error::{EngineError, Result},
    fetch::{FetchMetadata, KeyFetcher},
    index::KeyIndex,
};

/// Directory under `<data_dir>/keys/` that downloaded keys are stored in.
pub const KEY_DIR_NAME: &str = "stir_shaken";

/// Resolves public-key URLs to fresh, parseable local key files.
pub struct KeyCache {
    index: KeyIndex,
    fetcher: Arc<dyn KeyFetcher>,
    data_dir: PathBuf,
    cache_max_size: usize,
}

impl KeyCache {
    /// Creates a cache over the given index and fetcher.
    ///
    /// `cache_max_size` bounds the number of indexed keys; 0 disables the
    /// bound.
    #[must_use]
    pub fn new(
        index: KeyIndex,
        fetcher: Arc<dyn KeyFetcher>,
        data_dir: PathBuf,
        cache_max_size: usize,
    ) -> Self {
        Self { index, fetcher, data_dir, cache_max_size }
    }

    /// Returns the underlying index, for admin inspection.
    #[must_use]
    pub fn index(&self) -> &KeyIndex {
        &self.index
    }

    /// Returns the path to a fresh, parseable local copy of the public key
    /// at `url`, downloading it if needed.
    ///
    /// At most one network fetch is performed per call. Stale or corrupt
    /// local state is recovered by that single fetch; if the recovered copy
    /// is still stale or unparseable the entry is evicted and the call
    /// fails.
    ///
    /// # Errors
    ///
    /// - [`EngineError::FetchFailed`] — the key could not be downloaded
    /// - [`EngineError::Expired`] — the entry is stale and the re-fetch did
    ///   not produce a fresh one
    /// - [`EngineError::KeyUnreadable`] — the file does not parse as a
    ///   public key, even after a re-fetch
    pub async fn get_local_key_path(&self, url: &str) -> Result<PathBuf> {
        let now = chrono::Utc::now().timestamp();
        let mut already_fetched = false;

        let mut path = PathBuf::from(self.index.get_path(url).await);

        // Cold miss: no recorded path for this URL.
        if path.as_os_str().is_empty() {
            tracing::debug!(url, "no cached public key, downloading");

            // Drop any orphaned subtree left behind by a partial earlier run.
            self.index.remove(url).await;

            path = self.default_key_path(url);
            let meta = self.fetcher.fetch(url, &path).await?;
            self.index.put(url, &path).await;
            self.stamp_expiration(url, &meta).await;
            already_fetched = true;
            self.enforce_capacity(url).await;
        }

        // Freshness check.
        if self.is_expired(url, now).await {
            tracing::debug!(url, "cached public key is expired");
            self.index.remove(url).await;

            if already_fetched {
                return Err(EngineError::expired(url));
            }

            let meta = self.fetcher.fetch(url, &path).await?;
            self.stamp_expiration(url, &meta).await;
            if self.is_expired(url, now).await {
                tracing::warn!(url, "newly downloaded public key is already expired");
                return Err(EngineError::expired(url));
            }
            self.index.put(url, &path).await;
            already_fetched = true;
            self.enforce_capacity(url).await;
        }

        // Parse check, with one recovery fetch.
        if let Err(first_err) = read_public_key(&path) {
            tracing::debug!(url, path = %path.display(), "first read of public key failed");
            self.index.remove(url).await;

            if already_fetched {
                return Err(first_err);
            }

            let meta = self.fetcher.fetch(url, &path).await?;
            self.stamp_expiration(url, &meta).await;
            self.index.put(url, &path).await;
            self.enforce_capacity(url).await;

            if let Err(second_err) = read_public_key(&path) {
                tracing::warn!(url, path = %path.display(), "re-downloaded public key is unreadable");
                self.index.remove(url).await;
                return Err(second_err);
            }
        }

        Ok(path)
    }

    /// Default download target: `<data_dir>/keys/stir_shaken/<basename(url)>`.
    ///
    /// Falls back to the URL digest when the URL has no usable basename.
    fn default_key_path(&self, url: &str) -> PathBuf {
        let basename = url.rsplit('/').next().filter(|name| !name.is_empty());
        let file_name = match basename {
            Some(name) => name.to_string(),
            None => crate::digest::url_digest(url),
        };

        self.data_dir.join("keys").join(KEY_DIR_NAME).join(file_name)
    }

    async fn is_expired(&self, url: &str, now: i64) -> bool {
        let expiration = self.index.get_expiration(url).await;
        expiration == 0 || expiration < now
    }

    /// Folds fetch metadata into an absolute expiration stamp.
    ///
    /// `Cache-Control` takes precedence over `Expires` when present, even
    /// if no max-age directive can be parsed out of it.
    async fn stamp_expiration(&self, url: &str, meta: &FetchMetadata) {
        let now = chrono::Utc::now().timestamp();

        let expiration = match (&meta.cache_control, &meta.expires) {
            (Some(cache_control), _) if !cache_control.is_empty() => {
                parse_max_age(cache_control).map_or(now, |max_age| now.saturating_add(max_age))
            },
            (_, Some(expires)) if !expires.is_empty() => {
                chrono::DateTime::parse_from_rfc2822(expires)
                    .map_or(now, |parsed| parsed.timestamp())
            },
            _ => now,
        };

        self.index.set_expiration(url, expiration).await;
    }

    /// Evicts least-recently-used entries until the index is within the
    /// configured bound. The entry for `current_url` is never evicted.
    async fn enforce_capacity(&self, current_url: &str) {
        if self.cache_max_size == 0 {
            return;
        }

        while self.index.len().await > self.cache_max_size {
            match self.index.least_recently_used(current_url).await {
                Some(victim) => {
                    tracing::debug!(url = %victim, "evicting least-recently-used public key");
                    self.index.remove(&victim).await;
                },
                None => break,
            }
        }
    }
}

/// Extracts the max-age seconds from a `Cache-Control` value.
///
/// `s-maxage` is preferred over `max-age`; the first run of digits after
/// the directive's `=` is taken.
fn parse_max_age(cache_control: &str) -> Option<i64> {
    let directive = cache_control
        .find("s-maxage")
        .or_else(|| cache_control.find("max-age"))
        .map(|at| &cache_control[at..])?;

    let value = directive.split_once('=')?.1.trim_start();
    let digits: String = value.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use stir_shaken_storage::MemoryStore;

    use super::*;
    use crate::testutil::{ScriptedFetcher, generate_keypair, public_key_pem};

    const URL: &str = "https://ex.test/keys/abc.pub";

    fn cache_over(
        fetcher: Arc<ScriptedFetcher>,
        dir: &tempfile::TempDir,
        max_size: usize,
    ) -> KeyCache {
        let index = KeyIndex::new(Arc::new(MemoryStore::new()));
        KeyCache::new(index, fetcher, dir.path().to_path_buf(), max_size)
    }

    fn pem_fixture() -> String {
        let (_, verifying) = generate_keypair();
        public_key_pem(&verifying)
    }

    #[test]
    fn test_parse_max_age_variants() {
        assert_eq!(parse_max_age("max-age=300"), Some(300));
        assert_eq!(parse_max_age("public, max-age=300, must-revalidate"), Some(300));
        assert_eq!(parse_max_age("s-maxage=600, max-age=60"), Some(600));
        assert_eq!(parse_max_age("max-age=60, s-maxage=600"), Some(600));
        assert_eq!(parse_max_age("no-store"), None);
        assert_eq!(parse_max_age("max-age=abc"), None);
    }

    #[tokio::test]
    async fn test_cold_miss_downloads_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push_body(pem_fixture().as_bytes(), Some("max-age=300"), None);
        let cache = cache_over(fetcher.clone(), &dir, 0);

        let path = cache.get_local_key_path(URL).await.unwrap();

        assert_eq!(path, dir.path().join("keys").join(KEY_DIR_NAME).join("abc.pub"));
        assert!(path.exists());
        assert_eq!(fetcher.fetch_count(), 1);
        assert_eq!(cache.index().get_path(URL).await, path.to_string_lossy());

        let now = chrono::Utc::now().timestamp();
        let expiration = cache.index().get_expiration(URL).await;
        assert!(expiration > now + 200, "expiration must reflect max-age");
    }

    #[tokio::test]
    async fn test_warm_hit_does_not_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push_body(pem_fixture().as_bytes(), Some("max-age=300"), None);
        let cache = cache_over(fetcher.clone(), &dir, 0);

        cache.get_local_key_path(URL).await.unwrap();
        cache.get_local_key_path(URL).await.unwrap();

        assert_eq!(fetcher.fetch_count(), 1, "warm hit must not re-fetch");
    }

    #[tokio::test]
    async fn test_no_freshness_headers_stamp_now_and_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push_body(pem_fixture().as_bytes(), None, None);
        let cache = cache_over(fetcher.clone(), &dir, 0);

        let before = chrono::Utc::now().timestamp();
        cache.get_local_key_path(URL).await.unwrap();
        let after = chrono::Utc::now().timestamp();

        let expiration = cache.index().get_expiration(URL).await;
        assert!(expiration >= before && expiration <= after + 1);
    }

    #[tokio::test]
    async fn test_s_maxage_preferred_over_max_age() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push_body(pem_fixture().as_bytes(), Some("s-maxage=600, max-age=60"), None);
        let cache = cache_over(fetcher.clone(), &dir, 0);

        cache.get_local_key_path(URL).await.unwrap();

        let now = chrono::Utc::now().timestamp();
        let expiration = cache.index().get_expiration(URL).await;
        assert!(expiration > now + 500, "s-maxage must win over max-age");
    }

    #[tokio::test]
    async fn test_expires_header_used_without_cache_control() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push_body(
            pem_fixture().as_bytes(),
            None,
            Some("Mon, 01 Jan 2120 00:00:00 GMT"),
        );
        let cache = cache_over(fetcher.clone(), &dir, 0);

        cache.get_local_key_path(URL).await.unwrap();

        let now = chrono::Utc::now().timestamp();
        let expiration = cache.index().get_expiration(URL).await;
        assert!(expiration > now + 1_000_000, "far-future Expires must be honored");
    }

    #[tokio::test]
    async fn test_expired_entry_refetches_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new());
        let pem = pem_fixture();
        fetcher.push_body(pem.as_bytes(), Some("max-age=300"), None);
        fetcher.push_body(pem.as_bytes(), Some("max-age=300"), None);
        let cache = cache_over(fetcher.clone(), &dir, 0);

        cache.get_local_key_path(URL).await.unwrap();
        cache.index().set_expiration(URL, 1_000).await;

        cache.get_local_key_path(URL).await.unwrap();

        assert_eq!(fetcher.fetch_count(), 2, "stale entry must trigger exactly one re-fetch");
    }

    #[tokio::test]
    async fn test_refetched_key_still_expired_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new());
        let pem = pem_fixture();
        fetcher.push_body(pem.as_bytes(), Some("max-age=300"), None);
        // The re-fetch serves an Expires stamp firmly in the past.
        fetcher.push_body(pem.as_bytes(), None, Some("Mon, 01 Jan 2001 00:00:00 GMT"));
        let cache = cache_over(fetcher.clone(), &dir, 0);

        cache.get_local_key_path(URL).await.unwrap();
        cache.index().set_expiration(URL, 1_000).await;

        let err = cache.get_local_key_path(URL).await.unwrap_err();
        assert!(matches!(err, EngineError::Expired { .. }));
        assert_eq!(fetcher.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_local_file_recovered_by_refetch() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new());
        let pem = pem_fixture();
        fetcher.push_body(pem.as_bytes(), Some("max-age=300"), None);
        fetcher.push_body(pem.as_bytes(), Some("max-age=300"), None);
        let cache = cache_over(fetcher.clone(), &dir, 0);

        let path = cache.get_local_key_path(URL).await.unwrap();
        std::fs::write(&path, b"truncated").unwrap();

        let recovered = cache.get_local_key_path(URL).await.unwrap();

        assert_eq!(recovered, path);
        assert_eq!(fetcher.fetch_count(), 2);
        assert!(read_public_key(&recovered).is_ok());
    }

    #[tokio::test]
    async fn test_double_corruption_evicts_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push_body(pem_fixture().as_bytes(), Some("max-age=300"), None);
        fetcher.push_body(b"still not a key", Some("max-age=300"), None);
        let cache = cache_over(fetcher.clone(), &dir, 0);

        let path = cache.get_local_key_path(URL).await.unwrap();
        std::fs::write(&path, b"truncated").unwrap();

        let err = cache.get_local_key_path(URL).await.unwrap_err();

        assert!(matches!(err, EngineError::KeyUnreadable { .. }));
        assert_eq!(cache.index().get_path(URL).await, "", "entry must be evicted");
        assert_eq!(fetcher.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_on_cold_miss_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push_failure("connection refused");
        let cache = cache_over(fetcher.clone(), &dir, 0);

        let err = cache.get_local_key_path(URL).await.unwrap_err();
        assert!(matches!(err, EngineError::FetchFailed { .. }));
        assert_eq!(cache.index().get_path(URL).await, "");
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new());
        let pem = pem_fixture();
        for _ in 0..3 {
            fetcher.push_body(pem.as_bytes(), Some("max-age=300"), None);
        }
        let cache = cache_over(fetcher.clone(), &dir, 2);
        let index = cache.index().clone();

        let first = cache.get_local_key_path("https://ex.test/keys/a.pub").await.unwrap();
        cache.get_local_key_path("https://ex.test/keys/b.pub").await.unwrap();
        cache.get_local_key_path("https://ex.test/keys/c.pub").await.unwrap();

        // Ties on the last-used stamp break on URL order, so the oldest
        // entry ("a.pub") is the deterministic victim.
        assert_eq!(index.len().await, 2, "capacity bound must hold");
        assert_eq!(index.get_path("https://ex.test/keys/a.pub").await, "");
        assert!(!first.exists(), "evicted entry's file must be unlinked");
        assert!(!index.get_path("https://ex.test/keys/c.pub").await.is_empty());
    }

    #[tokio::test]
    async fn test_url_without_basename_falls_back_to_digest() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push_body(pem_fixture().as_bytes(), Some("max-age=300"), None);
        let cache = cache_over(fetcher.clone(), &dir, 0);
        let url = "https://ex.test/keys/";

        let path = cache.get_local_key_path(url).await.unwrap();

        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            crate::digest::url_digest(url),
        );
    }
}
