//! Public-key download.
//!
//! The [`KeyFetcher`] trait is the engine's seam to the HTTP transport:
//! download the body of a URL to a file and surface the response's
//! freshness headers. [`HttpFetcher`] is the production implementation;
//! tests script the trait directly to exercise the cache without a network.

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, EXPIRES};

use crate::error::{EngineError, Result};

/// Freshness metadata captured from a fetch response.
///
/// Lives for the duration of one fetch call; the cache manager folds it
/// into an absolute expiration immediately.
#[derive(Clone, Debug, Default)]
pub struct FetchMetadata {
    /// Raw `Cache-Control` header value, if the response carried one.
    pub cache_control: Option<String>,
    /// Raw `Expires` header value, if the response carried one.
    pub expires: Option<String>,
}

/// Downloads public keys to local files.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    /// Downloads the body of `url` to `target_path`.
    ///
    /// Implementations must create parent directories as needed and must
    /// not leave a partial file at `target_path` on failure.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::FetchFailed`] on any transport, status, or
    /// I/O failure.
    async fn fetch(&self, url: &str, target_path: &Path) -> Result<FetchMetadata>;
}

/// HTTP(S) fetcher over a shared [`reqwest::Client`].
///
/// Only `http` and `https` URLs are accepted; the configured timeout is a
/// hard upper bound on each fetch. The body is written to a temporary
/// sibling file and renamed into place so a failed download never leaves a
/// partial file at the target path.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the given per-fetch timeout.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::FetchFailed`] if the underlying HTTP client
    /// cannot be constructed (for example, TLS backend initialization
    /// failure).
    pub fn new(timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::fetch_failed_with_source("HTTP client setup", e))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl KeyFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, target_path: &Path) -> Result<FetchMetadata> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| EngineError::fetch_failed_with_source(format!("invalid URL '{url}'"), e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(EngineError::fetch_failed(format!(
                "unsupported scheme '{}' for '{url}'",
                parsed.scheme()
            )));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| EngineError::fetch_failed_with_source(format!("GET {url}"), e))?
            .error_for_status()
            .map_err(|e| EngineError::fetch_failed_with_source(format!("GET {url}"), e))?;

        let meta = FetchMetadata {
            cache_control: header_string(&response, CACHE_CONTROL),
            expires: header_string(&response, EXPIRES),
        };

        let body = response
            .bytes()
            .await
            .map_err(|e| EngineError::fetch_failed_with_source(format!("read body of {url}"), e))?;

        write_atomically(target_path, &body).await?;

        tracing::debug!(url, path = %target_path.display(), bytes = body.len(), "fetched public key");
        Ok(meta)
    }
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// Writes `body` to `path` via a temporary sibling file and rename, so the
/// target either holds the complete body or its previous content.
async fn write_atomically(path: &Path, body: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            EngineError::fetch_failed_with_source(format!("create {}", parent.display()), e)
        })?;
    }

    let mut file_name = path.file_name().map(std::ffi::OsString::from).unwrap_or_default();
    file_name.push(".part");
    let tmp = path.with_file_name(file_name);

    if let Err(e) = tokio::fs::write(&tmp, body).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(EngineError::fetch_failed_with_source(format!("write {}", tmp.display()), e));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(EngineError::fetch_failed_with_source(
            format!("rename into {}", path.display()),
            e,
        ));
    }

    Ok(())
}
