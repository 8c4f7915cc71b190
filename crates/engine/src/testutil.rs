//! Shared test utilities.
//!
//! Helpers for generating P-256 key material, rendering PEM fixtures, and
//! scripting the fetcher seam so cache behavior can be exercised without a
//! network. Feature-gated behind `testutil` to prevent leaking into
//! production builds; enable it in `[dev-dependencies]`:
//!
//! ```toml
//! [dev-dependencies]
//! stir-shaken-engine = { path = "../engine", features = ["testutil"] }
//! ```

use std::{
    collections::VecDeque,
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use p256::{
    ecdsa::{SigningKey, VerifyingKey},
    pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding},
};
use parking_lot::Mutex;
use rand_core::OsRng;

use crate::{
    error::{EngineError, Result},
    fetch::{FetchMetadata, KeyFetcher},
};

/// Generates a fresh random P-256 key pair.
#[must_use]
pub fn generate_keypair() -> (SigningKey, VerifyingKey) {
    let signing = SigningKey::random(&mut OsRng);
    let verifying = *signing.verifying_key();
    (signing, verifying)
}

/// Renders a verifying key as SubjectPublicKeyInfo PEM.
///
/// # Panics
///
/// Panics if PEM encoding fails, which cannot happen for a valid key.
#[must_use]
#[allow(clippy::expect_used)]
pub fn public_key_pem(key: &VerifyingKey) -> String {
    key.to_public_key_pem(LineEnding::LF).expect("PEM-encode public key")
}

/// Renders a signing key as PKCS#8 PEM.
///
/// # Panics
///
/// Panics if PEM encoding fails, which cannot happen for a valid key.
#[must_use]
#[allow(clippy::expect_used)]
pub fn private_key_pem(key: &SigningKey) -> String {
    key.to_pkcs8_pem(LineEnding::LF).expect("PEM-encode private key").to_string()
}

/// One scripted fetch outcome.
enum ScriptedResponse {
    Body { body: Vec<u8>, meta: FetchMetadata },
    Failure(String),
}

/// A [`KeyFetcher`] that serves a scripted queue of responses.
///
/// Each call pops the next response; an exhausted queue fails the fetch.
/// The attempt counter covers failures as well, so tests can assert the
/// at-most-one-fetch-per-call invariant directly.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    attempts: AtomicUsize,
}

impl ScriptedFetcher {
    /// Creates a fetcher with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful response with the given body and freshness
    /// headers.
    pub fn push_body(&self, body: &[u8], cache_control: Option<&str>, expires: Option<&str>) {
        self.responses.lock().push_back(ScriptedResponse::Body {
            body: body.to_vec(),
            meta: FetchMetadata {
                cache_control: cache_control.map(str::to_string),
                expires: expires.map(str::to_string),
            },
        });
    }

    /// Queues a failed fetch.
    pub fn push_failure(&self, message: &str) {
        self.responses.lock().push_back(ScriptedResponse::Failure(message.to_string()));
    }

    /// Number of fetch attempts made so far, including failures.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, target_path: &Path) -> Result<FetchMetadata> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let next = self.responses.lock().pop_front();
        match next {
            Some(ScriptedResponse::Body { body, meta }) => {
                if let Some(parent) = target_path.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        EngineError::fetch_failed_with_source("create key directory", e)
                    })?;
                }
                tokio::fs::write(target_path, &body)
                    .await
                    .map_err(|e| EngineError::fetch_failed_with_source("write key file", e))?;
                Ok(meta)
            },
            Some(ScriptedResponse::Failure(message)) => Err(EngineError::fetch_failed(message)),
            None => Err(EngineError::fetch_failed(format!("no scripted response for '{url}'"))),
        }
    }
}
