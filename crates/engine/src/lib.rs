//! # STIR/SHAKEN Engine
//!
//! Verification and signing of STIR/SHAKEN caller-ID identity assertions.
//!
//! Given a call identity assertion — a JWT-shaped structure with a header,
//! payload, detached signature, declared algorithm, and a URL pointing to
//! the signer's public key — the engine decides whether the assertion is
//! cryptographically authentic and semantically well-formed. Conversely,
//! it produces such an assertion for an outbound call using a locally
//! configured private key.
//!
//! ## Architecture
//!
//! ```text
//! verify(header, payload, signature, alg, x5u)
//!        │
//!        ▼
//! ┌──────────────┐   miss/stale   ┌─────────────┐
//! │   KeyCache   │───────────────▶│  KeyFetcher │──▶ http(s)
//! │ (state machine)◀──────────────│  (reqwest)  │
//! └──────┬───────┘    key file    └─────────────┘
//!        │
//!        ▼
//! ┌──────────────┐                ┌──────────────────┐
//! │   KeyIndex   │───────────────▶│  KeyValueStore   │
//! │ url→{path,exp}│               │ (memory or disk) │
//! └──────────────┘                └──────────────────┘
//!        │
//!        ▼
//!   ECDSA P-256 / SHA-256 verify ──▶ Passport
//! ```
//!
//! The sign path validates the document shape, looks up the caller's
//! certificate, completes the passport (`x5u`, `attest`, `origid`, `iat`),
//! and signs the serialized document with the certificate's private key.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use stir_shaken_engine::{
//!     certificate::MemoryCertificateRegistry, config::EngineConfig, engine::Engine,
//! };
//! use stir_shaken_storage::DiskStore;
//!
//! # async fn example(header: &str, payload: &str, signature: &str)
//! # -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(DiskStore::open("/var/lib/stir-shaken/index.json")?);
//! let registry = Arc::new(MemoryCertificateRegistry::new());
//! let engine =
//!     Engine::with_http_fetcher(EngineConfig::new("/var/lib/stir-shaken"), store, registry)?;
//!
//! let passport = engine
//!     .verify(header, payload, signature, "ES256", "https://ex.test/keys/abc.pub")
//!     .await?;
//! # let _ = passport;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! The engine is designed for cooperative use from multiple tasks and
//! contains no internal task pool. Each verify or sign operation is
//! sequential end-to-end and may suspend on disk and network I/O during a
//! fetch. No cross-operation locking is promised: two concurrent
//! verifications of a cold URL may both fetch, and the second writer wins.
//!
//! ## Feature Flags
//!
//! - **`testutil`**: enables the [`testutil`] module with key-material
//!   generators and a scriptable fetcher. Enable in `[dev-dependencies]`
//!   for integration tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Public-key cache manager.
pub mod cache;
/// Certificate registry.
pub mod certificate;
/// Engine configuration.
pub mod config;
/// ECDSA P-256 / SHA-256 primitive and base64 signature handling.
pub mod crypto;
/// Public-key URL digests.
pub mod digest;
/// The engine context.
pub mod engine;
/// Engine error types.
pub mod error;
/// Public-key download.
pub mod fetch;
/// Persistent public-key index.
pub mod index;
/// Passport structure and profile validation.
pub mod passport;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

// Re-export key types for convenience
pub use cache::KeyCache;
pub use certificate::{
    Certificate, CertificateRegistry, DirCertificateRegistry, MemoryCertificateRegistry,
};
pub use config::{EngineConfig, IssuedAtMode};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use fetch::{FetchMetadata, HttpFetcher, KeyFetcher};
pub use index::KeyIndex;
pub use passport::{Passport, STIR_SHAKEN_ALGORITHM, STIR_SHAKEN_PPT, STIR_SHAKEN_TYPE};
