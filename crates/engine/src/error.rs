//! Engine error types.
//!
//! This module defines the errors that can occur while verifying or signing
//! a STIR/SHAKEN identity passport, including the public-key acquisition
//! pipeline. Every failure is surfaced as a tagged variant; the engine never
//! returns partial results.

use std::{path::PathBuf, sync::Arc};

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by passport verification, signing, and key acquisition.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]` — new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// A required argument was empty.
    #[error("'{field}' is required")]
    MissingInput {
        /// Name of the empty argument.
        field: &'static str,
    },

    /// The JWT violates the fixed STIR/SHAKEN profile.
    #[error("invalid passport field '{field}': {detail}")]
    ShapeInvalid {
        /// Name of the offending field.
        field: &'static str,
        /// What was wrong with it.
        detail: String,
    },

    /// Network or I/O failure while acquiring a public key.
    #[error("public key fetch failed: {message}")]
    FetchFailed {
        /// Description of the failure.
        message: String,
        /// The underlying transport or I/O error.
        #[source]
        source: Option<BoxError>,
    },

    /// A local key file exists but is not a parseable public key.
    #[error("unreadable public key at '{path}'")]
    KeyUnreadable {
        /// Path to the unreadable file.
        path: PathBuf,
    },

    /// The cached key is expired and a re-fetch did not rescue it.
    #[error("public key for '{url}' is expired")]
    Expired {
        /// The public key URL whose entry is stale.
        url: String,
    },

    /// Cryptographic signature verification failed.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// No certificate is configured for the requested caller ID.
    #[error("no certificate for caller ID '{caller_id}'")]
    CertificateMissing {
        /// Caller ID number the lookup was keyed by.
        caller_id: String,
    },

    /// A configured certificate could not be loaded.
    #[error("invalid certificate at '{path}': {detail}")]
    CertificateInvalid {
        /// Path to the certificate's private key file.
        path: PathBuf,
        /// What was wrong with it.
        detail: String,
    },

    /// Signing-context failure inside the cryptographic backend.
    #[error("crypto failure: {message}")]
    CryptoInternal {
        /// Description of the failure.
        message: String,
    },

    /// Header or payload text is not valid JSON.
    #[error("malformed JSON in {context}")]
    MalformedJson {
        /// Which input failed to parse.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl EngineError {
    /// Creates a new `MissingInput` error for the given argument name.
    #[must_use]
    pub fn missing_input(field: &'static str) -> Self {
        Self::MissingInput { field }
    }

    /// Creates a new `ShapeInvalid` error naming the offending field.
    #[must_use]
    pub fn shape_invalid(field: &'static str, detail: impl Into<String>) -> Self {
        Self::ShapeInvalid { field, detail: detail.into() }
    }

    /// Creates a new `FetchFailed` error with the given message.
    #[must_use]
    pub fn fetch_failed(message: impl Into<String>) -> Self {
        Self::FetchFailed { message: message.into(), source: None }
    }

    /// Creates a new `FetchFailed` error with a message and source error.
    #[must_use]
    pub fn fetch_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::FetchFailed { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `KeyUnreadable` error for the given file.
    #[must_use]
    pub fn key_unreadable(path: impl Into<PathBuf>) -> Self {
        Self::KeyUnreadable { path: path.into() }
    }

    /// Creates a new `Expired` error for the given public key URL.
    #[must_use]
    pub fn expired(url: impl Into<String>) -> Self {
        Self::Expired { url: url.into() }
    }

    /// Creates a new `CertificateMissing` error for the given caller ID.
    #[must_use]
    pub fn certificate_missing(caller_id: impl Into<String>) -> Self {
        Self::CertificateMissing { caller_id: caller_id.into() }
    }

    /// Creates a new `CryptoInternal` error with the given message.
    #[must_use]
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::CryptoInternal { message: message.into() }
    }
}
