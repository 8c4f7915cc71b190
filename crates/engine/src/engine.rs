//! The engine context.
//!
//! [`Engine`] is the explicit context every public operation runs against:
//! configuration, the persistent key cache, and the certificate registry.
//! Construct one during startup and share it; there is no process-global
//! state.

use std::sync::Arc;

use serde_json::Value;
use stir_shaken_storage::KeyValueStore;

use crate::{
    cache::KeyCache,
    certificate::CertificateRegistry,
    config::{EngineConfig, IssuedAtMode},
    crypto::{decode_signature, encode_signature, read_public_key, sign_message, verify_message},
    error::{EngineError, Result},
    fetch::{HttpFetcher, KeyFetcher},
    index::KeyIndex,
    passport::{Passport, STIR_SHAKEN_ALGORITHM, check_profile},
};

/// STIR/SHAKEN verification and signing engine.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use stir_shaken_engine::{
///     certificate::MemoryCertificateRegistry, config::EngineConfig, engine::Engine,
/// };
/// use stir_shaken_storage::DiskStore;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(DiskStore::open("/var/lib/stir-shaken/index.json")?);
/// let registry = Arc::new(MemoryCertificateRegistry::new());
/// let engine =
///     Engine::with_http_fetcher(EngineConfig::new("/var/lib/stir-shaken"), store, registry)?;
/// # let _ = engine;
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    config: EngineConfig,
    cache: KeyCache,
    registry: Arc<dyn CertificateRegistry>,
}

impl Engine {
    /// Creates an engine over the given store, fetcher, and registry.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn KeyValueStore>,
        fetcher: Arc<dyn KeyFetcher>,
        registry: Arc<dyn CertificateRegistry>,
    ) -> Self {
        let index = KeyIndex::new(store);
        let cache = KeyCache::new(index, fetcher, config.data_dir.clone(), config.cache_max_size);

        Self { config, cache, registry }
    }

    /// Creates an engine with an [`HttpFetcher`] using the configured
    /// fetch timeout.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::FetchFailed`] if the HTTP client cannot be
    /// constructed.
    pub fn with_http_fetcher(
        config: EngineConfig,
        store: Arc<dyn KeyValueStore>,
        registry: Arc<dyn CertificateRegistry>,
    ) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout)?);
        Ok(Self::new(config, store, fetcher, registry))
    }

    /// Returns the key cache, for admin inspection.
    #[must_use]
    pub fn key_cache(&self) -> &KeyCache {
        &self.cache
    }

    /// Verifies a STIR/SHAKEN identity assertion.
    ///
    /// `payload` is verified byte-for-byte as supplied — the verifier never
    /// re-serializes. The header and payload are parsed into the returned
    /// [`Passport`] but are *not* re-validated against the profile here;
    /// that is the caller's responsibility at a higher layer.
    ///
    /// # Errors
    ///
    /// - [`EngineError::MissingInput`] — any argument is empty
    /// - [`EngineError::FetchFailed`], [`EngineError::Expired`],
    ///   [`EngineError::KeyUnreadable`] — the public key could not be
    ///   acquired
    /// - [`EngineError::SignatureInvalid`] — the signature does not decode
    ///   or does not verify
    /// - [`EngineError::MalformedJson`] — header or payload is not valid
    ///   JSON
    pub async fn verify(
        &self,
        header: &str,
        payload: &str,
        signature: &str,
        algorithm: &str,
        public_key_url: &str,
    ) -> Result<Passport> {
        let inputs = [
            ("header", header),
            ("payload", payload),
            ("signature", signature),
            ("algorithm", algorithm),
            ("public_key_url", public_key_url),
        ];
        for (field, value) in inputs {
            if value.is_empty() {
                return Err(EngineError::missing_input(field));
            }
        }

        let path = self.cache.get_local_key_path(public_key_url).await?;
        let public_key = read_public_key(&path)?;

        let raw_signature = decode_signature(signature)?;
        verify_message(payload.as_bytes(), &raw_signature, &public_key)?;

        let header_json = serde_json::from_str(header)
            .map_err(|e| EngineError::MalformedJson { context: "header", source: e })?;
        let payload_json = serde_json::from_str(payload)
            .map_err(|e| EngineError::MalformedJson { context: "payload", source: e })?;

        tracing::debug!(url = public_key_url, "verified identity assertion");

        Ok(Passport::new(
            header_json,
            payload_json,
            signature.to_string(),
            algorithm.to_string(),
            public_key_url.to_string(),
        ))
    }

    /// Signs an outbound identity assertion.
    ///
    /// The document is shape-checked against the fixed profile, then
    /// completed in place: `header.x5u` from the caller's certificate, the
    /// configured `attest` and `origid` values, and an `iat` stamp. The
    /// serialized form of the completed document is exactly what is signed.
    ///
    /// # Errors
    ///
    /// - [`EngineError::ShapeInvalid`] — the document violates the profile
    /// - [`EngineError::CertificateMissing`] — no certificate for
    ///   `payload.orig.tn`
    /// - [`EngineError::CryptoInternal`] — the signing context failed
    pub async fn sign(&self, json: &mut Value) -> Result<Passport> {
        check_profile(json)?;

        let caller_id = json
            .get("payload")
            .and_then(|payload| payload.get("orig"))
            .and_then(|orig| orig.get("tn"))
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::shape_invalid("orig.tn", "missing or empty"))?
            .to_string();

        let certificate = self
            .registry
            .lookup_by_caller_id(&caller_id)
            .await
            .ok_or_else(|| EngineError::certificate_missing(caller_id.clone()))?;

        insert_field(json, "header", "x5u", Value::from(certificate.public_key_url()))?;
        insert_field(json, "payload", "attest", Value::from(self.config.attestation.as_str()))?;
        insert_field(json, "payload", "origid", Value::from(self.config.origination_id.as_str()))?;
        insert_field(json, "payload", "iat", Value::from(self.issued_at()))?;

        let serialized = serde_json::to_string(json)
            .map_err(|e| EngineError::MalformedJson { context: "passport", source: e })?;

        let raw_signature = sign_message(serialized.as_bytes(), certificate.private_key())?;
        let signature = encode_signature(&raw_signature);

        tracing::debug!(caller_id = %caller_id, "signed identity assertion");

        Ok(Passport::new(
            json.get("header").cloned().unwrap_or(Value::Null),
            json.get("payload").cloned().unwrap_or(Value::Null),
            signature,
            STIR_SHAKEN_ALGORITHM.to_string(),
            certificate.public_key_url().to_string(),
        ))
    }

    /// Computes the `iat` stamp per the configured arithmetic.
    fn issued_at(&self) -> i64 {
        let now = chrono::Utc::now();
        match self.config.issued_at_mode {
            IssuedAtMode::SecondsPlusMillis => {
                now.timestamp() + i64::from(now.timestamp_subsec_micros() / 1000)
            },
            IssuedAtMode::UnixSeconds => now.timestamp(),
        }
    }
}

fn insert_field(json: &mut Value, section: &'static str, key: &str, value: Value) -> Result<()> {
    match json.get_mut(section).and_then(Value::as_object_mut) {
        Some(object) => {
            object.insert(key.to_string(), value);
            Ok(())
        },
        None => Err(EngineError::shape_invalid(section, "missing or not an object")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use serde_json::json;
    use stir_shaken_storage::MemoryStore;

    use super::*;
    use crate::{
        certificate::{Certificate, MemoryCertificateRegistry},
        testutil::{ScriptedFetcher, generate_keypair},
    };

    const TN: &str = "+15551234567";
    const X5U: &str = "https://ex.test/keys/abc.pub";

    fn engine_with_cert() -> (Engine, Arc<ScriptedFetcher>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let (signing, _) = generate_keypair();

        let registry = MemoryCertificateRegistry::new();
        registry.register(Certificate::new(TN, X5U, signing));

        let fetcher = Arc::new(ScriptedFetcher::new());
        let engine = Engine::new(
            EngineConfig::new(dir.path()),
            Arc::new(MemoryStore::new()),
            fetcher.clone(),
            Arc::new(registry),
        );

        (engine, fetcher, dir)
    }

    fn signable_json() -> Value {
        json!({
            "header": {"ppt": "shaken", "typ": "passport", "alg": "ES256"},
            "payload": {"orig": {"tn": TN}, "dest": {"tn": ["+15557654321"]}},
        })
    }

    #[tokio::test]
    async fn test_verify_rejects_empty_inputs() {
        let (engine, _, _dir) = engine_with_cert();

        let cases: [(&str, [&str; 5]); 5] = [
            ("header", ["", "{}", "sig", "ES256", X5U]),
            ("payload", ["{}", "", "sig", "ES256", X5U]),
            ("signature", ["{}", "{}", "", "ES256", X5U]),
            ("algorithm", ["{}", "{}", "sig", "", X5U]),
            ("public_key_url", ["{}", "{}", "sig", "ES256", ""]),
        ];

        for (field, [h, p, s, a, u]) in cases {
            let err = engine.verify(h, p, s, a, u).await.unwrap_err();
            assert!(
                matches!(err, EngineError::MissingInput { field: f } if f == field),
                "empty '{field}' must be reported",
            );
        }
    }

    #[tokio::test]
    async fn test_sign_completes_passport() {
        let (engine, _, _dir) = engine_with_cert();
        let mut json = signable_json();

        let passport = engine.sign(&mut json).await.unwrap();

        assert_eq!(passport.header()["x5u"], X5U);
        assert_eq!(passport.payload()["attest"], "B");
        assert_eq!(passport.payload()["origid"], "asterisk");
        assert!(passport.payload()["iat"].is_i64());
        assert_eq!(passport.algorithm(), "ES256");
        assert_eq!(passport.public_key_url(), X5U);
        assert!(!passport.signature().is_empty());

        // The caller's document carries the same completions.
        assert_eq!(json["header"]["x5u"], X5U);
        assert_eq!(json["payload"]["attest"], "B");
    }

    #[tokio::test]
    async fn test_sign_missing_certificate() {
        let (engine, _, _dir) = engine_with_cert();
        let mut json = signable_json();
        json["payload"]["orig"]["tn"] = json!("+15550000000");

        let err = engine.sign(&mut json).await.unwrap_err();
        assert!(
            matches!(err, EngineError::CertificateMissing { ref caller_id } if caller_id == "+15550000000")
        );
    }

    #[tokio::test]
    async fn test_sign_rejects_bad_shape() {
        let (engine, _, _dir) = engine_with_cert();
        let mut json = json!({"header": {"ppt": "shaken"}, "payload": {"orig": {"tn": TN}}});

        let err = engine.sign(&mut json).await.unwrap_err();
        assert!(matches!(err, EngineError::ShapeInvalid { .. }));
    }

    #[tokio::test]
    async fn test_issued_at_modes() {
        let (engine, _, _dir) = engine_with_cert();
        let now = chrono::Utc::now().timestamp();

        let legacy = engine.issued_at();
        assert!(legacy >= now && legacy <= now + 1001, "legacy mode adds at most 999ms-as-seconds");

        let mut corrected = engine;
        corrected.config.issued_at_mode = IssuedAtMode::UnixSeconds;
        let seconds = corrected.issued_at();
        assert!(seconds >= now && seconds <= now + 1);
    }
}
