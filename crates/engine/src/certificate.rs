//! Certificate registry.
//!
//! The signing path needs a certificate for the originating telephone
//! number: its public-key URL goes into the passport's `x5u` header and its
//! private key signs the serialized passport. [`CertificateRegistry`] is
//! the seam to that lookup; the engine releases each handle after use.
//!
//! Two implementations are provided: [`MemoryCertificateRegistry`] for
//! explicit registration (tests and embedding), and
//! [`DirCertificateRegistry`] which scans a store directory for `*.pem` /
//! `*.key` private keys — the file stem is the caller ID number — and also
//! loads explicitly configured certificates. Public-key URLs come from a
//! `${CERTIFICATE}` template expanded with the file stem, unless a
//! per-certificate override is given.

use std::{
    collections::HashMap,
    ffi::OsStr,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use p256::{ecdsa::SigningKey, pkcs8::DecodePrivateKey};
use parking_lot::RwLock;

use crate::error::{EngineError, Result};

/// Placeholder expanded with the certificate file stem in URL templates.
pub const CERTIFICATE_TEMPLATE_VAR: &str = "${CERTIFICATE}";

/// A signing certificate: caller ID, published public-key URL, and the
/// private key used to sign passports.
#[derive(Debug)]
pub struct Certificate {
    caller_id_number: String,
    public_key_url: String,
    signing_key: SigningKey,
}

impl Certificate {
    /// Creates a certificate handle.
    #[must_use]
    pub fn new(
        caller_id_number: impl Into<String>,
        public_key_url: impl Into<String>,
        signing_key: SigningKey,
    ) -> Self {
        Self {
            caller_id_number: caller_id_number.into(),
            public_key_url: public_key_url.into(),
            signing_key,
        }
    }

    /// The caller ID number this certificate signs for.
    #[must_use]
    pub fn caller_id_number(&self) -> &str {
        &self.caller_id_number
    }

    /// URL where the certificate's public key is published.
    #[must_use]
    pub fn public_key_url(&self) -> &str {
        &self.public_key_url
    }

    /// The certificate's private signing key.
    #[must_use]
    pub fn private_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

/// Looks up signing certificates by originating telephone number.
#[async_trait]
pub trait CertificateRegistry: Send + Sync {
    /// Returns the certificate for `caller_id`, or `None` when no
    /// certificate is configured for that number.
    async fn lookup_by_caller_id(&self, caller_id: &str) -> Option<Arc<Certificate>>;
}

/// In-memory registry populated by explicit registration.
#[derive(Default)]
pub struct MemoryCertificateRegistry {
    certificates: RwLock<HashMap<String, Arc<Certificate>>>,
}

impl MemoryCertificateRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a certificate under its caller ID number, replacing any
    /// previous registration for that number.
    pub fn register(&self, certificate: Certificate) {
        self.certificates
            .write()
            .insert(certificate.caller_id_number.clone(), Arc::new(certificate));
    }
}

#[async_trait]
impl CertificateRegistry for MemoryCertificateRegistry {
    async fn lookup_by_caller_id(&self, caller_id: &str) -> Option<Arc<Certificate>> {
        self.certificates.read().get(caller_id).cloned()
    }
}

/// One explicitly configured certificate entry.
#[derive(Clone, Debug)]
pub struct CertificateConfig {
    /// Caller ID number this certificate signs for.
    pub caller_id_number: String,
    /// Path to the PEM private key, absolute or relative to the store path.
    pub path: PathBuf,
    /// Public-key URL override. When absent, the store template is
    /// expanded instead.
    pub public_key_url: Option<String>,
}

/// Certificate store configuration.
#[derive(Clone, Debug, Default)]
pub struct CertificateStoreConfig {
    /// Directory scanned for `*.pem` / `*.key` private keys; also the base
    /// that explicit certificate paths are resolved against.
    pub path: Option<PathBuf>,
    /// URL template containing [`CERTIFICATE_TEMPLATE_VAR`], expanded with
    /// each certificate's file stem.
    pub public_key_url: Option<String>,
    /// Explicitly configured certificates. Loaded after the directory scan
    /// and taking precedence over scanned entries for the same number.
    pub certificates: Vec<CertificateConfig>,
}

/// Registry loaded from a certificate store directory.
///
/// Scanning maps each `*.pem` / `*.key` file to a certificate whose caller
/// ID number is the file stem (so `+15551234567.pem` signs for
/// `+15551234567`). A scanned file that does not parse as a P-256 private
/// key is skipped with a warning; explicitly configured certificates are
/// loaded strictly and fail the whole load on error.
#[derive(Debug)]
pub struct DirCertificateRegistry {
    certificates: HashMap<String, Arc<Certificate>>,
}

impl DirCertificateRegistry {
    /// Scans the store directory and loads every configured certificate.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CertificateInvalid`] when the store directory
    /// cannot be read, when a scan is configured without a usable
    /// `${CERTIFICATE}` URL template, when an explicitly configured private
    /// key cannot be read or parsed, or when an explicit certificate ends
    /// up with no public-key URL.
    pub fn load(config: &CertificateStoreConfig) -> Result<Self> {
        let mut certificates = HashMap::new();

        if let Some(dir) = &config.path {
            scan_store_dir(dir, config, &mut certificates)?;
        }

        for entry in &config.certificates {
            let path = match (&config.path, entry.path.is_absolute()) {
                (Some(base), false) => base.join(&entry.path),
                _ => entry.path.clone(),
            };

            let signing_key = read_private_key(&path)?;
            let public_key_url = resolve_public_key_url(entry, config, &path)?;

            tracing::debug!(
                caller_id = %entry.caller_id_number,
                url = %public_key_url,
                "loaded signing certificate"
            );

            certificates.insert(
                entry.caller_id_number.clone(),
                Arc::new(Certificate::new(&entry.caller_id_number, public_key_url, signing_key)),
            );
        }

        Ok(Self { certificates })
    }

    /// Returns the number of loaded certificates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// Returns `true` when no certificates are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}

#[async_trait]
impl CertificateRegistry for DirCertificateRegistry {
    async fn lookup_by_caller_id(&self, caller_id: &str) -> Option<Arc<Certificate>> {
        self.certificates.get(caller_id).cloned()
    }
}

/// Scans `dir` for `*.pem` / `*.key` private keys, keyed by file stem.
///
/// Entries are visited in path order so duplicate stems (`a.key` next to
/// `a.pem`) resolve deterministically — the last in order wins.
fn scan_store_dir(
    dir: &Path,
    config: &CertificateStoreConfig,
    certificates: &mut HashMap<String, Arc<Certificate>>,
) -> Result<()> {
    let template = config
        .public_key_url
        .as_deref()
        .filter(|t| t.contains(CERTIFICATE_TEMPLATE_VAR))
        .ok_or_else(|| EngineError::CertificateInvalid {
            path: dir.to_path_buf(),
            detail: "certificate store scan requires a public key URL template".to_string(),
        })?;

    let entries = std::fs::read_dir(dir).map_err(|e| EngineError::CertificateInvalid {
        path: dir.to_path_buf(),
        detail: e.to_string(),
    })?;

    let mut key_files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(OsStr::to_str)
                .is_some_and(|ext| matches!(ext, "pem" | "key"))
        })
        .collect();
    key_files.sort();

    for path in key_files {
        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };

        match read_private_key(&path) {
            Ok(signing_key) => {
                let public_key_url = template.replace(CERTIFICATE_TEMPLATE_VAR, &stem);
                tracing::debug!(
                    caller_id = %stem,
                    url = %public_key_url,
                    "loaded signing certificate from store directory"
                );
                certificates
                    .insert(stem.clone(), Arc::new(Certificate::new(stem, public_key_url, signing_key)));
            },
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "skipping unreadable key file in certificate store"
                );
            },
        }
    }

    Ok(())
}

/// Reads a P-256 private key: PKCS#8 PEM preferred, SEC1 PEM fallback.
fn read_private_key(path: &Path) -> Result<SigningKey> {
    let text = std::fs::read_to_string(path).map_err(|e| EngineError::CertificateInvalid {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    if let Ok(key) = SigningKey::from_pkcs8_pem(&text) {
        return Ok(key);
    }

    p256::SecretKey::from_sec1_pem(&text).map(SigningKey::from).map_err(|_| {
        EngineError::CertificateInvalid {
            path: path.to_path_buf(),
            detail: "not a parseable P-256 private key".to_string(),
        }
    })
}

fn resolve_public_key_url(
    entry: &CertificateConfig,
    config: &CertificateStoreConfig,
    path: &Path,
) -> Result<String> {
    if let Some(url) = &entry.public_key_url {
        return Ok(url.clone());
    }

    let template = config.public_key_url.as_deref().filter(|t| t.contains(CERTIFICATE_TEMPLATE_VAR));
    match (template, path.file_stem()) {
        (Some(template), Some(stem)) => {
            Ok(template.replace(CERTIFICATE_TEMPLATE_VAR, &stem.to_string_lossy()))
        },
        _ => Err(EngineError::CertificateInvalid {
            path: path.to_path_buf(),
            detail: "no public key URL override and no usable store template".to_string(),
        }),
    }
}
