//! Engine configuration.
//!
//! [`EngineConfig`] carries the deployment-supplied knobs the engine
//! consumes: where downloaded keys live, how long a fetch may take, how many
//! keys the persistent cache may hold, and the issued-at arithmetic used
//! when signing. Trust-anchor options (`ca_file`, `ca_path`) are carried for
//! deployments that configure them but are not consulted by the engine —
//! chain validation is out of scope.

use std::{path::PathBuf, time::Duration};

/// Default upper bound on the number of cached public keys.
pub const DEFAULT_CACHE_MAX_SIZE: usize = 1000;

/// Default per-fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(2);

/// Default attestation level placed in signed passports.
pub const DEFAULT_ATTESTATION: &str = "B";

/// Default origination identifier placed in signed passports.
pub const DEFAULT_ORIGINATION_ID: &str = "asterisk";

/// Arithmetic used for the `iat` claim when signing.
///
/// The historical implementation computed `tv_sec + tv_usec / 1000`, adding
/// up to 999 to the epoch-seconds value. Interoperating deployments may have
/// grown to tolerate that skew, so it remains the default; switch to
/// [`UnixSeconds`](IssuedAtMode::UnixSeconds) for a standards-conforming
/// `iat`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum IssuedAtMode {
    /// Epoch seconds plus sub-second microseconds divided by 1000.
    #[default]
    SecondsPlusMillis,
    /// Plain epoch seconds.
    UnixSeconds,
}

/// Configuration consumed by the engine.
///
/// Construct with [`EngineConfig::new`], then adjust fields as needed:
///
/// ```
/// use std::time::Duration;
///
/// use stir_shaken_engine::config::{EngineConfig, IssuedAtMode};
///
/// let config = EngineConfig {
///     fetch_timeout: Duration::from_secs(5),
///     issued_at_mode: IssuedAtMode::UnixSeconds,
///     ..EngineConfig::new("/var/lib/stir-shaken")
/// };
/// assert_eq!(config.cache_max_size, 1000);
/// ```
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Base directory for engine state. Downloaded public keys are stored
    /// under `<data_dir>/keys/stir_shaken/`.
    pub data_dir: PathBuf,

    /// Certificate authority file. Reserved; not consulted by the engine.
    pub ca_file: Option<PathBuf>,

    /// Certificate authority directory. Reserved; not consulted by the
    /// engine.
    pub ca_path: Option<PathBuf>,

    /// Upper bound on the number of cached public keys. Least-recently-used
    /// entries are evicted once the bound is exceeded.
    pub cache_max_size: usize,

    /// Hard upper bound on a single public-key fetch.
    pub fetch_timeout: Duration,

    /// Arithmetic for the `iat` claim when signing.
    pub issued_at_mode: IssuedAtMode,

    /// Attestation level placed in signed passports.
    pub attestation: String,

    /// Origination identifier placed in signed passports.
    pub origination_id: String,
}

impl EngineConfig {
    /// Creates a configuration with defaults, rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ca_file: None,
            ca_path: None,
            cache_max_size: DEFAULT_CACHE_MAX_SIZE,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            issued_at_mode: IssuedAtMode::default(),
            attestation: DEFAULT_ATTESTATION.to_string(),
            origination_id: DEFAULT_ORIGINATION_ID.to_string(),
        }
    }
}
