//! Passport structure and profile validation.
//!
//! A STIR/SHAKEN identity assertion is a JWT-shaped object with a fixed
//! profile: ES256, type `passport`, extension `shaken`, and an originating
//! telephone number claim. This module owns the profile constants, the
//! shape check applied on ingress, and the [`Passport`] value returned by
//! successful verify and sign operations.

use serde_json::Value;

use crate::error::{EngineError, Result};

/// The only accepted signing algorithm (ECDSA P-256 with SHA-256).
pub const STIR_SHAKEN_ALGORITHM: &str = "ES256";

/// The only accepted passport extension identifier.
pub const STIR_SHAKEN_PPT: &str = "shaken";

/// The only accepted token type.
pub const STIR_SHAKEN_TYPE: &str = "passport";

/// The structured result of a successful verify or sign.
///
/// Owns deep copies of the header and payload, the base64 signature text,
/// the declared algorithm, and the public-key URL; dropped as a unit by the
/// caller.
#[derive(Clone, Debug)]
pub struct Passport {
    header: Value,
    payload: Value,
    signature: String,
    algorithm: String,
    public_key_url: String,
}

impl Passport {
    pub(crate) fn new(
        header: Value,
        payload: Value,
        signature: String,
        algorithm: String,
        public_key_url: String,
    ) -> Self {
        Self { header, payload, signature, algorithm, public_key_url }
    }

    /// The parsed JWT header.
    #[must_use]
    pub fn header(&self) -> &Value {
        &self.header
    }

    /// The parsed JWT payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The detached signature, base64-encoded (standard alphabet, padded).
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The declared signing algorithm.
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// URL of the signer's published public key.
    #[must_use]
    pub fn public_key_url(&self) -> &str {
        &self.public_key_url
    }
}

/// Checks a JWT-shaped JSON document against the fixed STIR/SHAKEN profile.
///
/// The document must carry `header` and `payload` objects, the header must
/// pin `ppt`/`typ`/`alg` to the profile constants, and `payload.orig.tn`
/// must be a non-empty string. The input is not mutated.
///
/// # Errors
///
/// Returns [`EngineError::ShapeInvalid`] naming the offending field.
pub fn check_profile(json: &Value) -> Result<()> {
    let header = json
        .get("header")
        .and_then(Value::as_object)
        .ok_or_else(|| EngineError::shape_invalid("header", "missing or not an object"))?;

    check_fixed_field(header, "ppt", STIR_SHAKEN_PPT)?;
    check_fixed_field(header, "typ", STIR_SHAKEN_TYPE)?;
    check_fixed_field(header, "alg", STIR_SHAKEN_ALGORITHM)?;

    let payload = json
        .get("payload")
        .and_then(Value::as_object)
        .ok_or_else(|| EngineError::shape_invalid("payload", "missing or not an object"))?;

    let tn = payload.get("orig").and_then(|orig| orig.get("tn")).and_then(Value::as_str);
    match tn {
        Some(tn) if !tn.is_empty() => Ok(()),
        _ => Err(EngineError::shape_invalid("orig.tn", "missing or empty")),
    }
}

fn check_fixed_field(
    header: &serde_json::Map<String, Value>,
    field: &'static str,
    expected: &'static str,
) -> Result<()> {
    match header.get(field).and_then(Value::as_str) {
        None | Some("") => Err(EngineError::shape_invalid(field, "missing")),
        Some(found) if found != expected => Err(EngineError::shape_invalid(
            field,
            format!("was '{found}', must be '{expected}'"),
        )),
        Some(_) => Ok(()),
    }
}
