//! ECDSA P-256 / SHA-256 signing primitive.
//!
//! This module owns everything cryptographic: loading public keys from
//! downloaded files (PEM preferred, permissive DER/SEC1 fallback), signing
//! serialized passports, verifying detached signatures, and the base64
//! handling of signature text.
//!
//! Signatures are produced DER-encoded — the form an OpenSSL
//! `EVP_DigestSign` emits — and verification accepts DER first with a
//! permissive fallback to raw 64-byte `r || s` fixed encoding.

use std::path::Path;

use base64::{Engine, engine::general_purpose::STANDARD};
use p256::{
    ecdsa::{
        Signature, SigningKey, VerifyingKey,
        signature::{Signer, Verifier},
    },
    pkcs8::DecodePublicKey,
};

use crate::error::{EngineError, Result};

/// Reads a P-256 public key from a downloaded file.
///
/// PEM is preferred; raw PKCS#8 DER and SEC1 point encodings are accepted
/// as fallbacks.
///
/// # Errors
///
/// Returns [`EngineError::KeyUnreadable`] when the file cannot be read or
/// does not contain a parseable P-256 public key.
pub fn read_public_key(path: &Path) -> Result<VerifyingKey> {
    let bytes =
        std::fs::read(path).map_err(|_| EngineError::key_unreadable(path.to_path_buf()))?;

    if let Ok(text) = std::str::from_utf8(&bytes)
        && let Ok(key) = VerifyingKey::from_public_key_pem(text)
    {
        return Ok(key);
    }

    VerifyingKey::from_public_key_der(&bytes)
        .or_else(|_| VerifyingKey::from_sec1_bytes(&bytes))
        .map_err(|_| EngineError::key_unreadable(path.to_path_buf()))
}

/// Signs `message` with ECDSA P-256 / SHA-256, returning the DER-encoded
/// signature bytes.
///
/// # Errors
///
/// Returns [`EngineError::CryptoInternal`] if the signing context fails.
pub fn sign_message(message: &[u8], key: &SigningKey) -> Result<Vec<u8>> {
    let signature: Signature =
        key.try_sign(message).map_err(|e| EngineError::crypto(format!("sign: {e}")))?;

    Ok(signature.to_der().as_bytes().to_vec())
}

/// Verifies a detached ECDSA P-256 / SHA-256 signature over `message`.
///
/// `signature` may be DER-encoded or a raw 64-byte `r || s` encoding.
///
/// # Errors
///
/// Returns [`EngineError::SignatureInvalid`] when the signature does not
/// parse or does not verify.
pub fn verify_message(message: &[u8], signature: &[u8], key: &VerifyingKey) -> Result<()> {
    let signature = Signature::from_der(signature)
        .or_else(|_| Signature::from_slice(signature))
        .map_err(|_| EngineError::SignatureInvalid)?;

    key.verify(message, &signature).map_err(|_| EngineError::SignatureInvalid)
}

/// Encodes raw signature bytes as base64 (standard alphabet, padded).
#[must_use]
pub fn encode_signature(signature: &[u8]) -> String {
    STANDARD.encode(signature)
}

/// Decodes a base64 signature (standard alphabet, padded).
///
/// The decoded length is `(len / 4) * 3 - padding` where `padding` is the
/// number of trailing `=` characters (0, 1, or 2); input that does not
/// decode to exactly that length is rejected.
///
/// # Errors
///
/// Returns [`EngineError::SignatureInvalid`] on any malformed input.
pub fn decode_signature(signature: &str) -> Result<Vec<u8>> {
    let len = signature.len();
    let padding = signature.bytes().rev().take(2).take_while(|&b| b == b'=').count();

    if len < 4 || len % 4 != 0 {
        return Err(EngineError::SignatureInvalid);
    }
    let expected = (len / 4) * 3 - padding;

    let decoded = STANDARD.decode(signature).map_err(|_| EngineError::SignatureInvalid)?;
    if decoded.len() != expected {
        return Err(EngineError::SignatureInvalid);
    }

    Ok(decoded)
}
