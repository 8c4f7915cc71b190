//! Public-key URL digests.
//!
//! The persistent key index is keyed by a short, stable identifier derived
//! from each public-key URL. The digest is SHA-1 rendered as 40 lowercase
//! hex characters; it is an opaque cache key only and carries no security
//! property — a colliding or corrupted entry simply fails key parsing and
//! is evicted as a cache miss.

use sha1::{Digest, Sha1};

/// Derives the 40-character lowercase hex digest of a public-key URL.
///
/// Deterministic over the URL's UTF-8 bytes.
///
/// # Example
///
/// ```
/// use stir_shaken_engine::digest::url_digest;
///
/// let digest = url_digest("https://ex.test/keys/abc.pub");
/// assert_eq!(digest.len(), 40);
/// ```
#[must_use]
pub fn url_digest(url: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // SHA-1("abc")
        assert_eq!(url_digest("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(url_digest(""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn test_deterministic() {
        let url = "https://ex.test/keys/abc.pub";
        assert_eq!(url_digest(url), url_digest(url));
    }

    #[test]
    fn test_distinct_urls_differ() {
        assert_ne!(
            url_digest("https://ex.test/keys/abc.pub"),
            url_digest("https://ex.test/keys/def.pub"),
        );
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            /// Every digest is exactly 40 lowercase hex characters.
            #[test]
            fn digest_is_40_lowercase_hex(url in ".*") {
                let digest = url_digest(&url);
                prop_assert_eq!(digest.len(), 40);
                prop_assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
            }
        }
    }
}
