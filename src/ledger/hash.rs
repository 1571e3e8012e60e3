//! Chain Digest
//!
//! SHA-256 digests rendered as `sha256:<64 lowercase hex>`.

use sha2::{Digest, Sha256};

/// Prefix carried by every digest string
pub const DIGEST_PREFIX: &str = "sha256:";

/// `previous_hash` of the first entry in every scope
pub const GENESIS: &str =
    "sha256:0000000000000000000000000000000000000000000000000000000000000000";

/// Calculate the prefixed SHA-256 digest of raw bytes
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{}{}", DIGEST_PREFIX, hex::encode(hasher.finalize()))
}

/// Whether a string has the shape of a digest produced by [`digest`]
pub fn is_digest(value: &str) -> bool {
    match value.strip_prefix(DIGEST_PREFIX) {
        Some(hex_part) => {
            hex_part.len() == 64
                && hex_part
                    .chars()
                    .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        }
        None => false,
    }
}
