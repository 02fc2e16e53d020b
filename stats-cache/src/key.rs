//! Stable cache key derivation.

use sha2::{Digest, Sha256};

/// Number of hex digits of the digest kept in the key suffix.
const KEY_HASH_LEN: usize = 16;

/// Derive a stable cache key from its parts.
///
/// The key keeps the joined parts as a readable prefix (so
/// `invalidate_pattern` substring scans stay meaningful) and appends a
/// truncated sha256 of the joined form to disambiguate parts that join to
/// the same string.
pub fn cache_key<S: AsRef<str>>(parts: &[S]) -> String {
    let joined = parts
        .iter()
        .map(|p| p.as_ref())
        .collect::<Vec<_>>()
        .join(":");
    let digest = Sha256::digest(joined.as_bytes());
    let mut hex = String::with_capacity(KEY_HASH_LEN);
    for byte in digest.iter().take(KEY_HASH_LEN / 2) {
        hex.push_str(&format!("{:02x}", byte));
    }
    format!("{}:{}", joined, hex)
}
