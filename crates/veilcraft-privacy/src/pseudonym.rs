//! Deterministic pseudonym derivation via salted SHA-256.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hex characters of the digest kept in the pseudonym.
const PSEUDONYM_LEN: usize = 16;

/// Response shape for an anonymized-ID lookup.
#[derive(Debug, Clone, Serialize)]
pub struct PseudonymRecord {
    #[serde(rename = "originalId")]
    pub original_id: String,
    #[serde(rename = "anonymizedId")]
    pub anonymized_id: String,
    #[serde(rename = "saltUsed")]
    pub salt_used: String,
}

/// Derive the pseudonym for `(original_id, salt)`.
///
/// One-way: recovering the input requires both the id and the salt. The
/// salt is hashed before the id with a separator byte so that
/// `("ab", "c")` and `("a", "bc")` cannot collide.
pub(crate) fn derive(original_id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update([0x1f]);
    hasher.update(original_id.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("anon_{}", &digest[..PSEUDONYM_LEN])
}
