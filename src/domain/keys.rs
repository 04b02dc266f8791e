//! Cache key derivation.
//!
//! Keys are content addresses: the same `(owner, text)` pair must map to the
//! same key across calls and across process restarts, since keys persisted in
//! the metadata store outlive the process that wrote them. Mixing hasher
//! implementations over the lifetime of a deployment silently orphans every
//! record written by the previous hasher; the crate ships exactly one.

use sha2::{Digest, Sha256};

use super::record::CacheKey;

/// Pure digest over an arbitrary byte sequence. Implementations must be
/// deterministic; collision resistance is a trust assumption of the cache,
/// not something the orchestrator mitigates.
pub trait KeyHasher: Send + Sync {
    fn digest(&self, bytes: &[u8]) -> String;
}

/// SHA-256 with lowercase hex encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl KeyHasher for Sha256Hasher {
    fn digest(&self, bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }
}

/// Derive the cache key for one `(owner, text)` pair.
pub fn derive_key(hasher: &dyn KeyHasher, owner_id: &str, text: &str) -> CacheKey {
    let mut input = String::with_capacity(owner_id.len() + text.len());
    input.push_str(owner_id);
    input.push_str(text);
    CacheKey::new(hasher.digest(input.as_bytes()))
}
