//! Single-algorithm hashing for identifier derivation
//!
//! All digest derivation in charter (hrac, policy ids, revocation orders,
//! proximity scores) goes through this module so exactly one place names the
//! algorithm: SHA-256, 32-byte output.

use sha2::{Digest, Sha256};

/// Size in bytes of a digest produced by [`hash`]
pub const DIGEST_SIZE: usize = 32;

/// Hash arbitrary bytes to a 32-byte digest
pub fn hash(data: &[u8]) -> [u8; DIGEST_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Incremental hasher for multi-part input
///
/// Used when deriving digests over several fields without an intermediate
/// concatenation buffer.
pub struct Hasher(Sha256);

impl Hasher {
    /// Create a fresh incremental hasher
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    /// Update the hasher with more data
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Finalize and return the 32-byte digest
    pub fn finalize(self) -> [u8; DIGEST_SIZE] {
        self.0.finalize().into()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(hash(b"charter"), hash(b"charter"));
        assert_ne!(hash(b"charter"), hash(b"chartered"));
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut h = Hasher::new();
        h.update(b"hello ");
        h.update(b"world");
        assert_eq!(h.finalize(), hash(b"hello world"));
    }
}
