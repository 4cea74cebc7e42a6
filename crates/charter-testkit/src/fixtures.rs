//! Deterministic peer and credential fixtures
//!
//! Everything is derived from fixed seeds so tests are reproducible without
//! ambient randomness. A peer's address is the first 20 bytes of the digest
//! of its verifying key, the same shape a real deployment would use.

use charter_core::{hash, Peer, PeerAddress, Signer};

/// One generated peer with its signing credential
#[derive(Clone)]
pub struct PeerFixture {
    /// The peer as the directory sees it
    pub peer: Peer,
    /// The peer's signing credential, for scripting acceptance signatures
    pub signer: Signer,
}

impl PeerFixture {
    /// Shorthand for the peer's address
    pub fn address(&self) -> PeerAddress {
        self.peer.address
    }
}

/// Derive the address for a verifying key
pub fn address_for_key(key: &ed25519_dalek::VerifyingKey) -> PeerAddress {
    let digest = hash::hash(key.as_bytes());
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[..20]);
    PeerAddress::from_bytes(bytes)
}

/// Generate `count` deterministic peers
///
/// Seeds start at 100 to keep peer keys clearly apart from the publisher
/// and recipient fixtures.
pub fn peer_fixtures(count: usize) -> Vec<PeerFixture> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = 100;
            seed[1] = (i / 256) as u8;
            seed[2] = (i % 256) as u8;
            let signer = Signer::from_seed(seed);
            let verifying_key = signer.verifying_key();
            PeerFixture {
                peer: Peer {
                    address: address_for_key(&verifying_key),
                    verifying_key,
                },
                signer,
            }
        })
        .collect()
}

/// The standard publisher credential used across tests
pub fn publisher_signer() -> Signer {
    Signer::from_seed([1u8; 32])
}

/// The standard recipient credential used across tests
pub fn recipient_signer() -> Signer {
    Signer::from_seed([2u8; 32])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_are_deterministic_and_distinct() {
        let first = peer_fixtures(10);
        let second = peer_fixtures(10);
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.address(), b.address());
        }
        let mut addresses: Vec<_> = first.iter().map(PeerFixture::address).collect();
        addresses.sort();
        addresses.dedup();
        assert_eq!(addresses.len(), 10);
    }
}
