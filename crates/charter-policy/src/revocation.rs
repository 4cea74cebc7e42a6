//! Revocation material issued at enactment
//!
//! For every peer that accepted an arrangement, the publisher pre-signs a
//! revocation order so access can later be retracted without fresh key
//! material. The signed message is the digest of the hrac followed by the
//! peer's address.

use charter_core::{ed25519_verify, hash, Hrac, PeerAddress, Signer};
use ed25519_dalek::{Signature, VerifyingKey};
use std::collections::BTreeMap;

/// A single signed revocation order for one peer
#[derive(Debug, Clone)]
pub struct Revocation {
    /// The peer this order retracts access from
    pub address: PeerAddress,
    /// Digest of hrac and peer address; the signed message
    pub order: [u8; hash::DIGEST_SIZE],
    /// Publisher signature over the order
    pub signature: Signature,
}

impl Revocation {
    /// Sign a revocation order for `address` under `hrac`
    pub fn new(signer: &Signer, hrac: &Hrac, address: PeerAddress) -> Self {
        let order = Self::order_digest(hrac, &address);
        let signature = signer.sign(&order);
        Self {
            address,
            order,
            signature,
        }
    }

    /// Verify the order against the publisher's verifying key
    pub fn verify(&self, publisher_verifying_key: &VerifyingKey) -> bool {
        ed25519_verify(publisher_verifying_key, &self.order, &self.signature)
    }

    fn order_digest(hrac: &Hrac, address: &PeerAddress) -> [u8; hash::DIGEST_SIZE] {
        let mut hasher = hash::Hasher::new();
        hasher.update(hrac.as_bytes());
        hasher.update(address.as_bytes());
        hasher.finalize()
    }
}

/// One revocation order per accepted peer
#[derive(Debug, Clone)]
pub struct RevocationKit {
    revocations: BTreeMap<PeerAddress, Revocation>,
}

impl RevocationKit {
    /// Build the kit for the accepted peer set
    pub fn new(signer: &Signer, hrac: &Hrac, addresses: &[PeerAddress]) -> Self {
        let revocations = addresses
            .iter()
            .map(|address| (*address, Revocation::new(signer, hrac, *address)))
            .collect();
        Self { revocations }
    }

    /// The order for one peer, if that peer is in the kit
    pub fn get(&self, address: &PeerAddress) -> Option<&Revocation> {
        self.revocations.get(address)
    }

    /// Number of orders in the kit; equals the policy's `n`
    pub fn len(&self) -> usize {
        self.revocations.len()
    }

    /// Whether the kit is empty
    pub fn is_empty(&self) -> bool {
        self.revocations.is_empty()
    }

    /// Iterate over all orders
    pub fn iter(&self) -> impl Iterator<Item = &Revocation> {
        self.revocations.values()
    }
}
