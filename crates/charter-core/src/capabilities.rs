//! Capability traits through which the engine reaches its collaborators
//!
//! The orchestration core never talks to a socket, a chain, or a cipher
//! directly. Each external concern is a trait here; the surrounding
//! application (or the testkit) supplies implementations. Transport-level
//! failure is an `Err`; an application-level rejection is an `Ok` response
//! carrying a non-accepting status code. The two are distinct failure
//! classes throughout the orchestration layer.

use crate::identifiers::{Hrac, Peer, PeerAddress};
use crate::signing::{Ed25519Verifier, Signer};
use crate::{ed25519_verify, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, VerifyingKey};
use std::sync::Arc;
use std::time::Duration;

/// HTTP-shaped response from a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// Status code; 200/201 mean accepted, 402 means payment required
    pub status: u16,
    /// Response body
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Whether the peer accepted the request at the application level
    pub fn is_accepted(&self) -> bool {
        matches!(self.status, 200 | 201)
    }

    /// Whether the peer demanded payment
    pub fn is_payment_required(&self) -> bool {
        self.status == 402
    }
}

/// Receipt for a submitted on-chain policy payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    /// Hash of the submitted transaction
    pub transaction_hash: [u8; 32],
}

/// Membership view over the peer network
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    /// All currently known peers
    async fn known_peers(&self) -> Vec<Peer>;

    /// Look up one peer by address
    async fn get(&self, address: &PeerAddress) -> Option<Peer>;

    /// Block until at least `min` peers are known
    ///
    /// With `eager` set the directory refreshes its view actively instead of
    /// waiting for gossip to arrive. Fails with a network error if `deadline`
    /// elapses first.
    async fn block_until_peers_known(
        &self,
        min: usize,
        eager: bool,
        deadline: Duration,
    ) -> Result<()>;
}

/// Request/response transport to individual peers
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Propose an arrangement to a peer
    async fn propose_arrangement(
        &self,
        peer: &Peer,
        arrangement_bytes: &[u8],
    ) -> Result<TransportResponse>;

    /// Deliver an encrypted treasure map to a peer
    async fn publish_treasure_map(
        &self,
        peer: &Peer,
        map_bytes: &[u8],
    ) -> Result<TransportResponse>;

    /// Liveness probe; an accepting response body carries the caller's
    /// address as the peer observed it
    async fn ping(&self, peer: &Peer) -> Result<TransportResponse>;
}

/// Signature verification seam
///
/// Pure and synchronous; a trait only so tests can inject verification
/// failures without forging key material.
pub trait SignatureVerifier: Send + Sync {
    /// Whether `signature` is a valid signature by `key` over `message`
    fn verify(&self, key: &VerifyingKey, message: &[u8], signature: &Signature) -> bool;
}

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, key: &VerifyingKey, message: &[u8], signature: &Signature) -> bool {
        ed25519_verify(key, message, signature)
    }
}

/// Treasure map construction and encryption
///
/// Pure from the engine's point of view: the engine supplies the accepted
/// peer assignments and the threshold, the builder produces opaque bytes.
pub trait TreasureMapBuilder: Send + Sync {
    /// Build the cleartext map binding each peer to its share payload
    fn build(
        &self,
        hrac: &Hrac,
        assignments: &[(PeerAddress, Vec<u8>)],
        threshold: usize,
    ) -> Result<Vec<u8>>;

    /// Encrypt a built map for the recipient, optionally co-signing with a
    /// transacting credential
    fn encrypt(
        &self,
        map_bytes: &[u8],
        recipient_key: &VerifyingKey,
        blockchain_signer: Option<&Signer>,
    ) -> Result<Vec<u8>>;
}

/// On-chain policy payment, consumed by the paid policy kind only
#[async_trait]
pub trait PolicyPayment: Send + Sync {
    /// Record the policy and its accepted peers on chain
    async fn submit_policy(
        &self,
        hrac: &Hrac,
        value: u64,
        expiration: DateTime<Utc>,
        peer_addresses: &[PeerAddress],
    ) -> Result<PaymentReceipt>;
}

/// Stake view for weighting candidate selection, paid kind only
#[async_trait]
pub trait StakeDirectory: Send + Sync {
    /// Peers with active stake over the next `payment_periods`, with their
    /// stake amounts
    async fn active_stakes(&self, payment_periods: u64) -> Result<Vec<(PeerAddress, u64)>>;
}

/// Fallback source for discovering this node's externally visible address
#[async_trait]
pub trait AddressSource: Send + Sync {
    /// The address this source observes for us, if it can tell
    async fn observed_address(&self) -> Result<Option<String>>;
}

#[async_trait]
impl<T: PeerDirectory + ?Sized> PeerDirectory for Arc<T> {
    async fn known_peers(&self) -> Vec<Peer> {
        (**self).known_peers().await
    }

    async fn get(&self, address: &PeerAddress) -> Option<Peer> {
        (**self).get(address).await
    }

    async fn block_until_peers_known(
        &self,
        min: usize,
        eager: bool,
        deadline: Duration,
    ) -> Result<()> {
        (**self).block_until_peers_known(min, eager, deadline).await
    }
}

#[async_trait]
impl<T: PeerTransport + ?Sized> PeerTransport for Arc<T> {
    async fn propose_arrangement(
        &self,
        peer: &Peer,
        arrangement_bytes: &[u8],
    ) -> Result<TransportResponse> {
        (**self).propose_arrangement(peer, arrangement_bytes).await
    }

    async fn publish_treasure_map(
        &self,
        peer: &Peer,
        map_bytes: &[u8],
    ) -> Result<TransportResponse> {
        (**self).publish_treasure_map(peer, map_bytes).await
    }

    async fn ping(&self, peer: &Peer) -> Result<TransportResponse> {
        (**self).ping(peer).await
    }
}
