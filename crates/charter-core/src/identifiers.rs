//! Core identifier types for peers and policies
//!
//! Peers are identified by a 20-byte address; a policy is correlated across
//! the network by its `hrac` digest and addressed by a derived policy id.
//! All derivations are deterministic so that independent parties holding the
//! same inputs compute the same identifiers.

use crate::hash;
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length in bytes of a peer address
pub const ADDRESS_LENGTH: usize = 20;

/// Length in bytes of an hrac or policy id
pub const POLICY_ID_LENGTH: usize = 16;

/// Opaque 20-byte peer identifier
///
/// Displayed as `0x`-prefixed hex. Equality, ordering, and hashing are all
/// by the raw bytes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PeerAddress([u8; ADDRESS_LENGTH]);

impl PeerAddress {
    /// Create an address from raw bytes
    pub fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// The raw address bytes
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for PeerAddress {
    type Err = crate::CharterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped)
            .map_err(|e| crate::CharterError::invalid(format!("bad peer address hex: {e}")))?;
        let bytes: [u8; ADDRESS_LENGTH] = bytes.try_into().map_err(|_| {
            crate::CharterError::invalid(format!("peer address must be {ADDRESS_LENGTH} bytes"))
        })?;
        Ok(Self(bytes))
    }
}

/// A known peer: its address and the verifying key it signs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// The peer's network address
    pub address: PeerAddress,
    /// The peer's Ed25519 verifying key
    pub verifying_key: VerifyingKey,
}

/// Hashed resource authentication code
///
/// A 16-byte digest of the publisher's verifying key, the recipient's
/// verifying key, and the label. Both sides of a delegation can derive it
/// independently; peers receive it as the policy-wide correlation id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Hrac([u8; POLICY_ID_LENGTH]);

impl Hrac {
    /// Derive the hrac for a (publisher, recipient, label) triple
    pub fn derive(
        publisher_verifying_key: &VerifyingKey,
        recipient_verifying_key: &VerifyingKey,
        label: &[u8],
    ) -> Self {
        let mut hasher = hash::Hasher::new();
        hasher.update(publisher_verifying_key.as_bytes());
        hasher.update(recipient_verifying_key.as_bytes());
        hasher.update(label);
        let digest = hasher.finalize();
        let mut bytes = [0u8; POLICY_ID_LENGTH];
        bytes.copy_from_slice(&digest[..POLICY_ID_LENGTH]);
        Self(bytes)
    }

    /// The raw hrac bytes
    pub fn as_bytes(&self) -> &[u8; POLICY_ID_LENGTH] {
        &self.0
    }
}

impl fmt::Display for Hrac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hrac-{}", hex::encode(self.0))
    }
}

/// Policy identifier derived from the label and the recipient's key
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PolicyId([u8; POLICY_ID_LENGTH]);

impl PolicyId {
    /// Construct the policy id for a (label, recipient) pair
    pub fn construct(label: &[u8], recipient_verifying_key: &VerifyingKey) -> Self {
        let mut hasher = hash::Hasher::new();
        hasher.update(label);
        hasher.update(recipient_verifying_key.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; POLICY_ID_LENGTH];
        bytes.copy_from_slice(&digest[..POLICY_ID_LENGTH]);
        Self(bytes)
    }

    /// The raw policy id bytes
    pub fn as_bytes(&self) -> &[u8; POLICY_ID_LENGTH] {
        &self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "policy-{}", hex::encode(&self.0[..6]))
    }
}
