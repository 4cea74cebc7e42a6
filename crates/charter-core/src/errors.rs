//! Unified error system for charter
//!
//! One error type covers both the ambient failure modes (invalid input,
//! network, crypto, serialization, internal) and the domain-level outcomes
//! of policy enactment (quorum shortfall, enactment failure, unpaid peers,
//! fee validation). Per-peer detail rides inside the variant payloads so a
//! caller can always tell which peers failed and how.

use crate::identifiers::PeerAddress;
use serde::{Deserialize, Serialize};

/// Unified error type for all charter operations
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum CharterError {
    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Description of the invalid input
        message: String,
    },

    /// Network or transport error
    #[error("Network error: {message}")]
    Network {
        /// Description of the network failure
        message: String,
    },

    /// Cryptographic operation failed
    #[error("Crypto error: {message}")]
    Crypto {
        /// Description of the cryptographic failure
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error
        message: String,
    },

    /// The proposal quorum could not be reached
    #[error("Not enough peers: {} accepted, {} rejected", accepted.len(), rejected.len())]
    NotEnoughPeers {
        /// Peers that accepted an arrangement before the shortfall
        accepted: Vec<PeerAddress>,
        /// Peers that rejected or failed, with the per-peer reason
        rejected: Vec<(PeerAddress, String)>,
    },

    /// An enactment side effect failed, or a publication quorum completed
    /// with responses that were not uniformly accepting
    #[error("Enactment failed:\n{report}")]
    Enactment {
        /// Per-peer status report
        report: String,
    },

    /// A publication target reported that the policy is unpaid
    #[error("A peer expected policy payment but found none")]
    Unpaid,

    /// A blocking wait exceeded its deadline before reaching its target
    #[error("Timed out: {message}")]
    TimedOut {
        /// Description of the wait that expired
        message: String,
    },

    /// The candidate supply was exhausted before the target was reached
    #[error("Out of values: {message}")]
    OutOfValues {
        /// Description of the exhausted supply
        message: String,
    },

    /// Fee arithmetic validation failed (remainders are rejected, never rounded)
    #[error("Invalid policy value: {message}")]
    InvalidPolicyValue {
        /// Description of the failed validation
        message: String,
    },
}

impl CharterError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::TimedOut {
            message: message.into(),
        }
    }

    /// Create an out-of-values error
    pub fn out_of_values(message: impl Into<String>) -> Self {
        Self::OutOfValues {
            message: message.into(),
        }
    }

    /// Create a fee validation error
    pub fn invalid_policy_value(message: impl Into<String>) -> Self {
        Self::InvalidPolicyValue {
            message: message.into(),
        }
    }
}

/// Result alias used across all charter crates
pub type Result<T> = std::result::Result<T, CharterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_helpers_set_message() {
        let err = CharterError::network("peer unreachable");
        assert_eq!(err.to_string(), "Network error: peer unreachable");
    }

    #[test]
    fn test_not_enough_peers_counts_in_display() {
        let err = CharterError::NotEnoughPeers {
            accepted: vec![PeerAddress::from_bytes([1u8; 20])],
            rejected: vec![
                (PeerAddress::from_bytes([2u8; 20]), "status 400".into()),
                (PeerAddress::from_bytes([3u8; 20]), "unreachable".into()),
            ],
        };
        assert_eq!(err.to_string(), "Not enough peers: 1 accepted, 2 rejected");
    }
}
