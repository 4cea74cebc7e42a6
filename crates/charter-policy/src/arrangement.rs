//! Per-peer arrangement proposals
//!
//! An arrangement binds the publisher's verifying key to an expiration
//! timestamp. Its byte serialization is what a peer signs to accept, so it
//! must be deterministic: 32-byte key, then a u32 big-endian length prefix,
//! then the RFC 3339 expiration at second precision.

use charter_core::{CharterError, Result};
use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use ed25519_dalek::{Signature, VerifyingKey};

/// Immutable proposal artifact sent to each candidate peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrangement {
    publisher_verifying_key: VerifyingKey,
    expiration: DateTime<Utc>,
}

impl Arrangement {
    /// Create an arrangement, truncating the expiration to whole seconds so
    /// serialization round-trips exactly
    pub fn new(publisher_verifying_key: VerifyingKey, expiration: DateTime<Utc>) -> Self {
        let expiration = expiration.with_nanosecond(0).unwrap_or(expiration);
        Self {
            publisher_verifying_key,
            expiration,
        }
    }

    /// The publisher key peers verify acceptance against
    pub fn publisher_verifying_key(&self) -> &VerifyingKey {
        &self.publisher_verifying_key
    }

    /// When the delegation lapses
    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }

    /// Deterministic serialization; these are the bytes peers sign
    pub fn to_bytes(&self) -> Vec<u8> {
        let expiration = self
            .expiration
            .to_rfc3339_opts(SecondsFormat::Secs, true)
            .into_bytes();
        let mut bytes =
            Vec::with_capacity(32 + 4 + expiration.len());
        bytes.extend_from_slice(self.publisher_verifying_key.as_bytes());
        bytes.extend_from_slice(&(expiration.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&expiration);
        bytes
    }

    /// Parse an arrangement back from its serialized form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 36 {
            return Err(CharterError::serialization(
                "arrangement too short for key and length prefix",
            ));
        }
        let key_bytes: [u8; 32] = bytes[..32]
            .try_into()
            .map_err(|_| CharterError::serialization("bad arrangement key field"))?;
        let publisher_verifying_key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| CharterError::crypto(format!("bad publisher key: {e}")))?;

        let len_bytes: [u8; 4] = bytes[32..36]
            .try_into()
            .map_err(|_| CharterError::serialization("bad arrangement length field"))?;
        let expiration_len = u32::from_be_bytes(len_bytes) as usize;
        let rest = &bytes[36..];
        if rest.len() != expiration_len {
            return Err(CharterError::serialization(format!(
                "arrangement expiration field is {} bytes, expected {expiration_len}",
                rest.len()
            )));
        }
        let expiration_str = std::str::from_utf8(rest)
            .map_err(|e| CharterError::serialization(format!("expiration not utf-8: {e}")))?;
        let expiration = DateTime::parse_from_rfc3339(expiration_str)
            .map_err(|e| CharterError::serialization(format!("bad expiration: {e}")))?
            .with_timezone(&Utc);

        Ok(Self {
            publisher_verifying_key,
            expiration,
        })
    }
}

/// One peer's accepted arrangement, with the acceptance signature already
/// verified against the arrangement bytes
#[derive(Debug, Clone)]
pub struct AcceptedArrangement {
    /// The accepting peer
    pub peer: charter_core::Peer,
    /// The arrangement the peer signed
    pub arrangement: Arrangement,
    /// The peer's acceptance signature
    pub signature: Signature,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use charter_core::Signer;
    use chrono::TimeZone;

    fn sample() -> Arrangement {
        let key = Signer::from_seed([3u8; 32]).verifying_key();
        let expiration = Utc.with_ymd_and_hms(2027, 1, 15, 12, 30, 0).unwrap();
        Arrangement::new(key, expiration)
    }

    #[test]
    fn test_round_trip() {
        let arrangement = sample();
        let parsed = Arrangement::from_bytes(&arrangement.to_bytes()).unwrap();
        assert_eq!(parsed, arrangement);
    }

    #[test]
    fn test_serialization_is_deterministic() {
        assert_eq!(sample().to_bytes(), sample().to_bytes());
    }

    #[test]
    fn test_subsecond_expirations_are_truncated() {
        let key = Signer::from_seed([3u8; 32]).verifying_key();
        let precise = Utc.with_ymd_and_hms(2027, 1, 15, 12, 30, 0).unwrap()
            + chrono::Duration::milliseconds(250);
        let arrangement = Arrangement::new(key, precise);
        let parsed = Arrangement::from_bytes(&arrangement.to_bytes()).unwrap();
        assert_eq!(parsed.expiration(), arrangement.expiration());
    }

    #[test]
    fn test_rejects_truncated_input() {
        let bytes = sample().to_bytes();
        assert_matches!(
            Arrangement::from_bytes(&bytes[..bytes.len() - 3]),
            Err(CharterError::Serialization { .. })
        );
        assert_matches!(
            Arrangement::from_bytes(&bytes[..10]),
            Err(CharterError::Serialization { .. })
        );
    }

    #[test]
    fn test_rejects_garbage_expiration() {
        let key = Signer::from_seed([3u8; 32]).verifying_key();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(key.as_bytes());
        bytes.extend_from_slice(&4u32.to_be_bytes());
        bytes.extend_from_slice(b"soon");
        assert_matches!(
            Arrangement::from_bytes(&bytes),
            Err(CharterError::Serialization { .. })
        );
    }
}
