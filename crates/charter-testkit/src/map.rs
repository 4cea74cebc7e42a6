//! Deterministic stand-in for treasure map construction

use charter_core::{Hrac, PeerAddress, Result, Signer, TreasureMapBuilder};
use ed25519_dalek::VerifyingKey;

/// Map builder producing deterministic, inspectable bytes
///
/// The output is not a real map format; it is stable concatenation so tests
/// can assert that the right assignments and threshold went in and that the
/// "encryption" bound the recipient key.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockMapBuilder;

impl TreasureMapBuilder for MockMapBuilder {
    fn build(
        &self,
        hrac: &Hrac,
        assignments: &[(PeerAddress, Vec<u8>)],
        threshold: usize,
    ) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"map:");
        bytes.extend_from_slice(hrac.as_bytes());
        bytes.push(threshold as u8);
        for (address, payload) in assignments {
            bytes.extend_from_slice(address.as_bytes());
            bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            bytes.extend_from_slice(payload);
        }
        Ok(bytes)
    }

    fn encrypt(
        &self,
        map_bytes: &[u8],
        recipient_key: &VerifyingKey,
        blockchain_signer: Option<&Signer>,
    ) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"enc:");
        bytes.extend_from_slice(recipient_key.as_bytes());
        if let Some(signer) = blockchain_signer {
            bytes.extend_from_slice(&signer.sign(map_bytes).to_bytes());
        }
        bytes.extend_from_slice(map_bytes);
        Ok(bytes)
    }
}
