//! Ed25519 signing helpers and the verification capability
//!
//! A `Signer` wraps a signing key with its derived verifying key; the
//! `SignatureVerifier` capability lives in [`crate::capabilities`], and this
//! module provides the default [`Ed25519Verifier`] implementation plus a
//! free-standing verification helper.

use crate::{CharterError, Result};
use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};

/// An Ed25519 signing credential with its verifying half
#[derive(Clone)]
pub struct Signer {
    signing_key: SigningKey,
}

impl Signer {
    /// Wrap an existing signing key
    pub fn new(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    /// Deterministic signer from a 32-byte seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::new(SigningKey::from_bytes(&seed))
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// The verifying key matching this signer
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        write!(f, "Signer({:?})", self.signing_key.verifying_key())
    }
}

/// Verify an Ed25519 signature over a message
pub fn ed25519_verify(
    key: &VerifyingKey,
    message: &[u8],
    signature: &Signature,
) -> bool {
    key.verify_strict(message, signature).is_ok()
}

/// Parse a 64-byte signature from raw bytes
pub fn signature_from_bytes(bytes: &[u8]) -> Result<Signature> {
    let bytes: [u8; 64] = bytes
        .try_into()
        .map_err(|_| CharterError::crypto("signature must be 64 bytes"))?;
    Ok(Signature::from_bytes(&bytes))
}

/// Default [`crate::SignatureVerifier`] backed by plain Ed25519 verification
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;
