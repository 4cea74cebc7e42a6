//! Core types for the charter policy-distribution engine
//!
//! This crate provides the fundamental building blocks shared by the dispatch
//! engine and the policy orchestration layer: peer and policy identifiers, the
//! unified error type, a single-algorithm hashing module, Ed25519 signing
//! helpers, and the capability traits through which the engine reaches the
//! outside world (peer directory, transport, payment, map construction).
//!
//! Everything network- or chain-shaped is behind a trait; this crate defines
//! the seams, not the plumbing.

pub mod capabilities;
pub mod errors;
pub mod hash;
pub mod identifiers;
pub mod signing;

pub use capabilities::{
    AddressSource, PaymentReceipt, PeerDirectory, PeerTransport, PolicyPayment, SignatureVerifier,
    StakeDirectory, TransportResponse, TreasureMapBuilder,
};
pub use errors::{CharterError, Result};
pub use identifiers::{Hrac, Peer, PeerAddress, PolicyId};
pub use signing::{ed25519_verify, signature_from_bytes, Ed25519Verifier, Signer};
