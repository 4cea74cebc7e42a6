//! Test doubles for the charter capability surface
//!
//! Programmable mocks for every capability trait, plus deterministic
//! fixture builders for peers and credentials. Everything here is
//! scriptable per peer so tests can model mixed networks: some peers
//! accepting, some rejecting with a specific status, some unreachable,
//! some slow.

pub mod chain;
pub mod directory;
pub mod fixtures;
pub mod map;
pub mod transport;

pub use chain::{MockPaymentProvider, MockStakeDirectory, SubmittedPolicy};
pub use directory::MockPeerDirectory;
pub use fixtures::{peer_fixtures, publisher_signer, recipient_signer, PeerFixture};
pub use map::MockMapBuilder;
pub use transport::{MockAddressSource, MockPeerTransport, RejectingVerifier, ScriptedResponse};

/// Opt-in tracing output for a test run
///
/// Respects `RUST_LOG`; safe to call from several tests, only the first
/// call installs the subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
