//! External address discovery fallback chain

use assert_matches::assert_matches;
use charter_core::CharterError;
use charter_policy::networking::AddressDiscovery;
use charter_testkit::{
    peer_fixtures, MockAddressSource, MockPeerDirectory, MockPeerTransport, PeerFixture,
    ScriptedResponse,
};
use std::sync::Arc;

fn network(count: usize) -> (Vec<PeerFixture>, Arc<MockPeerDirectory>, Arc<MockPeerTransport>) {
    let fixtures = peer_fixtures(count);
    let directory = Arc::new(MockPeerDirectory::new(
        fixtures.iter().map(|f| f.peer.clone()).collect(),
    ));
    let transport = Arc::new(MockPeerTransport::new(
        fixtures.iter().map(|f| (f.address(), f.signer.clone())),
    ));
    (fixtures, directory, transport)
}

fn down(transport: &MockPeerTransport, fixtures: &[PeerFixture]) {
    for fixture in fixtures {
        transport.script(fixture.address(), ScriptedResponse::Unreachable);
    }
}

#[tokio::test]
async fn test_known_peers_answer_first() {
    let (_, directory, transport) = network(5);
    let discovery = AddressDiscovery::new(directory, transport, None, None);
    let address = discovery.determine_external_address().await.unwrap();
    assert_eq!(address, "192.0.2.1");
}

#[tokio::test]
async fn test_default_peer_answers_when_known_peers_are_down() {
    let (fixtures, directory, transport) = network(5);
    down(&transport, &fixtures);

    // A default peer outside the directory, reachable through the same
    // transport. Unscripted peers accept.
    let fallback = peer_fixtures(6).pop().unwrap();
    let discovery = AddressDiscovery::new(directory, transport, Some(fallback.peer), None);
    let address = discovery.determine_external_address().await.unwrap();
    assert_eq!(address, "192.0.2.1");
}

#[tokio::test]
async fn test_centralized_source_is_the_last_resort() {
    let (fixtures, directory, transport) = network(5);
    down(&transport, &fixtures);

    let discovery = AddressDiscovery::new(
        directory,
        transport,
        None,
        Some(Arc::new(MockAddressSource::answering("203.0.113.9"))),
    );
    let address = discovery.determine_external_address().await.unwrap();
    assert_eq!(address, "203.0.113.9");
}

#[tokio::test]
async fn test_exhausted_cascade_is_a_network_error() {
    let (fixtures, directory, transport) = network(5);
    down(&transport, &fixtures);

    let discovery = AddressDiscovery::new(
        directory,
        transport,
        None,
        Some(Arc::new(MockAddressSource::silent())),
    );
    let error = discovery.determine_external_address().await.unwrap_err();
    assert_matches!(error, CharterError::Network { .. });
}
