//! Treasure map publication: early release, quorum checks, failure classes

use assert_matches::assert_matches;
use charter_core::{CharterError, Peer, PeerAddress};
use charter_policy::{PublicationConfig, TreasureMapPublisher};
use charter_testkit::{peer_fixtures, MockPeerTransport, PeerFixture, ScriptedResponse};
use std::sync::Arc;
use std::time::Duration;

const MAP: &[u8] = b"enc:the-map";

fn targets(fixtures: &[PeerFixture]) -> Vec<Peer> {
    fixtures.iter().map(|f| f.peer.clone()).collect()
}

fn transport(fixtures: &[PeerFixture]) -> Arc<MockPeerTransport> {
    Arc::new(MockPeerTransport::new(
        fixtures.iter().map(|f| (f.address(), f.signer.clone())),
    ))
}

fn config(percent: u32) -> PublicationConfig {
    PublicationConfig {
        percent_to_complete_before_release: percent,
        threadpool_size: 32,
        timeout: Duration::from_secs(2),
        min_known_peers: 1,
        directory_deadline: Duration::from_secs(1),
        max_targets: None,
    }
}

#[tokio::test]
async fn test_blocking_call_releases_at_partial_quorum() {
    let fixtures = peer_fixtures(20);
    let transport = transport(&fixtures);
    // Deliveries complete at staggered times; the quorum of one must
    // release the caller long before the slowest peers finish.
    for (i, fixture) in fixtures.iter().enumerate() {
        transport.script(
            fixture.address(),
            ScriptedResponse::Delayed(
                Duration::from_millis(10 + 40 * i as u64),
                Box::new(ScriptedResponse::Accept),
            ),
        );
    }

    let publisher =
        TreasureMapPublisher::new(MAP.to_vec(), targets(&fixtures), transport.clone(), &config(5));
    assert_eq!(publisher.total(), 20);
    assert_eq!(publisher.quorum(), 1);

    publisher.start().unwrap();
    let completed = publisher
        .block_until_success_is_reasonably_likely()
        .await
        .unwrap();
    assert!(!completed.is_empty());
    assert!(completed.len() < 20);

    // The detached continuation finishes the rest.
    publisher.block_until_complete().await;
    assert_eq!(publisher.completed().len(), 20);
    assert_eq!(transport.maps_seen().len(), 20);
}

#[tokio::test]
async fn test_quorum_rounds_up() {
    let fixtures = peer_fixtures(30);
    let publisher = TreasureMapPublisher::new(
        MAP.to_vec(),
        targets(&fixtures),
        transport(&fixtures),
        &config(5),
    );
    // 5% of 30 is 1.5, which rounds up to 2 deliveries.
    assert_eq!(publisher.quorum(), 2);
}

#[tokio::test]
async fn test_payment_required_response_surfaces_as_unpaid() {
    let fixtures = peer_fixtures(4);
    let transport = transport(&fixtures);
    transport.script(fixtures[0].address(), ScriptedResponse::PaymentRequired);

    let publisher = TreasureMapPublisher::new(
        MAP.to_vec(),
        targets(&fixtures),
        transport,
        &config(100),
    );
    publisher.start().unwrap();
    let error = publisher
        .block_until_success_is_reasonably_likely()
        .await
        .unwrap_err();
    assert_matches!(error, CharterError::Unpaid);
}

#[tokio::test]
async fn test_rejecting_peer_surfaces_in_enactment_report() {
    let fixtures = peer_fixtures(4);
    let transport = transport(&fixtures);
    let rejecting = fixtures[2].address();
    transport.script(rejecting, ScriptedResponse::RejectWith(500));

    let publisher = TreasureMapPublisher::new(
        MAP.to_vec(),
        targets(&fixtures),
        transport,
        &config(100),
    );
    publisher.start().unwrap();
    let error = publisher
        .block_until_success_is_reasonably_likely()
        .await
        .unwrap_err();
    assert_matches!(error, CharterError::Enactment { report } => {
        assert!(report.contains(&rejecting.to_string()));
        assert!(report.contains("status 500"));
    });
}

#[tokio::test]
async fn test_unreachable_targets_land_in_the_failed_snapshot() {
    let fixtures = peer_fixtures(6);
    let transport = transport(&fixtures);
    let down: Vec<PeerAddress> = fixtures[..2].iter().map(PeerFixture::address).collect();
    for address in &down {
        transport.script(*address, ScriptedResponse::Unreachable);
    }

    // Quorum of the four reachable peers; the two unreachable targets are
    // transport failures, not completed deliveries.
    let publisher = TreasureMapPublisher::new(
        MAP.to_vec(),
        targets(&fixtures),
        transport,
        &config(60),
    );
    publisher.start().unwrap();
    let completed = publisher
        .block_until_success_is_reasonably_likely()
        .await
        .unwrap();
    assert!(completed.len() >= 4);

    publisher.block_until_complete().await;
    assert_eq!(publisher.completed().len(), 4);
    let failed = publisher.failed();
    assert_eq!(failed.len(), 2);
    for address in &down {
        assert!(failed.contains_key(address));
    }
}

#[tokio::test]
async fn test_publication_cannot_start_twice() {
    let fixtures = peer_fixtures(3);
    let publisher = TreasureMapPublisher::new(
        MAP.to_vec(),
        targets(&fixtures),
        transport(&fixtures),
        &config(100),
    );
    publisher.start().unwrap();
    assert!(publisher.start().is_err());
    publisher.block_until_complete().await;
}
