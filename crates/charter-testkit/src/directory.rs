//! In-memory peer directory

use async_trait::async_trait;
use charter_core::{CharterError, Peer, PeerAddress, PeerDirectory, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Peer directory backed by a mutable in-memory map
///
/// `block_until_peers_known` polls the map, so a test can add peers from
/// another task to exercise the waiting path.
pub struct MockPeerDirectory {
    peers: Mutex<HashMap<PeerAddress, Peer>>,
}

impl MockPeerDirectory {
    /// Directory pre-populated with `peers`
    pub fn new(peers: Vec<Peer>) -> Self {
        Self {
            peers: Mutex::new(peers.into_iter().map(|p| (p.address, p)).collect()),
        }
    }

    /// Add a peer after construction
    pub fn insert(&self, peer: Peer) {
        self.peers.lock().insert(peer.address, peer);
    }

    /// Remove a peer, simulating churn
    pub fn remove(&self, address: &PeerAddress) {
        self.peers.lock().remove(address);
    }
}

#[async_trait]
impl PeerDirectory for MockPeerDirectory {
    async fn known_peers(&self) -> Vec<Peer> {
        self.peers.lock().values().cloned().collect()
    }

    async fn get(&self, address: &PeerAddress) -> Option<Peer> {
        self.peers.lock().get(address).cloned()
    }

    async fn block_until_peers_known(
        &self,
        min: usize,
        _eager: bool,
        deadline: Duration,
    ) -> Result<()> {
        let started = Instant::now();
        loop {
            let known = self.peers.lock().len();
            if known >= min {
                return Ok(());
            }
            if started.elapsed() >= deadline {
                return Err(CharterError::network(format!(
                    "directory knows {known} peers, needed {min}"
                )));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
