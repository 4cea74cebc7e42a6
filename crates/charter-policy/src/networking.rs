//! External address discovery
//!
//! A publisher that must advertise a reachable endpoint asks the network
//! what address it is seen under. Sources are consulted in order until one
//! answers: a small random sample of known peers, then a configured default
//! peer, then a centralized address source. Exhausting all sources is a
//! network error.

use charter_core::{
    AddressSource, CharterError, Peer, PeerDirectory, PeerTransport, Result,
};
use rand::seq::SliceRandom;
use std::sync::Arc;

/// How many known peers to sample before falling back
const PEER_SAMPLE_SIZE: usize = 3;

/// Cascading fallback chain for self-address detection
pub struct AddressDiscovery {
    directory: Arc<dyn PeerDirectory>,
    transport: Arc<dyn PeerTransport>,
    default_peer: Option<Peer>,
    fallback: Option<Arc<dyn AddressSource>>,
}

impl AddressDiscovery {
    /// Assemble the cascade; either fallback stage may be absent
    pub fn new(
        directory: Arc<dyn PeerDirectory>,
        transport: Arc<dyn PeerTransport>,
        default_peer: Option<Peer>,
        fallback: Option<Arc<dyn AddressSource>>,
    ) -> Self {
        Self {
            directory,
            transport,
            default_peer,
            fallback,
        }
    }

    /// Determine this node's externally visible address
    pub async fn determine_external_address(&self) -> Result<String> {
        if let Some(address) = self.ask_known_peers().await {
            return Ok(address);
        }
        if let Some(peer) = &self.default_peer {
            if let Some(address) = self.ask_peer(peer).await {
                tracing::debug!(peer = %peer.address, "external address from default peer");
                return Ok(address);
            }
        }
        if let Some(source) = &self.fallback {
            if let Some(address) = source.observed_address().await? {
                tracing::debug!("external address from centralized source");
                return Ok(address);
            }
        }
        Err(CharterError::network("external address detection failed"))
    }

    async fn ask_known_peers(&self) -> Option<String> {
        let mut peers = self.directory.known_peers().await;
        peers.shuffle(&mut rand::thread_rng());
        for peer in peers.iter().take(PEER_SAMPLE_SIZE) {
            if let Some(address) = self.ask_peer(peer).await {
                tracing::debug!(peer = %peer.address, "external address from known peer");
                return Some(address);
            }
        }
        None
    }

    async fn ask_peer(&self, peer: &Peer) -> Option<String> {
        match self.transport.ping(peer).await {
            Ok(response) if response.is_accepted() => {
                String::from_utf8(response.body).ok().filter(|s| !s.is_empty())
            }
            Ok(_) | Err(_) => None,
        }
    }
}
