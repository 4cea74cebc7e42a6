//! Publication target selection
//!
//! Treasure map publication does not go to arbitrary peers: targets are the
//! directory's known peers ordered by XOR proximity of their address digest
//! to the hrac. The ordering depends only on the hrac and the peer set, so
//! the recipient can independently derive the same list and know where to
//! look for the map.

use charter_core::identifiers::POLICY_ID_LENGTH;
use charter_core::{hash, Hrac, Peer};

/// XOR distance between a peer's address digest and the hrac
fn proximity(peer: &Peer, hrac: &Hrac) -> [u8; POLICY_ID_LENGTH] {
    let digest = hash::hash(peer.address.as_bytes());
    let mut distance = [0u8; POLICY_ID_LENGTH];
    for (i, byte) in distance.iter_mut().enumerate() {
        *byte = digest[i] ^ hrac.as_bytes()[i];
    }
    distance
}

/// Order `peers` by proximity to `hrac`, closest first, truncated to
/// `max_targets` when set
pub fn publication_targets(
    mut peers: Vec<Peer>,
    hrac: &Hrac,
    max_targets: Option<usize>,
) -> Vec<Peer> {
    peers.sort_by_key(|peer| proximity(peer, hrac));
    if let Some(max) = max_targets {
        peers.truncate(max);
    }
    peers
}
