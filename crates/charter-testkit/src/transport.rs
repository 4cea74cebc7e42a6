//! Scriptable peer transport

use async_trait::async_trait;
use charter_core::{
    CharterError, Peer, PeerAddress, PeerTransport, Result, SignatureVerifier, Signer,
    TransportResponse,
};
use ed25519_dalek::{Signature, VerifyingKey};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Per-peer behavior for the mock transport
#[derive(Clone)]
pub enum ScriptedResponse {
    /// Accept: proposals get a valid acceptance signature with status 200,
    /// map deliveries get an empty 201
    Accept,
    /// Answer with the given status code and an empty body
    RejectWith(u16),
    /// Answer 402
    PaymentRequired,
    /// Fail at the transport level
    Unreachable,
    /// Delay, then behave like the inner script
    Delayed(Duration, Box<ScriptedResponse>),
}

/// A [`PeerTransport`] whose per-peer behavior is scripted
///
/// Peers are registered with their signing credential so an `Accept`
/// proposal response can carry a genuine signature over the received
/// arrangement bytes. Unscripted peers accept. The transport records every
/// request it sees.
pub struct MockPeerTransport {
    signers: HashMap<PeerAddress, Signer>,
    scripts: Mutex<HashMap<PeerAddress, ScriptedResponse>>,
    proposals_seen: Mutex<Vec<(PeerAddress, Vec<u8>)>>,
    maps_seen: Mutex<Vec<(PeerAddress, Vec<u8>)>>,
    observed_address: String,
}

impl MockPeerTransport {
    /// Transport over peers with their signing credentials
    pub fn new(signers: impl IntoIterator<Item = (PeerAddress, Signer)>) -> Self {
        Self {
            signers: signers.into_iter().collect(),
            scripts: Mutex::new(HashMap::new()),
            proposals_seen: Mutex::new(Vec::new()),
            maps_seen: Mutex::new(Vec::new()),
            observed_address: "192.0.2.1".to_string(),
        }
    }

    /// Script one peer's behavior
    pub fn script(&self, address: PeerAddress, response: ScriptedResponse) {
        self.scripts.lock().insert(address, response);
    }

    /// Set the address carried in accepting ping bodies
    pub fn set_observed_address(&mut self, address: impl Into<String>) {
        self.observed_address = address.into();
    }

    /// Every proposal the transport has carried
    pub fn proposals_seen(&self) -> Vec<(PeerAddress, Vec<u8>)> {
        self.proposals_seen.lock().clone()
    }

    /// Every map delivery the transport has carried
    pub fn maps_seen(&self) -> Vec<(PeerAddress, Vec<u8>)> {
        self.maps_seen.lock().clone()
    }

    fn script_for(&self, address: &PeerAddress) -> ScriptedResponse {
        self.scripts
            .lock()
            .get(address)
            .cloned()
            .unwrap_or(ScriptedResponse::Accept)
    }

    async fn resolve(
        &self,
        peer: &Peer,
        script: ScriptedResponse,
        accept: impl Fn(&Self, &Peer) -> TransportResponse + Send,
    ) -> Result<TransportResponse> {
        match script {
            ScriptedResponse::Accept => Ok(accept(self, peer)),
            ScriptedResponse::RejectWith(status) => Ok(TransportResponse {
                status,
                body: Vec::new(),
            }),
            ScriptedResponse::PaymentRequired => Ok(TransportResponse {
                status: 402,
                body: Vec::new(),
            }),
            ScriptedResponse::Unreachable => Err(CharterError::network(format!(
                "connection to {} refused",
                peer.address
            ))),
            ScriptedResponse::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                Box::pin(self.resolve(peer, *inner, accept)).await
            }
        }
    }
}

#[async_trait]
impl PeerTransport for MockPeerTransport {
    async fn propose_arrangement(
        &self,
        peer: &Peer,
        arrangement_bytes: &[u8],
    ) -> Result<TransportResponse> {
        self.proposals_seen
            .lock()
            .push((peer.address, arrangement_bytes.to_vec()));
        let bytes = arrangement_bytes.to_vec();
        self.resolve(peer, self.script_for(&peer.address), move |this, peer| {
            let body = this
                .signers
                .get(&peer.address)
                .map(|signer| signer.sign(&bytes).to_bytes().to_vec())
                .unwrap_or_default();
            TransportResponse { status: 200, body }
        })
        .await
    }

    async fn publish_treasure_map(
        &self,
        peer: &Peer,
        map_bytes: &[u8],
    ) -> Result<TransportResponse> {
        self.maps_seen.lock().push((peer.address, map_bytes.to_vec()));
        self.resolve(peer, self.script_for(&peer.address), |_, _| {
            TransportResponse {
                status: 201,
                body: Vec::new(),
            }
        })
        .await
    }

    async fn ping(&self, peer: &Peer) -> Result<TransportResponse> {
        self.resolve(peer, self.script_for(&peer.address), |this, _| {
            TransportResponse {
                status: 200,
                body: this.observed_address.clone().into_bytes(),
            }
        })
        .await
    }
}

/// Centralized address source returning a fixed answer
pub struct MockAddressSource(Option<String>);

impl MockAddressSource {
    /// A source that reports `address`
    pub fn answering(address: impl Into<String>) -> Self {
        Self(Some(address.into()))
    }

    /// A source that has no answer
    pub fn silent() -> Self {
        Self(None)
    }
}

#[async_trait]
impl charter_core::AddressSource for MockAddressSource {
    async fn observed_address(&self) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

/// A verifier that fails everything, for exercising the signature-check
/// failure path without forging bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectingVerifier;

impl SignatureVerifier for RejectingVerifier {
    fn verify(&self, _key: &VerifyingKey, _message: &[u8], _signature: &Signature) -> bool {
        false
    }
}
