//! Treasure map publication with early release on partial quorum
//!
//! The publisher pushes the encrypted map to every target peer but lets the
//! caller unblock as soon as a configurable minority percentage of
//! deliveries complete; the rest keep running in a detached task and their
//! outcomes stay observable through the snapshot accessors.
//!
//! Two failure classes are kept apart deliberately: a peer that could not
//! be reached at all is a transport failure in the pool's tally, while a
//! peer that answered with a non-accepting status is a transport success
//! whose application-level status is inspected only at quorum time.

use charter_core::{CharterError, Peer, PeerAddress, PeerTransport, Result, TransportResponse};
use charter_dispatch::{AllAtOnceFactory, DispatchWorker, PoolConfig, WorkerPool};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for one publication attempt
#[derive(Debug, Clone)]
pub struct PublicationConfig {
    /// Percentage of targets that must complete before the blocking call
    /// may return
    pub percent_to_complete_before_release: u32,
    /// Maximum concurrent deliveries
    pub threadpool_size: usize,
    /// Deadline for the blocking quorum wait
    pub timeout: Duration,
    /// Minimum peers the directory must know before targets are selected
    pub min_known_peers: usize,
    /// How long to wait for the directory to reach `min_known_peers`
    pub directory_deadline: Duration,
    /// Cap on the number of publication targets; `None` publishes to every
    /// known peer in proximity order
    pub max_targets: Option<usize>,
}

impl Default for PublicationConfig {
    fn default() -> Self {
        Self {
            percent_to_complete_before_release: 5,
            threadpool_size: 120,
            timeout: Duration::from_secs(20),
            min_known_peers: 8,
            directory_deadline: Duration::from_secs(2),
            max_targets: None,
        }
    }
}

struct PublicationWorker {
    transport: Arc<dyn PeerTransport>,
    peers: HashMap<PeerAddress, Peer>,
    map_bytes: Vec<u8>,
}

#[async_trait]
impl DispatchWorker<PeerAddress, TransportResponse> for PublicationWorker {
    async fn dispatch(&self, address: PeerAddress) -> Result<TransportResponse> {
        let peer = self
            .peers
            .get(&address)
            .ok_or_else(|| CharterError::internal(format!("{address} missing from target set")))?;
        let response = self
            .transport
            .publish_treasure_map(peer, &self.map_bytes)
            .await?;
        if !response.is_accepted() {
            // Reachable but rejecting: still a completed delivery attempt.
            tracing::warn!(
                peer = %address,
                status = response.status,
                "treasure map delivery not accepted"
            );
        }
        Ok(response)
    }
}

/// Drives one publication attempt over a fixed target list
///
/// Single-use: construct, `start()`, then either wait on
/// [`TreasureMapPublisher::block_until_success_is_reasonably_likely`] or
/// observe the snapshots while the detached continuation finishes the run.
pub struct TreasureMapPublisher {
    pool: Arc<WorkerPool<PeerAddress, TransportResponse>>,
    total: usize,
    quorum: usize,
}

impl std::fmt::Debug for TreasureMapPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreasureMapPublisher")
            .field("total", &self.total)
            .field("quorum", &self.quorum)
            .finish_non_exhaustive()
    }
}

impl TreasureMapPublisher {
    /// Prepare a publication of `map_bytes` to `targets`
    pub fn new(
        map_bytes: Vec<u8>,
        targets: Vec<Peer>,
        transport: Arc<dyn PeerTransport>,
        config: &PublicationConfig,
    ) -> Self {
        let total = targets.len();
        let quorum =
            (total * config.percent_to_complete_before_release as usize).div_ceil(100);
        let addresses: Vec<PeerAddress> = targets.iter().map(|p| p.address).collect();
        let peers = targets.into_iter().map(|p| (p.address, p)).collect();

        let worker = Arc::new(PublicationWorker {
            transport,
            peers,
            map_bytes,
        });
        let pool = WorkerPool::new(
            worker,
            Box::new(AllAtOnceFactory::new(addresses)),
            PoolConfig {
                target_successes: quorum,
                threadpool_size: config.threadpool_size,
                stagger_timeout: Duration::ZERO,
                timeout: Some(config.timeout),
            },
        );

        Self {
            pool: Arc::new(pool),
            total,
            quorum,
        }
    }

    /// Total number of publication targets
    pub fn total(&self) -> usize {
        self.total
    }

    /// Deliveries that must complete before the blocking call may return
    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// Begin delivery and detach a continuation that drives the remaining
    /// deliveries to completion after the quorum wait returns
    pub fn start(&self) -> Result<()> {
        tracing::info!(
            targets = self.total,
            quorum = self.quorum,
            "treasure map publication starting"
        );
        self.pool.start().map_err(CharterError::from)?;
        let pool = self.pool.clone();
        tokio::spawn(async move {
            pool.join().await;
            tracing::debug!("treasure map publication complete");
        });
        Ok(())
    }

    /// Block until the minimum quorum of deliveries complete, then check
    /// the application-level status of every completed delivery
    ///
    /// All accepted: returns the completed set. Any 402: [`CharterError::Unpaid`].
    /// Any other rejection: [`CharterError::Enactment`] with the per-peer
    /// status report. Deliveries completing after this check are not
    /// re-inspected.
    pub async fn block_until_success_is_reasonably_likely(
        &self,
    ) -> Result<HashMap<PeerAddress, TransportResponse>> {
        self.pool
            .block_until_target_successes()
            .await
            .map_err(CharterError::from)?;

        let completed = self.pool.get_successes();
        tracing::debug!(
            completed = completed.len(),
            "minimal amount of target peers contacted for treasure map publication"
        );

        if completed.values().all(TransportResponse::is_accepted) {
            return Ok(completed);
        }
        if completed.values().any(TransportResponse::is_payment_required) {
            return Err(CharterError::Unpaid);
        }
        let mut lines: Vec<String> = completed
            .iter()
            .filter(|(_, response)| !response.is_accepted())
            .map(|(address, response)| format!("{address}: status {}", response.status))
            .collect();
        lines.sort();
        Err(CharterError::Enactment {
            report: lines.join("\n"),
        })
    }

    /// Snapshot of completed deliveries (transport-level successes)
    pub fn completed(&self) -> HashMap<PeerAddress, TransportResponse> {
        self.pool.get_successes()
    }

    /// Snapshot of unreachable targets
    pub fn failed(&self) -> HashMap<PeerAddress, CharterError> {
        self.pool.get_failures()
    }

    /// Wait for every delivery attempt to terminate
    pub async fn block_until_complete(&self) {
        self.pool.join().await;
    }

    /// Abort outstanding deliveries
    pub fn cancel(&self) {
        self.pool.cancel();
    }
}
