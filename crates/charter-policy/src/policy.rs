//! Policy construction and enactment
//!
//! The policy lifecycle runs Draft → proposing arrangements → enacting →
//! building the map → publishing, and it is one-way: [`Policy::enact`]
//! consumes the policy, so a failed enactment cannot be resumed — the
//! caller reconstructs and retries. Accepted arrangements are never rolled
//! back on failure; peers expire unused arrangements on their own.
//!
//! The open/paid split is a kind tag dispatched in match arms: the kind
//! decides how the candidate reservoir is built, whether a payment
//! transaction is submitted at enactment, how a share is wrapped into its
//! enactment payload, and which credential co-signs the encrypted map.

use crate::arrangement::{AcceptedArrangement, Arrangement};
use crate::publisher::{PublicationConfig, TreasureMapPublisher};
use crate::revocation::RevocationKit;
use crate::selection;
use async_trait::async_trait;
use charter_core::{
    CharterError, Hrac, PeerAddress, PeerDirectory, PeerTransport, PolicyId, Result,
    SignatureVerifier, Signer, TreasureMapBuilder,
};
use charter_dispatch::{
    DispatchWorker, MergedReservoir, PoolConfig, PoolError, PrefetchStrategy, Reservoir,
    WorkerPool,
};
use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// One opaque key-fragment share, already verified by the crypto layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share(Vec<u8>);

impl Share {
    /// Wrap verified share bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The raw share bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Fee terms for a paid policy
///
/// Exactly one of `value` or `rate` is supplied at generation; the other is
/// derived. Division remainders are validation failures, never rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaidTerms {
    /// Total policy value across all peers and periods
    pub value: u64,
    /// Per-peer, per-period fee rate
    pub rate: u64,
    /// Number of payment periods the policy spans
    pub payment_periods: u64,
}

impl PaidTerms {
    /// Derive complete terms from either a total value or a rate
    pub fn generate(
        n: u64,
        payment_periods: u64,
        value: Option<u64>,
        rate: Option<u64>,
    ) -> Result<Self> {
        if n == 0 {
            return Err(CharterError::invalid_policy_value(
                "policy requires at least one share",
            ));
        }
        if payment_periods == 0 {
            return Err(CharterError::invalid_policy_value(
                "payment duration must be at least one period",
            ));
        }
        match (value, rate) {
            (None, None) => {
                return Err(CharterError::invalid_policy_value(
                    "either value or rate must be provided",
                ));
            }
            (Some(v), Some(r)) if v != 0 && r != 0 => {
                return Err(CharterError::invalid_policy_value(format!(
                    "either value or rate must be provided, got value {v} and rate {r}"
                )));
            }
            _ => {}
        }

        let (value, rate) = if let Some(value) = value {
            let value_per_node = value / n;
            if value_per_node * n != value {
                return Err(CharterError::invalid_policy_value(format!(
                    "policy value {value} cannot be divided among {n} peers without a remainder"
                )));
            }
            let rate = value_per_node / payment_periods;
            if rate * payment_periods != value_per_node {
                return Err(CharterError::invalid_policy_value(format!(
                    "per-peer value {value_per_node} cannot be divided across \
                     {payment_periods} periods without a remainder"
                )));
            }
            (value, rate)
        } else {
            let rate = rate.unwrap_or(0);
            let value = rate
                .checked_mul(payment_periods)
                .and_then(|v| v.checked_mul(n))
                .ok_or_else(|| {
                    CharterError::invalid_policy_value("fee arithmetic overflow")
                })?;
            (value, rate)
        };

        Ok(Self {
            value,
            rate,
            payment_periods,
        })
    }

    /// Re-check that `value` divides evenly for `n` peers
    pub fn validate(&self, n: u64) -> Result<()> {
        if n == 0 {
            return Err(CharterError::invalid_policy_value(
                "policy requires at least one share",
            ));
        }
        let rate_per_period = self.value / n / self.payment_periods;
        let recalculated = rate_per_period * self.payment_periods * n;
        if recalculated != self.value {
            return Err(CharterError::invalid_policy_value(format!(
                "value {} cannot be divided into {n} peer payments per period for \
                 {} periods without a remainder",
                self.value, self.payment_periods
            )));
        }
        Ok(())
    }
}

/// The open/paid variant tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyKind {
    /// No on-chain side effects; candidates drawn uniformly from the
    /// peer directory
    Open,
    /// On-chain payment at enactment; candidates drawn stake-weighted
    Paid(PaidTerms),
}

impl PolicyKind {
    fn name(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Paid(_) => "paid",
        }
    }
}

/// Knobs for the arrangement proposal phase
#[derive(Debug, Clone)]
pub struct ProposalConfig {
    /// Deadline for the quorum wait
    pub timeout: Duration,
    /// Pause between proposal batches
    pub stagger_timeout: Duration,
    /// How long to wait for the directory to know enough peers
    pub directory_deadline: Duration,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            stagger_timeout: Duration::from_secs(1),
            directory_deadline: Duration::from_secs(10),
        }
    }
}

/// The capability bundle a policy enactment runs against
#[derive(Clone)]
pub struct PolicyContext {
    /// Peer membership view
    pub directory: Arc<dyn PeerDirectory>,
    /// Request transport to peers
    pub transport: Arc<dyn PeerTransport>,
    /// Acceptance signature verification
    pub verifier: Arc<dyn SignatureVerifier>,
    /// Treasure map construction and encryption
    pub map_builder: Arc<dyn TreasureMapBuilder>,
    /// On-chain payment; required for the paid kind only
    pub payment: Option<Arc<dyn charter_core::PolicyPayment>>,
    /// Stake view; required for the paid kind only
    pub stakes: Option<Arc<dyn charter_core::StakeDirectory>>,
    /// Credential that co-signs the encrypted map for the paid kind;
    /// defaults to the policy's publisher credential
    pub transacting_signer: Option<Signer>,
}

/// Caller-tunable enactment parameters
#[derive(Debug, Clone)]
pub struct EnactmentOptions {
    /// Peers to propose to first, before any sampling
    pub handpicked: Vec<PeerAddress>,
    /// Whether to start treasure map publication before returning
    pub publish_treasure_map: bool,
    /// Proposal phase configuration
    pub proposal: ProposalConfig,
    /// Publication phase configuration
    pub publication: PublicationConfig,
}

impl Default for EnactmentOptions {
    fn default() -> Self {
        Self {
            handpicked: Vec::new(),
            publish_treasure_map: true,
            proposal: ProposalConfig::default(),
            publication: PublicationConfig::default(),
        }
    }
}

struct ProposalWorker {
    directory: Arc<dyn PeerDirectory>,
    transport: Arc<dyn PeerTransport>,
    verifier: Arc<dyn SignatureVerifier>,
    arrangement: Arrangement,
    arrangement_bytes: Vec<u8>,
}

#[async_trait]
impl DispatchWorker<PeerAddress, AcceptedArrangement> for ProposalWorker {
    async fn dispatch(&self, address: PeerAddress) -> Result<AcceptedArrangement> {
        let peer = self
            .directory
            .get(&address)
            .await
            .ok_or_else(|| CharterError::network(format!("{address} is not known")))?;

        tracing::debug!(peer = %address, "proposing arrangement");
        let response = self
            .transport
            .propose_arrangement(&peer, &self.arrangement_bytes)
            .await?;
        if !response.is_accepted() {
            return Err(CharterError::network(format!(
                "proposing arrangement to {address} failed with status {}",
                response.status
            )));
        }

        // The peer accepted: its response body must be a valid signature
        // over the exact arrangement bytes we sent.
        let signature = charter_core::signature_from_bytes(&response.body)?;
        if !self
            .verifier
            .verify(&peer.verifying_key, &self.arrangement_bytes, &signature)
        {
            return Err(CharterError::crypto(format!(
                "acceptance signature from {address} failed verification"
            )));
        }

        tracing::debug!(peer = %address, "arrangement accepted");
        Ok(AcceptedArrangement {
            peer,
            arrangement: self.arrangement.clone(),
            signature,
        })
    }
}

/// An access-delegation edict awaiting enactment
pub struct Policy {
    publisher: Signer,
    recipient_key: VerifyingKey,
    label: Vec<u8>,
    expiration: DateTime<Utc>,
    shares: Vec<Share>,
    threshold: usize,
    public_key: Vec<u8>,
    kind: PolicyKind,
    hrac: Hrac,
    id: PolicyId,
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("label", &self.label)
            .field("expiration", &self.expiration)
            .field("threshold", &self.threshold)
            .field("n", &self.shares.len())
            .field("kind", &self.kind)
            .field("hrac", &self.hrac)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Policy {
    /// Construct a policy; `shares.len()` fixes `n`
    ///
    /// `public_key` is the aggregate delegation key produced by the
    /// key-splitting layer; it travels opaquely through enactment.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        publisher: Signer,
        recipient_key: VerifyingKey,
        label: Vec<u8>,
        expiration: DateTime<Utc>,
        shares: Vec<Share>,
        public_key: Vec<u8>,
        threshold: usize,
        kind: PolicyKind,
    ) -> Result<Self> {
        if shares.is_empty() {
            return Err(CharterError::invalid("policy requires at least one share"));
        }
        if threshold == 0 || threshold > shares.len() {
            return Err(CharterError::invalid(format!(
                "threshold {threshold} is outside 1..={}",
                shares.len()
            )));
        }
        if let PolicyKind::Paid(terms) = &kind {
            terms.validate(shares.len() as u64)?;
        }

        let hrac = Hrac::derive(&publisher.verifying_key(), &recipient_key, &label);
        let id = PolicyId::construct(&label, &recipient_key);
        Ok(Self {
            publisher,
            recipient_key,
            label,
            expiration,
            shares,
            threshold,
            public_key,
            kind,
            hrac,
            id,
        })
    }

    /// Number of shares, and therefore the proposal quorum
    pub fn n(&self) -> usize {
        self.shares.len()
    }

    /// Minimum shares needed to reconstruct the delegation
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// The policy-wide correlation id
    pub fn hrac(&self) -> Hrac {
        self.hrac
    }

    /// The derived policy id
    pub fn id(&self) -> PolicyId {
        self.id
    }

    /// The open/paid kind tag
    pub fn kind(&self) -> &PolicyKind {
        &self.kind
    }

    /// Build the candidate reservoir: handpicked addresses first, then the
    /// kind-specific sampled pool with handpicked overlap filtered out
    async fn make_reservoir(
        &self,
        ctx: &PolicyContext,
        handpicked: &[PeerAddress],
    ) -> Result<MergedReservoir<PeerAddress>> {
        let handpicked_set: HashSet<PeerAddress> = handpicked.iter().copied().collect();
        let sampled = match &self.kind {
            PolicyKind::Open => {
                let peers = ctx.directory.known_peers().await;
                Reservoir::uniform(
                    peers
                        .into_iter()
                        .map(|peer| peer.address)
                        .filter(|address| !handpicked_set.contains(address))
                        .collect(),
                )
            }
            PolicyKind::Paid(terms) => {
                let stakes = ctx.stakes.as_ref().ok_or_else(|| {
                    CharterError::invalid("paid policy requires a stake directory")
                })?;
                let active = stakes.active_stakes(terms.payment_periods).await?;
                Reservoir::weighted(
                    active
                        .into_iter()
                        .filter(|(address, _)| !handpicked_set.contains(address))
                        .collect(),
                )
            }
        };
        Ok(MergedReservoir::new(vec![
            Reservoir::fixed(handpicked.to_vec()),
            sampled,
        ]))
    }

    /// Solicit arrangements until exactly `n` peers accept
    async fn propose_arrangements(
        &self,
        ctx: &PolicyContext,
        options: &EnactmentOptions,
    ) -> Result<HashMap<PeerAddress, AcceptedArrangement>> {
        let n = self.n();
        ctx.directory
            .block_until_peers_known(n, true, options.proposal.directory_deadline)
            .await?;

        let arrangement = Arrangement::new(self.publisher.verifying_key(), self.expiration);
        let arrangement_bytes = arrangement.to_bytes();
        let worker = Arc::new(ProposalWorker {
            directory: ctx.directory.clone(),
            transport: ctx.transport.clone(),
            verifier: ctx.verifier.clone(),
            arrangement,
            arrangement_bytes,
        });

        let reservoir = self.make_reservoir(ctx, &options.handpicked).await?;
        let pool = WorkerPool::new(
            worker,
            Box::new(PrefetchStrategy::new(reservoir, n)),
            PoolConfig {
                target_successes: n,
                threadpool_size: n,
                stagger_timeout: options.proposal.stagger_timeout,
                timeout: Some(options.proposal.timeout),
            },
        );
        pool.start().map_err(CharterError::from)?;

        let outcome = pool.block_until_target_successes().await;
        let successes = match outcome {
            Ok(successes) => successes,
            // Quorum shortfall is judged below from the snapshot.
            Err(PoolError::TimedOut { .. } | PoolError::OutOfValues { .. }) => {
                pool.get_successes()
            }
            Err(other) => {
                pool.cancel();
                pool.join().await;
                return Err(other.into());
            }
        };

        // No leaked concurrent work, whatever the outcome.
        pool.cancel();
        pool.join().await;

        if successes.len() < n {
            let mut accepted: Vec<PeerAddress> = successes.keys().copied().collect();
            accepted.sort();
            let mut rejected: Vec<(PeerAddress, String)> = pool
                .get_failures()
                .into_iter()
                .map(|(address, error)| (address, error.to_string()))
                .collect();
            rejected.sort();
            tracing::warn!(
                kind = self.kind.name(),
                accepted = accepted.len(),
                rejected = rejected.len(),
                target = n,
                "could not find enough peers to accept proposals"
            );
            return Err(CharterError::NotEnoughPeers { accepted, rejected });
        }

        tracing::debug!(accepted = successes.len(), "finished proposing arrangements");
        Ok(successes)
    }

    /// Kind-specific enactment side effect
    async fn enact_arrangements(
        &self,
        ctx: &PolicyContext,
        addresses: &[PeerAddress],
    ) -> Result<()> {
        match &self.kind {
            PolicyKind::Open => Ok(()),
            PolicyKind::Paid(terms) => {
                let payment = ctx.payment.as_ref().ok_or_else(|| {
                    CharterError::invalid("paid policy requires a payment capability")
                })?;
                let receipt = payment
                    .submit_policy(&self.hrac, terms.value, self.expiration, addresses)
                    .await
                    .map_err(|e| CharterError::Enactment {
                        report: format!("payment submission failed: {e}"),
                    })?;
                tracing::info!(
                    policy = %self.id,
                    transaction = %hex::encode(receipt.transaction_hash),
                    "policy payment submitted"
                );
                Ok(())
            }
        }
    }

    /// Wrap one share into the payload a peer receives through the map
    fn enactment_payload(&self, share: &Share) -> Vec<u8> {
        match &self.kind {
            PolicyKind::Open => share.as_bytes().to_vec(),
            PolicyKind::Paid(_) => {
                let mut payload =
                    Vec::with_capacity(self.hrac.as_bytes().len() + share.as_bytes().len());
                payload.extend_from_slice(self.hrac.as_bytes());
                payload.extend_from_slice(share.as_bytes());
                payload
            }
        }
    }

    /// Enact the policy end to end
    ///
    /// Consumes the policy: enactment is not resumable after a failure.
    /// On success the returned [`EnactedPolicy`]'s publication may still be
    /// in progress when `publish_treasure_map` was requested.
    pub async fn enact(
        self,
        ctx: &PolicyContext,
        options: EnactmentOptions,
    ) -> Result<EnactedPolicy> {
        tracing::info!(
            policy = %self.id,
            hrac = %self.hrac,
            kind = self.kind.name(),
            n = self.n(),
            threshold = self.threshold,
            "proposing arrangements"
        );
        let arrangements = self.propose_arrangements(ctx, &options).await?;

        let mut addresses: Vec<PeerAddress> = arrangements.keys().copied().collect();
        addresses.sort();
        // A late success racing the quorum check can leave more than n
        // acceptances; only n peers receive shares.
        addresses.truncate(self.n());

        tracing::info!(policy = %self.id, "enacting policy");
        self.enact_arrangements(ctx, &addresses).await?;

        // Shares are assigned to accepted peers in address order, so any
        // party holding the accepted set reproduces the same assignment.
        let assignments: Vec<(PeerAddress, Vec<u8>)> = addresses
            .iter()
            .zip(self.shares.iter())
            .map(|(address, share)| (*address, self.enactment_payload(share)))
            .collect();

        tracing::info!(policy = %self.id, "building treasure map");
        let map = ctx
            .map_builder
            .build(&self.hrac, &assignments, self.threshold)?;
        let blockchain_signer = match &self.kind {
            PolicyKind::Open => None,
            PolicyKind::Paid(_) => {
                Some(ctx.transacting_signer.as_ref().unwrap_or(&self.publisher))
            }
        };
        let encrypted_map =
            ctx.map_builder
                .encrypt(&map, &self.recipient_key, blockchain_signer)?;

        let revocation_kit = RevocationKit::new(&self.publisher, &self.hrac, &addresses);

        ctx.directory
            .block_until_peers_known(
                options.publication.min_known_peers,
                true,
                options.publication.directory_deadline,
            )
            .await?;
        let targets = selection::publication_targets(
            ctx.directory.known_peers().await,
            &self.hrac,
            options.publication.max_targets,
        );
        let treasure_map_publisher = TreasureMapPublisher::new(
            encrypted_map.clone(),
            targets,
            ctx.transport.clone(),
            &options.publication,
        );

        let enacted = EnactedPolicy {
            id: self.id,
            hrac: self.hrac,
            label: self.label,
            public_key: self.public_key,
            threshold: self.threshold,
            n: addresses.len(),
            treasure_map: encrypted_map,
            treasure_map_publisher,
            revocation_kit,
            publisher_verifying_key: self.publisher.verifying_key(),
        };

        if options.publish_treasure_map {
            enacted.publish_treasure_map()?;
        }
        Ok(enacted)
    }
}

/// The terminal, immutable result of a successful enactment
#[derive(Debug)]
pub struct EnactedPolicy {
    /// The derived policy id
    pub id: PolicyId,
    /// The policy-wide correlation id
    pub hrac: Hrac,
    /// The resource label
    pub label: Vec<u8>,
    /// Aggregate delegation public key
    pub public_key: Vec<u8>,
    /// Minimum shares needed to reconstruct (m)
    pub threshold: usize,
    /// Shares issued (n)
    pub n: usize,
    /// The encrypted treasure map
    pub treasure_map: Vec<u8>,
    /// Handle to the ongoing or completed publication
    pub treasure_map_publisher: TreasureMapPublisher,
    /// Pre-signed revocation orders, one per accepted peer
    pub revocation_kit: RevocationKit,
    /// The publisher's verifying key
    pub publisher_verifying_key: VerifyingKey,
}

impl EnactedPolicy {
    /// Start treasure map publication
    pub fn publish_treasure_map(&self) -> Result<()> {
        self.treasure_map_publisher.start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    fn shares(n: usize) -> Vec<Share> {
        (0..n).map(|i| Share::new(vec![i as u8; 8])).collect()
    }

    fn sample_policy(label: &[u8]) -> Policy {
        Policy::new(
            Signer::from_seed([1u8; 32]),
            Signer::from_seed([2u8; 32]).verifying_key(),
            label.to_vec(),
            Utc.with_ymd_and_hms(2027, 6, 1, 0, 0, 0).unwrap(),
            shares(5),
            vec![0xaa; 33],
            3,
            PolicyKind::Open,
        )
        .unwrap()
    }

    #[test]
    fn test_identical_inputs_yield_identical_hrac() {
        assert_eq!(sample_policy(b"files").hrac(), sample_policy(b"files").hrac());
        assert_ne!(sample_policy(b"files").hrac(), sample_policy(b"mail").hrac());
    }

    #[test]
    fn test_threshold_must_fit_share_count() {
        let bad = Policy::new(
            Signer::from_seed([1u8; 32]),
            Signer::from_seed([2u8; 32]).verifying_key(),
            b"label".to_vec(),
            Utc.with_ymd_and_hms(2027, 6, 1, 0, 0, 0).unwrap(),
            shares(3),
            vec![],
            4,
            PolicyKind::Open,
        );
        assert_matches!(bad, Err(CharterError::Invalid { .. }));
    }

    #[test]
    fn test_paid_terms_from_rate() {
        let terms = PaidTerms::generate(5, 4, None, Some(10)).unwrap();
        assert_eq!(terms.rate, 10);
        assert_eq!(terms.value, 10 * 4 * 5);
    }

    #[test]
    fn test_paid_terms_from_value_with_remainder_errors() {
        // 101 does not divide across 5 peers.
        assert_matches!(
            PaidTerms::generate(5, 4, Some(101), None),
            Err(CharterError::InvalidPolicyValue { .. })
        );
        // 100 divides across 5 peers but 20-per-peer not across 3 periods.
        assert_matches!(
            PaidTerms::generate(5, 3, Some(100), None),
            Err(CharterError::InvalidPolicyValue { .. })
        );
    }

    #[test]
    fn test_paid_terms_require_exactly_one_of_value_and_rate() {
        assert_matches!(
            PaidTerms::generate(5, 4, None, None),
            Err(CharterError::InvalidPolicyValue { .. })
        );
        assert_matches!(
            PaidTerms::generate(5, 4, Some(200), Some(10)),
            Err(CharterError::InvalidPolicyValue { .. })
        );
        // A zero on either side is a legal minimum-fee policy.
        assert_matches!(PaidTerms::generate(5, 4, Some(0), None), Ok(_));
        assert_matches!(PaidTerms::generate(5, 4, None, Some(0)), Ok(_));
    }

    proptest::proptest! {
        /// Deriving value from rate and then rate back from value recovers
        /// the original rate exactly.
        #[test]
        fn prop_fee_round_trip(
            n in 1u64..100,
            payment_periods in 1u64..100,
            rate in 0u64..1_000_000,
        ) {
            let from_rate =
                PaidTerms::generate(n, payment_periods, None, Some(rate)).unwrap();
            let from_value =
                PaidTerms::generate(n, payment_periods, Some(from_rate.value), None)
                    .unwrap();
            proptest::prop_assert_eq!(from_value.rate, rate);
            proptest::prop_assert_eq!(from_value.value, from_rate.value);
        }
    }

    #[test]
    fn test_enactment_payload_is_kind_dispatched() {
        let open = sample_policy(b"label");
        let share = Share::new(vec![9, 9, 9]);
        assert_eq!(open.enactment_payload(&share), vec![9, 9, 9]);

        let terms = PaidTerms::generate(5, 4, None, Some(10)).unwrap();
        let paid = Policy::new(
            Signer::from_seed([1u8; 32]),
            Signer::from_seed([2u8; 32]).verifying_key(),
            b"label".to_vec(),
            Utc.with_ymd_and_hms(2027, 6, 1, 0, 0, 0).unwrap(),
            shares(5),
            vec![],
            3,
            PolicyKind::Paid(terms),
        )
        .unwrap();
        let payload = paid.enactment_payload(&share);
        assert_eq!(&payload[..16], paid.hrac().as_bytes());
        assert_eq!(&payload[16..], &[9, 9, 9]);
    }
}
