//! Mock payment and stake capabilities

use async_trait::async_trait;
use charter_core::{
    hash, CharterError, Hrac, PaymentReceipt, PeerAddress, PolicyPayment, Result,
    StakeDirectory,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// One recorded payment submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedPolicy {
    /// The policy's correlation id
    pub hrac: Hrac,
    /// Total policy value
    pub value: u64,
    /// Policy expiration
    pub expiration: DateTime<Utc>,
    /// Accepted peer addresses recorded on chain
    pub addresses: Vec<PeerAddress>,
}

/// Payment provider that records submissions instead of transacting
///
/// Set `fail` to exercise the enactment failure path.
#[derive(Default)]
pub struct MockPaymentProvider {
    submissions: Mutex<Vec<SubmittedPolicy>>,
    fail: bool,
}

impl MockPaymentProvider {
    /// A provider that accepts every submission
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider whose submissions all fail
    pub fn failing() -> Self {
        Self {
            submissions: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Every submission seen so far
    pub fn submissions(&self) -> Vec<SubmittedPolicy> {
        self.submissions.lock().clone()
    }
}

#[async_trait]
impl PolicyPayment for MockPaymentProvider {
    async fn submit_policy(
        &self,
        hrac: &Hrac,
        value: u64,
        expiration: DateTime<Utc>,
        peer_addresses: &[PeerAddress],
    ) -> Result<PaymentReceipt> {
        if self.fail {
            return Err(CharterError::network("transaction reverted"));
        }
        self.submissions.lock().push(SubmittedPolicy {
            hrac: *hrac,
            value,
            expiration,
            addresses: peer_addresses.to_vec(),
        });
        Ok(PaymentReceipt {
            transaction_hash: hash::hash(hrac.as_bytes()),
        })
    }
}

/// Stake directory over a fixed stake table
pub struct MockStakeDirectory {
    stakes: Vec<(PeerAddress, u64)>,
}

impl MockStakeDirectory {
    /// Directory reporting exactly `stakes`
    pub fn new(stakes: Vec<(PeerAddress, u64)>) -> Self {
        Self { stakes }
    }
}

#[async_trait]
impl StakeDirectory for MockStakeDirectory {
    async fn active_stakes(&self, _payment_periods: u64) -> Result<Vec<(PeerAddress, u64)>> {
        Ok(self.stakes.clone())
    }
}
