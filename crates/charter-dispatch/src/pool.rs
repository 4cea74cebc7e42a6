//! Quorum-bounded concurrent worker pool
//!
//! A [`WorkerPool`] runs a caller-supplied operation over values pulled from
//! a [`crate::ValueFactory`], with bounded concurrency, until a target number
//! of successes is reached, the supply is exhausted, or the pool is
//! cancelled. One dispatch-loop task owns all scheduling; workers record
//! their outcome exactly once, and readers only ever see consistent
//! snapshots of the tallies.
//!
//! An operation's `Err` is recorded as that value's failure and never aborts
//! sibling dispatches. Application-level classification of an `Ok` outcome
//! (e.g. a non-accepting status code) is the caller's concern, not the
//! pool's.

use crate::factory::ValueFactory;
use async_trait::async_trait;
use charter_core::CharterError;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

/// The operation a pool runs against each dispatched value
#[async_trait]
pub trait DispatchWorker<V, O>: Send + Sync + 'static {
    /// Execute the operation for one value
    ///
    /// An `Err` marks the value as failed in the pool's tally; it carries
    /// whatever detail the caller needs to diagnose that peer later.
    async fn dispatch(&self, value: V) -> Result<O, CharterError>;
}

/// Configuration for one [`WorkerPool`] run
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Successes required before the blocking wait may return
    pub target_successes: usize,
    /// Maximum concurrently executing operations
    pub threadpool_size: usize,
    /// Pause between dispatch batches, to avoid synchronized bursts
    pub stagger_timeout: Duration,
    /// Deadline for the caller-facing blocking wait; `None` waits forever
    pub timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            target_successes: 1,
            threadpool_size: 8,
            stagger_timeout: Duration::ZERO,
            timeout: None,
        }
    }
}

/// Infrastructure-level pool failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// `start()` was called a second time
    #[error("worker pool already started")]
    AlreadyStarted,

    /// The blocking wait exceeded its deadline
    #[error("timed out with {successes}/{target} successes")]
    TimedOut {
        /// Successes recorded when the deadline elapsed
        successes: usize,
        /// The configured success target
        target: usize,
    },

    /// The value supply ran out before the target was reached
    #[error("out of values with {successes}/{target} successes")]
    OutOfValues {
        /// Successes recorded when the supply ended
        successes: usize,
        /// The configured success target
        target: usize,
    },

    /// A reservoir draw was attempted with nothing remaining
    #[error("reservoir exhausted")]
    Exhausted,
}

impl From<PoolError> for CharterError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::AlreadyStarted => CharterError::internal("worker pool already started"),
            PoolError::TimedOut { successes, target } => {
                CharterError::timed_out(format!("{successes}/{target} successes"))
            }
            PoolError::OutOfValues { successes, target } => {
                CharterError::out_of_values(format!("{successes}/{target} successes"))
            }
            PoolError::Exhausted => CharterError::out_of_values("reservoir exhausted"),
        }
    }
}

/// Live counters published through the progress channel
///
/// Updated inside the same critical section that mutates the tally maps, so
/// a reader combining the two can never observe a torn record.
#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    successes: usize,
    failures: usize,
    dispatched: usize,
    supply_exhausted: bool,
    quiescent: bool,
}

struct Tallies<V, O> {
    successes: HashMap<V, O>,
    failures: HashMap<V, CharterError>,
    dispatched: HashSet<V>,
}

struct Shared<V, O> {
    tallies: Mutex<Tallies<V, O>>,
    progress_tx: watch::Sender<Progress>,
}

impl<V, O> Shared<V, O>
where
    V: Clone + Eq + Hash,
    O: Clone,
{
    fn new() -> Self {
        Self {
            tallies: Mutex::new(Tallies {
                successes: HashMap::new(),
                failures: HashMap::new(),
                dispatched: HashSet::new(),
            }),
            progress_tx: watch::channel(Progress::default()).0,
        }
    }

    /// Mark a value as issued; false if it was already dispatched
    fn mark_dispatched(&self, value: &V) -> bool {
        let mut tallies = self.tallies.lock();
        if !tallies.dispatched.insert(value.clone()) {
            return false;
        }
        let dispatched = tallies.dispatched.len();
        self.progress_tx.send_modify(|p| p.dispatched = dispatched);
        true
    }

    /// Record a value's terminal outcome; exactly one record per value
    fn record(&self, value: V, outcome: Result<O, CharterError>) {
        let mut tallies = self.tallies.lock();
        debug_assert!(
            !tallies.successes.contains_key(&value) && !tallies.failures.contains_key(&value),
            "outcome recorded twice for one value"
        );
        match outcome {
            Ok(result) => {
                tallies.successes.insert(value, result);
            }
            Err(error) => {
                tallies.failures.insert(value, error);
            }
        }
        let (successes, failures) = (tallies.successes.len(), tallies.failures.len());
        self.progress_tx.send_modify(|p| {
            p.successes = successes;
            p.failures = failures;
        });
    }

    fn mark_supply_exhausted(&self) {
        let _tallies = self.tallies.lock();
        self.progress_tx.send_modify(|p| p.supply_exhausted = true);
    }

    fn mark_quiescent(&self) {
        let _tallies = self.tallies.lock();
        self.progress_tx.send_modify(|p| p.quiescent = true);
    }
}

/// Bounded concurrent executor with a success target
///
/// See the module docs for the dispatch algorithm. The pool is single-use:
/// `start()` once, then observe through [`WorkerPool::get_successes`],
/// [`WorkerPool::get_failures`],
/// [`WorkerPool::block_until_target_successes`], and [`WorkerPool::join`].
pub struct WorkerPool<V, O> {
    config: PoolConfig,
    shared: Arc<Shared<V, O>>,
    worker: Arc<dyn DispatchWorker<V, O>>,
    factory: Mutex<Option<Box<dyn ValueFactory<V>>>>,
    started: AtomicBool,
    cancel_tx: watch::Sender<bool>,
}

impl<V, O> WorkerPool<V, O>
where
    V: Clone + Eq + Hash + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    /// Build a pool over `worker` and `factory` with the given config
    pub fn new(
        worker: Arc<dyn DispatchWorker<V, O>>,
        factory: Box<dyn ValueFactory<V>>,
        config: PoolConfig,
    ) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::new()),
            worker,
            factory: Mutex::new(Some(factory)),
            started: AtomicBool::new(false),
            cancel_tx: watch::channel(false).0,
        }
    }

    /// The success target this pool was configured with
    pub fn target_successes(&self) -> usize {
        self.config.target_successes
    }

    /// Begin dispatching; non-blocking
    ///
    /// Errors with [`PoolError::AlreadyStarted`] on a second call.
    pub fn start(&self) -> Result<(), PoolError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(PoolError::AlreadyStarted);
        }
        let factory = self
            .factory
            .lock()
            .take()
            .ok_or(PoolError::AlreadyStarted)?;
        tokio::spawn(dispatch_loop(
            self.shared.clone(),
            self.worker.clone(),
            factory,
            self.config.clone(),
            self.cancel_tx.subscribe(),
        ));
        Ok(())
    }

    /// Snapshot of the successes recorded so far
    pub fn get_successes(&self) -> HashMap<V, O> {
        self.shared.tallies.lock().successes.clone()
    }

    /// Snapshot of the failures recorded so far
    pub fn get_failures(&self) -> HashMap<V, CharterError> {
        self.shared.tallies.lock().failures.clone()
    }

    /// Block until at least `target_successes` outcomes are successes
    ///
    /// Returns the success snapshot (at least target-sized) on success.
    /// Fails with [`PoolError::TimedOut`] when the configured deadline
    /// elapses first, or [`PoolError::OutOfValues`] when the supply is
    /// exhausted, every issued value has resolved, and the target is unmet.
    pub async fn block_until_target_successes(&self) -> Result<HashMap<V, O>, PoolError> {
        let target = self.config.target_successes;
        match self.config.timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.wait_for_target(target))
                .await
                .unwrap_or_else(|_| {
                    let successes = self.shared.tallies.lock().successes.len();
                    Err(PoolError::TimedOut { successes, target })
                }),
            None => self.wait_for_target(target).await,
        }
    }

    async fn wait_for_target(&self, target: usize) -> Result<HashMap<V, O>, PoolError> {
        let mut progress_rx = self.shared.progress_tx.subscribe();
        loop {
            let progress = *progress_rx.borrow_and_update();
            if progress.successes >= target {
                return Ok(self.get_successes());
            }
            let all_resolved =
                progress.dispatched == progress.successes + progress.failures;
            if (progress.supply_exhausted && all_resolved) || progress.quiescent {
                return Err(PoolError::OutOfValues {
                    successes: progress.successes,
                    target,
                });
            }
            if progress_rx.changed().await.is_err() {
                // Sender gone without quiescence; nothing more can arrive.
                return Err(PoolError::OutOfValues {
                    successes: progress.successes,
                    target,
                });
            }
        }
    }

    /// Request a best-effort abort of dispatch and in-flight operations
    ///
    /// Outcomes already recorded are kept; an operation that has returned
    /// records its outcome even if cancellation races it.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Block until the dispatch loop and all in-flight operations have
    /// fully terminated, whatever the cause; safe after `cancel()` and safe
    /// to call repeatedly
    pub async fn join(&self) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        let mut progress_rx = self.shared.progress_tx.subscribe();
        loop {
            if progress_rx.borrow_and_update().quiescent {
                return;
            }
            if progress_rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Resolves when cancellation is requested; pends forever otherwise
async fn cancel_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        // Channel closed without a cancel; let the other select arm win.
        std::future::pending::<()>().await;
    }
}

async fn dispatch_loop<V, O>(
    shared: Arc<Shared<V, O>>,
    worker: Arc<dyn DispatchWorker<V, O>>,
    mut factory: Box<dyn ValueFactory<V>>,
    config: PoolConfig,
    mut cancel_rx: watch::Receiver<bool>,
) where
    V: Clone + Eq + Hash + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    let semaphore = Arc::new(Semaphore::new(config.threadpool_size.max(1)));
    let mut tasks: JoinSet<()> = JoinSet::new();
    let mut progress_rx = shared.progress_tx.subscribe();
    let mut supply_exhausted = false;

    'produce: loop {
        if *cancel_rx.borrow() {
            break;
        }
        let progress = *progress_rx.borrow_and_update();
        if progress.successes >= config.target_successes {
            break;
        }

        match factory.next_batch(progress.successes, progress.failures) {
            None => {
                supply_exhausted = true;
                break;
            }
            Some(batch) if batch.is_empty() => {
                // Nothing to issue right now; wake on any tally change.
                tokio::select! {
                    _ = progress_rx.changed() => {}
                    () = cancel_requested(&mut cancel_rx) => break 'produce,
                }
                continue;
            }
            Some(batch) => {
                tracing::debug!(batch_size = batch.len(), "dispatching batch");
                for value in batch {
                    let permit = tokio::select! {
                        permit = semaphore.clone().acquire_owned() => {
                            match permit {
                                Ok(permit) => permit,
                                Err(_) => break 'produce,
                            }
                        }
                        () = cancel_requested(&mut cancel_rx) => break 'produce,
                    };
                    if !shared.mark_dispatched(&value) {
                        // A value is dispatched at most once.
                        continue;
                    }
                    tasks.spawn(run_one(
                        permit,
                        worker.clone(),
                        shared.clone(),
                        cancel_rx.clone(),
                        value,
                    ));
                }
            }
        }

        if !config.stagger_timeout.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(config.stagger_timeout) => {}
                () = cancel_requested(&mut cancel_rx) => break 'produce,
            }
        }
    }

    if supply_exhausted {
        shared.mark_supply_exhausted();
    }

    // Quiescence: every spawned operation records its outcome, including
    // those that resolve as cancelled.
    while tasks.join_next().await.is_some() {}
    shared.mark_quiescent();
    tracing::debug!("worker pool quiescent");
}

async fn run_one<V, O>(
    permit: OwnedSemaphorePermit,
    worker: Arc<dyn DispatchWorker<V, O>>,
    shared: Arc<Shared<V, O>>,
    mut cancel_rx: watch::Receiver<bool>,
    value: V,
) where
    V: Clone + Eq + Hash + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    let outcome = tokio::select! {
        outcome = worker.dispatch(value.clone()) => outcome,
        () = cancel_requested(&mut cancel_rx) => {
            Err(CharterError::internal("dispatch cancelled"))
        }
    };
    // No await between here and the record: a cancellation arriving now
    // cannot lose this outcome.
    shared.record(value, outcome);
    drop(permit);
}
