//! Composition tests: prefetch-fed pools against flaky workers

use async_trait::async_trait;
use charter_core::CharterError;
use charter_dispatch::{
    AllAtOnceFactory, DispatchWorker, MergedReservoir, PoolConfig, PoolError,
    PrefetchStrategy, Reservoir, WorkerPool,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

struct FlakyWorker {
    failing: HashSet<u32>,
}

#[async_trait]
impl DispatchWorker<u32, u32> for FlakyWorker {
    async fn dispatch(&self, value: u32) -> Result<u32, CharterError> {
        // A little latency keeps several dispatches genuinely in flight.
        tokio::time::sleep(Duration::from_millis(5)).await;
        if self.failing.contains(&value) {
            Err(CharterError::network(format!("{value} unreachable")))
        } else {
            Ok(value)
        }
    }
}

fn prefetch_pool(
    candidates: MergedReservoir<u32>,
    failing: impl IntoIterator<Item = u32>,
    target: usize,
) -> WorkerPool<u32, u32> {
    WorkerPool::new(
        Arc::new(FlakyWorker {
            failing: failing.into_iter().collect(),
        }),
        Box::new(PrefetchStrategy::new(candidates, target)),
        PoolConfig {
            target_successes: target,
            threadpool_size: target,
            stagger_timeout: Duration::from_millis(5),
            timeout: Some(Duration::from_secs(5)),
        },
    )
}

#[tokio::test]
async fn test_quorum_reached_despite_unreachable_candidates() {
    // Ten candidates, five handpicked, three of the ten unreachable: the
    // quorum of five must still be reached from the seven that answer.
    let handpicked = Reservoir::fixed(vec![0, 1, 2, 3, 4]);
    let sampled = Reservoir::uniform((5..10).collect()).with_seed(17);
    let candidates = MergedReservoir::new(vec![handpicked, sampled]);

    let pool = prefetch_pool(candidates, [1, 3, 7], 5);
    pool.start().unwrap();
    let successes = pool.block_until_target_successes().await.unwrap();
    pool.cancel();
    pool.join().await;

    assert_eq!(successes.len(), 5);
    for value in successes.keys() {
        assert!(![1, 3, 7].contains(value));
    }
}

#[tokio::test]
async fn test_no_value_is_dispatched_twice() {
    let candidates =
        MergedReservoir::new(vec![Reservoir::uniform((0..20).collect()).with_seed(3)]);
    let pool = prefetch_pool(candidates, 0..10, 8);
    pool.start().unwrap();
    let _ = pool.block_until_target_successes().await;
    pool.cancel();
    pool.join().await;

    let successes = pool.get_successes();
    let failures = pool.get_failures();
    let mut all: Vec<u32> = successes.keys().chain(failures.keys()).copied().collect();
    let dispatched = all.len();
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), dispatched, "a value was recorded twice");
}

#[tokio::test]
async fn test_exhaustion_surfaces_as_out_of_values() {
    // Every candidate fails; the target can never be met.
    let candidates =
        MergedReservoir::new(vec![Reservoir::uniform((0..6).collect()).with_seed(9)]);
    let pool = prefetch_pool(candidates, 0..6, 4);
    pool.start().unwrap();
    let result = pool.block_until_target_successes().await;
    pool.cancel();
    pool.join().await;

    assert!(matches!(
        result,
        Err(PoolError::OutOfValues {
            successes: 0,
            target: 4
        })
    ));
    assert_eq!(pool.get_failures().len(), 6);
}

#[tokio::test]
async fn test_all_at_once_records_every_outcome_after_join() {
    let pool = WorkerPool::new(
        Arc::new(FlakyWorker {
            failing: [2, 4].into_iter().collect(),
        }),
        Box::new(AllAtOnceFactory::new((0..12).collect())),
        PoolConfig {
            target_successes: 1,
            threadpool_size: 32,
            stagger_timeout: Duration::ZERO,
            timeout: Some(Duration::from_secs(5)),
        },
    );
    pool.start().unwrap();

    // The blocking call releases at the first success, while the rest of
    // the batch keeps completing in the background.
    let early = pool.block_until_target_successes().await.unwrap();
    assert!(!early.is_empty());

    pool.join().await;
    assert_eq!(pool.get_successes().len(), 10);
    assert_eq!(pool.get_failures().len(), 2);
}
