//! Value-supply strategies for the worker pool
//!
//! A factory decides how many fresh values the dispatch loop should put in
//! flight, given how the run is going so far. [`AllAtOnceFactory`] hands over
//! a known collection in one batch; [`PrefetchStrategy`] tops the pool up
//! from a reservoir with exactly the number of candidates still needed to
//! reach the success target.

use crate::reservoir::MergedReservoir;

/// Supplies batches of values to a [`crate::WorkerPool`]
///
/// `next_batch` receives the pool's current success and failure tallies.
/// `None` means the supply is exhausted and the target can no longer be
/// reached from this factory; an empty batch means "nothing right now, ask
/// again after progress".
pub trait ValueFactory<V>: Send + 'static {
    /// Produce the next batch of values to dispatch
    fn next_batch(&mut self, successes: usize, failures: usize) -> Option<Vec<V>>;
}

/// Hands out a fixed, fully-known collection exactly once
///
/// Used when the candidate set is already decided, e.g. treasure map
/// publication targets.
pub struct AllAtOnceFactory<V> {
    values: Option<Vec<V>>,
}

impl<V> AllAtOnceFactory<V> {
    /// Wrap the full collection to be issued on the first call
    pub fn new(values: Vec<V>) -> Self {
        Self {
            values: Some(values),
        }
    }
}

impl<V: Send + 'static> ValueFactory<V> for AllAtOnceFactory<V> {
    fn next_batch(&mut self, _successes: usize, _failures: usize) -> Option<Vec<V>> {
        self.values.take()
    }
}

/// Keeps just enough candidates in flight to reach `target` successes
///
/// Because not every dispatch succeeds, the strategy draws replacements for
/// failures as they happen, without over-soliciting the whole pool at once.
/// A candidate drawn once is never re-issued; the reservoir guarantees that.
pub struct PrefetchStrategy<V> {
    reservoir: MergedReservoir<V>,
    target: usize,
    issued: usize,
}

impl<V> PrefetchStrategy<V> {
    /// Draw from `reservoir` until `target` successes look reachable
    pub fn new(reservoir: MergedReservoir<V>, target: usize) -> Self {
        Self {
            reservoir,
            target,
            issued: 0,
        }
    }
}

impl<V: Send + 'static> ValueFactory<V> for PrefetchStrategy<V> {
    fn next_batch(&mut self, successes: usize, failures: usize) -> Option<Vec<V>> {
        // Everything issued but not yet resolved is still working toward the
        // target; only the shortfall beyond that needs fresh candidates.
        let in_flight = self.issued - successes - failures;
        let needed = self.target.saturating_sub(successes + in_flight);

        if needed == 0 {
            return Some(Vec::new());
        }

        let batch = self.reservoir.draw_at_most(needed);
        if batch.is_empty() {
            if in_flight > 0 {
                // The outstanding work may still get us there.
                return Some(Vec::new());
            }
            // Nothing left to draw and nothing in flight: unreachable target.
            return None;
        }

        self.issued += batch.len();
        Some(batch)
    }
}
