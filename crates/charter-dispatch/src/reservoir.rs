//! Weighted sampling without replacement
//!
//! A [`Reservoir`] owns a candidate pool and hands out unique candidates on
//! demand; once a candidate leaves the reservoir it can never be drawn again
//! from the same instance. A [`MergedReservoir`] stacks reservoirs in
//! priority order so a handpicked list can be drained before any sampling
//! happens.

use crate::pool::PoolError;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

enum Sampling {
    /// Drain in insertion order; used for handpicked candidate lists
    Fifo,
    /// Weighted-random among the remaining candidates
    Weighted,
}

/// Stateful sampler over a finite candidate pool
///
/// Selection probability is proportional to weight among the candidates
/// still remaining, so every draw reflects earlier removals (classic
/// weighted sampling without replacement).
pub struct Reservoir<V> {
    entries: Vec<(V, u64)>,
    total_weight: u128,
    sampling: Sampling,
    rng: ChaCha20Rng,
}

impl<V> Reservoir<V> {
    /// A reservoir that yields `values` in the order given
    pub fn fixed(values: Vec<V>) -> Self {
        let entries: Vec<(V, u64)> = values.into_iter().map(|v| (v, 1)).collect();
        let total_weight = entries.len() as u128;
        Self {
            entries,
            total_weight,
            sampling: Sampling::Fifo,
            rng: ChaCha20Rng::from_entropy(),
        }
    }

    /// Uniform sampling without replacement over `values`
    pub fn uniform(values: Vec<V>) -> Self {
        Self::weighted(values.into_iter().map(|v| (v, 1)).collect())
    }

    /// Weighted sampling without replacement over `(value, weight)` pairs
    ///
    /// Zero-weight candidates are dropped up front; they could never be
    /// selected anyway.
    pub fn weighted(pairs: Vec<(V, u64)>) -> Self {
        let entries: Vec<(V, u64)> = pairs.into_iter().filter(|(_, w)| *w > 0).collect();
        let total_weight = entries.iter().map(|(_, w)| u128::from(*w)).sum();
        Self {
            entries,
            total_weight,
            sampling: Sampling::Weighted,
            rng: ChaCha20Rng::from_entropy(),
        }
    }

    /// Replace the entropy-seeded RNG with a deterministic one
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha20Rng::seed_from_u64(seed);
        self
    }

    /// Number of candidates still available
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the reservoir has been fully drained
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Draw up to `count` candidates, erroring only if nothing remains
    ///
    /// Returns fewer than `count` when the pool is smaller than the request;
    /// a draw against an already-empty reservoir is the only failure.
    pub fn draw(&mut self, count: usize) -> Result<Vec<V>, PoolError> {
        if count > 0 && self.entries.is_empty() {
            return Err(PoolError::Exhausted);
        }
        Ok(self.draw_at_most(count))
    }

    /// Draw up to `count` candidates, returning an empty batch when drained
    pub fn draw_at_most(&mut self, count: usize) -> Vec<V> {
        let take = count.min(self.entries.len());
        let mut drawn = Vec::with_capacity(take);
        for _ in 0..take {
            drawn.push(self.draw_one());
        }
        drawn
    }

    fn draw_one(&mut self) -> V {
        let index = match self.sampling {
            Sampling::Fifo => 0,
            Sampling::Weighted => {
                let target = self.rng.gen_range(0..self.total_weight);
                let mut cumulative: u128 = 0;
                let mut chosen = self.entries.len() - 1;
                for (i, (_, weight)) in self.entries.iter().enumerate() {
                    cumulative += u128::from(*weight);
                    if target < cumulative {
                        chosen = i;
                        break;
                    }
                }
                chosen
            }
        };
        let (value, weight) = match self.sampling {
            // remove() keeps FIFO order; weighted order is irrelevant
            Sampling::Fifo => self.entries.remove(index),
            Sampling::Weighted => self.entries.swap_remove(index),
        };
        self.total_weight -= u128::from(weight);
        value
    }
}

/// An ordered stack of reservoirs presented as one draw interface
///
/// Earlier layers are fully drained before later ones are consulted. A short
/// draw returns whatever is available; exhaustion is signaled only when a
/// draw is attempted and nothing remains in any layer. Callers pre-filter
/// duplicates across layers.
pub struct MergedReservoir<V> {
    layers: Vec<Reservoir<V>>,
}

impl<V> MergedReservoir<V> {
    /// Stack `layers` in priority order
    pub fn new(layers: Vec<Reservoir<V>>) -> Self {
        Self { layers }
    }

    /// Total candidates remaining across all layers
    pub fn len(&self) -> usize {
        self.layers.iter().map(Reservoir::len).sum()
    }

    /// Whether every layer has been drained
    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(Reservoir::is_empty)
    }

    /// Draw up to `count` candidates in layer-priority order
    pub fn draw(&mut self, count: usize) -> Result<Vec<V>, PoolError> {
        if count > 0 && self.is_empty() {
            return Err(PoolError::Exhausted);
        }
        Ok(self.draw_at_most(count))
    }

    /// Draw up to `count` candidates without erroring on exhaustion
    pub fn draw_at_most(&mut self, count: usize) -> Vec<V> {
        let mut drawn = Vec::new();
        for layer in &mut self.layers {
            if drawn.len() == count {
                break;
            }
            drawn.extend(layer.draw_at_most(count - drawn.len()));
        }
        drawn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashSet;

    #[test]
    fn test_fixed_reservoir_preserves_order() {
        let mut reservoir = Reservoir::fixed(vec![1, 2, 3]);
        assert_eq!(reservoir.draw_at_most(2), vec![1, 2]);
        assert_eq!(reservoir.draw_at_most(5), vec![3]);
        assert!(reservoir.is_empty());
    }

    #[test]
    fn test_weighted_draw_yields_each_candidate_exactly_once() {
        let pairs: Vec<(u32, u64)> = (0..10).map(|i| (i, u64::from(i) + 1)).collect();
        let mut reservoir = Reservoir::weighted(pairs).with_seed(42);
        let mut seen = HashSet::new();
        while !reservoir.is_empty() {
            for value in reservoir.draw_at_most(3) {
                assert!(seen.insert(value), "candidate {value} drawn twice");
            }
        }
        assert_eq!(seen, (0..10).collect());
    }

    #[test]
    fn test_draw_on_empty_reservoir_errors() {
        let mut reservoir = Reservoir::<u32>::uniform(vec![]);
        assert_matches!(reservoir.draw(1), Err(PoolError::Exhausted));
    }

    #[test]
    fn test_short_draw_returns_available() {
        let mut reservoir = Reservoir::uniform(vec![7, 8]).with_seed(1);
        let drawn = reservoir.draw(5).unwrap();
        assert_eq!(drawn.len(), 2);
    }

    #[test]
    fn test_zero_weight_candidates_never_selected() {
        let mut reservoir =
            Reservoir::weighted(vec![(1u32, 0), (2, 5), (3, 0)]).with_seed(7);
        assert_eq!(reservoir.len(), 1);
        assert_eq!(reservoir.draw_at_most(3), vec![2]);
    }

    #[test]
    fn test_merged_reservoir_drains_layers_in_order() {
        let handpicked = Reservoir::fixed(vec![100, 101]);
        let sampled = Reservoir::uniform(vec![1, 2, 3]).with_seed(3);
        let mut merged = MergedReservoir::new(vec![handpicked, sampled]);

        let first = merged.draw(3).unwrap();
        assert_eq!(&first[..2], &[100, 101]);
        assert_eq!(first.len(), 3);

        let rest = merged.draw(10).unwrap();
        assert_eq!(rest.len(), 2);
        assert_matches!(merged.draw(1), Err(PoolError::Exhausted));
    }

    proptest::proptest! {
        /// Draws until exhaustion yield the original candidate set exactly
        /// once each, whatever the weights and draw sizes.
        #[test]
        fn prop_weighted_draws_partition_the_pool(
            weights in proptest::collection::vec(1u64..1000, 1..40),
            seed in proptest::prelude::any::<u64>(),
            step in 1usize..7,
        ) {
            let pairs: Vec<(usize, u64)> =
                weights.iter().copied().enumerate().collect();
            let expected: HashSet<usize> = (0..pairs.len()).collect();
            let mut reservoir = Reservoir::weighted(pairs).with_seed(seed);
            let mut seen = HashSet::new();
            while !reservoir.is_empty() {
                for value in reservoir.draw_at_most(step) {
                    proptest::prop_assert!(seen.insert(value));
                }
            }
            proptest::prop_assert_eq!(seen, expected);
        }
    }

    #[test]
    fn test_merged_reservoir_union_is_exact() {
        let merged_layers = vec![
            Reservoir::fixed(vec![0, 1]),
            Reservoir::weighted((2..8).map(|i| (i, 2)).collect()).with_seed(11),
        ];
        let mut merged = MergedReservoir::new(merged_layers);
        let mut seen = HashSet::new();
        while !merged.is_empty() {
            for value in merged.draw_at_most(3) {
                assert!(seen.insert(value));
            }
        }
        assert_eq!(seen, (0..8).collect());
    }
}
