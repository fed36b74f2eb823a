//! Property tests for the data-parallel primitives: exact-once coverage,
//! reduce-vs-sequential-fold equivalence, and the range partition invariant.

use proptest::prelude::*;

use grainpool::{IndexRange, PoolConfig, ThreadPool};
use std::sync::atomic::{AtomicU32, Ordering};

fn pool(workers: usize, threshold: f64) -> ThreadPool {
    ThreadPool::new(PoolConfig {
        workers,
        seed: 0xA11CE,
        threshold_override: Some(threshold),
        ..PoolConfig::default()
    })
}

proptest! {
    // Each case spins up a pool; keep the case count moderate.
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Every index in [0, n) is visited exactly once, for any worker count
    /// and whether the threshold forces splitting or forces sequential.
    #[test]
    fn parallel_for_visits_exactly_once(
        n in 0usize..400,
        workers in prop::sample::select(vec![1usize, 2, 8]),
        threshold in prop::sample::select(vec![1.0f64, 64.0, 1e18]),
    ) {
        let pool = pool(workers, threshold);
        let hits: Vec<AtomicU32> = (0..n).map(|_| AtomicU32::new(0)).collect();
        pool.install(|scope| {
            scope.parallel_for(IndexRange::new(0, n), |_s, i| {
                hits[i].fetch_add(1, Ordering::Relaxed);
            });
        });
        for (i, c) in hits.iter().enumerate() {
            prop_assert_eq!(c.load(Ordering::Relaxed), 1, "index {} miscounted", i);
        }
    }

    /// Parallel reduce equals the sequential left fold, whatever the split
    /// pattern was.
    #[test]
    fn reduce_equals_sequential_fold(
        values in prop::collection::vec(0u64..1000, 0..200),
        workers in prop::sample::select(vec![1usize, 2, 8]),
    ) {
        let expected: u64 = values.iter().sum();
        let pool = pool(workers, 1.0);
        let got = pool.install(|scope| {
            scope.reduce(
                IndexRange::new(0, values.len()),
                0u64,
                |a, b| a + b,
                |_s, i| values[i],
            )
        });
        prop_assert_eq!(got, expected);
    }

    /// Splitting partitions the range: disjoint, covering, non-empty halves.
    #[test]
    fn split_partitions_range(lo in 0usize..10_000, len in 2usize..10_000) {
        let r = IndexRange::new(lo, lo + len);
        let (a, b) = r.split();
        prop_assert!(!a.is_empty());
        prop_assert!(!b.is_empty());
        prop_assert_eq!(a.lo, r.lo);
        prop_assert_eq!(a.hi, b.lo);
        prop_assert_eq!(b.hi, r.hi);
        prop_assert_eq!(a.len() + b.len(), r.len());
    }
}
