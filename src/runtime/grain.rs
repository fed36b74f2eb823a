//! Granularity control: calibrated threshold + the `guard` dispatch.
//!
//! Call sites describe the expected work of the current call as a count of
//! abstract units (one unit ≈ one iteration of trivial sequential work).
//! The pool converts an acceptable sequential leaf duration into units once
//! at startup, by timing a reference kernel on the actual hardware; every
//! `guard` decision then compares the caller's estimate against that single
//! number. The cutoff ports across machines without per-algorithm tuning:
//! faster hardware gets a higher threshold, keeping leaf durations roughly
//! constant.

use std::hint::black_box;
use std::time::{Duration, Instant};

use super::metrics;
use super::pool::WorkerScope;
use super::rng::XorShift64;

/// Acceptable sequential leaf cost, in nanoseconds. Large enough to
/// amortize the cost of publishing and joining a forked job, small enough
/// to leave ample parallel slack.
const KAPPA_NANOS: f64 = 20_000.0;

/// Minimum sample duration for a trustworthy measurement.
const CALIBRATION_FLOOR: Duration = Duration::from_micros(200);

/// Cap on reference-kernel iterations, in case the clock misbehaves.
const MAX_PROBE_UNITS: u64 = 1 << 24;

/// Measure sequential throughput and derive the granularity threshold:
/// `KAPPA_NANOS × units-per-nanosecond`.
///
/// Doubles the probe size until the sample is long enough to time
/// reliably. Runs once per pool, on the constructing thread.
pub(crate) fn calibrate_threshold() -> f64 {
    let mut units: u64 = 1 << 12;
    loop {
        let elapsed = time_reference_kernel(units);
        if elapsed >= CALIBRATION_FLOOR || units >= MAX_PROBE_UNITS {
            let nanos = elapsed.as_nanos().max(1) as f64;
            return KAPPA_NANOS * (units as f64 / nanos);
        }
        units *= 2;
    }
}

/// One unit of reference work is one xorshift step. `black_box` keeps the
/// loop from being folded away.
fn time_reference_kernel(units: u64) -> Duration {
    let mut rng = XorShift64::new(units | 1);
    let start = Instant::now();
    let mut acc = 0u64;
    for _ in 0..units {
        acc ^= rng.next_u64();
    }
    black_box(acc);
    start.elapsed()
}

impl WorkerScope<'_> {
    /// Granularity-gated dispatch.
    ///
    /// Evaluates the caller's cost estimate; below the pool threshold the
    /// sequential fallback runs directly on this worker (no job created,
    /// no fork overhead), otherwise the parallel body runs — and typically
    /// forks or splits further.
    ///
    /// The estimate is a caller contract: non-uniform call sites (e.g.
    /// exponential recursion) should estimate their actual cost, not their
    /// input size.
    #[inline]
    pub fn guard<C, P, S, R>(&self, complexity: C, parallel: P, sequential: S) -> R
    where
        C: FnOnce() -> f64,
        P: FnOnce() -> R,
        S: FnOnce() -> R,
    {
        if complexity() < self.threshold() {
            metrics::inc(&self.metrics().seq_leaves);
            sequential()
        } else {
            parallel()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::pool::tests::test_config;
    use super::super::pool::ThreadPool;
    use super::*;
    use crate::PoolConfig;

    #[test]
    fn calibration_is_positive_and_finite() {
        let t = calibrate_threshold();
        assert!(t.is_finite());
        assert!(t > 0.0, "threshold {} should be positive", t);
    }

    #[test]
    fn guard_picks_sequential_below_threshold() {
        let pool = ThreadPool::new(PoolConfig {
            threshold_override: Some(1000.0),
            ..test_config(2)
        });
        let picked = pool.install(|scope| scope.guard(|| 1.0, || "parallel", || "sequential"));
        assert_eq!(picked, "sequential");
        assert_eq!(pool.metrics().seq_leaves, 1);
    }

    #[test]
    fn guard_picks_parallel_at_or_above_threshold() {
        let pool = ThreadPool::new(PoolConfig {
            threshold_override: Some(1000.0),
            ..test_config(2)
        });
        let picked = pool.install(|scope| scope.guard(|| 1000.0, || "parallel", || "sequential"));
        assert_eq!(picked, "parallel");
        let picked = pool.install(|scope| scope.guard(|| 1e12, || "parallel", || "sequential"));
        assert_eq!(picked, "parallel");
        assert_eq!(pool.metrics().seq_leaves, 0);
    }
}
