//! Pool configuration.

use std::time::Duration;

/// Thread pool configuration.
///
/// All defaults are conservative. Profile with your workload before tuning.
///
/// # Tuning Notes
///
/// | Knob         | Workload Sensitivity                    |
/// |--------------|-----------------------------------------|
/// | workers      | CPU count, task CPU-boundedness         |
/// | steal_tries  | Fork fanout pattern, worker count       |
/// | spin_iters   | Leaf duration distribution              |
/// | park_timeout | Fork frequency between idle phases      |
#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    /// Number of worker threads. Defaults to the hardware parallelism
    /// reported by the OS; the pool never resizes after construction.
    pub workers: usize,

    /// Seed for deterministic victim selection.
    ///
    /// Same seed + same fork order = reproducible steal pattern
    /// (modulo timing).
    pub seed: u64,

    /// Steal rounds before a worker gives up per idle cycle.
    ///
    /// Higher = less parking, more CPU when idle.
    /// Lower = faster sleep, less steal overhead.
    pub steal_tries: u32,

    /// Spin iterations before yielding/parking.
    ///
    /// Higher = better latency for bursty fork trees.
    /// Lower = less CPU waste when truly idle.
    pub spin_iters: u32,

    /// Park timeout after spinning/yielding.
    ///
    /// Shorter = more responsive to newly published forks.
    /// Longer = less OS scheduling overhead.
    pub park_timeout: Duration,

    /// Try to pin each worker to a core (requires the `affinity` feature).
    pub pin_threads: bool,

    /// Bypass calibration and use this granularity threshold directly.
    ///
    /// Intended for tests that need deterministic sequential-vs-parallel
    /// decisions. `None` calibrates at pool construction.
    pub threshold_override: Option<f64>,
}

impl PoolConfig {
    /// Validate configuration. Panics on invalid values.
    pub fn validate(&self) {
        assert!(self.workers > 0, "workers must be > 0");
        assert!(self.steal_tries > 0, "steal_tries must be > 0");
        assert!(self.spin_iters > 0, "spin_iters must be > 0");
        assert!(
            self.park_timeout > Duration::ZERO,
            "park_timeout must be > 0"
        );
        if let Some(t) = self.threshold_override {
            assert!(t.is_finite() && t >= 0.0, "threshold_override must be >= 0");
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            seed: 0x853c49e6748fea9b,
            steal_tries: 4,
            spin_iters: 200,
            park_timeout: Duration::from_micros(200),
            pin_threads: false,
            threshold_override: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        PoolConfig::default().validate();
        assert!(PoolConfig::default().workers >= 1);
    }

    #[test]
    #[should_panic(expected = "workers must be > 0")]
    fn zero_workers_rejected() {
        PoolConfig {
            workers: 0,
            ..PoolConfig::default()
        }
        .validate();
    }

    #[test]
    #[should_panic(expected = "park_timeout must be > 0")]
    fn zero_park_timeout_rejected() {
        PoolConfig {
            park_timeout: Duration::ZERO,
            ..PoolConfig::default()
        }
        .validate();
    }

    #[test]
    #[should_panic(expected = "threshold_override must be >= 0")]
    fn nan_threshold_rejected() {
        PoolConfig {
            threshold_override: Some(f64::NAN),
            ..PoolConfig::default()
        }
        .validate();
    }
}
