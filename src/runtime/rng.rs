//! Tiny deterministic RNG for scheduling decisions (victim selection,
//! per-worker seeding).
//!
//! XorShift64 is enough here: victims are picked from a handful of workers,
//! not sampled for Monte Carlo. Bounded sampling uses Lemire's method to
//! avoid a hardware divide on the steal path, with a bitmask fast path for
//! power-of-two bounds.
//!
//! Intentionally `Clone` but not `Copy`: copying an RNG silently duplicates
//! its stream and makes two workers take identical "random" decisions.

/// Deterministic scheduling RNG.
///
/// Not thread-safe; every worker owns its own instance, forked from the
/// pool's master seed.
#[derive(Clone, Debug)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    /// Create a new RNG with the given seed.
    ///
    /// Seed 0 is remapped to a non-zero constant: the all-zero state is a
    /// fixed point of xorshift.
    #[inline]
    pub fn new(seed: u64) -> Self {
        let seed = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: seed }
    }

    /// Next value in the stream.
    ///
    /// Shift constants (13, 7, 17) are Marsaglia's full-period triple.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform usize in `[0, upper)`.
    ///
    /// # Panics
    /// Panics in debug builds if `upper` is 0.
    #[inline]
    pub fn next_usize(&mut self, upper: usize) -> usize {
        debug_assert!(upper > 0, "upper bound must be > 0");

        if upper.is_power_of_two() {
            return (self.next_u64() as usize) & (upper - 1);
        }

        self.bounded_u64(upper as u64) as usize
    }

    /// Lemire's nearly-divisionless bounded generation.
    ///
    /// Maps a random u64 to `[0, upper)` via multiply-high; rejection keeps
    /// the distribution uniform and is vanishingly rare for small bounds.
    #[inline]
    fn bounded_u64(&mut self, upper: u64) -> u64 {
        let threshold = upper.wrapping_neg() % upper;

        loop {
            let x = self.next_u64();
            let m = (x as u128) * (upper as u128);
            let lo = m as u64;

            if lo >= threshold {
                return (m >> 64) as u64;
            }
        }
    }

    /// Fork the RNG by creating a new one seeded from this one.
    ///
    /// The raw output is passed through splitmix64 so sequential forks do
    /// not land on correlated streams. Used to derive per-worker RNGs from
    /// the pool's master seed.
    pub fn fork(&mut self) -> Self {
        let raw_seed = self.next_u64();
        Self::new(splitmix64(raw_seed))
    }
}

impl Default for XorShift64 {
    fn default() -> Self {
        Self::new(0)
    }
}

/// SplitMix64 mixing step (Vigna). Each input bit affects roughly half the
/// output bits, which is what makes sequential fork seeds usable.
#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_sequence() {
        let mut a = XorShift64::new(123);
        let mut b = XorShift64::new(123);
        for _ in 0..1000 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn zero_seed_does_not_lock_up() {
        let mut rng = XorShift64::new(0);
        let first = rng.next_u64();
        let second = rng.next_u64();
        assert_ne!(first, 0);
        assert_ne!(first, second);
    }

    #[test]
    fn next_usize_in_bounds() {
        let mut rng = XorShift64::new(42);
        for upper in [1, 2, 3, 7, 8, 13, 16, 100, 128] {
            for _ in 0..1000 {
                let v = rng.next_usize(upper);
                assert!(v < upper, "got {} for upper {}", v, upper);
            }
        }
    }

    #[test]
    fn fork_produces_distinct_deterministic_streams() {
        let mut master1 = XorShift64::new(42);
        let mut master2 = XorShift64::new(42);

        let mut fork_a = master1.fork();
        let mut fork_b = master1.fork();

        let seq_a: Vec<_> = (0..10).map(|_| fork_a.next_u64()).collect();
        let seq_b: Vec<_> = (0..10).map(|_| fork_b.next_u64()).collect();
        assert_ne!(seq_a, seq_b);

        // Same master seed reproduces the same first fork.
        let mut fork_a2 = master2.fork();
        let seq_a2: Vec<_> = (0..10).map(|_| fork_a2.next_u64()).collect();
        assert_eq!(seq_a, seq_a2);
    }

    #[test]
    fn bounded_distribution_roughly_uniform() {
        let mut rng = XorShift64::new(0xDEADBEEF);
        let upper = 10;
        let trials = 100_000;
        let mut counts = [0u32; 10];

        for _ in 0..trials {
            counts[rng.next_usize(upper)] += 1;
        }

        let expected = trials as f64 / upper as f64;
        for (i, &count) in counts.iter().enumerate() {
            let deviation = ((count as f64) - expected).abs() / expected;
            assert!(
                deviation < 0.10,
                "bucket {} has {} (expected ~{})",
                i,
                count,
                expected
            );
        }
    }
}
