//! Range-parallel loops and reductions.
//!
//! All operations follow one discipline: cost the current range with the
//! caller's complexity function, run the sequential leaf inline when the
//! estimate is below threshold, otherwise split at the midpoint and recurse
//! through `fork2`. Leaves are processed exactly once; no ordering holds
//! between indices on different branches.
//!
//! Bodies receive the scope of whichever worker executes their leaf — that
//! scope, not the caller's, is the handle for nested parallelism (a row
//! body that runs an inner parallel reduce, say). Bodies must be `Sync`
//! because sibling branches invoke them concurrently by reference. Writes
//! for different indices must target disjoint memory; the runtime performs
//! no aliasing checks.

use super::pool::WorkerScope;
use super::range::IndexRange;

impl WorkerScope<'_> {
    /// Apply `body` to every index in `range` exactly once, assuming unit
    /// cost per index (complexity = index count).
    pub fn parallel_for<B>(&self, range: IndexRange, body: B)
    where
        B: for<'s> Fn(&WorkerScope<'s>, usize) + Sync,
    {
        self.parallel_for_with(range, |r: IndexRange| r.len() as f64, body)
    }

    /// `parallel_for` with a caller-supplied complexity function, for loops
    /// whose per-index cost is not uniform or not ≈1 unit (e.g. each index
    /// hides an inner loop).
    pub fn parallel_for_with<C, B>(&self, range: IndexRange, complexity: C, body: B)
    where
        C: Fn(IndexRange) -> f64 + Sync,
        B: for<'s> Fn(&WorkerScope<'s>, usize) + Sync,
    {
        let leaf = |s: &WorkerScope<'_>, r: IndexRange| {
            for i in r {
                body(s, i);
            }
        };
        self.for_rec(range, &complexity, &leaf);
    }

    /// `parallel_for` with an alternative sequential body, run once per
    /// leaf range instead of the default per-index loop.
    ///
    /// Useful when the sequential case has a tighter formulation than
    /// per-index calls (e.g. a fused inner loop over a row block). The body
    /// must process exactly `[r.lo, r.hi)`; leaves are disjoint and cover
    /// the input range, so per-index semantics carry over when the body
    /// does.
    pub fn parallel_for_alt<C, A>(&self, range: IndexRange, complexity: C, seq_body: A)
    where
        C: Fn(IndexRange) -> f64 + Sync,
        A: for<'s> Fn(&WorkerScope<'s>, IndexRange) + Sync,
    {
        self.for_rec(range, &complexity, &seq_body);
    }

    fn for_rec<C, S>(&self, range: IndexRange, complexity: &C, leaf: &S)
    where
        C: Fn(IndexRange) -> f64 + Sync,
        S: for<'s> Fn(&WorkerScope<'s>, IndexRange) + Sync,
    {
        if range.is_empty() {
            return;
        }
        self.guard(
            || complexity(range),
            || {
                if range.len() < 2 {
                    // Too small to split, whatever the estimate says.
                    leaf(self, range);
                    return;
                }
                let (left, right) = range.split();
                self.fork2(
                    |s| s.for_rec(right, complexity, leaf),
                    || self.for_rec(left, complexity, leaf),
                );
            },
            || leaf(self, range),
        )
    }

    /// Combine `lift(scope, i)` over every index in `range`, seeded by
    /// `identity`.
    ///
    /// Leaves fold left-to-right; sub-results combine in split order.
    /// `combine` must be associative, and for floating point the result is
    /// reproducible for a fixed threshold and worker count but not bit-exact
    /// across them. Unit cost per index; see
    /// [`reduce_with`](WorkerScope::reduce_with) for weighted ranges.
    pub fn reduce<T, O, L>(&self, range: IndexRange, identity: T, combine: O, lift: L) -> T
    where
        T: Clone + Send + Sync,
        O: Fn(T, T) -> T + Sync,
        L: for<'s> Fn(&WorkerScope<'s>, usize) -> T + Sync,
    {
        self.reduce_with(range, |r: IndexRange| r.len() as f64, identity, combine, lift)
    }

    /// `reduce` with a caller-supplied complexity function.
    pub fn reduce_with<T, C, O, L>(
        &self,
        range: IndexRange,
        complexity: C,
        identity: T,
        combine: O,
        lift: L,
    ) -> T
    where
        T: Clone + Send + Sync,
        C: Fn(IndexRange) -> f64 + Sync,
        O: Fn(T, T) -> T + Sync,
        L: for<'s> Fn(&WorkerScope<'s>, usize) -> T + Sync,
    {
        self.reduce_rec(range, &complexity, &identity, &combine, &lift)
    }

    fn reduce_rec<T, C, O, L>(
        &self,
        range: IndexRange,
        complexity: &C,
        identity: &T,
        combine: &O,
        lift: &L,
    ) -> T
    where
        T: Clone + Send + Sync,
        C: Fn(IndexRange) -> f64 + Sync,
        O: Fn(T, T) -> T + Sync,
        L: for<'s> Fn(&WorkerScope<'s>, usize) -> T + Sync,
    {
        self.guard(
            || complexity(range),
            || {
                if range.len() < 2 {
                    return self.reduce_leaf(range, identity, combine, lift);
                }
                let (left, right) = range.split();
                let (right_v, left_v) = self.fork2(
                    |s| s.reduce_rec(right, complexity, identity, combine, lift),
                    || self.reduce_rec(left, complexity, identity, combine, lift),
                );
                combine(left_v, right_v)
            },
            || self.reduce_leaf(range, identity, combine, lift),
        )
    }

    /// Sequential left fold over a leaf range, seeded by the identity.
    fn reduce_leaf<T, O, L>(&self, range: IndexRange, identity: &T, combine: &O, lift: &L) -> T
    where
        T: Clone,
        O: Fn(T, T) -> T,
        L: for<'s> Fn(&WorkerScope<'s>, usize) -> T,
    {
        let mut acc = identity.clone();
        for i in range {
            acc = combine(acc, lift(self, i));
        }
        acc
    }
}
