//! Fork-join runtime with adaptive granularity control.
//!
//! ## Scope
//! This crate is a single-process, shared-memory execution engine for
//! divide-and-conquer and index-range parallel computations: a fixed pool of
//! work-stealing workers, a fork-join primitive, and data-parallel loops and
//! reductions whose split decisions are driven by caller-supplied cost
//! estimates instead of fixed input-size cutoffs.
//!
//! ## Key invariants
//! - Every forked pair of computations is joined before the enclosing call
//!   returns; no detached work escapes a fork-join scope.
//! - A range handed to `parallel_for` or `reduce` is partitioned into
//!   disjoint sub-ranges whose union is the original; each index is processed
//!   exactly once.
//! - The granularity threshold is calibrated once per pool and used by every
//!   decision made through that pool.
//! - A worker waiting at a join never blocks its OS thread: it executes other
//!   ready jobs (its own queue first, then stolen ones) until the awaited job
//!   completes.
//!
//! ## Flow (one `parallel_for` call)
//! 1) The whole range is costed via the caller's complexity function.
//! 2) Below threshold: run the sequential leaf body inline, no job created.
//! 3) At or above threshold: split at the midpoint, publish one half as a
//!    stealable job, recurse into the other half, then join cooperatively.
//!
//! ## Entry points
//! - [`ThreadPool`] / [`PoolConfig`]: pool lifecycle and tuning knobs.
//! - [`WorkerScope`]: capability handle passed to code running inside the
//!   pool; all primitives (`fork2`, `guard`, `parallel_for`, `reduce`) hang
//!   off it. There is no ambient singleton and no thread-local registry.
//! - [`MetricsSnapshot`]: aggregated per-worker scheduling counters.
//!
//! ## Design trade-offs
//! Cost estimates are supplied by call sites, so non-uniform workloads
//! (exponential recursion, weighted rows) and flat scans share one
//! mechanism. The price is that estimates are a caller contract: the runtime
//! never second-guesses them. Writes performed by loop bodies for different
//! indices must target disjoint memory; the runtime performs no aliasing
//! checks.

pub mod runtime;

pub use runtime::config::PoolConfig;
pub use runtime::metrics::MetricsSnapshot;
pub use runtime::pool::{ThreadPool, WorkerScope};
pub use runtime::range::IndexRange;
