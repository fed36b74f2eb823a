//! Work-stealing fork-join runtime.
//!
//! # Architecture
//!
//! One engine, three layers:
//! - **Pool**: fixed worker set, Chase-Lev deques, global injector,
//!   tiered idle (spin → yield → park), randomized victim selection.
//! - **Fork-join**: stack-held jobs with type-erased references; unstolen
//!   jobs are popped back and run inline with no synchronization; stolen
//!   jobs are awaited cooperatively (the waiter keeps executing work).
//! - **Granularity control**: a per-pool threshold calibrated against a
//!   reference kernel gates every split decision in `parallel_for` and
//!   `reduce`.

// Unsafe is used sparingly and only where the scheduler requires it:
// - job.rs: type-erased references to stack-held job records
// All unsafe blocks have documented invariants.

pub mod config;
pub mod metrics;
pub mod range;
pub mod rng;

pub(crate) mod grain;
pub(crate) mod job;

pub mod pool;

mod fork;
mod par;

pub use config::PoolConfig;
pub use metrics::MetricsSnapshot;
pub use pool::{ThreadPool, WorkerScope};
pub use range::IndexRange;
pub use rng::XorShift64;
