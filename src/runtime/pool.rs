//! Work-stealing worker pool.
//!
//! # Architecture
//!
//! ```text
//!                ┌────────────────────────────────────────────────┐
//!                │                  ThreadPool                    │
//!                │                                                │
//!  install() ────┼───► Injector ──────┬───────────────────────────┤
//!  (external)    │                    │                           │
//!                │                    ▼                           │
//!                │   ┌────────────────────────────────────────┐   │
//!                │   │  Worker 0   │  Worker 1   │  Worker N  │   │
//!                │   │ ┌────────┐  │ ┌────────┐  │ ┌────────┐ │   │
//!                │   │ │ Deque  │◄─┼─►│ Deque │◄─┼─►│ Deque │ │   │
//!                │   │ │ (LIFO) │  │ └────────┘  │ └────────┘ │   │
//!                │   │ └────┬───┘  │             │            │   │
//!                │   │      ▼      │             │            │   │
//!                │   │ WorkerScope │ WorkerScope │ WorkerScope│   │
//!                │   └────────────────────────────────────────┘   │
//!                │                      ▲                         │
//!                │   Shared: threshold, done, unparkers, metrics  │
//!                └────────────────────────────────────────────────┘
//! ```
//!
//! - N worker threads (optionally pinned to cores), fixed for the pool's
//!   lifetime
//! - Per-worker Chase-Lev deque (LIFO local, FIFO steal)
//! - Global injector for external `install` calls
//! - Tiered idle strategy: spin → yield → park
//! - Per-pool calibrated granularity threshold, shared by every scope
//!
//! # Correctness Invariants
//!
//! - **Joined forks**: every job published by `fork2` completes before the
//!   enclosing call returns; the pool never holds detached work across an
//!   `install` boundary.
//! - **No blocked joins**: waiting workers execute other ready jobs; only
//!   truly idle workers park, and always with a timeout.
//! - **Monotonic shutdown**: `done` is set once, by `Drop`, after every
//!   `install` has returned.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use crossbeam_utils::sync::{Parker, Unparker};
use crossbeam_utils::CachePadded;

use super::config::PoolConfig;
use super::grain;
use super::job::{JobRef, ParkLatch, StackJob};
use super::metrics::{self, MetricsSnapshot, WorkerMetrics};
use super::rng::XorShift64;

/// Local pushes between proactive sibling wakeups.
///
/// A worker descending a deep fork tree publishes many stealable jobs while
/// its siblings may all be parked; without an occasional wake, they only
/// notice via their park timeout. Waking on every push would put a syscall
/// on the fork fast path, so the wake is amortized over a batch of pushes.
pub(crate) const WAKE_ON_HOARD_THRESHOLD: u32 = 32;

// ============================================================================
// Shared state
// ============================================================================

/// State shared between the pool owner and all workers.
///
/// # Invariants
///
/// - `stealers.len() == unparkers.len() == metrics.len() == worker count`
/// - `threshold` is immutable after construction
/// - `done` is monotonic: once true, never cleared
pub(crate) struct Shared {
    /// Global injector; `install` pushes root jobs here.
    pub(crate) injector: Injector<JobRef>,

    /// `stealers[i]` steals from worker `i`'s deque (FIFO steal order).
    pub(crate) stealers: Vec<Stealer<JobRef>>,

    /// Calibrated granularity threshold, in complexity units.
    pub(crate) threshold: f64,

    /// Stop flag. Set only by `ThreadPool::drop`.
    pub(crate) done: AtomicBool,

    /// Per-worker counters; slot `i` is written only by worker `i`.
    pub(crate) metrics: Box<[CachePadded<WorkerMetrics>]>,

    /// Unparkers for each worker.
    unparkers: Vec<Unparker>,

    /// Round-robin wakeup counter. Relaxed: approximate fairness is enough.
    next_unpark: AtomicUsize,
}

impl Shared {
    /// Wake one worker (round-robin).
    pub(crate) fn unpark_one(&self) {
        let n = self.unparkers.len();
        let idx = self.next_unpark.fetch_add(1, Ordering::Relaxed) % n;
        self.unparkers[idx].unpark();
    }

    /// Wake all workers.
    fn unpark_all(&self) {
        for u in &self.unparkers {
            u.unpark();
        }
    }
}

// ============================================================================
// Worker thread state and scope
// ============================================================================

/// One worker's thread-local state. Lives on the worker's own stack for the
/// pool's lifetime.
pub(crate) struct WorkerThread {
    pub(crate) index: usize,
    pub(crate) local: Worker<JobRef>,
    pub(crate) shared: Arc<Shared>,
    parker: Parker,
    rng: RefCell<XorShift64>,
    /// Local pushes since the last proactive sibling wake.
    hoard: Cell<u32>,
}

impl WorkerThread {
    /// This worker's metrics slot.
    #[inline]
    pub(crate) fn metrics(&self) -> &WorkerMetrics {
        &self.shared.metrics[self.index]
    }

    /// Publish a stealable job on the local deque.
    #[inline]
    pub(crate) fn publish(&self, job: JobRef) {
        self.local.push(job);
        let h = self.hoard.get() + 1;
        if h >= WAKE_ON_HOARD_THRESHOLD {
            self.hoard.set(0);
            self.shared.unpark_one();
        } else {
            self.hoard.set(h);
        }
    }

    /// One steal round: injector batch first, then victims starting from a
    /// random position.
    pub(crate) fn try_steal(&self) -> Option<JobRef> {
        let m = self.metrics();
        metrics::inc(&m.steal_attempts);

        match self.shared.injector.steal_batch_and_pop(&self.local) {
            Steal::Success(job) => {
                metrics::inc(&m.steal_successes);
                return Some(job);
            }
            Steal::Retry | Steal::Empty => {}
        }

        let n = self.shared.stealers.len();
        if n > 1 {
            let start = self.rng.borrow_mut().next_usize(n);
            for off in 0..n {
                let victim = (start + off) % n;
                if victim == self.index {
                    continue;
                }
                if let Steal::Success(job) = self.shared.stealers[victim].steal() {
                    metrics::inc(&m.steal_successes);
                    return Some(job);
                }
            }
        }
        None
    }

    /// Find a job: own deque first, then up to `tries` steal rounds.
    fn find_job(&self, tries: u32) -> Option<JobRef> {
        if let Some(job) = self.local.pop() {
            return Some(job);
        }
        for _ in 0..tries {
            if let Some(job) = self.try_steal() {
                return Some(job);
            }
        }
        None
    }

    /// Main worker loop: execute work until the pool is dropped.
    fn main_loop(&self, cfg: &PoolConfig) {
        let scope = WorkerScope { worker: self };
        let mut idle = TieredIdle::new();

        loop {
            if let Some(job) = self.find_job(cfg.steal_tries) {
                idle.on_work();
                scope.execute(job);
                continue;
            }
            if self.shared.done.load(Ordering::Acquire) {
                break;
            }
            match idle.on_idle(cfg) {
                IdleAction::Continue => {}
                IdleAction::Park(timeout) => self.parker.park_timeout(timeout),
            }
        }
    }
}

/// Capability handle for code running inside the pool.
///
/// Borrows the executing worker, so it is neither `Send` nor `Sync`; a
/// stolen job receives the thief's scope, never the forker's. All
/// primitives — [`fork2`](WorkerScope::fork2), [`guard`](WorkerScope::guard),
/// [`parallel_for`](WorkerScope::parallel_for),
/// [`reduce`](WorkerScope::reduce) — are methods on this handle, keeping the
/// runtime object explicit at every call site.
pub struct WorkerScope<'w> {
    pub(crate) worker: &'w WorkerThread,
}

impl WorkerScope<'_> {
    /// Index of the executing worker, `0..worker_count`.
    #[inline]
    pub fn worker_index(&self) -> usize {
        self.worker.index
    }

    /// Number of workers in the pool.
    #[inline]
    pub fn worker_count(&self) -> usize {
        self.worker.shared.stealers.len()
    }

    /// The pool's calibrated granularity threshold, in complexity units.
    #[inline]
    pub fn threshold(&self) -> f64 {
        self.worker.shared.threshold
    }

    /// This worker's metrics slot.
    #[inline]
    pub(crate) fn metrics(&self) -> &WorkerMetrics {
        self.worker.metrics()
    }

    /// Execute a job taken from a deque on this worker.
    #[inline]
    pub(crate) fn execute(&self, job: JobRef) {
        metrics::inc(&self.metrics().tasks_executed);
        // Safety: jobs reachable through the deques are live stack records
        // whose owners are waiting on their latches (see job.rs).
        unsafe { job.execute(self) };
    }
}

// ============================================================================
// ThreadPool
// ============================================================================

/// Fixed-size work-stealing pool with a per-pool granularity threshold.
///
/// # Lifecycle
///
/// 1. Construct with [`ThreadPool::new`]; workers start immediately and
///    park until work arrives. Calibration (unless overridden) happens here.
/// 2. Run computations with [`ThreadPool::install`].
/// 3. Drop the pool; workers are signaled and joined.
///
/// The pool is the explicit process-wide runtime object: hosts construct it
/// once and hand out `&ThreadPool` (or run everything through `install`).
/// Re-initialization is just constructing another pool.
pub struct ThreadPool {
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Create and start the pool.
    ///
    /// Spawns `cfg.workers` named threads, each owning a LIFO deque, a
    /// parker, and an RNG forked from the master seed. When
    /// `cfg.threshold_override` is `None`, the granularity threshold is
    /// calibrated here, once, on the constructing thread.
    pub fn new(cfg: PoolConfig) -> Self {
        cfg.validate();

        let threshold = cfg
            .threshold_override
            .unwrap_or_else(grain::calibrate_threshold);

        let injector = Injector::new();

        let mut locals = Vec::with_capacity(cfg.workers);
        let mut stealers = Vec::with_capacity(cfg.workers);
        for _ in 0..cfg.workers {
            let w = Worker::new_lifo();
            stealers.push(w.stealer());
            locals.push(w);
        }

        let mut parkers = Vec::with_capacity(cfg.workers);
        let mut unparkers = Vec::with_capacity(cfg.workers);
        for _ in 0..cfg.workers {
            let p = Parker::new();
            unparkers.push(p.unparker().clone());
            parkers.push(p);
        }

        let mut master_rng = XorShift64::new(cfg.seed);
        let mut rngs: Vec<XorShift64> = (0..cfg.workers).map(|_| master_rng.fork()).collect();

        let metrics = (0..cfg.workers)
            .map(|_| CachePadded::new(WorkerMetrics::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let shared = Arc::new(Shared {
            injector,
            stealers,
            threshold,
            done: AtomicBool::new(false),
            metrics,
            unparkers,
            next_unpark: AtomicUsize::new(0),
        });

        let mut threads = Vec::with_capacity(cfg.workers);

        // Spawn in reverse so pop() hands each thread the right slot.
        for index in (0..cfg.workers).rev() {
            let shared = Arc::clone(&shared);
            let local = locals.pop().expect("locals length mismatch");
            let parker = parkers.pop().expect("parkers length mismatch");
            let rng = rngs.pop().expect("rngs length mismatch");
            let thread_cfg = cfg;

            let th = thread::Builder::new()
                .name(format!("grainpool-worker-{index}"))
                .spawn(move || {
                    #[cfg(feature = "affinity")]
                    if thread_cfg.pin_threads {
                        pin_current_thread(index);
                    }

                    let worker = WorkerThread {
                        index,
                        local,
                        shared,
                        parker,
                        rng: RefCell::new(rng),
                        hoard: Cell::new(0),
                    };
                    worker.main_loop(&thread_cfg);
                })
                .expect("failed to spawn worker thread");

            threads.push(th);
        }

        threads.reverse();

        Self { shared, threads }
    }

    /// Run `op` inside the pool and return its result.
    ///
    /// The closure receives the [`WorkerScope`] of whichever worker picks it
    /// up; the calling thread parks until the operation completes.
    ///
    /// # Preconditions
    ///
    /// Must be called from outside the pool's worker threads. (A worker
    /// calling `install` would park itself instead of helping; use the
    /// scope it already has.)
    pub fn install<F, R>(&self, op: F) -> R
    where
        F: for<'s> FnOnce(&WorkerScope<'s>) -> R + Send,
        R: Send,
    {
        let job = StackJob::new(op, ParkLatch::new(thread::current()));
        // Safety: the record stays on this frame and is not touched until
        // its latch is observed set below.
        let job_ref = unsafe { job.as_job_ref() };
        self.shared.injector.push(job_ref);
        self.shared.unpark_one();

        // park() can wake spuriously; the latch is the ground truth.
        while !job.latch().probe() {
            thread::park();
        }

        // Safety: latch observed set with Acquire ordering.
        unsafe { job.take_result() }
    }

    /// Number of workers in the pool.
    pub fn worker_count(&self) -> usize {
        self.shared.stealers.len()
    }

    /// The calibrated granularity threshold, in complexity units.
    pub fn threshold(&self) -> f64 {
        self.shared.threshold
    }

    /// Aggregate scheduling counters across all workers.
    ///
    /// Counters for completed `install` calls are exact; operations still
    /// in flight may be mid-update.
    pub fn metrics(&self) -> MetricsSnapshot {
        let mut snap = MetricsSnapshot::default();
        for m in self.shared.metrics.iter() {
            snap.merge_worker(m);
        }
        snap
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shared.done.store(true, Ordering::Release);
        self.shared.unpark_all();
        for th in self.threads.drain(..) {
            th.join().expect("worker thread panicked");
        }
    }
}

// ============================================================================
// Idle policy
// ============================================================================

enum IdleAction {
    Continue,
    Park(Duration),
}

/// Tiered idle strategy: spin while work may arrive within nanoseconds,
/// yield occasionally to stay polite, then park with a timeout.
struct TieredIdle {
    idle_rounds: u32,
}

impl TieredIdle {
    fn new() -> Self {
        Self { idle_rounds: 0 }
    }

    fn on_work(&mut self) {
        self.idle_rounds = 0;
    }

    fn on_idle(&mut self, cfg: &PoolConfig) -> IdleAction {
        self.idle_rounds = self.idle_rounds.saturating_add(1);

        if self.idle_rounds <= cfg.spin_iters {
            std::hint::spin_loop();
            return IdleAction::Continue;
        }

        if (self.idle_rounds & 0xF) == 0 {
            thread::yield_now();
        }

        IdleAction::Park(cfg.park_timeout)
    }
}

#[cfg(feature = "affinity")]
fn pin_current_thread(index: usize) {
    let cores = match core_affinity::get_core_ids() {
        Some(v) if !v.is_empty() => v,
        _ => {
            eprintln!(
                "WARN: failed to get core IDs for worker {}, skipping affinity",
                index
            );
            return;
        }
    };
    let core = cores[index % cores.len()];
    if !core_affinity::set_for_current(core) {
        eprintln!("WARN: failed to pin worker {} to core {:?}", index, core.id);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    pub(crate) fn test_config(workers: usize) -> PoolConfig {
        PoolConfig {
            workers,
            seed: 12345,
            spin_iters: 100,
            park_timeout: Duration::from_micros(100),
            threshold_override: Some(1.0),
            ..PoolConfig::default()
        }
    }

    #[test]
    fn install_returns_value() {
        let pool = ThreadPool::new(test_config(2));
        let v = pool.install(|_scope| 40 + 2);
        assert_eq!(v, 42);
    }

    #[test]
    fn install_runs_on_a_worker() {
        let pool = ThreadPool::new(test_config(4));
        let idx = pool.install(|scope| scope.worker_index());
        assert!(idx < 4);
        assert_eq!(pool.worker_count(), 4);
    }

    #[test]
    fn repeated_installs_on_one_pool() {
        let pool = ThreadPool::new(test_config(2));
        let counter = AtomicUsize::new(0);
        for _ in 0..100 {
            pool.install(|_scope| {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        assert_eq!(counter.load(Ordering::Relaxed), 100);
        // Every install is one scheduled root job.
        assert_eq!(pool.metrics().tasks_executed, 100);
    }

    #[test]
    fn drop_without_work_is_clean() {
        let pool = ThreadPool::new(test_config(8));
        drop(pool);
    }

    #[test]
    fn threshold_override_is_visible() {
        let pool = ThreadPool::new(PoolConfig {
            threshold_override: Some(512.0),
            ..test_config(1)
        });
        assert_eq!(pool.threshold(), 512.0);
        let t = pool.install(|scope| scope.threshold());
        assert_eq!(t, 512.0);
    }

    #[test]
    fn concurrent_installs_from_many_threads() {
        let pool = ThreadPool::new(test_config(4));
        let counter = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        pool.install(|_scope| {
                            counter.fetch_add(1, Ordering::Relaxed);
                        });
                    }
                });
            }
        });

        assert_eq!(counter.load(Ordering::Relaxed), 400);
    }
}
