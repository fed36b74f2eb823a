//! Type-erased job records for the work-stealing deques.
//!
//! A fork publishes a [`StackJob`] that lives on the forking worker's call
//! stack; only an erased [`JobRef`] (data pointer + execute thunk) travels
//! through the deques. The record's address doubles as its identity, which
//! is how a join recognizes its own un-stolen job when popping the local
//! queue.
//!
//! # Safety model
//!
//! The creator of a `StackJob` guarantees that the record outlives every
//! `JobRef` derived from it, and that it does not read the result slot
//! until the latch is observed set (an `Acquire` load pairing with the
//! `Release` store in `Latch::set`). Under that contract the erased
//! pointers never dangle and the result handoff is properly synchronized.
//!
//! # Panic policy
//!
//! A panic inside any scheduled job aborts the process. The runtime has no
//! recovery primitive: an unwinding job would leave its sibling running
//! against a dead stack frame, so the abort is the only sound exit. Callers
//! that want fallible parallel work should return values, not unwind.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::Thread;

use super::pool::WorkerScope;

/// Completion signal for a job, set exactly once after the result slot is
/// written.
pub(crate) trait Latch {
    fn set(&self);
}

/// Latch probed by a cooperating worker inside a join loop.
pub(crate) struct WorkerLatch {
    done: AtomicBool,
}

impl WorkerLatch {
    pub(crate) fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
        }
    }

    /// True once the job completed. `Acquire` pairs with the `Release`
    /// store in `set`, making the result slot visible to the prober.
    #[inline]
    pub(crate) fn probe(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

impl Latch for WorkerLatch {
    #[inline]
    fn set(&self) {
        self.done.store(true, Ordering::Release);
    }
}

/// Latch that additionally unparks a non-worker thread waiting in
/// `ThreadPool::install`.
pub(crate) struct ParkLatch {
    done: AtomicBool,
    owner: Thread,
}

impl ParkLatch {
    pub(crate) fn new(owner: Thread) -> Self {
        Self {
            done: AtomicBool::new(false),
            owner,
        }
    }

    #[inline]
    pub(crate) fn probe(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

impl Latch for ParkLatch {
    fn set(&self) {
        self.done.store(true, Ordering::Release);
        self.owner.unpark();
    }
}

/// A job that can be executed through an erased pointer.
pub(crate) trait Job {
    /// # Safety
    /// `this` must point to a live record of the implementing type, and the
    /// job must be executed at most once.
    unsafe fn execute(this: *const Self, scope: &WorkerScope<'_>);
}

/// Erased reference to a job record living elsewhere (on some stack).
///
/// Pointer identity is job identity: `id` is compared against the record
/// address during the un-stolen fast path of a join.
pub(crate) struct JobRef {
    data: *const (),
    execute_fn: unsafe fn(*const (), &WorkerScope<'_>),
}

// Safety: JobRef is only constructed from StackJob records whose closure
// and result types are Send (enforced by StackJob::as_job_ref's bounds),
// and the record outlives the reference per the module safety model.
unsafe impl Send for JobRef {}

impl JobRef {
    /// # Safety
    /// `job` must outlive the returned reference and be executed at most
    /// once.
    pub(crate) unsafe fn new<J: Job>(job: *const J) -> JobRef {
        unsafe fn run<J: Job>(data: *const (), scope: &WorkerScope<'_>) {
            J::execute(data as *const J, scope)
        }
        JobRef {
            data: job as *const (),
            execute_fn: run::<J>,
        }
    }

    /// Identity of the underlying record.
    #[inline]
    pub(crate) fn id(&self) -> *const () {
        self.data
    }

    /// Execute the job on the given worker.
    ///
    /// # Safety
    /// The underlying record must still be live and not yet executed.
    #[inline]
    pub(crate) unsafe fn execute(self, scope: &WorkerScope<'_>) {
        (self.execute_fn)(self.data, scope)
    }
}

/// A fork-join job held on the forking worker's stack: the closure, a slot
/// for its result, and the completion latch.
pub(crate) struct StackJob<L: Latch, F, R> {
    latch: L,
    func: UnsafeCell<Option<F>>,
    result: UnsafeCell<Option<R>>,
}

impl<L, F, R> StackJob<L, F, R>
where
    L: Latch,
    F: for<'s> FnOnce(&WorkerScope<'s>) -> R + Send,
    R: Send,
{
    pub(crate) fn new(func: F, latch: L) -> Self {
        Self {
            latch,
            func: UnsafeCell::new(Some(func)),
            result: UnsafeCell::new(None),
        }
    }

    pub(crate) fn latch(&self) -> &L {
        &self.latch
    }

    /// Erase this record into a deque-traversable reference.
    ///
    /// # Safety
    /// The record must not move or drop until its latch has been observed
    /// set (or the reference was popped back and executed inline).
    pub(crate) unsafe fn as_job_ref(&self) -> JobRef {
        JobRef::new::<Self>(self as *const Self)
    }

    /// Take the result out of the slot.
    ///
    /// # Safety
    /// Only call after the latch was observed set with `Acquire` ordering
    /// (or after executing the job on the current thread).
    pub(crate) unsafe fn take_result(&self) -> R {
        (*self.result.get())
            .take()
            .expect("stack job result missing")
    }
}

impl<L, F, R> Job for StackJob<L, F, R>
where
    L: Latch,
    F: for<'s> FnOnce(&WorkerScope<'s>) -> R + Send,
    R: Send,
{
    unsafe fn execute(this: *const Self, scope: &WorkerScope<'_>) {
        let this = &*this;
        // Dropped only on unwind; see the module panic policy.
        let guard = AbortOnUnwind;
        let func = (*this.func.get())
            .take()
            .expect("stack job executed twice");
        let result = func(scope);
        *this.result.get() = Some(result);
        std::mem::forget(guard);
        // Result write happens-before the Release store in set().
        this.latch.set();
    }
}

/// Converts an unwind crossing a fork-join boundary into a process abort.
///
/// Armed around job execution here and around the inline branch of `fork2`:
/// an unwind past a published job would drop the stack record while a thief
/// may still be writing its result slot.
pub(crate) struct AbortOnUnwind;

impl Drop for AbortOnUnwind {
    fn drop(&mut self) {
        eprintln!("grainpool: panic inside a fork-join computation; aborting");
        std::process::abort();
    }
}
