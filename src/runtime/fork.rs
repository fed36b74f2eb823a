//! The fork-join primitive.
//!
//! `fork2(f, g)` publishes `f` as a stealable job on the calling worker's
//! deque and runs `g` inline on the current call stack. The join then has
//! two paths:
//!
//! - **Un-stolen fast path**: if `f` is still on top of the local deque
//!   when `g` finishes, it is popped back (pointer identity check) and run
//!   inline. No latch traffic, no atomics beyond the deque itself.
//! - **Cooperative wait**: if `f` was stolen, the worker keeps itself
//!   useful — draining its own deque, then stealing — until `f`'s latch
//!   reads set. The OS thread is never parked inside a join, which is what
//!   makes simultaneous joins on every worker deadlock-free.
//!
//! Jobs popped while waiting may belong to an enclosing fork (leapfrogging);
//! executing them here is sound, the outer join simply finds its deque
//! empty and waits on its latch.

use std::thread;

use super::job::{AbortOnUnwind, StackJob, WorkerLatch};
use super::metrics;
use super::pool::WorkerScope;

impl WorkerScope<'_> {
    /// Run two computations to completion, in parallel when profitable.
    ///
    /// `f` is published for stealing; `g` runs inline first. Both are
    /// guaranteed complete when `fork2` returns. No ordering is guaranteed
    /// between them, and `f` may run on any worker — it receives the
    /// executing worker's scope, which is the handle it must use for any
    /// nested forks.
    ///
    /// A panic in either computation aborts the process (see `job.rs`).
    pub fn fork2<F, RF, G, RG>(&self, f: F, g: G) -> (RF, RG)
    where
        F: for<'s> FnOnce(&WorkerScope<'s>) -> RF + Send,
        RF: Send,
        G: FnOnce() -> RG,
    {
        let fjob = StackJob::new(f, WorkerLatch::new());
        // Safety: fjob stays on this frame; we do not return before the
        // join below observes it complete or runs it inline.
        let fref = unsafe { fjob.as_job_ref() };
        let fid = fref.id();

        metrics::inc(&self.metrics().forks);
        self.worker.publish(fref);

        // fjob is published: an unwind from here would drop it while a
        // thief may be writing its result slot. Abort at this boundary,
        // not transitively at some enclosing job.
        let unwind_guard = AbortOnUnwind;
        let rg = g();
        std::mem::forget(unwind_guard);

        self.join_published(&fjob, fid);

        // Safety: join_published returns only after the job ran (latch
        // observed with Acquire, or executed on this thread).
        let rf = unsafe { fjob.take_result() };
        (rf, rg)
    }

    /// Wait for a published job, executing other work in the meantime.
    fn join_published<F, RF>(&self, job: &StackJob<WorkerLatch, F, RF>, id: *const ())
    where
        F: for<'s> FnOnce(&WorkerScope<'s>) -> RF + Send,
        RF: Send,
    {
        let mut idle_rounds: u32 = 0;

        while !job.latch().probe() {
            if let Some(popped) = self.worker.local.pop() {
                if popped.id() == id {
                    // Never stolen: run it ourselves, skipping the
                    // synchronization handshake entirely.
                    metrics::inc(&self.metrics().inline_joins);
                    // Safety: `popped` is the erased reference to `job`,
                    // which is live and unexecuted (its latch is unset and
                    // the reference just left the deque).
                    unsafe { popped.execute(self) };
                    return;
                }
                // Someone else's job (ours was stolen and this one belongs
                // to an enclosing fork). Helping with it is useful work.
                self.execute(popped);
                idle_rounds = 0;
                continue;
            }

            if let Some(stolen) = self.worker.try_steal() {
                self.execute(stolen);
                idle_rounds = 0;
                continue;
            }

            // Nothing to do but wait for the thief. Stay hot briefly, then
            // yield; never park here.
            idle_rounds = idle_rounds.wrapping_add(1);
            if (idle_rounds & 0xF) == 0 {
                thread::yield_now();
            } else {
                std::hint::spin_loop();
            }
        }
    }
}
