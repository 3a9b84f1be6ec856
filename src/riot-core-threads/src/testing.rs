//! Helpers to drive the scheduler from host tests.
//!
//! On the host there is no real context switch. Tests create threads that
//! never run, and decide themselves when the "current" thread changes, either
//! by letting the scheduler pick ([`context_switch()`]) or by forcing a thread
//! ([`switch_to()`]). A call that would block the current thread returns
//! right away; the thread is left in its blocked state, just as if another
//! thread had been switched to.
//!
//! The kernel state is global, so tests using these helpers must hold the
//! [`lock()`] guard for their whole duration.
use std::sync::{Mutex, MutexGuard};

use crate::{
    arch::host, thread_create_noarg, RunqueueId, Scheduler, ThreadId, ThreadState, SCHEDULER,
};

static TEST_LOCK: Mutex<()> = Mutex::new(());

/// Serializes tests that use the global kernel state.
///
/// A test that panicked while holding the lock does not poison it for the
/// others.
pub fn lock() -> MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// Resets all kernel state: no threads, no current thread, not in an ISR.
pub fn reset() {
    SCHEDULER.with_mut(|mut scheduler| *scheduler = Scheduler::new());
    host::set_in_isr(false);
    host::take_switch_request();
}

/// Returns an empty stack, good enough for threads that never run.
pub fn stack() -> &'static mut [u8] {
    &mut []
}

fn never_runs() {}

/// Creates a runnable thread with priority `prio`.
pub fn spawn(prio: RunqueueId) -> ThreadId {
    thread_create_noarg(never_runs, stack(), prio)
}

/// Lets the scheduler pick the next thread and makes it the current one.
///
/// Returns the new current thread, or `None` if no thread is runnable.
pub fn context_switch() -> Option<ThreadId> {
    host::take_switch_request();
    SCHEDULER.with_mut(|mut scheduler| scheduler.select_next().map(|(_, next)| next))
}

/// Makes `pid` the current thread, regardless of priorities.
pub fn switch_to(pid: ThreadId) {
    SCHEDULER.with_mut(|mut scheduler| scheduler.current_thread = Some(pid));
}

/// Runs `f` as if it were called from an interrupt handler.
pub fn in_isr<R>(f: impl FnOnce() -> R) -> R {
    struct Leave;
    impl Drop for Leave {
        fn drop(&mut self) {
            host::set_in_isr(false);
        }
    }

    host::set_in_isr(true);
    let _leave = Leave;
    f()
}

/// Returns whether a context switch was requested since the last call (or
/// since the last [`context_switch()`]).
pub fn take_switch_request() -> bool {
    host::take_switch_request()
}

/// Puts thread `pid` into `state`, as if it had blocked itself.
pub fn block(pid: ThreadId, state: ThreadState) {
    SCHEDULER.with_mut(|mut scheduler| {
        scheduler.set_state(pid, state);
    });
}
