//! Kernel core: a preemptive, priority based scheduler plus the primitives
//! built on it (IRQ control, locks, thread flags and message passing).
//!
//! The scheduler is single core and strictly priority preemptive: the highest
//! priority runnable thread always runs, threads of equal priority run in FIFO
//! order and only hand over the CPU when they block or call [`yield_same()`].
//!
//! All kernel state lives in one statically allocated [`Scheduler`] that is
//! only accessed in critical sections. Operations that make another thread
//! runnable request a context switch with [`schedule()`], which the arch layer
//! performs once interrupts are enabled again.
#![cfg_attr(not(test), no_std)]
// Disable indexing lints for now, possible panics are documented or rely on internally-enforced
// invariants
#![allow(clippy::indexing_slicing)]

#[cfg(feature = "testing")]
extern crate std;

use riot_core_runqueue::RunQueue;
pub use riot_core_runqueue::{RunqueueId, ThreadId};
use riot_core_utils::usize_from_env_or;

mod arch;
mod kernel_cell;
mod thread;
mod threadlist;

pub mod irq;
pub mod msg;
pub mod sync;
pub mod thread_flags;

#[cfg(all(any(test, feature = "testing"), not(context = "cortex-m")))]
pub mod testing;

pub use arch::schedule;
pub use thread::{Thread, ThreadState};
pub use threadlist::ThreadList;

use arch::{Arch, Cpu, ThreadData};
use kernel_cell::KernelCell;

/// The number of possible priority levels.
pub const SCHED_PRIO_LEVELS: usize = usize_from_env_or!("CONFIG_SCHED_PRIO_LEVELS", 12);

/// The number of threads that can exist at the same time.
pub const THREADS_NUMOF: usize = usize_from_env_or!("CONFIG_THREADS_NUMOF", 16);

pub(crate) static SCHEDULER: KernelCell<Scheduler> = KernelCell::new(Scheduler::new());

/// Struct holding all scheduler state
pub struct Scheduler {
    /// Global thread runqueue.
    runqueue: RunQueue<SCHED_PRIO_LEVELS, THREADS_NUMOF>,
    /// The actual TCBs.
    threads: [Thread; THREADS_NUMOF],
    /// Links of the [`ThreadList`]s: the next thread waiting on the same
    /// resource, if any.
    thread_blocklist: [Option<ThreadId>; THREADS_NUMOF],
    /// The currently running thread.
    current_thread: Option<ThreadId>,
}

impl Scheduler {
    const fn new() -> Self {
        Self {
            runqueue: RunQueue::new(),
            threads: [const { Thread::default() }; THREADS_NUMOF],
            thread_blocklist: [const { None }; THREADS_NUMOF],
            current_thread: None,
        }
    }

    /// Returns checked mutable access to the thread data of the currently
    /// running thread.
    ///
    /// Returns `None` if there is no current thread.
    pub(crate) fn current(&mut self) -> Option<&mut Thread> {
        self.current_thread
            .map(|pid| &mut self.threads[usize::from(pid)])
    }

    pub(crate) fn current_pid(&self) -> Option<ThreadId> {
        self.current_thread
    }

    /// Creates a new thread in [`ThreadState::Paused`].
    ///
    /// Returns `None` if there is no free thread slot.
    fn create(
        &mut self,
        func: usize,
        arg: usize,
        stack: &'static mut [u8],
        prio: RunqueueId,
    ) -> Option<ThreadId> {
        let (thread, pid) = self.get_unused()?;
        *thread = Thread::default();
        Cpu::setup_stack(thread, stack, func, arg);
        thread.prio = prio;
        thread.pid = pid;
        thread.state = ThreadState::Paused;
        Some(pid)
    }

    /// Returns access to any thread data.
    ///
    /// # Panics
    ///
    /// Panics if `pid` is >= [`THREADS_NUMOF`].
    /// If the thread for this `pid` is in an invalid state, the data in the
    /// returned [`Thread`] is undefined, i.e. empty or outdated.
    pub(crate) fn get_unchecked(&self, pid: ThreadId) -> &Thread {
        &self.threads[usize::from(pid)]
    }

    /// Mutable version of [`Self::get_unchecked`].
    pub(crate) fn get_unchecked_mut(&mut self, pid: ThreadId) -> &mut Thread {
        &mut self.threads[usize::from(pid)]
    }

    /// Returns an unused thread slot.
    fn get_unused(&mut self) -> Option<(&mut Thread, ThreadId)> {
        let pid = self
            .threads
            .iter()
            .position(|thread| thread.state == ThreadState::Invalid)?;
        Some((&mut self.threads[pid], pid as ThreadId))
    }

    /// Checks if a thread with valid state exists for this `pid`.
    pub(crate) fn is_valid_pid(&self, pid: ThreadId) -> bool {
        self.threads
            .get(usize::from(pid))
            .is_some_and(|thread| thread.state != ThreadState::Invalid)
    }

    /// Sets the state of a thread.
    ///
    /// This function handles adding/ removing the thread to the runqueue depending
    /// on its previous or new state. It does not request a context switch.
    ///
    /// # Panics
    ///
    /// Panics if `pid` is >= [`THREADS_NUMOF`].
    pub(crate) fn set_state(&mut self, pid: ThreadId, state: ThreadState) -> ThreadState {
        let thread = &mut self.threads[usize::from(pid)];
        let old_state = thread.state;
        thread.state = state;
        if old_state != ThreadState::Running && state == ThreadState::Running {
            self.runqueue.add(thread.pid, thread.prio);
        } else if old_state == ThreadState::Running && state != ThreadState::Running {
            self.runqueue.del(thread.pid, thread.prio);
        }

        old_state
    }

    /// Returns the state of a thread.
    pub(crate) fn get_state(&self, pid: ThreadId) -> Option<ThreadState> {
        self.is_valid_pid(pid)
            .then(|| self.threads[usize::from(pid)].state)
    }

    /// Changes the priority of a thread, moving it to the new runqueue if it
    /// is runnable.
    ///
    /// # Panics
    ///
    /// Panics if `pid` is >= [`THREADS_NUMOF`].
    pub(crate) fn set_priority(&mut self, pid: ThreadId, prio: RunqueueId) {
        let thread = &mut self.threads[usize::from(pid)];
        let old_prio = thread.prio;
        if old_prio == prio {
            return;
        }
        thread.prio = prio;
        if thread.state == ThreadState::Running {
            self.runqueue.del(pid, old_prio);
            self.runqueue.add(pid, prio);
        }
    }

    /// Makes the head of the highest non-empty runqueue the current thread.
    ///
    /// Returns the previous and the new current thread, or `None` if no
    /// thread is runnable (the current thread is left untouched then).
    pub(crate) fn select_next(&mut self) -> Option<(Option<ThreadId>, ThreadId)> {
        let next = self.runqueue.get_next()?;
        let prev = self.current_thread.replace(next);
        Some((prev, next))
    }
}

/// Starts threading.
///
/// Supposed to be started early on by OS startup code. The first context
/// switch selects the highest priority thread that was created so far.
///
/// # Safety
///
/// This may only be called once.
pub unsafe fn start_threading() {
    Cpu::start_threading();
}

/// Trait for types that fit into a single register.
///
/// Currently implemented for `'static` references, `usize` and `()`.
pub trait Arguable {
    fn into_arg(self) -> usize;
}

impl Arguable for usize {
    fn into_arg(self) -> usize {
        self
    }
}

impl Arguable for () {
    fn into_arg(self) -> usize {
        0
    }
}

impl<T> Arguable for &'static T {
    fn into_arg(self) -> usize {
        self as *const T as usize
    }
}

/// Low-level function to create a thread that runs `func` with `arg`.
///
/// This sets up the stack for the thread and adds it to the runqueue. If the
/// new thread has a higher priority than the current one, it preempts it.
///
/// # Panics
///
/// Panics if all [`THREADS_NUMOF`] thread slots are in use, or if `prio` is
/// not below [`SCHED_PRIO_LEVELS`].
pub fn thread_create<T: Arguable + Send>(
    func: fn(arg: T),
    arg: T,
    stack: &'static mut [u8],
    prio: RunqueueId,
) -> ThreadId {
    let arg = arg.into_arg();
    // SAFETY: `func` takes an argument of type `T`, matching `arg`.
    unsafe { thread_create_raw(func as usize, arg, stack, prio) }
}

/// Low-level function to create a thread without argument.
///
/// See [`thread_create()`].
pub fn thread_create_noarg(func: fn(), stack: &'static mut [u8], prio: RunqueueId) -> ThreadId {
    // SAFETY: a function without arguments ignores `r0`.
    unsafe { thread_create_raw(func as usize, 0, stack, prio) }
}

/// Creates a thread, low-level.
///
/// # Safety
///
/// `func` must be the address of a function taking a single register sized
/// argument, which `arg` is passed as.
///
/// # Panics
///
/// See [`thread_create()`].
pub unsafe fn thread_create_raw(
    func: usize,
    arg: usize,
    stack: &'static mut [u8],
    prio: RunqueueId,
) -> ThreadId {
    assert!(
        usize::from(prio) < SCHED_PRIO_LEVELS,
        "thread priority out of range"
    );
    SCHEDULER.with_mut(|mut scheduler| {
        let pid = scheduler
            .create(func, arg, stack, prio)
            .expect("no free thread slot");
        scheduler.set_state(pid, ThreadState::Running);
        riot_core_log::debug!("thread {} created with priority {}", pid, prio);
        schedule();
        pid
    })
}

/// Returns the [`ThreadState`] for this `pid`.
///
/// Returns `None` if `pid` is out of bound or no thread with
/// valid state exists.
pub fn get_state(pid: ThreadId) -> Option<ThreadState> {
    SCHEDULER.with(|scheduler| scheduler.get_state(pid))
}

/// Returns the [`ThreadId`] of the currently active thread.
///
/// Note: when called from ISRs, this will return the thread id of the thread
/// that was interrupted.
pub fn current_pid() -> Option<ThreadId> {
    SCHEDULER.with(|scheduler| scheduler.current_pid())
}

/// Checks if a given [`ThreadId`] is valid
pub fn is_valid_pid(pid: ThreadId) -> bool {
    SCHEDULER.with(|scheduler| scheduler.is_valid_pid(pid))
}

/// Returns the priority of a thread, or `None` if `pid` is not valid.
pub fn get_priority(pid: ThreadId) -> Option<RunqueueId> {
    SCHEDULER.with(|scheduler| {
        scheduler
            .is_valid_pid(pid)
            .then(|| scheduler.get_unchecked(pid).prio)
    })
}

/// Changes the priority of a thread.
///
/// Lowering the priority of the current thread or raising the priority of
/// another runnable thread may cause a context switch.
///
/// Does nothing if `pid` is not valid.
///
/// # Panics
///
/// Panics if `prio` is not below [`SCHED_PRIO_LEVELS`].
pub fn set_priority(pid: ThreadId, prio: RunqueueId) {
    assert!(
        usize::from(prio) < SCHED_PRIO_LEVELS,
        "thread priority out of range"
    );
    SCHEDULER.with_mut(|mut scheduler| {
        if scheduler.is_valid_pid(pid) {
            scheduler.set_priority(pid, prio);
            schedule();
        }
    })
}

/// Thread cleanup function.
///
/// This gets hooked into a newly created thread stack so it gets called when
/// the thread function returns.
#[allow(unused)]
fn cleanup() -> ! {
    SCHEDULER.with_mut(|mut scheduler| {
        let pid = scheduler
            .current_pid()
            .expect("cleanup() runs in thread context");
        scheduler.set_state(pid, ThreadState::Invalid);
        riot_core_log::debug!("thread {} terminated", pid);
    });

    schedule();

    unreachable!();
}

/// "Yields" to another thread with the same priority.
///
/// # Panics
///
/// Panics if this is called outside of a thread context.
pub fn yield_same() {
    SCHEDULER.with_mut(|mut scheduler| {
        let prio = scheduler
            .current()
            .expect("Function should be called inside a thread context.")
            .prio;
        scheduler.runqueue.advance(prio);
        schedule();
    })
}

/// Suspends/ pauses the current thread's execution until [`wakeup()`].
///
/// # Panics
///
/// Panics if this is called outside of a thread context or from an ISR.
pub fn sleep() {
    assert!(!irq::is_in_isr(), "sleep() called from interrupt context");
    SCHEDULER.with_mut(|mut scheduler| scheduler.sleep_current());
}

impl Scheduler {
    pub(crate) fn sleep_current(&mut self) {
        let pid = self
            .current_pid()
            .expect("Function should be called inside a thread context.");
        self.set_state(pid, ThreadState::Paused);
        schedule();
    }
}

/// Wakes up a thread and adds it to the runqueue.
///
/// Returns `false` if no paused thread exists for `pid`.
pub fn wakeup(pid: ThreadId) -> bool {
    SCHEDULER.with_mut(|mut scheduler| {
        if scheduler.get_state(pid) == Some(ThreadState::Paused) {
            scheduler.set_state(pid, ThreadState::Running);
            schedule();
            true
        } else {
            false
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nop() {}

    #[test]
    fn create_and_query() {
        let _guard = testing::lock();
        testing::reset();

        let pid = thread_create_noarg(nop, testing::stack(), 3);
        assert!(is_valid_pid(pid));
        assert_eq!(get_state(pid), Some(ThreadState::Running));
        assert_eq!(get_priority(pid), Some(3));
        assert!(testing::take_switch_request());

        assert!(!is_valid_pid(pid + 1));
        assert_eq!(get_state(THREADS_NUMOF as ThreadId), None);
        assert_eq!(get_priority(THREADS_NUMOF as ThreadId), None);
    }

    #[test]
    fn create_with_argument() {
        static VALUE: u32 = 7;
        fn takes_ref(_: &'static u32) {}

        let _guard = testing::lock();
        testing::reset();

        let pid = thread_create(takes_ref, &VALUE, testing::stack(), 1);
        assert_eq!(get_state(pid), Some(ThreadState::Running));
    }

    #[test]
    #[should_panic(expected = "no free thread slot")]
    fn create_too_many() {
        let _guard = testing::lock();
        testing::reset();

        for _ in 0..=THREADS_NUMOF {
            thread_create_noarg(nop, testing::stack(), 0);
        }
    }

    #[test]
    #[should_panic(expected = "thread priority out of range")]
    fn create_with_invalid_priority() {
        let _guard = testing::lock();
        testing::reset();

        thread_create_noarg(nop, testing::stack(), SCHED_PRIO_LEVELS as RunqueueId);
    }

    #[test]
    fn highest_priority_runs_first() {
        let _guard = testing::lock();
        testing::reset();

        let low = testing::spawn(1);
        let high = testing::spawn(4);
        let mid = testing::spawn(2);

        assert_eq!(testing::context_switch(), Some(high));
        assert_eq!(current_pid(), Some(high));

        sleep();
        assert_eq!(get_state(high), Some(ThreadState::Paused));
        assert_eq!(testing::context_switch(), Some(mid));

        assert!(wakeup(high));
        assert!(!wakeup(high));
        assert_eq!(testing::context_switch(), Some(high));

        assert!(!wakeup(low));
    }

    #[test]
    fn yield_round_robin() {
        let _guard = testing::lock();
        testing::reset();

        let a = testing::spawn(2);
        let b = testing::spawn(2);
        let c = testing::spawn(2);

        assert_eq!(testing::context_switch(), Some(a));
        yield_same();
        assert_eq!(testing::context_switch(), Some(b));
        yield_same();
        assert_eq!(testing::context_switch(), Some(c));
        yield_same();
        assert_eq!(testing::context_switch(), Some(a));
    }

    #[test]
    fn priority_change_reorders() {
        let _guard = testing::lock();
        testing::reset();

        let a = testing::spawn(2);
        let b = testing::spawn(3);
        assert_eq!(testing::context_switch(), Some(b));

        set_priority(a, 5);
        assert_eq!(get_priority(a), Some(5));
        assert_eq!(testing::context_switch(), Some(a));

        // a paused thread is only requeued on wakeup
        sleep();
        set_priority(a, 0);
        assert_eq!(testing::context_switch(), Some(b));
        assert!(wakeup(a));
        assert_eq!(testing::context_switch(), Some(b));
    }

    #[test]
    fn no_runnable_thread() {
        let _guard = testing::lock();
        testing::reset();

        assert_eq!(current_pid(), None);
        assert_eq!(testing::context_switch(), None);

        let pid = testing::spawn(0);
        assert_eq!(testing::context_switch(), Some(pid));
        sleep();
        assert_eq!(testing::context_switch(), None);
        // the previous thread stays current until another one becomes runnable
        assert_eq!(current_pid(), Some(pid));
    }
}
