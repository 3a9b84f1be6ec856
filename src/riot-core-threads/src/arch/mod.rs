use crate::Thread;

/// Architecture specific parts of the scheduler.
pub(crate) trait Arch {
    /// Extra register state that is saved per thread on a context switch.
    type ThreadData;

    const DEFAULT_THREAD_DATA: Self::ThreadData;

    /// Prepares the stack of a new thread so that the first context switch to
    /// it starts `func(arg)` and returning from `func` ends up in the thread
    /// cleanup.
    fn setup_stack(thread: &mut Thread, stack: &mut [u8], func: usize, arg: usize);

    /// Requests a context switch.
    ///
    /// The switch itself happens once interrupts are enabled again.
    fn schedule();

    /// Starts the scheduler; the first context switch selects the first thread.
    fn start_threading();

    /// Waits for the next interrupt.
    fn wfi();

    /// Returns whether the CPU currently executes an interrupt handler.
    fn in_isr() -> bool;
}

cfg_if::cfg_if! {
    if #[cfg(context = "cortex-m")] {
        mod cortex_m;
        pub(crate) use self::cortex_m::Cpu;
    } else {
        pub(crate) mod host;
        pub(crate) use self::host::Cpu;
    }
}

pub(crate) type ThreadData = <Cpu as Arch>::ThreadData;

/// Requests a context switch.
///
/// If a thread of higher priority than the current one became runnable (or the
/// current thread blocked), the switch takes place as soon as interrupts are
/// enabled again, i.e., after the enclosing critical section.
pub fn schedule() {
    Cpu::schedule();
}
