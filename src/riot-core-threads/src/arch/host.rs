//! Stand-in architecture for running the kernel logic on the build host.
//!
//! There is no real context switch: [`Cpu::schedule()`] only records that a
//! switch was requested, and the "current thread" changes when a test says so
//! (see [`crate::testing`]). Interrupt context is simulated with a flag.
use core::sync::atomic::{AtomicBool, Ordering};

use crate::{Arch, Thread};

static IN_ISR: AtomicBool = AtomicBool::new(false);
static SWITCH_REQUESTED: AtomicBool = AtomicBool::new(false);

pub struct Cpu;

impl Arch for Cpu {
    type ThreadData = ();

    const DEFAULT_THREAD_DATA: Self::ThreadData = ();

    fn setup_stack(thread: &mut Thread, stack: &mut [u8], _func: usize, _arg: usize) {
        thread.sp = stack.as_ptr() as usize + stack.len();
    }

    fn schedule() {
        SWITCH_REQUESTED.store(true, Ordering::Relaxed);
    }

    fn start_threading() {
        Self::schedule();
    }

    fn wfi() {}

    fn in_isr() -> bool {
        IN_ISR.load(Ordering::Relaxed)
    }
}

#[allow(dead_code, reason = "only used by the testing helpers")]
pub(crate) fn set_in_isr(in_isr: bool) {
    IN_ISR.store(in_isr, Ordering::Relaxed);
}

#[allow(dead_code, reason = "only used by the testing helpers")]
pub(crate) fn take_switch_request() -> bool {
    SWITCH_REQUESTED.swap(false, Ordering::Relaxed)
}
