//! Interrupt control.
//!
//! Disabling interrupts is the kernel's basic mutual exclusion mechanism on a
//! single core. It is built on the [`critical_section`] crate, so the
//! [`CriticalSection`] token obtained here can be used with
//! [`critical_section::Mutex`] and the rest of the kernel API.
//!
//! Interrupts must never stay disabled across a blocking call; all blocking
//! functions assert that they run in thread context, and the context switch
//! they request only happens once interrupts are enabled again.
use core::marker::PhantomData;

use critical_section::{CriticalSection, RestoreState};

use crate::{Arch, Cpu};

/// Keeps interrupts disabled while alive.
///
/// Created by [`disable()`]. Dropping the guard restores the interrupt state
/// from before [`disable()`], so nested guards work as expected: only
/// dropping the outermost guard enables interrupts again. Guards must be
/// dropped in reverse order of creation, which scoping takes care of.
#[must_use = "interrupts are enabled again when the guard is dropped"]
pub struct IrqGuard {
    state: RestoreState,
    // The state must be restored on the same core and context that saved it.
    _not_send: PhantomData<*mut ()>,
}

/// Disables interrupts, returning a guard that restores the previous state.
pub fn disable() -> IrqGuard {
    // SAFETY: the matching `release()` happens when the guard is dropped.
    let state = unsafe { critical_section::acquire() };
    IrqGuard {
        state,
        _not_send: PhantomData,
    }
}

impl IrqGuard {
    /// Returns a critical section token, valid while the guard is alive.
    pub fn cs(&self) -> CriticalSection<'_> {
        // SAFETY: interrupts stay disabled for the lifetime of `self`.
        unsafe { CriticalSection::new() }
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        // SAFETY: `state` was returned by the `acquire()` in `disable()`.
        unsafe { critical_section::release(self.state) };
    }
}

/// Runs `f` with interrupts disabled.
///
/// The previous interrupt state is restored even if `f` panics.
pub fn with<R>(f: impl FnOnce(CriticalSection<'_>) -> R) -> R {
    critical_section::with(f)
}

/// Returns whether the code runs in interrupt context.
pub fn is_in_isr() -> bool {
    Cpu::in_isr()
}
