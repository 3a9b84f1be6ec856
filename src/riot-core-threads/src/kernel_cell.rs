//! Interior mutability for kernel state.
//!
//! A [`KernelCell`] can only be accessed inside a critical section, and the
//! [`RefCell`] inside it catches reentrant access at runtime (e.g., taking the
//! scheduler state while it is already borrowed further up the call stack).
use core::cell::{Ref, RefCell, RefMut};

use critical_section::{with, CriticalSection, Mutex};

pub(crate) struct KernelCell<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> KernelCell<T> {
    pub const fn new(inner: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(inner)),
        }
    }

    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(Ref<T>) -> R,
    {
        with(|cs| f(self.inner.borrow(cs).borrow()))
    }

    pub fn with_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(RefMut<T>) -> R,
    {
        with(|cs| self.with_mut_cs(cs, f))
    }

    pub fn with_mut_cs<F, R>(&self, cs: CriticalSection, f: F) -> R
    where
        F: FnOnce(RefMut<T>) -> R,
    {
        f(self.inner.borrow(cs).borrow_mut())
    }

    /// Returns a raw pointer to the contents, bypassing the borrow tracking.
    ///
    /// Only meant for the context switch code, which runs with interrupts
    /// disabled and cannot return a borrow.
    #[allow(dead_code, reason = "only used by some architectures")]
    pub fn as_ptr(&self, cs: CriticalSection) -> *mut T {
        self.inner.borrow(cs).as_ptr()
    }
}
