//! Data-carrying mutex
//!
//! This roughly mimics [std::sync::Mutex], built on a [`Lock`].
use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
};

use super::Lock;
use crate::{irq, SCHEDULER};

/// A mutual exclusion primitive useful for protecting shared data
///
/// Unlike the [std::sync::Mutex], this has no concept of poisoning: threads
/// don't unwind, so a mutex held by a panicked thread stays locked.
///
/// There is no priority inheritance; a low priority owner can be kept from
/// running (and thus from unlocking) by threads of medium priority.
pub struct Mutex<T> {
    lock: Lock,
    data: UnsafeCell<T>,
}

impl<T> Mutex<T> {
    /// Creates a new **unlocked** [`Mutex`].
    pub const fn new(value: T) -> Mutex<T> {
        Mutex {
            lock: Lock::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Returns whether the mutex is locked.
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// Acquires the mutex, blocking the current thread until it is able to do so.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is locked and this is called outside of a thread
    /// context or from an ISR.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.lock.acquire();
        MutexGuard { mutex: self }
    }

    /// Attempts to acquire the mutex, in a non-blocking fashion.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.lock.try_acquire().then(|| MutexGuard { mutex: self })
    }
}

// SAFETY: the data is only reachable through a guard, of which at most one exists.
unsafe impl<T: Send> Send for Mutex<T> {}
// SAFETY: see above.
unsafe impl<T: Send> Sync for Mutex<T> {}

/// Grants access to the [`Mutex`] inner data.
///
/// Dropping the [`MutexGuard`] will unlock the [`Mutex`].
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<T> MutexGuard<'_, T> {
    /// Unlocks the mutex and puts the current thread to sleep, atomically:
    /// a [`crate::wakeup()`] issued by the next owner cannot get lost.
    ///
    /// # Panics
    ///
    /// Panics if this is called outside of a thread context or from an ISR.
    pub fn unlock_and_sleep(self) {
        assert!(!irq::is_in_isr(), "sleep() called from interrupt context");
        let mutex = self.mutex;
        core::mem::forget(self);
        critical_section::with(|cs| {
            mutex.lock.release_cs(cs);
            SCHEDULER.with_mut_cs(cs, |mut scheduler| scheduler.sleep_current());
        });
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard has exclusive access while it exists.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard has exclusive access while it exists.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{get_state, testing, ThreadState};

    #[test]
    fn guard_grants_access() {
        let _guard = testing::lock();
        testing::reset();

        let mutex = Mutex::new(0u32);
        {
            let mut value = mutex.lock();
            *value += 5;
            assert!(mutex.is_locked());
            assert!(mutex.try_lock().is_none());
        }
        assert!(!mutex.is_locked());
        assert_eq!(*mutex.try_lock().unwrap(), 5);
    }

    #[test]
    fn waiter_owns_mutex_after_unlock() {
        static MUTEX: Mutex<u8> = Mutex::new(0);

        let _guard = testing::lock();
        testing::reset();

        let owner = testing::spawn(1);
        let waiter = testing::spawn(3);

        testing::switch_to(owner);
        let guard = MUTEX.lock();

        // blocks the waiter; on the host, it returns with a guard it does not own yet
        testing::switch_to(waiter);
        let waiter_guard = MUTEX.lock();
        assert_eq!(get_state(waiter), Some(ThreadState::LockBlocked));

        testing::switch_to(owner);
        drop(guard);
        assert_eq!(get_state(waiter), Some(ThreadState::Running));
        assert!(MUTEX.is_locked());

        testing::switch_to(waiter);
        drop(waiter_guard);
        assert!(!MUTEX.is_locked());
    }

    #[test]
    fn unlock_and_sleep() {
        let _guard = testing::lock();
        testing::reset();

        let pid = testing::spawn(2);
        testing::context_switch();

        let mutex = Mutex::new(());
        let guard = mutex.lock();
        guard.unlock_and_sleep();
        assert!(!mutex.is_locked());
        assert_eq!(get_state(pid), Some(ThreadState::Paused));
        assert!(crate::wakeup(pid));
    }
}
