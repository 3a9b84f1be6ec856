//! This module provides a Lock implementation.
use core::cell::UnsafeCell;

use critical_section::CriticalSection;

use crate::{irq, threadlist::ThreadList, ThreadState};

/// A basic locking object.
///
/// A `Lock` behaves like a Mutex, but carries no data.
/// This is supposed to be used to implement other locking primitives.
///
/// Waiting threads are woken in priority order, FIFO among equal priorities.
/// On release, the lock is handed over directly to the woken thread, so it
/// stays locked without anybody else being able to grab it in between.
pub struct Lock {
    state: UnsafeCell<LockState>,
}

// SAFETY: the state is only accessed in critical sections.
unsafe impl Sync for Lock {}

enum LockState {
    Unlocked,
    Locked(ThreadList),
}

impl Lock {
    /// Creates new **unlocked** Lock.
    pub const fn new() -> Self {
        Self {
            state: UnsafeCell::new(LockState::Unlocked),
        }
    }

    /// Creates new **locked** Lock.
    pub const fn new_locked() -> Self {
        Self {
            state: UnsafeCell::new(LockState::Locked(ThreadList::new())),
        }
    }

    /// Returns the current lock state.
    ///
    /// true if locked, false otherwise
    pub fn is_locked(&self) -> bool {
        critical_section::with(|_| {
            // SAFETY: access to the state only happens in critical sections.
            let state = unsafe { &*self.state.get() };
            !matches!(state, LockState::Unlocked)
        })
    }

    /// Get this lock (blocking).
    ///
    /// If the lock was unlocked, it will be locked and the function returns.
    /// If the lock was locked, this function will block the current thread until the lock gets
    /// unlocked elsewhere.
    ///
    /// # Panics
    ///
    /// Panics if the lock is taken and this is called outside of a thread
    /// context or from an ISR.
    pub fn acquire(&self) {
        critical_section::with(|cs| {
            // SAFETY: access to the state only happens in critical sections.
            let state = unsafe { &mut *self.state.get() };
            match state {
                LockState::Unlocked => *state = LockState::Locked(ThreadList::new()),
                LockState::Locked(waiters) => {
                    assert!(
                        !irq::is_in_isr(),
                        "blocking on a lock in interrupt context"
                    );
                    waiters.put_current(cs, ThreadState::LockBlocked);
                    // The context switch happens when leaving the critical
                    // section; we continue once `release()` handed us the lock.
                }
            }
        })
    }

    /// Get the lock (non-blocking).
    ///
    /// If the lock was unlocked, it will be locked and the function returns true.
    /// If the lock was locked, the function returns false
    pub fn try_acquire(&self) -> bool {
        critical_section::with(|_| {
            // SAFETY: access to the state only happens in critical sections.
            let state = unsafe { &mut *self.state.get() };
            match state {
                LockState::Unlocked => {
                    *state = LockState::Locked(ThreadList::new());
                    true
                }
                LockState::Locked(_) => false,
            }
        })
    }

    /// Releases the lock.
    ///
    /// If the lock was locked, and there were waiters, the first waiter will be
    /// woken up and now holds the lock.
    /// If the lock was locked and there were no waiters, the lock will be unlocked.
    /// If the lock was not locked, the function just returns.
    pub fn release(&self) {
        critical_section::with(|cs| self.release_cs(cs))
    }

    pub(crate) fn release_cs(&self, cs: CriticalSection) {
        // SAFETY: access to the state only happens in critical sections.
        let state = unsafe { &mut *self.state.get() };
        if let LockState::Locked(waiters) = state {
            if waiters.pop(cs).is_none() {
                *state = LockState::Unlocked;
            }
        }
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{get_state, testing};

    #[test]
    fn try_acquire_never_blocks() {
        let _guard = testing::lock();
        testing::reset();

        let lock = Lock::new();
        assert!(!lock.is_locked());
        assert!(lock.try_acquire());
        assert!(lock.is_locked());
        assert!(!lock.try_acquire());
        lock.release();
        assert!(!lock.is_locked());

        // releasing an unlocked lock is a no-op
        lock.release();
        assert!(!lock.is_locked());

        assert!(Lock::new_locked().is_locked());
    }

    #[test]
    fn handover_to_highest_priority_waiter() {
        let _guard = testing::lock();
        testing::reset();

        let owner = testing::spawn(1);
        let low = testing::spawn(2);
        let high = testing::spawn(6);
        let high_late = testing::spawn(6);

        let lock = Lock::new();
        testing::switch_to(owner);
        lock.acquire();

        for pid in [low, high, high_late] {
            testing::switch_to(pid);
            lock.acquire();
            assert_eq!(get_state(pid), Some(ThreadState::LockBlocked));
        }

        lock.release();
        assert_eq!(get_state(high), Some(ThreadState::Running));
        assert_eq!(get_state(high_late), Some(ThreadState::LockBlocked));
        assert!(lock.is_locked());

        lock.release();
        assert_eq!(get_state(high_late), Some(ThreadState::Running));
        lock.release();
        assert_eq!(get_state(low), Some(ThreadState::Running));
        assert!(lock.is_locked());

        lock.release();
        assert!(!lock.is_locked());
    }

    #[test]
    #[should_panic(expected = "blocking on a lock in interrupt context")]
    fn acquire_in_isr() {
        let _guard = testing::lock();
        testing::reset();

        let lock = Lock::new_locked();
        testing::in_isr(|| lock.acquire());
    }
}
