//! Thread flags: a per-thread bitmask for lightweight wakeups.
//!
//! Any context, including ISRs, can [`set()`] flags of a thread; the thread
//! itself waits for them with one of the `wait_*` functions, which clear the
//! flags they return.
use crate::{Scheduler, ThreadId, ThreadState, SCHEDULER};

/// type of thread flags
pub type ThreadFlags = u16;

/// Set by the kernel when a message was queued for the thread.
pub const THREAD_FLAG_MSG_WAITING: ThreadFlags = 1 << 15;

/// Possible waiting modes for thread flags
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitMode {
    Any(ThreadFlags),
    All(ThreadFlags),
}

/// Sets flags `mask` of a thread, waking it up if it waits for them.
///
/// # Panics
///
/// Panics if `thread_id` is >= [`crate::THREADS_NUMOF`].
pub fn set(thread_id: ThreadId, mask: ThreadFlags) {
    SCHEDULER.with_mut(|mut scheduler| scheduler.flag_set(thread_id, mask))
}

/// Waits until all flags in `mask` are set, then clears and returns them.
pub fn wait_all(mask: ThreadFlags) -> ThreadFlags {
    loop {
        if let Some(flags) = SCHEDULER.with_mut(|mut scheduler| scheduler.flag_wait_all(mask)) {
            return flags;
        }
    }
}

/// Waits until any flag in `mask` is set, then clears and returns the set ones.
pub fn wait_any(mask: ThreadFlags) -> ThreadFlags {
    loop {
        if let Some(flags) = SCHEDULER.with_mut(|mut scheduler| scheduler.flag_wait_any(mask)) {
            return flags;
        }
    }
}

/// Waits until any flag in `mask` is set, then clears and returns only the
/// least significant one.
pub fn wait_one(mask: ThreadFlags) -> ThreadFlags {
    loop {
        if let Some(flags) = SCHEDULER.with_mut(|mut scheduler| scheduler.flag_wait_one(mask)) {
            return flags;
        }
    }
}

/// Clears flags `mask` of the current thread, returning those that were set.
pub fn clear(mask: ThreadFlags) -> ThreadFlags {
    SCHEDULER.with_mut(|mut scheduler| {
        let thread = current_thread(&mut scheduler);
        let res = thread.flags & mask;
        thread.flags &= !mask;
        res
    })
}

/// Returns the flags of the current thread.
pub fn get() -> ThreadFlags {
    SCHEDULER.with_mut(|mut scheduler| current_thread(&mut scheduler).flags)
}

fn current_thread(scheduler: &mut Scheduler) -> &mut crate::Thread {
    scheduler
        .current()
        .expect("Function should be called inside a thread context.")
}

impl Scheduler {
    pub(crate) fn flag_set(&mut self, thread_id: ThreadId, mask: ThreadFlags) {
        let thread = self.get_unchecked_mut(thread_id);
        thread.flags |= mask;
        if thread.waits_for(thread.flags) {
            self.set_state(thread_id, ThreadState::Running);
            crate::schedule();
        }
    }

    fn flag_wait_all(&mut self, mask: ThreadFlags) -> Option<ThreadFlags> {
        let thread = current_thread(self);
        if thread.flags & mask == mask {
            thread.flags &= !mask;
            Some(mask)
        } else {
            let thread_id = thread.pid;
            self.flag_block(thread_id, WaitMode::All(mask));
            None
        }
    }

    fn flag_wait_any(&mut self, mask: ThreadFlags) -> Option<ThreadFlags> {
        let thread = current_thread(self);
        if thread.flags & mask != 0 {
            let res = thread.flags & mask;
            thread.flags &= !res;
            Some(res)
        } else {
            let thread_id = thread.pid;
            self.flag_block(thread_id, WaitMode::Any(mask));
            None
        }
    }

    fn flag_wait_one(&mut self, mask: ThreadFlags) -> Option<ThreadFlags> {
        let thread = current_thread(self);
        if thread.flags & mask != 0 {
            let mut res = thread.flags & mask;
            // clear all but least significant bit
            res &= res.wrapping_neg();
            thread.flags &= !res;
            Some(res)
        } else {
            let thread_id = thread.pid;
            self.flag_block(thread_id, WaitMode::Any(mask));
            None
        }
    }

    fn flag_block(&mut self, thread_id: ThreadId, mode: WaitMode) {
        assert!(
            !crate::irq::is_in_isr(),
            "waiting for thread flags in interrupt context"
        );
        self.set_state(thread_id, ThreadState::FlagBlocked(mode));
        crate::schedule();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{get_state, testing};

    #[test]
    fn set_get_clear() {
        let _guard = testing::lock();
        testing::reset();

        let pid = testing::spawn(1);
        testing::context_switch();

        set(pid, 0b1010);
        assert_eq!(get(), 0b1010);
        assert_eq!(clear(0b0011), 0b0010);
        assert_eq!(get(), 0b1000);
    }

    #[test]
    fn wait_returns_set_flags() {
        let _guard = testing::lock();
        testing::reset();

        let pid = testing::spawn(1);
        testing::context_switch();

        set(pid, 0b0110);
        assert_eq!(wait_one(0b1110), 0b0010);
        assert_eq!(wait_any(0b1110), 0b0100);
        assert_eq!(get(), 0);

        set(pid, 0b0011);
        assert_eq!(wait_all(0b0011), 0b0011);
        assert_eq!(get(), 0);
    }

    #[test]
    fn set_wakes_waiter_on_match_only() {
        let _guard = testing::lock();
        testing::reset();

        let pid = testing::spawn(1);
        testing::context_switch();

        // blocks, but returns on the host once the flag is set
        SCHEDULER.with_mut(|mut scheduler| {
            assert_eq!(scheduler.flag_wait_any(0b0100), None);
        });
        assert_eq!(
            get_state(pid),
            Some(ThreadState::FlagBlocked(WaitMode::Any(0b0100)))
        );

        testing::in_isr(|| set(pid, 0b0001));
        assert_eq!(
            get_state(pid),
            Some(ThreadState::FlagBlocked(WaitMode::Any(0b0100)))
        );

        testing::in_isr(|| set(pid, 0b0100));
        assert_eq!(get_state(pid), Some(ThreadState::Running));
        assert!(testing::take_switch_request());
        assert_eq!(wait_any(0b0100), 0b0100);
        assert_eq!(get(), 0b0001);
    }

    #[test]
    fn wait_all_needs_every_flag() {
        let _guard = testing::lock();
        testing::reset();

        let pid = testing::spawn(1);
        testing::context_switch();

        SCHEDULER.with_mut(|mut scheduler| {
            assert_eq!(scheduler.flag_wait_all(0b0011), None);
        });
        set(pid, 0b0001);
        assert_ne!(get_state(pid), Some(ThreadState::Running));
        set(pid, 0b0010);
        assert_eq!(get_state(pid), Some(ThreadState::Running));
    }

    #[test]
    #[should_panic(expected = "waiting for thread flags in interrupt context")]
    fn wait_in_isr() {
        let _guard = testing::lock();
        testing::reset();

        testing::spawn(1);
        testing::context_switch();
        testing::in_isr(|| wait_any(1));
    }
}
