use critical_section::CriticalSection;

use crate::{thread::Thread, Scheduler, ThreadId, ThreadState, SCHEDULER};

/// Manages blocked [`super::Thread`]s for a resource, and triggering the scheduler when needed.
///
/// Threads are kept ordered by priority, and in FIFO order among threads of
/// the same priority. The links live in the scheduler, so a thread can only be
/// in one list at a time.
#[derive(Debug, Default)]
pub struct ThreadList {
    /// Next thread to run once the resource is available.
    pub head: Option<ThreadId>,
}

impl ThreadList {
    /// Creates a new empty [`ThreadList`]
    pub const fn new() -> Self {
        Self { head: None }
    }

    /// Puts the current (blocked) thread into this [`ThreadList`] and triggers the scheduler.
    ///
    /// Returns the id of the blocked thread.
    ///
    /// # Panics
    ///
    /// Panics if this is called outside of a thread context.
    pub fn put_current(&mut self, cs: CriticalSection, state: ThreadState) -> ThreadId {
        SCHEDULER.with_mut_cs(cs, |mut scheduler| self.put_current_in(&mut scheduler, state))
    }

    pub(crate) fn put_current_in(
        &mut self,
        scheduler: &mut Scheduler,
        state: ThreadState,
    ) -> ThreadId {
        let &mut Thread { pid, prio, .. } = scheduler
            .current()
            .expect("Function should be called inside a thread context.");

        let mut prev = None;
        let mut next = self.head;
        while let Some(n) = next {
            if scheduler.get_unchecked(n).prio < prio {
                break;
            }
            prev = next;
            next = scheduler.thread_blocklist[usize::from(n)];
        }
        scheduler.thread_blocklist[usize::from(pid)] = next;
        match prev {
            Some(prev) => scheduler.thread_blocklist[usize::from(prev)] = Some(pid),
            None => self.head = Some(pid),
        }

        scheduler.set_state(pid, state);
        crate::schedule();
        pid
    }

    /// Removes the head from this [`ThreadList`].
    ///
    /// Sets the thread's [`ThreadState`] to [`ThreadState::Running`] and triggers
    /// the scheduler.
    ///
    /// Returns the thread's [`ThreadId`] and its previous [`ThreadState`].
    pub fn pop(&mut self, cs: CriticalSection) -> Option<(ThreadId, ThreadState)> {
        self.head?;
        SCHEDULER.with_mut_cs(cs, |mut scheduler| self.pop_in(&mut scheduler))
    }

    pub(crate) fn pop_in(&mut self, scheduler: &mut Scheduler) -> Option<(ThreadId, ThreadState)> {
        let head = self.head?;
        self.head = scheduler.thread_blocklist[usize::from(head)].take();
        let old_state = scheduler.set_state(head, ThreadState::Running);
        crate::schedule();
        Some((head, old_state))
    }

    /// Determines if this [`ThreadList`] is empty.
    pub fn is_empty(&self, _cs: CriticalSection) -> bool {
        self.head.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn ordered_by_priority_then_fifo() {
        let _guard = testing::lock();
        testing::reset();

        let low = testing::spawn(1);
        let high_a = testing::spawn(5);
        let high_b = testing::spawn(5);
        let mid = testing::spawn(3);

        let mut list = ThreadList::new();
        for pid in [low, high_a, high_b, mid] {
            testing::switch_to(pid);
            critical_section::with(|cs| list.put_current(cs, ThreadState::LockBlocked));
            assert_eq!(crate::get_state(pid), Some(ThreadState::LockBlocked));
        }

        let mut popped = [0; 4];
        critical_section::with(|cs| {
            for slot in popped.iter_mut() {
                let (pid, old_state) = list.pop(cs).unwrap();
                assert_eq!(old_state, ThreadState::LockBlocked);
                *slot = pid;
            }
            assert!(list.pop(cs).is_none());
            assert!(list.is_empty(cs));
        });
        assert_eq!(popped, [high_a, high_b, mid, low]);
        assert_eq!(crate::get_state(low), Some(ThreadState::Running));
    }
}
