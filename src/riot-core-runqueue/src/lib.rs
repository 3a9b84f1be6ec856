//! Fixed-capacity, multi-priority runqueue.
//!
//! Used by the scheduler to find the next thread that should run. Threads of
//! the same priority are kept in FIFO order; the scheduler rotates a queue with
//! [`RunQueue::advance`] to implement round robin among equal priorities.

#![cfg_attr(not(test), no_std)]

mod runqueue;
pub use runqueue::{RunQueue, RunqueueId, ThreadId};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_within_priority() {
        let mut runqueue: RunQueue<8, 32> = RunQueue::new();

        runqueue.add(0, 0);
        runqueue.add(1, 0);
        runqueue.add(2, 0);

        assert_eq!(runqueue.get_next(), Some(0));
        runqueue.advance(0);
        assert_eq!(runqueue.get_next(), Some(1));
        runqueue.advance(0);
        assert_eq!(runqueue.get_next(), Some(2));
        assert_eq!(runqueue.get_next(), Some(2));
        runqueue.advance(0);
        assert_eq!(runqueue.get_next(), Some(0));
    }

    #[test]
    fn rotates_all_threads() {
        let mut runqueue: RunQueue<8, 32> = RunQueue::new();

        for i in 0..=31 {
            runqueue.add(i, 0);
        }

        for _ in 0..2 {
            for i in 0..=31 {
                assert_eq!(runqueue.get_next(), Some(i));
                runqueue.advance(0);
            }
        }
    }

    #[test]
    fn higher_priority_first() {
        let mut runqueue: RunQueue<8, 32> = RunQueue::new();

        runqueue.add(0, 0);
        runqueue.add(1, 0);
        runqueue.add(3, 0);

        runqueue.add(2, 1);
        runqueue.add(4, 1);

        assert_eq!(runqueue.get_next(), Some(2));
        runqueue.del(2, 1);
        assert_eq!(runqueue.get_next(), Some(4));
        runqueue.del(4, 1);
        assert_eq!(runqueue.get_next(), Some(0));
        runqueue.del(0, 0);
        assert_eq!(runqueue.get_next(), Some(1));
        runqueue.del(1, 0);
        assert_eq!(runqueue.get_next(), Some(3));
        runqueue.del(3, 0);
        assert_eq!(runqueue.get_next(), None);
        assert!(runqueue.is_empty());
    }

    #[test]
    fn readd_goes_to_tail() {
        let mut runqueue: RunQueue<8, 32> = RunQueue::new();

        runqueue.add(0, 0);
        runqueue.add(1, 0);

        assert_eq!(runqueue.get_next(), Some(0));
        runqueue.del(0, 0);
        assert_eq!(runqueue.get_next(), Some(1));

        runqueue.add(0, 0);
        assert_eq!(runqueue.get_next(), Some(1));

        runqueue.advance(0);
        assert_eq!(runqueue.get_next(), Some(0));
    }

    #[test]
    fn del_from_middle_and_tail() {
        let mut runqueue: RunQueue<4, 8> = RunQueue::new();

        runqueue.add(5, 2);
        runqueue.add(6, 2);
        runqueue.add(7, 2);

        // middle
        runqueue.del(6, 2);
        assert_eq!(runqueue.get_next(), Some(5));
        runqueue.advance(2);
        assert_eq!(runqueue.get_next(), Some(7));

        // tail (7 is the tail again after advancing past 5)
        runqueue.advance(2);
        runqueue.del(7, 2);
        assert_eq!(runqueue.get_next(), Some(5));
        runqueue.advance(2);
        assert_eq!(runqueue.get_next(), Some(5));
    }

    #[test]
    fn del_unknown_is_noop() {
        let mut runqueue: RunQueue<4, 8> = RunQueue::new();
        runqueue.add(1, 3);
        runqueue.del(2, 3);
        assert_eq!(runqueue.get_next(), Some(1));
    }

    #[test]
    fn add_twice_is_noop() {
        let mut runqueue: RunQueue<4, 8> = RunQueue::new();
        runqueue.add(1, 0);
        runqueue.add(1, 0);
        runqueue.del(1, 0);
        assert_eq!(runqueue.get_next(), None);
    }
}
