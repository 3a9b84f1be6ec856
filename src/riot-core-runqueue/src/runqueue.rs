// Disable indexing lints for now
#![allow(clippy::indexing_slicing)]

use core::mem;

use self::clist::CList;

const USIZE_BITS: usize = mem::size_of::<usize>() * 8;

/// Runqueue number, doubles as thread priority.
pub type RunqueueId = u8;
/// Thread identifier.
pub type ThreadId = u8;

/// Runqueue for `N_QUEUES` priorities, supporting `N_THREADS` total.
///
/// Assumptions:
/// - runqueue numbers (corresponding priorities) are 0..N_QUEUES (exclusive)
/// - higher runqueue number ([`RunqueueId`]) means higher priority
/// - runqueue numbers fit in usize bits
/// - [`ThreadId`]s range from 0..N_THREADS
/// - `N_THREADS` is < 255 (0xFF is used as sentinel)
///
/// A thread can only be in one of the queues at a time.
pub struct RunQueue<const N_QUEUES: usize, const N_THREADS: usize> {
    /// Bit `n` is set when queue `n` is non-empty.
    bitcache: usize,
    queues: CList<N_QUEUES, N_THREADS>,
}

impl<const N_QUEUES: usize, const N_THREADS: usize> RunQueue<N_QUEUES, N_THREADS> {
    const CHECK: () = {
        assert!(N_QUEUES <= USIZE_BITS);
        assert!(N_THREADS < CList::<N_QUEUES, N_THREADS>::sentinel() as usize);
    };

    #[allow(clippy::new_without_default)]
    pub const fn new() -> RunQueue<N_QUEUES, N_THREADS> {
        #[allow(clippy::let_unit_value)]
        let () = Self::CHECK;
        RunQueue {
            bitcache: 0,
            queues: CList::new(),
        }
    }

    /// Adds thread `n` to the tail of runqueue number `rq`.
    ///
    /// Adding a thread that is already queued has no effect.
    pub fn add(&mut self, n: ThreadId, rq: RunqueueId) {
        debug_assert!((n as usize) < N_THREADS);
        debug_assert!((rq as usize) < N_QUEUES);
        self.bitcache |= 1 << rq;
        self.queues.push(n, rq);
    }

    /// Removes thread `n` from runqueue number `rq`.
    ///
    /// O(1) if `n` is the head of the queue (which it is for the running
    /// thread), O(N_THREADS) otherwise.
    pub fn del(&mut self, n: ThreadId, rq: RunqueueId) {
        debug_assert!((n as usize) < N_THREADS);
        debug_assert!((rq as usize) < N_QUEUES);

        if self.queues.peek_head(rq) == Some(n) {
            self.queues.pop_head(rq);
        } else {
            self.queues.del(n, rq);
        }

        if self.queues.is_empty(rq) {
            self.bitcache &= !(1 << rq);
        }
    }

    /// Returns the thread that should run next.
    ///
    /// This is the head of the non-empty runqueue with the highest number.
    pub fn get_next(&self) -> Option<ThreadId> {
        let rq = ffs(self.bitcache)?;
        self.queues.peek_head(rq)
    }

    /// Advances runqueue number `rq`, moving its head to the tail.
    ///
    /// This is used to "yield" to another thread of *the same* priority.
    pub fn advance(&mut self, rq: RunqueueId) {
        debug_assert!((rq as usize) < N_QUEUES);
        self.queues.advance(rq);
    }

    /// Returns `true` if no thread is runnable.
    pub fn is_empty(&self) -> bool {
        self.bitcache == 0
    }
}

/// Returns the index of the most significant set bit.
fn ffs(val: usize) -> Option<RunqueueId> {
    if val == 0 {
        return None;
    }
    Some((USIZE_BITS as u32 - val.leading_zeros() - 1) as RunqueueId)
}

mod clist {
    //! An array of `N_QUEUES` circular linked lists over an array of size `N_THREADS`.
    //!
    //! The array holds the "next" indexes, so each integer value corresponds to
    //! one element, which can only be in one of the lists.
    use super::{RunqueueId, ThreadId};

    #[derive(Debug, Copy, Clone)]
    pub struct CList<const N_QUEUES: usize, const N_THREADS: usize> {
        tail: [ThreadId; N_QUEUES],
        next_idxs: [ThreadId; N_THREADS],
    }

    impl<const N_QUEUES: usize, const N_THREADS: usize> CList<N_QUEUES, N_THREADS> {
        pub const fn new() -> Self {
            CList {
                tail: [Self::sentinel(); N_QUEUES],
                next_idxs: [Self::sentinel(); N_THREADS],
            }
        }

        pub const fn sentinel() -> u8 {
            0xFF
        }

        pub fn is_empty(&self, rq: RunqueueId) -> bool {
            self.tail[rq as usize] == Self::sentinel()
        }

        pub fn push(&mut self, n: ThreadId, rq: RunqueueId) {
            if self.next_idxs[n as usize] != Self::sentinel() {
                // already linked
                return;
            }
            let tail = self.tail[rq as usize];
            if tail == Self::sentinel() {
                self.next_idxs[n as usize] = n;
            } else {
                self.next_idxs[n as usize] = self.next_idxs[tail as usize];
                self.next_idxs[tail as usize] = n;
            }
            self.tail[rq as usize] = n;
        }

        pub fn del(&mut self, n: ThreadId, rq: RunqueueId) {
            if self.next_idxs[n as usize] == Self::sentinel() {
                return;
            }

            if self.next_idxs[n as usize] == n {
                if self.tail[rq as usize] == n {
                    self.tail[rq as usize] = Self::sentinel();
                }
            } else {
                let next = self.next_idxs[n as usize];
                let Some(prev) = self.next_idxs.iter().position(|idx| *idx == n) else {
                    unreachable!("list is circular");
                };
                self.next_idxs[prev] = next;

                if self.tail[rq as usize] == n {
                    self.tail[rq as usize] = prev as ThreadId;
                }
            }

            self.next_idxs[n as usize] = Self::sentinel();
        }

        pub fn pop_head(&mut self, rq: RunqueueId) -> Option<ThreadId> {
            let tail = self.tail[rq as usize];
            if tail == Self::sentinel() {
                return None;
            }
            let head = self.next_idxs[tail as usize];
            if head == tail {
                self.tail[rq as usize] = Self::sentinel();
            } else {
                self.next_idxs[tail as usize] = self.next_idxs[head as usize];
            }
            self.next_idxs[head as usize] = Self::sentinel();
            Some(head)
        }

        pub fn peek_head(&self, rq: RunqueueId) -> Option<ThreadId> {
            let tail = self.tail[rq as usize];
            if tail == Self::sentinel() {
                None
            } else {
                Some(self.next_idxs[tail as usize])
            }
        }

        pub fn advance(&mut self, rq: RunqueueId) {
            let tail = self.tail[rq as usize];
            if tail != Self::sentinel() {
                self.tail[rq as usize] = self.next_idxs[tail as usize];
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn push_pop() {
            let mut clist: CList<8, 32> = CList::new();
            assert!(clist.is_empty(0));
            clist.push(0, 0);
            clist.push(1, 0);
            assert_eq!(clist.pop_head(0), Some(0));
            assert_eq!(clist.pop_head(0), Some(1));
            assert_eq!(clist.pop_head(0), None);
            assert!(clist.is_empty(0));
        }

        #[test]
        fn push_all() {
            const N: usize = 254;
            let mut clist: CList<8, N> = CList::new();
            for i in 0..N {
                clist.push(i as ThreadId, 0);
            }
            for i in 0..N {
                assert_eq!(clist.pop_head(0), Some(i as ThreadId));
            }
            assert_eq!(clist.pop_head(0), None);
        }

        #[test]
        fn advance_rotates() {
            let mut clist: CList<8, 32> = CList::new();
            clist.push(0, 0);
            clist.push(1, 0);
            clist.advance(0);
            assert_eq!(clist.peek_head(0), Some(1));
            assert_eq!(clist.pop_head(0), Some(1));
            assert_eq!(clist.pop_head(0), Some(0));
            assert_eq!(clist.peek_head(0), None);
        }

        #[test]
        fn separate_queues() {
            let mut clist: CList<8, 32> = CList::new();
            clist.push(3, 1);
            clist.push(4, 2);
            assert_eq!(clist.peek_head(1), Some(3));
            assert_eq!(clist.peek_head(2), Some(4));
            clist.del(3, 1);
            assert!(clist.is_empty(1));
            assert!(!clist.is_empty(2));
        }
    }
}
