//! Event queues.
//!
//! An [`Event`] is a statically allocated object with a handler function. It
//! is posted to an [`EventQueue`], from thread or interrupt context, and the
//! thread that claimed the queue (its *waiter*) runs the handlers one after
//! another.
//!
//! Queues are intrusive: the link lives in the event, so posting never
//! allocates and never fails. An event can be queued at most once at a time;
//! posting an event that is still queued has no effect.
//!
//! Handlers usually recover the object an event is embedded in (with
//! `memoffset::offset_of!`), to get at their context.
#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

use core::cell::Cell;
use core::ptr;

use critical_section::{CriticalSection, Mutex};
use riot_core_threads::{thread_flags, thread_flags::ThreadFlags, ThreadId};

/// Thread flag used to wake up the waiter of a queue.
pub const THREAD_FLAG_EVENT: ThreadFlags = 0x1;

/// An event that can be posted to an [`EventQueue`].
pub struct Event {
    /// Next event in the (circular) queue; `Some` exactly while queued.
    next: Mutex<Cell<Option<&'static Event>>>,
    handler: fn(&'static Event),
}

impl Event {
    /// Creates an event that calls `handler` when processed.
    pub const fn new(handler: fn(&'static Event)) -> Self {
        Self {
            next: Mutex::new(Cell::new(None)),
            handler,
        }
    }

    /// Runs the handler.
    pub fn process(&'static self) {
        (self.handler)(self);
    }

    /// Returns whether the event is queued in any queue.
    pub fn is_queued(&self) -> bool {
        critical_section::with(|cs| self.next(cs).is_some())
    }

    fn next(&self, cs: CriticalSection) -> Option<&'static Event> {
        self.next.borrow(cs).get()
    }

    fn set_next(&self, cs: CriticalSection, next: Option<&'static Event>) {
        self.next.borrow(cs).set(next);
    }
}

/// A FIFO queue of [`Event`]s, processed by the thread that claimed it.
pub struct EventQueue {
    /// Last event of the queue; its `next` is the first.
    tail: Mutex<Cell<Option<&'static Event>>>,
    waiter: Mutex<Cell<Option<ThreadId>>>,
}

impl EventQueue {
    /// Creates an empty queue that is not claimed by any thread yet.
    ///
    /// Events can be posted right away, they are processed once a thread
    /// claimed the queue.
    pub const fn new() -> Self {
        Self {
            tail: Mutex::new(Cell::new(None)),
            waiter: Mutex::new(Cell::new(None)),
        }
    }

    /// Makes the current thread the waiter of this queue.
    ///
    /// If events were posted before, the waiter is notified right away.
    ///
    /// # Panics
    ///
    /// Panics if the queue is already claimed, or if this is called outside
    /// of a thread context.
    pub fn claim(&self) {
        let pid = riot_core_threads::current_pid()
            .expect("Function should be called inside a thread context.");
        critical_section::with(|cs| {
            let waiter = self.waiter.borrow(cs);
            assert!(waiter.get().is_none(), "event queue already claimed");
            waiter.set(Some(pid));
            if self.tail.borrow(cs).get().is_some() {
                thread_flags::set(pid, THREAD_FLAG_EVENT);
            }
        });
        riot_core_log::debug!("event queue claimed by thread {}", pid);
    }

    /// Returns the thread processing this queue, if claimed.
    pub fn waiter(&self) -> Option<ThreadId> {
        critical_section::with(|cs| self.waiter.borrow(cs).get())
    }

    /// Appends `event` to the queue and notifies the waiter.
    ///
    /// Does nothing if the event is already queued. Can be called from
    /// interrupt context.
    pub fn post(&self, event: &'static Event) {
        critical_section::with(|cs| {
            if event.next(cs).is_some() {
                return;
            }
            let tail = self.tail.borrow(cs);
            match tail.get() {
                None => event.set_next(cs, Some(event)),
                Some(last) => {
                    event.set_next(cs, last.next(cs));
                    last.set_next(cs, Some(event));
                }
            }
            tail.set(Some(event));

            if let Some(waiter) = self.waiter.borrow(cs).get() {
                thread_flags::set(waiter, THREAD_FLAG_EVENT);
            }
        });
    }

    /// Removes `event` from the queue.
    ///
    /// Does nothing if the event is not queued here.
    pub fn cancel(&self, event: &'static Event) {
        critical_section::with(|cs| {
            let tail = self.tail.borrow(cs);
            let Some(last) = tail.get() else {
                return;
            };
            let mut prev = last;
            loop {
                let Some(current) = prev.next(cs) else {
                    return;
                };
                if ptr::eq(current, event) {
                    if ptr::eq(current, prev) {
                        // only element
                        tail.set(None);
                    } else {
                        prev.set_next(cs, current.next(cs));
                        if ptr::eq(current, last) {
                            tail.set(Some(prev));
                        }
                    }
                    current.set_next(cs, None);
                    return;
                }
                if ptr::eq(current, last) {
                    return;
                }
                prev = current;
            }
        });
    }

    /// Removes and returns the first event, without blocking.
    pub fn get(&self) -> Option<&'static Event> {
        critical_section::with(|cs| {
            let tail = self.tail.borrow(cs);
            let last = tail.get()?;
            let first = last.next(cs)?;
            if ptr::eq(first, last) {
                tail.set(None);
            } else {
                last.set_next(cs, first.next(cs));
            }
            first.set_next(cs, None);
            Some(first)
        })
    }

    /// Removes and returns the first event, blocking until there is one.
    ///
    /// Must be called by the waiter; see [`EventQueue::claim()`].
    pub fn wait(&self) -> &'static Event {
        debug_assert_eq!(self.waiter(), riot_core_threads::current_pid());
        loop {
            if let Some(event) = self.get() {
                return event;
            }
            thread_flags::wait_any(THREAD_FLAG_EVENT);
        }
    }

    /// Processes all queued events, without blocking.
    ///
    /// Events posted by the handlers are processed as well. Returns the
    /// number of processed events.
    pub fn process_pending(&self) -> usize {
        let mut count = 0;
        while let Some(event) = self.get() {
            event.process();
            count += 1;
        }
        count
    }

    /// Processes events forever.
    ///
    /// Claims the queue for the current thread if it has no waiter yet.
    pub fn run(&self) -> ! {
        if self.waiter().is_none() {
            self.claim();
        }
        loop {
            self.wait().process();
        }
    }

    /// Returns whether no event is queued.
    pub fn is_empty(&self) -> bool {
        critical_section::with(|cs| self.tail.borrow(cs).get().is_none())
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Claims all `queues` for the current thread.
///
/// The queues are served by priority: earlier queues first.
pub fn claim_all(queues: &[EventQueue]) {
    for queue in queues {
        queue.claim();
    }
}

/// Returns the first event of the first non-empty queue, without blocking.
pub fn get_multi(queues: &[EventQueue]) -> Option<&'static Event> {
    queues.iter().find_map(EventQueue::get)
}

/// Returns the first event of the first non-empty queue, blocking until
/// there is one.
pub fn wait_multi(queues: &[EventQueue]) -> &'static Event {
    loop {
        if let Some(event) = get_multi(queues) {
            return event;
        }
        thread_flags::wait_any(THREAD_FLAG_EVENT);
    }
}
