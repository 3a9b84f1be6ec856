//! Synchronous and queued message passing between threads.
//!
//! Every thread can receive messages. By default, a message is only delivered
//! when the receiver is waiting in [`receive()`], and the sender blocks until
//! then. After [`init_queue()`], a thread additionally buffers up to
//! [`MSG_QUEUE_SIZE`] messages, so that senders (and ISRs) don't have to wait.
//!
//! ISRs can only send, and never block: [`send_from_isr()`] drops the message
//! if the receiver is neither waiting nor has room in its queue.
use core::any::Any;

use heapless::Deque;
use riot_core_utils::usize_from_env_or;

use crate::{
    irq, thread_flags::THREAD_FLAG_MSG_WAITING, Scheduler, ThreadId, ThreadState, SCHEDULER,
};

/// Capacity of a thread's message queue.
pub const MSG_QUEUE_SIZE: usize = usize_from_env_or!("CONFIG_MSG_QUEUE_SIZE", 8);

/// Payload of a [`Msg`].
#[derive(Copy, Clone, Debug)]
pub enum MsgContent {
    Value(u32),
    /// Reference to a statically allocated object; recover the concrete type
    /// with [`Any::downcast_ref()`].
    Ptr(&'static (dyn Any + Send + Sync)),
}

/// A message.
#[derive(Copy, Clone, Debug)]
pub struct Msg {
    /// Filled in by the kernel on sending; `None` if sent from an ISR.
    pub sender_pid: Option<ThreadId>,
    pub msg_type: u16,
    pub content: MsgContent,
}

impl Msg {
    pub const fn new(msg_type: u16, content: MsgContent) -> Self {
        Self {
            sender_pid: None,
            msg_type,
            content,
        }
    }

    pub const fn with_value(msg_type: u16, value: u32) -> Self {
        Self::new(msg_type, MsgContent::Value(value))
    }

    pub const fn with_ptr(msg_type: u16, ptr: &'static (dyn Any + Send + Sync)) -> Self {
        Self::new(msg_type, MsgContent::Ptr(ptr))
    }

    /// Returns the value, if the content is [`MsgContent::Value`].
    pub fn value(&self) -> Option<u32> {
        match self.content {
            MsgContent::Value(value) => Some(value),
            MsgContent::Ptr(_) => None,
        }
    }

    /// Returns the referenced object if the content is a [`MsgContent::Ptr`]
    /// to a `T`.
    pub fn ptr<T: Any>(&self) -> Option<&'static T> {
        match self.content {
            MsgContent::Ptr(ptr) => ptr.downcast_ref(),
            MsgContent::Value(_) => None,
        }
    }
}

/// Errors when sending a message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendError {
    /// There is no thread with this id.
    InvalidPid,
    /// The receiver is not waiting, and has no room in its queue (or no
    /// queue). The message was not delivered.
    QueueFull,
    /// The receiver does not wait for a reply. The reply was not delivered.
    NotWaitingForReply,
}

/// Enables the message queue of the current thread.
///
/// Calling this more than once has no effect; queued messages are kept.
///
/// # Panics
///
/// Panics if this is called outside of a thread context.
pub fn init_queue() {
    SCHEDULER.with_mut(|mut scheduler| {
        let thread = scheduler
            .current()
            .expect("Function should be called inside a thread context.");
        if thread.msg_queue.is_none() {
            thread.msg_queue = Some(Deque::new());
        }
    })
}

/// Sends `msg` to `target`, blocking if necessary.
///
/// The message is handed over directly if the target waits in [`receive()`],
/// else it is queued. If the target's queue is full (or it has none), the
/// current thread blocks until the target receives the message.
///
/// Sending to the current thread only queues and never blocks.
///
/// Called from an ISR, this behaves like [`send_from_isr()`].
///
/// # Panics
///
/// Panics if this is called outside of a thread context.
pub fn send(mut msg: Msg, target: ThreadId) -> Result<(), SendError> {
    if irq::is_in_isr() {
        return send_from_isr(msg, target);
    }
    critical_section::with(|cs| {
        SCHEDULER.with_mut_cs(cs, |mut scheduler| {
            let pid = scheduler
                .current_pid()
                .expect("Function should be called inside a thread context.");
            msg.sender_pid = Some(pid);
            match scheduler.msg_deliver(msg, target) {
                Err(SendError::QueueFull) if target != pid => {
                    scheduler.msg_block_sender(pid, msg, target);
                    // Continues after the target took the message.
                    Ok(())
                }
                res => res,
            }
        })
    })
}

/// Sends `msg` to `target` without blocking.
///
/// Fails with [`SendError::QueueFull`] if the message can neither be handed
/// over nor queued.
pub fn try_send(mut msg: Msg, target: ThreadId) -> Result<(), SendError> {
    SCHEDULER.with_mut(|mut scheduler| {
        msg.sender_pid = if irq::is_in_isr() {
            None
        } else {
            scheduler.current_pid()
        };
        scheduler.msg_deliver(msg, target)
    })
}

/// Sends `msg` to `target` from interrupt context.
///
/// Never blocks. Fails with [`SendError::QueueFull`] if the message can
/// neither be handed over nor queued; the message is dropped then.
pub fn send_from_isr(mut msg: Msg, target: ThreadId) -> Result<(), SendError> {
    msg.sender_pid = None;
    SCHEDULER.with_mut(|mut scheduler| scheduler.msg_deliver(msg, target))
}

/// Receives a message, blocking until one is available.
///
/// Queued messages are returned first, in FIFO order, then messages of blocked
/// senders in their priority order.
///
/// # Panics
///
/// Panics if this is called outside of a thread context or from an ISR.
pub fn receive() -> Msg {
    assert!(
        !irq::is_in_isr(),
        "receiving a message in interrupt context"
    );
    let received = critical_section::with(|cs| {
        SCHEDULER.with_mut_cs(cs, |mut scheduler| {
            let pid = scheduler
                .current_pid()
                .expect("Function should be called inside a thread context.");
            let msg = scheduler.msg_take(pid);
            if msg.is_none() {
                scheduler.set_state(pid, ThreadState::MsgRxBlocked);
                crate::schedule();
            }
            msg
        })
    });
    // If there was no message, a sender handed one over while we were
    // blocked.
    received.unwrap_or_else(|| {
        SCHEDULER.with_mut(|mut scheduler| {
            scheduler
                .current()
                .and_then(|thread| thread.msg_slot.take())
                .expect("woken up without a message")
        })
    })
}

/// Receives a message if one is available, without blocking.
pub fn try_receive() -> Option<Msg> {
    SCHEDULER.with_mut(|mut scheduler| {
        let pid = scheduler
            .current_pid()
            .expect("Function should be called inside a thread context.");
        scheduler.msg_take(pid)
    })
}

/// Sends `msg` to `target` and waits for the reply.
///
/// Blocks like [`send()`], and then until the target answers with [`reply()`].
/// The current thread is waiting for the reply as soon as the target has the
/// request, so the reply never gets lost, even without a queue.
///
/// # Panics
///
/// Panics if this is called outside of a thread context, from an ISR, or with
/// the current thread as `target`.
pub fn send_receive(msg: Msg, target: ThreadId) -> Result<Msg, SendError> {
    assert!(
        !irq::is_in_isr(),
        "receiving a message in interrupt context"
    );
    critical_section::with(|cs| {
        SCHEDULER.with_mut_cs(cs, |mut scheduler| scheduler.msg_send_request(msg, target))
    })?;
    Ok(SCHEDULER.with_mut(|mut scheduler| {
        scheduler
            .current()
            .and_then(|thread| thread.msg_slot.take())
            .expect("woken up without a reply")
    }))
}

/// Replies to a message received from [`send_receive()`].
///
/// Never blocks: the requester is waiting for the reply. Fails with
/// [`SendError::NotWaitingForReply`] if `request` was not sent with
/// [`send_receive()`] (or was answered already).
pub fn reply(request: &Msg, mut reply: Msg) -> Result<(), SendError> {
    let target = request.sender_pid.ok_or(SendError::InvalidPid)?;
    SCHEDULER.with_mut(|mut scheduler| {
        reply.sender_pid = if irq::is_in_isr() {
            None
        } else {
            scheduler.current_pid()
        };
        scheduler.msg_reply(reply, target)
    })
}

/// Returns the number of messages in the current thread's queue.
pub fn avail() -> usize {
    SCHEDULER.with_mut(|mut scheduler| {
        scheduler
            .current()
            .and_then(|thread| thread.msg_queue.as_ref())
            .map_or(0, Deque::len)
    })
}

/// Returns whether the thread `pid` has a message queue.
pub fn has_queue(pid: ThreadId) -> bool {
    SCHEDULER.with(|scheduler| {
        scheduler.is_valid_pid(pid) && scheduler.get_unchecked(pid).msg_queue.is_some()
    })
}

/// Returns the capacity of the current thread's message queue, `0` if it has
/// none.
pub fn queue_capacity() -> usize {
    SCHEDULER.with_mut(|mut scheduler| {
        scheduler
            .current()
            .and_then(|thread| thread.msg_queue.as_ref())
            .map_or(0, Deque::capacity)
    })
}

impl Scheduler {
    /// Hands `msg` over to `target` if it waits for a message, else queues it.
    ///
    /// A thread waiting for a reply does not take the message; it is queued
    /// for later like for a thread that is busy.
    fn msg_deliver(&mut self, msg: Msg, target: ThreadId) -> Result<(), SendError> {
        if !self.is_valid_pid(target) {
            return Err(SendError::InvalidPid);
        }
        let thread = self.get_unchecked_mut(target);
        if thread.state == ThreadState::MsgRxBlocked {
            thread.msg_slot = Some(msg);
            self.set_state(target, ThreadState::Running);
            crate::schedule();
            return Ok(());
        }
        match thread.msg_queue.as_mut().map(|queue| queue.push_back(msg)) {
            Some(Ok(())) => {
                self.flag_set(target, THREAD_FLAG_MSG_WAITING);
                Ok(())
            }
            _ => Err(SendError::QueueFull),
        }
    }

    /// Blocks the current thread `pid` until `target` takes `msg`.
    fn msg_block_sender(&mut self, pid: ThreadId, msg: Msg, target: ThreadId) {
        self.get_unchecked_mut(pid).msg_slot = Some(msg);
        let mut senders = core::mem::take(&mut self.get_unchecked_mut(target).msg_senders);
        senders.put_current_in(self, ThreadState::MsgTxBlocked(target));
        self.get_unchecked_mut(target).msg_senders = senders;
    }

    /// Sends a request from the current thread and blocks it until the reply.
    fn msg_send_request(&mut self, mut msg: Msg, target: ThreadId) -> Result<(), SendError> {
        let pid = self
            .current_pid()
            .expect("Function should be called inside a thread context.");
        assert_ne!(pid, target, "sending a request to the current thread");
        msg.sender_pid = Some(pid);
        match self.msg_deliver(msg, target) {
            Ok(()) => {
                self.set_state(pid, ThreadState::MsgReplyBlocked);
                crate::schedule();
                Ok(())
            }
            Err(SendError::QueueFull) => {
                self.get_unchecked_mut(pid).msg_awaits_reply = true;
                self.msg_block_sender(pid, msg, target);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Hands `reply` over to `target`, which must wait for a reply.
    fn msg_reply(&mut self, reply: Msg, target: ThreadId) -> Result<(), SendError> {
        if !self.is_valid_pid(target) {
            return Err(SendError::InvalidPid);
        }
        let thread = self.get_unchecked_mut(target);
        if thread.state != ThreadState::MsgReplyBlocked {
            return Err(SendError::NotWaitingForReply);
        }
        thread.msg_slot = Some(reply);
        self.set_state(target, ThreadState::Running);
        crate::schedule();
        Ok(())
    }

    /// Takes the next message for `pid`, from the queue or a blocked sender.
    fn msg_take(&mut self, pid: ThreadId) -> Option<Msg> {
        let queued = self
            .get_unchecked_mut(pid)
            .msg_queue
            .as_mut()
            .and_then(Deque::pop_front);
        let Some(msg) = queued else {
            return self.msg_unblock_sender(pid);
        };
        // A queue slot was just freed, move the next blocked sender's message in.
        if let Some(pending) = self.msg_unblock_sender(pid) {
            if let Some(queue) = self.get_unchecked_mut(pid).msg_queue.as_mut() {
                let pushed = queue.push_back(pending);
                debug_assert!(pushed.is_ok(), "no room for a blocked sender's message");
            }
        }
        Some(msg)
    }

    /// Wakes the first thread blocked sending to `pid`, returning its message.
    fn msg_unblock_sender(&mut self, pid: ThreadId) -> Option<Msg> {
        let mut senders = core::mem::take(&mut self.get_unchecked_mut(pid).msg_senders);
        let popped = senders.pop_in(self);
        self.get_unchecked_mut(pid).msg_senders = senders;
        let (sender, _) = popped?;
        let thread = self.get_unchecked_mut(sender);
        let msg = thread.msg_slot.take();
        if core::mem::take(&mut thread.msg_awaits_reply) {
            self.set_state(sender, ThreadState::MsgReplyBlocked);
        }
        msg
    }
}
