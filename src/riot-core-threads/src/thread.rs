use heapless::Deque;

use crate::{
    msg::{Msg, MSG_QUEUE_SIZE},
    thread_flags::{ThreadFlags, WaitMode},
    threadlist::ThreadList,
    Arch, Cpu, RunqueueId, ThreadData, ThreadId,
};

/// Thread control block.
#[derive(Debug)]
pub struct Thread {
    /// Saved stack pointer after context switch.
    #[allow(dead_code, reason = "only read by the context switch code")]
    pub sp: usize,
    /// The thread's current state.
    pub state: ThreadState,
    /// Priority of the thread between 0..[`super::SCHED_PRIO_LEVELS`].
    /// Multiple threads may have the same priority.
    pub prio: RunqueueId,
    /// Id of the thread between 0..[`super::THREADS_NUMOF`].
    /// Ids are unique while a thread is alive but reused after a thread finished.
    pub pid: ThreadId,
    /// Flags set for the thread.
    pub flags: ThreadFlags,
    /// Incoming messages; `None` until the thread calls [`crate::msg::init_queue()`].
    pub(crate) msg_queue: Option<Deque<Msg, MSG_QUEUE_SIZE>>,
    /// Threads blocked sending to this thread.
    pub(crate) msg_senders: ThreadList,
    /// Message being handed over to or from this thread while it is blocked.
    pub(crate) msg_slot: Option<Msg>,
    /// Set while blocked sending a request with [`crate::msg::send_receive()`].
    pub(crate) msg_awaits_reply: bool,
    /// Arch-specific thread data.
    #[allow(dead_code)]
    pub(crate) data: ThreadData,
}

/// Possible states of a thread
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ThreadState {
    /// No active thread.
    Invalid,
    /// Ready to run.
    ///
    /// This doesn't necessarily mean that the thread is currently running,
    /// but rather that it is in the runqueue.
    Running,
    /// Suspended / paused.
    Paused,
    /// Waiting to acquire a [`crate::sync::Lock`] or [`crate::sync::Mutex`].
    LockBlocked,
    /// Waiting for [`ThreadFlags`] to be set.
    FlagBlocked(WaitMode),
    /// Waiting for a message.
    MsgRxBlocked,
    /// Waiting for the reply to a request; only [`crate::msg::reply()`]
    /// wakes it up.
    MsgReplyBlocked,
    /// Waiting for the given thread to take a message.
    MsgTxBlocked(ThreadId),
}

impl Thread {
    /// Creates an empty [`Thread`] object with [`ThreadState::Invalid`].
    pub const fn default() -> Thread {
        Thread {
            sp: 0,
            state: ThreadState::Invalid,
            prio: 0,
            pid: 0,
            flags: 0,
            msg_queue: None,
            msg_senders: ThreadList::new(),
            msg_slot: None,
            msg_awaits_reply: false,
            data: Cpu::DEFAULT_THREAD_DATA,
        }
    }

    /// Returns whether the thread waits for any of the flags in `flags`.
    pub(crate) fn waits_for(&self, flags: ThreadFlags) -> bool {
        match self.state {
            ThreadState::FlagBlocked(WaitMode::Any(mask)) => flags & mask != 0,
            ThreadState::FlagBlocked(WaitMode::All(mask)) => flags & mask == mask,
            _ => false,
        }
    }
}
