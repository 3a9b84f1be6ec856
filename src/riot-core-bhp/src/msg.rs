//! Message backend.
//!
//! The top half sends a [`BHP_MSG_BH_REQUEST`] message to a thread, which
//! passes it to [`handler()`] from its message loop. Use this backend for
//! threads that have no event queue.
//!
//! Messages are sent without blocking: if the thread is not waiting for a
//! message and its queue is full, the trigger is dropped (and logged). Drivers
//! using this backend have to cope with missed bottom halves, e.g., by
//! checking the device status on the next one. The event backend does not
//! have this problem.
use riot_core_threads::{
    msg::{self, Msg},
    ThreadId,
};

use crate::{Bhp, BottomHalf, TopHalf};

/// Message type of bottom half requests.
pub const BHP_MSG_BH_REQUEST: u16 = 0x1539;

/// A bottom half delivered as a message to a thread.
#[derive(Debug, Default)]
pub struct BhpMsg {
    bhp: Bhp,
    pid: Option<ThreadId>,
}

impl BhpMsg {
    /// Creates a descriptor without callback and target thread.
    pub const fn new() -> Self {
        Self {
            bhp: Bhp::new(),
            pid: None,
        }
    }

    /// Binds `cb` with `ctx`.
    ///
    /// The target thread is unset afterwards; see [`BhpMsg::claim_thread()`].
    pub fn init(&mut self, cb: fn(usize), ctx: usize) {
        self.bhp.set_cb(cb, ctx);
        self.pid = None;
    }

    /// Binds a handler object.
    ///
    /// The target thread is unset afterwards; see [`BhpMsg::claim_thread()`].
    pub fn init_with_handler<T: BottomHalf>(&mut self, handler: &'static T) {
        self.bhp.set_handler(handler);
        self.pid = None;
    }

    /// Sets the thread that runs the bottom half.
    pub fn claim_thread(&mut self, pid: ThreadId) {
        self.pid = Some(pid);
    }

    /// Returns the thread that runs the bottom half, if set.
    pub fn pid(&self) -> Option<ThreadId> {
        self.pid
    }

    /// Sends a bottom half request to the target thread. Safe to call from
    /// interrupt context.
    ///
    /// # Panics
    ///
    /// Panics if no target thread was set.
    pub fn isr_cb(&'static self) {
        let pid = self.pid.expect("BhpMsg triggered before claim_thread()");
        let request = Msg::with_ptr(BHP_MSG_BH_REQUEST, self);
        if let Err(err) = msg::send_from_isr(request, pid) {
            riot_core_log::warn!("bhp: request to thread {} dropped: {}", pid, err);
        }
    }
}

impl TopHalf for BhpMsg {
    fn isr_cb(&'static self) {
        BhpMsg::isr_cb(self);
    }
}

/// Runs the bottom half requested by `msg`.
///
/// # Panics
///
/// Panics if `msg` is not a bottom half request.
pub fn handler(msg: &Msg) {
    assert_eq!(msg.msg_type, BHP_MSG_BH_REQUEST, "not a bottom half request");
    let bhp_msg = msg
        .ptr::<BhpMsg>()
        .expect("bottom half request without a BhpMsg");
    bhp_msg.bhp.irq_handler();
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use riot_core_threads::{get_state, msg::MSG_QUEUE_SIZE, testing, ThreadState};
    use static_cell::StaticCell;

    use super::*;

    fn setup(
        cell: &'static StaticCell<BhpMsg>,
        cb: fn(usize),
        ctx: usize,
    ) -> &'static mut BhpMsg {
        let bhp = cell.init(BhpMsg::new());
        bhp.init(cb, ctx);
        assert_eq!(bhp.pid(), None);
        bhp
    }

    #[test]
    fn request_runs_bottom_half_once() {
        static CELL: StaticCell<BhpMsg> = StaticCell::new();
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        static LAST_CTX: AtomicUsize = AtomicUsize::new(0);

        fn cb(ctx: usize) {
            CALLS.fetch_add(1, Ordering::Relaxed);
            LAST_CTX.store(ctx, Ordering::Relaxed);
        }

        let _guard = testing::lock();
        testing::reset();

        let pid = testing::spawn(2);
        testing::context_switch();
        msg::init_queue();

        let bhp = setup(&CELL, cb, 7);
        bhp.claim_thread(pid);
        assert_eq!(bhp.pid(), Some(pid));
        let bhp: &'static BhpMsg = bhp;

        testing::in_isr(|| bhp.isr_cb());
        assert_eq!(msg::avail(), 1);
        assert_eq!(CALLS.load(Ordering::Relaxed), 0);

        let request = msg::receive();
        assert_eq!(request.msg_type, BHP_MSG_BH_REQUEST);
        assert_eq!(request.sender_pid, None);
        handler(&request);
        assert_eq!(CALLS.load(Ordering::Relaxed), 1);
        assert_eq!(LAST_CTX.load(Ordering::Relaxed), 7);
    }

    #[test]
    fn request_handed_over_to_waiting_thread() {
        static CELL: StaticCell<BhpMsg> = StaticCell::new();
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        fn cb(_: usize) {
            CALLS.fetch_add(1, Ordering::Relaxed);
        }

        let _guard = testing::lock();
        testing::reset();

        // no queue, but waiting in `receive()`
        let pid = testing::spawn(2);
        testing::context_switch();
        testing::block(pid, ThreadState::MsgRxBlocked);

        let bhp = setup(&CELL, cb, 0);
        bhp.claim_thread(pid);
        let bhp: &'static BhpMsg = bhp;

        testing::in_isr(|| bhp.isr_cb());
        assert_eq!(get_state(pid), Some(ThreadState::Running));
        assert!(testing::take_switch_request());

        // the second trigger finds the thread busy and without a queue
        testing::in_isr(|| bhp.isr_cb());

        let request = msg::receive();
        handler(&request);
        assert_eq!(CALLS.load(Ordering::Relaxed), 1);
        assert!(msg::try_receive().is_none());
    }

    #[test]
    fn trigger_while_waiting_for_reply_keeps_reply() {
        static CELL: StaticCell<BhpMsg> = StaticCell::new();
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        fn cb(_: usize) {
            CALLS.fetch_add(1, Ordering::Relaxed);
        }

        let _guard = testing::lock();
        testing::reset();

        let server = testing::spawn(1);
        let client = testing::spawn(2);

        testing::switch_to(server);
        msg::init_queue();

        testing::switch_to(client);
        msg::init_queue();
        let bhp = setup(&CELL, cb, 0);
        bhp.claim_thread(client);
        let bhp: &'static BhpMsg = bhp;

        // the client is in `send_receive()`, its request waits at the server
        assert_eq!(msg::send(Msg::with_value(1, 1), server), Ok(()));
        testing::block(client, ThreadState::MsgReplyBlocked);

        testing::in_isr(|| bhp.isr_cb());
        assert_eq!(get_state(client), Some(ThreadState::MsgReplyBlocked));

        testing::switch_to(server);
        let request = msg::receive();
        assert_eq!(msg::reply(&request, Msg::with_value(2, 10)), Ok(()));
        assert_eq!(get_state(client), Some(ThreadState::Running));

        // the bottom half request is still queued for the client
        testing::switch_to(client);
        assert_eq!(msg::avail(), 1);
        handler(&msg::receive());
        assert_eq!(CALLS.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn full_queue_drops_trigger() {
        static CELL: StaticCell<BhpMsg> = StaticCell::new();
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        fn cb(_: usize) {
            CALLS.fetch_add(1, Ordering::Relaxed);
        }

        let _guard = testing::lock();
        testing::reset();

        let pid = testing::spawn(2);
        testing::context_switch();
        msg::init_queue();

        let bhp = setup(&CELL, cb, 0);
        bhp.claim_thread(pid);
        let bhp: &'static BhpMsg = bhp;

        testing::in_isr(|| {
            for _ in 0..MSG_QUEUE_SIZE + 3 {
                bhp.isr_cb();
            }
        });
        assert_eq!(msg::avail(), MSG_QUEUE_SIZE);

        while let Some(request) = msg::try_receive() {
            handler(&request);
        }
        assert_eq!(CALLS.load(Ordering::Relaxed), MSG_QUEUE_SIZE);
    }

    #[test]
    fn handler_object() {
        struct Radio {
            frames: AtomicUsize,
        }

        impl BottomHalf for Radio {
            fn irq_handler(&self) {
                self.frames.fetch_add(1, Ordering::Relaxed);
            }
        }

        static RADIO: Radio = Radio {
            frames: AtomicUsize::new(0),
        };
        static CELL: StaticCell<BhpMsg> = StaticCell::new();

        let _guard = testing::lock();
        testing::reset();

        let pid = testing::spawn(1);
        testing::context_switch();
        msg::init_queue();

        let bhp = CELL.init(BhpMsg::new());
        bhp.init_with_handler(&RADIO);
        bhp.claim_thread(pid);
        let top_half: &'static dyn TopHalf = bhp;

        testing::in_isr(|| top_half.isr_cb());
        handler(&msg::receive());
        assert_eq!(RADIO.frames.load(Ordering::Relaxed), 1);
    }

    #[test]
    #[should_panic(expected = "BhpMsg triggered before claim_thread()")]
    fn trigger_unclaimed() {
        static CELL: StaticCell<BhpMsg> = StaticCell::new();

        let bhp: &'static BhpMsg = setup(&CELL, |_| {}, 0);
        bhp.isr_cb();
    }

    #[test]
    #[should_panic(expected = "not a bottom half request")]
    fn handler_rejects_other_types() {
        handler(&Msg::with_value(BHP_MSG_BH_REQUEST + 1, 0));
    }

    #[test]
    #[should_panic(expected = "bottom half request without a BhpMsg")]
    fn handler_rejects_other_payloads() {
        static NOT_A_BHP: u32 = 0;
        handler(&Msg::with_ptr(BHP_MSG_BH_REQUEST, &NOT_A_BHP));
    }
}
