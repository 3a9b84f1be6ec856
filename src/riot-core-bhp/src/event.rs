//! Event queue backend.
//!
//! The top half posts an event that is embedded in the descriptor; the thread
//! running the queue calls the bottom half when it processes the event.
//!
//! ```ignore
//! static QUEUE: EventQueue = EventQueue::new();
//! static BHP: StaticCell<BhpEvent> = StaticCell::new();
//!
//! let bhp = BHP.init(BhpEvent::new());
//! bhp.init(&QUEUE, bottom_half, 0);
//! let bhp: &'static BhpEvent = bhp;
//! // from the interrupt handler:
//! bhp.isr_cb();
//! ```
use riot_core_event::{Event, EventQueue};

use crate::{Bhp, BottomHalf, TopHalf};

/// A bottom half delivered through an [`EventQueue`].
///
/// Triggering the descriptor again before the queue processed the previous
/// trigger has no effect: the bottom half runs once for both.
pub struct BhpEvent {
    bhp: Bhp,
    evq: Option<&'static EventQueue>,
    event: Event,
}

impl BhpEvent {
    /// Creates a descriptor that is not bound to a queue yet.
    pub const fn new() -> Self {
        Self {
            bhp: Bhp::new(),
            evq: None,
            event: Event::new(Self::handle_event),
        }
    }

    /// Binds `cb` with `ctx` and the queue that runs it.
    pub fn init(&mut self, evq: &'static EventQueue, cb: fn(usize), ctx: usize) {
        self.evq = Some(evq);
        self.bhp.set_cb(cb, ctx);
    }

    /// Binds a handler object and the queue that runs it.
    pub fn init_with_handler<T: BottomHalf>(
        &mut self,
        evq: &'static EventQueue,
        handler: &'static T,
    ) {
        self.evq = Some(evq);
        self.bhp.set_handler(handler);
    }

    /// Posts the bottom half to the queue. Safe to call from interrupt context.
    ///
    /// # Panics
    ///
    /// Panics if the descriptor was not initialized.
    pub fn isr_cb(&'static self) {
        let evq = self.evq.expect("BhpEvent triggered before init()");
        evq.post(&self.event);
    }

    /// Returns whether a trigger waits to be processed.
    pub fn is_pending(&self) -> bool {
        self.event.is_queued()
    }

    fn handle_event(event: &'static Event) {
        let offset = memoffset::offset_of!(BhpEvent, event);
        // SAFETY: this handler is private, and only used for the event
        // embedded in a `BhpEvent`, so `event` points `offset` bytes into one.
        let this = unsafe {
            &*(event as *const Event)
                .byte_sub(offset)
                .cast::<BhpEvent>()
        };
        this.bhp.irq_handler();
    }
}

impl Default for BhpEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl TopHalf for BhpEvent {
    fn isr_cb(&'static self) {
        BhpEvent::isr_cb(self);
    }
}
