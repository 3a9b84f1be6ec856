//! Bottom-half processing (BHP) of interrupts.
//!
//! Interrupt handlers (the *top half*) should do as little as possible, and
//! nothing that blocks. A [`Bhp`] binds the rest of the work (the *bottom
//! half*) to a callback that runs in thread context, where it may block, take
//! mutexes and so on.
//!
//! How the bottom half gets from the interrupt into a thread is up to a
//! backend. Both wrap a [`Bhp`] and implement [`TopHalf`], to be called from
//! the interrupt handler:
//!
//! - [`event::BhpEvent`] posts an event to an event queue. Triggers are never
//!   lost, and a trigger that arrives while the previous one is still pending
//!   is merged into it. This is the preferred backend.
//! - [`msg::BhpMsg`] sends a message to a thread. If the thread's message
//!   queue is full, the trigger is dropped.
//!
//! [`registry::IsrRegistry`] maps interrupt lines to top halves, for
//! interrupt vectors shared by several sources.
#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

#[cfg(feature = "event")]
pub mod event;
#[cfg(feature = "msg")]
pub mod msg;
pub mod registry;

/// A bottom half handler object, for use with [`Bhp::set_handler()`].
pub trait BottomHalf: Sync {
    /// Runs the bottom half, in thread context.
    fn irq_handler(&self);
}

/// Something that can be triggered from an interrupt handler.
pub trait TopHalf: Sync {
    /// Triggers the bottom half. Safe to call from interrupt context; never
    /// blocks.
    fn isr_cb(&'static self);
}

/// A bottom half: a callback with its context.
#[derive(Debug, Default)]
pub struct Bhp {
    irq_handler: Option<fn(usize)>,
    ctx: usize,
}

impl Bhp {
    /// Creates a descriptor without callback.
    pub const fn new() -> Self {
        Self {
            irq_handler: None,
            ctx: 0,
        }
    }

    /// Binds `cb`, to be called with `ctx`.
    pub fn set_cb(&mut self, cb: fn(usize), ctx: usize) {
        self.irq_handler = Some(cb);
        self.ctx = ctx;
    }

    /// Binds a handler object, whose [`BottomHalf::irq_handler()`] will be
    /// called.
    pub fn set_handler<T: BottomHalf>(&mut self, handler: &'static T) {
        self.set_cb(call_handler::<T>, handler as *const T as usize);
    }

    /// Runs the bottom half callback.
    ///
    /// This is meant to be called in thread context, by the backends. It can
    /// be called from an ISR if the callback is fine with that, but that
    /// defeats the purpose.
    ///
    /// # Panics
    ///
    /// Panics if no callback was bound.
    pub fn irq_handler(&self) {
        let cb = self
            .irq_handler
            .expect("bottom half triggered without a callback");
        cb(self.ctx);
    }

    /// Returns whether a callback was bound.
    pub fn is_bound(&self) -> bool {
        self.irq_handler.is_some()
    }
}

fn call_handler<T: BottomHalf>(ctx: usize) {
    // SAFETY: `set_handler()` only pairs this function with the address of a
    // `&'static T`.
    let handler = unsafe { &*(ctx as *const T) };
    handler.irq_handler();
}
