//! Synchronization primitives.
mod lock;
mod mutex;

pub use lock::Lock;
pub use mutex::{Mutex, MutexGuard};
