//! Interrupt line to top half mapping.
//!
//! Drivers register their top half for the line their device interrupts on;
//! the handler of a shared interrupt vector then calls
//! [`IsrRegistry::dispatch()`] with the line that fired.
use core::cell::Cell;

use critical_section::Mutex;
use riot_core_utils::usize_from_env_or;

use crate::TopHalf;

/// Default number of lines of an [`IsrRegistry`].
pub const ISR_REGISTRY_SIZE: usize = usize_from_env_or!("CONFIG_ISR_REGISTRY_SIZE", 16);

/// Errors when registering a top half.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistryError {
    /// The line number is not below the registry size.
    LineOutOfRange,
    /// Another top half is registered for this line.
    LineInUse,
}

type Entry = Cell<Option<&'static dyn TopHalf>>;

/// Top halves by interrupt line, for lines `0..N`.
pub struct IsrRegistry<const N: usize = ISR_REGISTRY_SIZE> {
    entries: Mutex<[Entry; N]>,
}

impl<const N: usize> IsrRegistry<N> {
    /// Creates an empty registry.
    pub const fn new() -> Self {
        const EMPTY: Entry = Cell::new(None);
        Self {
            entries: Mutex::new([EMPTY; N]),
        }
    }

    /// Registers `top_half` for `line`.
    pub fn register(&self, line: u8, top_half: &'static dyn TopHalf) -> Result<(), RegistryError> {
        critical_section::with(|cs| {
            let entry = self
                .entries
                .borrow(cs)
                .get(usize::from(line))
                .ok_or(RegistryError::LineOutOfRange)?;
            if entry.get().is_some() {
                return Err(RegistryError::LineInUse);
            }
            entry.set(Some(top_half));
            Ok(())
        })?;
        riot_core_log::debug!("bhp: top half registered for line {}", line);
        Ok(())
    }

    /// Removes the top half of `line`, and returns it.
    pub fn unregister(&self, line: u8) -> Option<&'static dyn TopHalf> {
        critical_section::with(|cs| {
            self.entries
                .borrow(cs)
                .get(usize::from(line))
                .and_then(Cell::take)
        })
    }

    /// Triggers the top half registered for `line`.
    ///
    /// Returns `false` if there is none; the interrupt is spurious then.
    pub fn dispatch(&self, line: u8) -> bool {
        // The top half runs outside of the critical section.
        let Some(top_half) = self.lookup(line) else {
            riot_core_log::trace!("bhp: spurious interrupt on line {}", line);
            return false;
        };
        top_half.isr_cb();
        true
    }

    /// Returns whether a top half is registered for `line`.
    pub fn is_registered(&self, line: u8) -> bool {
        self.lookup(line).is_some()
    }

    fn lookup(&self, line: u8) -> Option<&'static dyn TopHalf> {
        critical_section::with(|cs| {
            self.entries
                .borrow(cs)
                .get(usize::from(line))
                .and_then(Cell::get)
        })
    }
}

impl<const N: usize> Default for IsrRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}
