//! Logging macros for the kernel core.
//!
//! With the `defmt` feature enabled, the macros forward to [`defmt`], so the
//! usual `defmt` format strings apply. Without it they compile to nothing but
//! still evaluate (and thus "use") their arguments.
//!
//! Logging from interrupt context is fine with both backends.

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]
#![deny(clippy::pedantic)]

#[cfg(feature = "defmt")]
pub mod defmt {
    //! Selected [`defmt`] items.

    // Hidden in the docs, but the macros need a path to it.
    #[doc(hidden)]
    pub mod hidden {
        #[doc(hidden)]
        pub use defmt;
    }

    pub use defmt::{Debug2Format, Display2Format, Format};
}

// The declarative macros are required because the defmt macros expect defmt to be in scope.

/// Logs a message at the trace level.
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {{
        use $crate::defmt::hidden::defmt;
        defmt::trace!($($arg)*);
    }};
}

/// Logs a message at the debug level.
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {{
        use $crate::defmt::hidden::defmt;
        defmt::debug!($($arg)*);
    }};
}

/// Logs a message at the info level.
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        use $crate::defmt::hidden::defmt;
        defmt::info!($($arg)*);
    }};
}

/// Logs a message at the warn level.
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        use $crate::defmt::hidden::defmt;
        defmt::warn!($($arg)*);
    }};
}

/// Logs a message at the error level.
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        use $crate::defmt::hidden::defmt;
        defmt::error!($($arg)*);
    }};
}

/// No-op log macro.
#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {{
        let _ = ($($arg)*);
    }};
}

/// No-op log macro.
#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {{
        let _ = ($($arg)*);
    }};
}

/// No-op log macro.
#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        let _ = ($($arg)*);
    }};
}

/// No-op log macro.
#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        let _ = ($($arg)*);
    }};
}

/// No-op log macro.
#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        let _ = ($($arg)*);
    }};
}

#[cfg(all(test, not(feature = "defmt")))]
mod tests {
    #[test]
    fn disabled_macros_evaluate_their_arguments() {
        let mut evaluated = false;
        debug!("thread {} created", {
            evaluated = true;
            3u8
        });
        assert!(evaluated);
        warn!("dropped");
    }
}
