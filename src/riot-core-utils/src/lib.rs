//! Helpers shared by the kernel core crates.

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

#[doc(hidden)]
#[macro_use]
pub mod env;
