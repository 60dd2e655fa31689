//! Flash operation orchestration for STM32 serial bootloaders.
//!
//! The wire protocol, file parsers and boot pin sequencing are supplied by
//! the caller through the traits in [`protocol`], [`parser`] and
//! [`boot_sequence`]. This crate resolves what to touch, moves the data and
//! guarantees the target and host resources are left in a known state.

pub mod api;
pub mod boot_sequence;
pub mod cancel;
pub mod config;
pub mod devices;
mod finalize;
pub mod memory_map;
pub mod operation;
pub mod parser;
pub mod port;
pub mod protocol;
pub mod serial;
pub mod session;
pub mod transfer;
pub mod window;
pub mod worker;

#[cfg(test)]
mod mock;
