//! Architecture contract for the keel kernel core.
//!
//! The core is written against this crate instead of against real hardware:
//! CPU identity, interrupt masking, inter-processor interrupts and the
//! coroutine context handoff all go through the [`platform::Platform`]
//! trait. Everything that busy-waits lives in [`sync`].
//!
//! # Sections
//!
//! - [`cpu`]: CPU identifiers and the per-CPU array bound
//! - [`sync`]: spin and ticket locks
//! - [`context`]: opaque register-save area for coroutine switching
//! - [`platform`]: the hardware contract implemented by a real port or by
//!   the host-side simulator

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(test)]
extern crate std;

pub mod context;
pub mod cpu;
pub mod platform;
pub mod sync;

pub use context::Context;
pub use cpu::{CpuId, CPU_MAX};
pub use platform::Platform;
