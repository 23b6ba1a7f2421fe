//! Host-side platform layer for the keel kernel core.
//!
//! Implements the `keel-arch` contract without hardware: OS threads stand
//! in for CPUs, trampoline operations and IPIs are recorded instead of
//! performed, and log output lands in a drainable ring buffer. Everything
//! the core observes through the contract behaves as documented there, so
//! the scheduler, guard and timer machinery can be exercised as the state
//! machines they are.

pub mod logger;
pub mod sim;

pub use sim::{claim_cpu, CtxEvent, SimPlatform};
