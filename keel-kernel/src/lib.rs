//! Concurrency and scheduling core of the keel teaching kernel.
//!
//! Reconciles asynchronous hardware interrupts with cooperatively
//! scheduled kernel coroutines across several CPUs sharing one address
//! space. Hardware is reached only through the `keel-arch` platform
//! contract, so the whole core runs as a plain state machine on the host
//! simulator as well as on a real port.
//!
//! # Sections
//!
//! - [`irq`]: two-phase interrupt handling. [`irq::gate::Gate`]s register
//!   in the [`irq::plugbox::Plugbox`]; [`irq::guardian`] runs prologues;
//!   the [`irq::guard::Guard`] serialises epilogues and every
//!   [`irq::guard::Secure`] section under the big kernel lock.
//! - [`sched`]: threads, the FIFO ready queue, per-CPU dispatch, the idle
//!   threads and the kill machinery.
//! - [`sync`]: waiting rooms, counting semaphores and owner-handoff
//!   mutexes built on block/wakeup.
//! - [`time`]: the bell delta queue and the periodic tick gate.
//! - [`system`]: the process-wide assembly and the application-facing,
//!   `Secure`-wrapped entry points.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod error;
pub mod irq;
mod obj;
pub mod sched;
pub mod sync;
pub mod system;
pub mod time;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::Error;
pub use irq::guard::Secure;
pub use irq::{guardian, vector};
pub use sched::thread::{ThreadId, ThreadState};
pub use sync::mutex::MutexId;
pub use sync::semaphore::SemaphoreId;
pub use system::{install, system, Kernel, System};
pub use time::bell::BellId;
pub use time::TICK_MS;
