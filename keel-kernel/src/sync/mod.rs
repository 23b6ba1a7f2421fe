//! Blocking synchronisation.
//!
//! Everything here reduces to [`room::Waitingroom`]: a FIFO of blocked
//! threads that the scheduler parks into and wakes out of. Semaphores
//! add a counter, mutexes add an owner with direct handoff. All
//! operations run inside the big-lock critical section.
//!
//! # Sections
//!
//! - [`room`]: the bare FIFO of blocked threads.
//! - [`semaphore`]: counting semaphores with wake-before-increment.
//! - [`mutex`]: non-recursive mutexes that pass ownership to the head
//!   waiter on unlock.

pub mod mutex;
pub mod room;
pub mod semaphore;
