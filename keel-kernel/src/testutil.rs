//! Shared helpers for the in-crate tests.

use alloc::boxed::Box;

use keel_pal::SimPlatform;

use crate::sched::thread::ThreadId;
use crate::system::System;

/// A plausible stack top for threads that will never really run.
pub(crate) const STACK: usize = 0x8000;

/// Build a leaked system over a fresh simulator.
pub(crate) fn fresh_system(cpus: usize) -> (&'static System, &'static SimPlatform) {
    keel_pal::logger::init();
    let sim: &'static SimPlatform = Box::leak(Box::new(SimPlatform::new(cpus)));
    let system: &'static System = Box::leak(Box::new(System::new(sim).unwrap()));
    (system, sim)
}

/// Create a thread with an empty action and a dummy stack.
pub(crate) fn spawn(system: &'static System) -> ThreadId {
    system.create_thread(STACK, || {})
}
