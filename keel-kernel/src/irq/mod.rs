//! Two-phase interrupt handling.
//!
//! Every interrupt source implements [`gate::Gate`] and registers in the
//! [`plugbox::Plugbox`] under its hardware vector. The low-level entry
//! point is [`guardian`]: prologue with interrupts masked, acknowledge,
//! then optionally hand the deferred half to the [`guard::Guard`].

pub mod gate;
pub mod guard;
pub mod plugbox;

use crate::system::System;

/// Interrupt vectors owned by the core.
///
/// Device drivers take vectors outside this set and register their own
/// gates for them.
pub mod vector {
    /// Local periodic timer tick.
    pub const TIMER: u8 = 32;
    /// IPI: re-check the running thread's kill flag.
    pub const ASSASSIN: u8 = 100;
    /// IPI: wake a halted CPU so it re-examines the ready queue.
    pub const WAKEUP: u8 = 101;
}

/// Low-level interrupt entry point.
///
/// Called by the platform's vector stubs with interrupts disabled. Looks
/// up the gate, runs its prologue, signals end-of-interrupt, and relays
/// to the epilogue layer if the prologue asked for it. Never blocks.
pub fn guardian(system: &System, vector: u8) {
    let gate = system.plugbox().report(vector);
    log::trace!("vector {} -> {}", vector, gate.name());

    let wants_epilogue = gate.prologue();
    system.platform().ack_interrupt();

    if wants_epilogue {
        system.guard().relay(gate);
    }
}
