//! Vector to gate directory.
//!
//! All 256 interrupt vectors always resolve to a valid gate; unassigned
//! ones resolve to the fault gate, whose prologue treats delivery as
//! kernel corruption. Entries are only ever overwritten, never cleared.

use keel_arch::sync::Spinlock;

use crate::irq::gate::{Gate, GateLink, GateRef};

/// Number of interrupt vectors.
pub const VECTORS: usize = 256;

/// The vector directory.
pub struct Plugbox {
    slots: Spinlock<[GateRef; VECTORS]>,
}

impl Plugbox {
    pub(crate) fn new() -> Self {
        Self {
            slots: Spinlock::new([&FAULT_GATE as GateRef; VECTORS]),
        }
    }

    /// Register `gate` for `vector`, replacing the previous entry.
    pub fn assign(&self, vector: u8, gate: GateRef) {
        self.slots.lock()[vector as usize] = gate;
        log::debug!("vector {} assigned to gate {}", vector, gate.name());
    }

    /// The gate currently registered for `vector`. Never null.
    pub fn report(&self, vector: u8) -> GateRef {
        self.slots.lock()[vector as usize]
    }
}

/// Default entry for unassigned vectors.
struct FaultGate {
    link: GateLink,
}

impl Gate for FaultGate {
    fn name(&self) -> &'static str {
        "fault"
    }

    fn prologue(&self) -> bool {
        log::error!("interrupt on unassigned vector");
        panic!("interrupt on unassigned vector");
    }

    fn link(&self) -> &GateLink {
        &self.link
    }
}

static FAULT_GATE: FaultGate = FaultGate {
    link: GateLink::new(),
};

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet {
        link: GateLink,
    }

    impl Gate for Quiet {
        fn name(&self) -> &'static str {
            "quiet"
        }

        fn prologue(&self) -> bool {
            false
        }

        fn link(&self) -> &GateLink {
            &self.link
        }
    }

    static QUIET: Quiet = Quiet {
        link: GateLink::new(),
    };

    #[test]
    fn test_default_is_fault_gate() {
        let plugbox = Plugbox::new();
        assert_eq!(plugbox.report(0).name(), "fault");
        assert_eq!(plugbox.report(255).name(), "fault");
    }

    #[test]
    fn test_assign_overwrites() {
        let plugbox = Plugbox::new();
        plugbox.assign(42, &QUIET);
        assert_eq!(plugbox.report(42).name(), "quiet");
        assert_eq!(plugbox.report(41).name(), "fault");
    }

    #[test]
    #[should_panic(expected = "unassigned vector")]
    fn test_fault_gate_panics() {
        let plugbox = Plugbox::new();
        plugbox.report(7).prologue();
    }
}
