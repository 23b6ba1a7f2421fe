//! Wake-up IPIs for halted CPUs.

use crate::irq::gate::{Gate, GateLink};

/// Gate behind the wake-up IPI.
///
/// The interrupt itself is the whole payload: it pulls the target CPU
/// out of `wait_for_interrupt`, and its idle loop then re-reads the
/// ready hint. Nothing is deferred, no epilogue runs.
pub(crate) struct WakeUp {
    link: GateLink,
}

pub(crate) static WAKEUP: WakeUp = WakeUp {
    link: GateLink::new(),
};

impl Gate for WakeUp {
    fn name(&self) -> &'static str {
        "wakeup"
    }

    fn prologue(&self) -> bool {
        false
    }

    fn link(&self) -> &GateLink {
        &self.link
    }
}

#[cfg(test)]
mod tests {
    use keel_arch::CpuId;

    use crate::irq::{guardian, vector};
    use crate::testutil;

    #[test]
    fn test_wakeup_acknowledges_and_defers_nothing() {
        let (system, sim) = testutil::fresh_system(1);

        system.platform().disable_interrupts();
        guardian(system, vector::WAKEUP);

        assert_eq!(sim.ack_count(CpuId::BOOT), 1);
        assert!(!system.guard().in_epilogue());
        assert!(sim.take_context_events().is_empty());
    }
}
