//! Cross-CPU kill delivery.

use crate::irq::gate::{Gate, GateLink};
use crate::system::Kernel;

/// Gate behind the assassin IPI.
///
/// `kill` flags a victim running on another CPU and aims this vector at
/// it; the epilogue then retires the victim inside that CPU's critical
/// section. The victim may already have died at a dispatch point of its
/// own by the time the IPI lands, so the epilogue re-checks.
pub(crate) struct Assassin {
    link: GateLink,
}

pub(crate) static ASSASSIN: Assassin = Assassin {
    link: GateLink::new(),
};

impl Gate for Assassin {
    fn name(&self) -> &'static str {
        "assassin"
    }

    fn prologue(&self) -> bool {
        true
    }

    fn epilogue(&self, kernel: &mut Kernel) {
        kernel.exit_if_killed();
    }

    fn link(&self) -> &GateLink {
        &self.link
    }
}

#[cfg(test)]
mod tests {
    use keel_arch::CpuId;

    use crate::error::Error;
    use crate::irq::guard::Secure;
    use crate::irq::{guardian, vector};
    use crate::testutil;

    #[test]
    fn test_assassin_retires_condemned_thread() {
        let (system, sim) = testutil::fresh_system(2);
        let cpu1 = CpuId::from_index(1).unwrap();
        let victim = testutil::spawn(system);

        keel_pal::claim_cpu(cpu1);
        system.init_cpu(testutil::STACK).unwrap();
        {
            let mut secure = Secure::new(system);
            let kernel = secure.kernel();
            kernel.ready(victim).unwrap();
            kernel.schedule();
        }

        keel_pal::claim_cpu(CpuId::BOOT);
        {
            let mut secure = Secure::new(system);
            secure.kernel().kill(victim).unwrap();
        }
        assert_eq!(sim.take_ipis(), [(cpu1, vector::ASSASSIN)]);

        // Deliver the interrupt on the victim's CPU.
        keel_pal::claim_cpu(cpu1);
        system.platform().disable_interrupts();
        guardian(system, vector::ASSASSIN);

        let mut secure = Secure::new(system);
        let kernel = secure.kernel();
        assert_eq!(kernel.thread_state(victim), Err(Error::UnknownThread));
        assert!(kernel.active(cpu1).is_some(), "idle thread takes over");
        assert_eq!(sim.ack_count(cpu1), 1);
    }

    #[test]
    fn test_assassin_without_victim_changes_nothing() {
        let (system, sim) = testutil::fresh_system(1);
        let a = testutil::spawn(system);
        {
            let mut secure = Secure::new(system);
            let kernel = secure.kernel();
            kernel.ready(a).unwrap();
            kernel.schedule();
        }

        system.platform().disable_interrupts();
        guardian(system, vector::ASSASSIN);

        let mut secure = Secure::new(system);
        assert_eq!(secure.kernel().active(CpuId::BOOT), Some(a));
        assert_eq!(sim.ack_count(CpuId::BOOT), 1);
    }
}
