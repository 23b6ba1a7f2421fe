//! The periodic timer gate.

use crate::irq::gate::{Gate, GateLink};
use crate::system::Kernel;

/// Gate behind the per-CPU periodic timer.
///
/// Every CPU preempts its running thread through `resume`; the tick
/// owner advances the bellringer first, so a sleeper woken by a ring can
/// be dispatched by the very same tick. The vector must stay quiet until
/// dispatch has started on a CPU, which the boot protocol guarantees by
/// keeping interrupts masked until the first thread runs.
pub(crate) struct Tick {
    link: GateLink,
}

pub(crate) static TICK: Tick = Tick {
    link: GateLink::new(),
};

impl Gate for Tick {
    fn name(&self) -> &'static str {
        "tick"
    }

    fn prologue(&self) -> bool {
        true
    }

    fn epilogue(&self, kernel: &mut Kernel) {
        if kernel.platform.cpu_id().is_boot() {
            kernel.check_bells();
        }
        kernel.resume();
    }

    fn link(&self) -> &GateLink {
        &self.link
    }
}
