//! Per-CPU idle threads.
//!
//! Every CPU owns one idle thread that the dispatcher substitutes
//! whenever the ready queue runs dry. Idle threads never enter the
//! queue themselves. The loop reads the published scheduler hints
//! instead of taking the big lock, so an idle CPU stays off the lock
//! entirely until there is work.

use keel_arch::CpuId;

use crate::sched::thread::ThreadId;
use crate::system::{Kernel, System};

impl Kernel {
    /// Register an idle thread for the given CPU. Must happen before the
    /// first dispatch there.
    pub(crate) fn set_idle(&mut self, cpu: CpuId, t: ThreadId) {
        self.sched.idle[cpu.index()] = Some(t);
    }

    pub(crate) fn has_idle(&self, cpu: CpuId) -> bool {
        self.sched.idle[cpu.index()].is_some()
    }
}

/// Body of every idle thread.
pub(crate) fn idle_loop(system: &'static System) -> ! {
    let cpu = system.platform().cpu_id();
    log::debug!("{}: idle thread up", cpu);
    loop {
        system.platform().disable_interrupts();
        if system.hints().ready_threads() > 0 {
            system.platform().enable_interrupts();
            system.resume();
        } else {
            idle_wait(system, cpu);
        }
    }
}

/// Halt until an interrupt arrives.
///
/// Interrupts must be disabled on entry; the platform's
/// `wait_for_interrupt` re-enables them, so a wakeup raised between the
/// emptiness check and the halt still gets through. The local timer is
/// silenced while asleep, except on the CPU that owns the tick or while
/// a bell is pending, so an otherwise idle machine is not woken over
/// and over for nothing.
pub(crate) fn idle_wait(system: &System, cpu: CpuId) {
    let platform = system.platform();
    let keep_timer = cpu.is_boot() || system.hints().pending_bells() > 0;
    if !keep_timer {
        platform.mask_local_timer(true);
    }
    system.hints().set_halted(cpu, true);
    log::trace!("{}: halting", cpu);
    platform.wait_for_interrupt();
    system.hints().set_halted(cpu, false);
    if !keep_timer {
        platform.mask_local_timer(false);
    }
}
