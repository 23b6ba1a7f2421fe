//! Epilogue serialisation and the big kernel lock.
//!
//! The [`Guard`] turns "may I run kernel-level deferred work now" into a
//! serialised, interruption-tolerant critical section. One fair lock
//! serialises all epilogues and all [`Secure`] sections across CPUs; a
//! per-CPU queue holds gates whose epilogues arrived while this CPU was
//! already inside.
//!
//! The lock is a raw ticket lock on purpose. A context switch performed
//! inside the critical section hands the lock to whatever thread runs
//! next; that thread releases it on its own `leave` path (or in `kickoff`
//! for a first activation). Acquisition and release therefore do not nest
//! lexically, which rules out an RAII lock guard at this level. `Secure`
//! restores the RAII discipline one layer up, where scopes do nest.
//!
//! # Interrupt discipline
//!
//! `enter` sets this CPU's `in_epilogue` flag with interrupts masked,
//! then re-enables them before spinning on the lock, so interrupts keep
//! being served (and their prologues keep queueing epilogues) while the
//! CPU waits. `leave` drains this CPU's queue head by head, interrupts
//! enabled around each epilogue, masked around the queue surgery.

use alloc::collections::VecDeque;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use keel_arch::sync::{Spinlock, Ticketlock};
use keel_arch::{Platform, CPU_MAX};

use crate::irq::gate::GateRef;
use crate::system::{Kernel, System};

struct CpuGuard {
    in_epilogue: AtomicBool,
    queue: Spinlock<VecDeque<GateRef>>,
}

impl CpuGuard {
    fn new() -> Self {
        Self {
            in_epilogue: AtomicBool::new(false),
            queue: Spinlock::new(VecDeque::new()),
        }
    }
}

/// The cross-CPU critical section and the state it protects.
pub struct Guard {
    platform: &'static dyn Platform,
    bkl: Ticketlock,
    cpus: [CpuGuard; CPU_MAX],
    kernel: UnsafeCell<Kernel>,
}

// SAFETY: `kernel` is only ever dereferenced while the caller holds the
// big kernel lock (`kernel_mut`'s contract), so all access to it is
// serialised even though `Guard` is shared between CPUs.
unsafe impl Sync for Guard {}

impl Guard {
    pub(crate) fn new(platform: &'static dyn Platform, kernel: Kernel) -> Self {
        Self {
            platform,
            bkl: Ticketlock::new(),
            cpus: core::array::from_fn(|_| CpuGuard::new()),
            kernel: UnsafeCell::new(kernel),
        }
    }

    /// Open the critical section on this CPU.
    ///
    /// Panics if this CPU is already inside; nesting `Secure` sections or
    /// calling an entry point from an epilogue is kernel corruption.
    pub fn enter(&self) {
        self.platform.disable_interrupts();
        let cpu = self.platform.cpu_id();
        if self.cpus[cpu.index()].in_epilogue.swap(true, Ordering::Acquire) {
            log::error!("{} entered the guard twice", cpu);
            panic!("guard entered twice on one cpu");
        }
        // Wait for the lock with interrupts open so this CPU keeps
        // serving prologues meanwhile.
        self.platform.enable_interrupts();
        self.bkl.lock();
    }

    /// Drain this CPU's epilogue queue, then close the critical section.
    pub fn leave(&self) {
        let cpu = self.platform.cpu_id();
        let slot = &self.cpus[cpu.index()];

        self.platform.disable_interrupts();
        loop {
            let next = slot.queue.lock().pop_front();
            let Some(gate) = next else { break };
            gate.link().clear_queued();
            self.platform.enable_interrupts();
            self.run_epilogue(gate);
            self.platform.disable_interrupts();
        }

        self.bkl.unlock();
        slot.in_epilogue.store(false, Ordering::Release);
        self.platform.enable_interrupts();
    }

    /// Hand a gate's epilogue to the critical section.
    ///
    /// Called from prologue context with interrupts masked. If this CPU is
    /// already inside, the gate is queued (at most once) for the ongoing
    /// `leave`; otherwise the epilogue runs right here and the section is
    /// closed again.
    pub fn relay(&self, gate: GateRef) {
        let cpu = self.platform.cpu_id();
        let slot = &self.cpus[cpu.index()];

        if slot.in_epilogue.load(Ordering::Acquire) {
            if gate.link().try_enqueue() {
                slot.queue.lock().push_back(gate);
            } else {
                log::trace!("gate {} already queued", gate.name());
            }
            return;
        }

        slot.in_epilogue.store(true, Ordering::Release);
        self.platform.enable_interrupts();
        self.bkl.lock();
        self.run_epilogue(gate);
        self.leave();
    }

    /// Whether this CPU is inside the critical section.
    pub fn in_epilogue(&self) -> bool {
        let cpu = self.platform.cpu_id();
        self.cpus[cpu.index()].in_epilogue.load(Ordering::Acquire)
    }

    /// The protected kernel state.
    ///
    /// # Safety
    ///
    /// The caller must hold the big kernel lock and must not let borrows
    /// from two calls overlap.
    pub(crate) unsafe fn kernel_mut(&self) -> &mut Kernel {
        // SAFETY: serialisation is the caller's contract, see above.
        unsafe { &mut *self.kernel.get() }
    }

    fn run_epilogue(&self, gate: GateRef) {
        let link = gate.link();
        link.mark_dequeued();
        // SAFETY: this CPU holds the big kernel lock for the whole
        // epilogue; the borrow ends before the flag is cleared.
        let kernel = unsafe { self.kernel_mut() };
        gate.epilogue(kernel);
        link.clear_dequeued();
    }
}

/// Scope-bound critical section for system-call-level code.
///
/// Construction enters the guard, destruction leaves it on every exit
/// path. All application-reachable scheduler, synchronisation and timer
/// entry points run inside one of these.
#[must_use]
pub struct Secure<'a> {
    system: &'a System,
}

impl<'a> Secure<'a> {
    pub fn new(system: &'a System) -> Self {
        system.guard().enter();
        Self { system }
    }

    /// The guarded kernel state.
    pub fn kernel(&mut self) -> &mut Kernel {
        // SAFETY: `new` acquired the big kernel lock and `drop` is what
        // releases it; the returned borrow cannot outlive `self`.
        unsafe { self.system.guard().kernel_mut() }
    }
}

impl Drop for Secure<'_> {
    fn drop(&mut self) {
        self.system.guard().leave();
    }
}
