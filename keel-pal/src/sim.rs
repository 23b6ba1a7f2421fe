//! Simulated multiprocessor platform.
//!
//! A [`SimPlatform`] models `cpu_count` CPUs. Each OS thread claims the
//! CPU it acts for with [`claim_cpu`]; unclaimed threads act for the boot
//! CPU, so single-threaded tests need no setup. Interrupt-enable and
//! timer-mask state is tracked per CPU; context operations, IPIs,
//! acknowledgements and halts are recorded for inspection.
//!
//! `wait_for_interrupt` records the halt, enables interrupts and returns
//! immediately. That models the pending-interrupt rescue of real halt
//! instructions: a simulated CPU never actually stops, it just lets the
//! caller's loop re-check its wakeup condition.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use keel_arch::sync::Spinlock;
use keel_arch::{Context, CpuId, Platform, CPU_MAX};

thread_local! {
    static CLAIMED_CPU: Cell<Option<CpuId>> = const { Cell::new(None) };
}

/// Make the calling OS thread act for `cpu` in every later contract call.
pub fn claim_cpu(cpu: CpuId) {
    CLAIMED_CPU.with(|claimed| claimed.set(Some(cpu)));
}

fn current_cpu() -> CpuId {
    CLAIMED_CPU.with(|claimed| claimed.get().unwrap_or(CpuId::BOOT))
}

/// One recorded trampoline operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtxEvent {
    /// `prepare_context` was called with this stack top and entry argument.
    Prepare { stack_top: usize, arg: usize },
    /// `switch_context` was called on this CPU.
    Switch { cpu: CpuId },
    /// `launch_context` was called on this CPU.
    Launch { cpu: CpuId },
}

#[derive(Default)]
struct SimCpu {
    irq_enabled: AtomicBool,
    timer_masked: AtomicBool,
    halts: AtomicUsize,
    masked_halts: AtomicUsize,
    acks: AtomicUsize,
}

/// Recording implementation of the platform contract.
pub struct SimPlatform {
    cpu_count: usize,
    cpus: [SimCpu; CPU_MAX],
    context_events: Spinlock<Vec<CtxEvent>>,
    ipis: Spinlock<Vec<(CpuId, u8)>>,
}

impl SimPlatform {
    /// Create a simulator for `cpu_count` CPUs, interrupts enabled.
    pub fn new(cpu_count: usize) -> Self {
        assert!(
            cpu_count >= 1 && cpu_count <= CPU_MAX,
            "simulated CPU count {cpu_count} out of range"
        );
        let sim = Self {
            cpu_count,
            cpus: core::array::from_fn(|_| SimCpu::default()),
            context_events: Spinlock::new(Vec::new()),
            ipis: Spinlock::new(Vec::new()),
        };
        for cpu in &sim.cpus {
            cpu.irq_enabled.store(true, Ordering::Relaxed);
        }
        sim
    }

    fn cpu(&self) -> &SimCpu {
        &self.cpus[current_cpu().index()]
    }

    /// Drain the recorded trampoline operations.
    pub fn take_context_events(&self) -> Vec<CtxEvent> {
        core::mem::take(&mut *self.context_events.lock())
    }

    /// Drain the recorded IPIs as `(target, vector)` pairs.
    pub fn take_ipis(&self) -> Vec<(CpuId, u8)> {
        core::mem::take(&mut *self.ipis.lock())
    }

    /// How often `cpu` has halted so far.
    pub fn halt_count(&self, cpu: CpuId) -> usize {
        self.cpus[cpu.index()].halts.load(Ordering::SeqCst)
    }

    /// How often `cpu` has halted with its local timer masked.
    pub fn masked_halt_count(&self, cpu: CpuId) -> usize {
        self.cpus[cpu.index()].masked_halts.load(Ordering::SeqCst)
    }

    /// How many interrupts `cpu` has acknowledged so far.
    pub fn ack_count(&self, cpu: CpuId) -> usize {
        self.cpus[cpu.index()].acks.load(Ordering::SeqCst)
    }

    /// Current local-timer mask state of `cpu`.
    pub fn timer_masked(&self, cpu: CpuId) -> bool {
        self.cpus[cpu.index()].timer_masked.load(Ordering::SeqCst)
    }
}

impl Platform for SimPlatform {
    fn cpu_id(&self) -> CpuId {
        current_cpu()
    }

    fn cpu_count(&self) -> usize {
        self.cpu_count
    }

    fn interrupts_enabled(&self) -> bool {
        self.cpu().irq_enabled.load(Ordering::SeqCst)
    }

    fn disable_interrupts(&self) -> bool {
        self.cpu().irq_enabled.swap(false, Ordering::SeqCst)
    }

    fn restore_interrupts(&self, was_enabled: bool) {
        self.cpu().irq_enabled.store(was_enabled, Ordering::SeqCst);
    }

    fn enable_interrupts(&self) {
        self.cpu().irq_enabled.store(true, Ordering::SeqCst);
    }

    fn ack_interrupt(&self) {
        self.cpu().acks.fetch_add(1, Ordering::SeqCst);
    }

    fn send_ipi(&self, target: CpuId, vector: u8) {
        self.ipis.lock().push((target, vector));
    }

    fn wait_for_interrupt(&self) {
        let cpu = self.cpu();
        cpu.irq_enabled.store(true, Ordering::SeqCst);
        cpu.halts.fetch_add(1, Ordering::SeqCst);
        if cpu.timer_masked.load(Ordering::SeqCst) {
            cpu.masked_halts.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn mask_local_timer(&self, masked: bool) {
        self.cpu().timer_masked.store(masked, Ordering::SeqCst);
    }

    unsafe fn prepare_context(
        &self,
        _context: *mut Context,
        stack_top: usize,
        _entry: extern "C" fn(usize) -> !,
        arg: usize,
    ) {
        self.context_events
            .lock()
            .push(CtxEvent::Prepare { stack_top, arg });
    }

    unsafe fn switch_context(&self, _from: *mut Context, _to: *mut Context) {
        self.context_events
            .lock()
            .push(CtxEvent::Switch { cpu: current_cpu() });
    }

    unsafe fn launch_context(&self, _to: *mut Context) {
        self.context_events
            .lock()
            .push(CtxEvent::Launch { cpu: current_cpu() });
    }
}
