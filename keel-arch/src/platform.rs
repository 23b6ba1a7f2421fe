//! The hardware contract.
//!
//! Everything the concurrency core needs from the machine is collected in
//! one trait: CPU identity and count from topology discovery, interrupt
//! masking and acknowledgement, IPI delivery, the halt instruction, local
//! timer gating, and the three trampoline operations over [`Context`].
//!
//! A real port implements this over its interrupt controller and a few
//! lines of assembly; the host simulator in `keel-pal` implements it by
//! recording. The core holds a `&'static dyn Platform` and never assumes
//! more than what is written here.

use crate::context::Context;
use crate::cpu::CpuId;

/// Hardware services required by the kernel core.
///
/// All methods are called from kernel context. Implementations must be
/// callable from any CPU; the "current CPU" methods apply to the CPU the
/// caller is running on.
pub trait Platform: Send + Sync {
    /// Identifier of the CPU executing the caller.
    fn cpu_id(&self) -> CpuId;

    /// Number of CPUs brought up by the boot collaborator.
    ///
    /// Constant after boot, at most [`CPU_MAX`](crate::cpu::CPU_MAX).
    fn cpu_count(&self) -> usize;

    /// Whether interrupts are currently enabled on this CPU.
    fn interrupts_enabled(&self) -> bool;

    /// Disable interrupts on this CPU.
    ///
    /// # Returns
    ///
    /// Whether interrupts were enabled before, for a later
    /// [`restore_interrupts`](Platform::restore_interrupts).
    fn disable_interrupts(&self) -> bool;

    /// Restore the interrupt state saved by
    /// [`disable_interrupts`](Platform::disable_interrupts).
    fn restore_interrupts(&self, was_enabled: bool);

    /// Enable interrupts on this CPU unconditionally.
    fn enable_interrupts(&self);

    /// Signal end-of-interrupt for the interrupt currently being handled
    /// on this CPU, so further interrupts can be delivered.
    fn ack_interrupt(&self);

    /// Deliver an inter-processor interrupt carrying `vector` to `target`.
    fn send_ipi(&self, target: CpuId, vector: u8);

    /// Enable interrupts and halt this CPU until the next interrupt.
    ///
    /// An interrupt already pending while interrupts were masked wakes the
    /// CPU immediately; this closes the lost-wakeup window in the idle
    /// loop's check-then-halt sequence.
    fn wait_for_interrupt(&self);

    /// Mask or unmask this CPU's local periodic timer interrupt.
    fn mask_local_timer(&self, masked: bool);

    /// Prepare `context` so that the first switch or launch into it enters
    /// `entry(arg)` on the stack ending at `stack_top`.
    ///
    /// # Safety
    ///
    /// `context` must be valid for writes. `stack_top` must be the upper
    /// end of a writable stack region owned by the caller for the lifetime
    /// of the coroutine. `entry` never returns.
    unsafe fn prepare_context(
        &self,
        context: *mut Context,
        stack_top: usize,
        entry: extern "C" fn(usize) -> !,
        arg: usize,
    );

    /// Save the caller's execution state into `from` and resume `to`.
    ///
    /// Returns when some later switch resumes `from`.
    ///
    /// # Safety
    ///
    /// Both pointers must be valid; `to` must hold a prepared or
    /// previously saved context whose stack is still alive. The caller is
    /// responsible for the lock protocol across the switch.
    unsafe fn switch_context(&self, from: *mut Context, to: *mut Context);

    /// Discard the caller's execution state and resume `to`.
    ///
    /// On hardware this never returns; the simulator records the launch
    /// and returns so tests can observe the state machine.
    ///
    /// # Safety
    ///
    /// Same requirements as [`switch_context`](Platform::switch_context)
    /// for `to`. The caller's stack must not be reused while anything
    /// still references it.
    unsafe fn launch_context(&self, to: *mut Context);
}
