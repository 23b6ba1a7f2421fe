//! Process-wide assembly.
//!
//! [`Kernel`] is every piece of state the big lock protects, in one
//! struct: the thread arena, the scheduler queues, waiting rooms,
//! semaphores, mutexes, bells and the bellringer. The operations on it
//! live with their subsystems; this module only defines the struct and
//! wires it into a [`System`] together with the plugbox and the guard.
//!
//! [`System`] is what boot code and applications hold. Its entry points
//! open a [`Secure`] section, call the matching [`Kernel`] operation and
//! close the section again, so callers never see the lock.

use alloc::boxed::Box;
use alloc::sync::Arc;

use spin::Once;

use keel_arch::{Platform, CPU_MAX};

use crate::error::Error;
use crate::irq::guard::{Guard, Secure};
use crate::irq::plugbox::Plugbox;
use crate::irq::vector;
use crate::obj::Slab;
use crate::sched::idle::idle_loop;
use crate::sched::thread::{Thread, ThreadId};
use crate::sched::{assassin, wakeup, Sched, SchedHints};
use crate::sync::mutex::{Mutex, MutexId};
use crate::sync::room::Waitingroom;
use crate::sync::semaphore::{Semaphore, SemaphoreId};
use crate::time::bell::{Bell, BellId};
use crate::time::bellringer::Bellringer;
use crate::time::tick;

/// Everything the big kernel lock protects.
///
/// All fields are arenas or queues of plain state; operations are
/// implemented by the subsystem modules as `impl Kernel` blocks. Code
/// holding a `&mut Kernel` is inside the critical section by
/// construction.
pub struct Kernel {
    pub(crate) platform: &'static dyn Platform,
    pub(crate) hints: Arc<SchedHints>,
    pub(crate) sched: Sched,
    pub(crate) threads: Slab<Thread>,
    pub(crate) rooms: Slab<Waitingroom>,
    pub(crate) semaphores: Slab<Semaphore>,
    pub(crate) mutexes: Slab<Mutex>,
    pub(crate) bells: Slab<Bell>,
    pub(crate) ringer: Bellringer,
}

impl Kernel {
    fn new(platform: &'static dyn Platform, hints: Arc<SchedHints>) -> Self {
        Self {
            platform,
            hints,
            sched: Sched::new(),
            threads: Slab::new(),
            rooms: Slab::new(),
            semaphores: Slab::new(),
            mutexes: Slab::new(),
            bells: Slab::new(),
            ringer: Bellringer::new(),
        }
    }
}

/// The concurrency core of one machine.
pub struct System {
    platform: &'static dyn Platform,
    plugbox: Plugbox,
    hints: Arc<SchedHints>,
    guard: Guard,
}

impl System {
    /// Build a system for the given platform.
    ///
    /// Fails if the platform reports a CPU count outside `1..=CPU_MAX`;
    /// per-CPU state is statically sized. The tick, assassin and wake-up
    /// gates are registered here, before any interrupt can be delivered.
    pub fn new(platform: &'static dyn Platform) -> Result<Self, Error> {
        let count = platform.cpu_count();
        if count < 1 || count > CPU_MAX {
            log::error!("platform reports {} cpus, supported are 1..={}", count, CPU_MAX);
            return Err(Error::CpuCountOutOfRange);
        }

        let hints = Arc::new(SchedHints::new());
        let kernel = Kernel::new(platform, Arc::clone(&hints));
        let system = Self {
            platform,
            plugbox: Plugbox::new(),
            hints,
            guard: Guard::new(platform, kernel),
        };
        system.plugbox.assign(vector::TIMER, &tick::TICK);
        system.plugbox.assign(vector::ASSASSIN, &assassin::ASSASSIN);
        system.plugbox.assign(vector::WAKEUP, &wakeup::WAKEUP);

        log::info!("kernel core initialised for {} cpus", count);
        Ok(system)
    }

    pub fn platform(&self) -> &'static dyn Platform {
        self.platform
    }

    pub fn plugbox(&self) -> &Plugbox {
        &self.plugbox
    }

    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    /// Scheduler facts readable without entering the critical section.
    pub fn hints(&self) -> &SchedHints {
        &self.hints
    }

    /// Allocate a thread that will run `action` once admitted and
    /// dispatched. The stack ending at `stack_top` belongs to the caller
    /// and must outlive the thread.
    pub fn create_thread(
        &'static self,
        stack_top: usize,
        action: impl FnOnce() + Send + 'static,
    ) -> ThreadId {
        let mut secure = Secure::new(self);
        secure.kernel().create_thread(self, stack_top, Box::new(action))
    }

    /// Register this CPU's idle thread. Must run once per CPU before
    /// [`System::start_cpu`].
    pub fn init_cpu(&'static self, idle_stack_top: usize) -> Result<(), Error> {
        let cpu = self.platform.cpu_id();
        let mut secure = Secure::new(self);
        let kernel = secure.kernel();
        if kernel.has_idle(cpu) {
            return Err(Error::AlreadyStarted);
        }
        let idle = kernel.create_thread(self, idle_stack_top, Box::new(move || idle_loop(self)));
        kernel.set_idle(cpu, idle);
        log::debug!("{}: idle thread {:?} registered", cpu, idle);
        Ok(())
    }

    /// Begin dispatch on the calling CPU.
    ///
    /// Call once per CPU, with interrupts still masked and the local
    /// interrupt controller programmed; the first dispatched thread
    /// enables interrupts when it releases the critical section. Never
    /// returns on hardware.
    pub fn start_cpu(&'static self, idle_stack_top: usize) -> Result<(), Error> {
        self.init_cpu(idle_stack_top)?;
        let mut secure = Secure::new(self);
        secure.kernel().schedule();
        Ok(())
    }

    /// Admit a thread to the ready queue.
    pub fn ready(&self, t: ThreadId) -> Result<(), Error> {
        let mut secure = Secure::new(self);
        secure.kernel().ready(t)
    }

    /// Yield the calling thread.
    pub fn resume(&self) {
        let mut secure = Secure::new(self);
        secure.kernel().resume();
    }

    /// Terminate the calling thread. Never returns on hardware.
    pub fn exit(&self) {
        let mut secure = Secure::new(self);
        secure.kernel().exit();
    }

    /// Condemn a thread.
    pub fn kill(&self, t: ThreadId) -> Result<(), Error> {
        let mut secure = Secure::new(self);
        secure.kernel().kill(t)
    }

    /// Wake a blocked thread.
    pub fn wakeup(&self, t: ThreadId) -> Result<(), Error> {
        let mut secure = Secure::new(self);
        secure.kernel().wakeup(t)
    }

    pub fn create_semaphore(&self, counter: usize) -> SemaphoreId {
        let mut secure = Secure::new(self);
        secure.kernel().create_semaphore(counter)
    }

    pub fn destroy_semaphore(&self, s: SemaphoreId) -> Result<(), Error> {
        let mut secure = Secure::new(self);
        secure.kernel().destroy_semaphore(s)
    }

    /// Take one unit of a semaphore, blocking while none is available.
    pub fn p(&self, s: SemaphoreId) -> Result<(), Error> {
        let mut secure = Secure::new(self);
        secure.kernel().p(s)
    }

    /// Release one unit of a semaphore.
    pub fn v(&self, s: SemaphoreId) -> Result<(), Error> {
        let mut secure = Secure::new(self);
        secure.kernel().v(s)
    }

    pub fn create_mutex(&self) -> MutexId {
        let mut secure = Secure::new(self);
        secure.kernel().create_mutex()
    }

    pub fn destroy_mutex(&self, m: MutexId) -> Result<(), Error> {
        let mut secure = Secure::new(self);
        secure.kernel().destroy_mutex(m)
    }

    /// Acquire a mutex, blocking while another thread owns it.
    pub fn lock_mutex(&self, m: MutexId) -> Result<(), Error> {
        let mut secure = Secure::new(self);
        secure.kernel().lock_mutex(m)
    }

    /// Release a mutex owned by the calling thread.
    pub fn unlock_mutex(&self, m: MutexId) -> Result<(), Error> {
        let mut secure = Secure::new(self);
        secure.kernel().unlock_mutex(m)
    }

    /// Park the calling thread for at least `ms` milliseconds.
    pub fn sleep(&self, ms: usize) {
        let mut secure = Secure::new(self);
        secure.kernel().sleep(ms);
    }

    pub fn create_bell(&self) -> BellId {
        let mut secure = Secure::new(self);
        secure.kernel().create_bell()
    }

    pub fn destroy_bell(&self, b: BellId) -> Result<(), Error> {
        let mut secure = Secure::new(self);
        secure.kernel().destroy_bell(b)
    }

    /// Arm a bell to ring in `ms` milliseconds.
    pub fn bell_job(&self, b: BellId, ms: usize) -> Result<(), Error> {
        let mut secure = Secure::new(self);
        secure.kernel().bell_job(b, ms)
    }

    /// Take a pending bell off the ringer's list before it rings.
    pub fn cancel_bell(&self, b: BellId) -> Result<(), Error> {
        let mut secure = Secure::new(self);
        secure.kernel().cancel_bell(b)
    }
}

static SYSTEM: Once<System> = Once::new();

/// Build the process-wide system and publish it for [`system`].
///
/// The first call wins; later calls report `AlreadyInstalled`.
pub fn install(platform: &'static dyn Platform) -> Result<&'static System, Error> {
    if SYSTEM.get().is_some() {
        return Err(Error::AlreadyInstalled);
    }
    let system = System::new(platform)?;
    Ok(SYSTEM.call_once(|| system))
}

/// The installed system.
///
/// # Panics
///
/// If called before [`install`].
pub fn system() -> &'static System {
    SYSTEM.get().expect("kernel core not installed")
}

#[cfg(test)]
mod tests {
    use keel_arch::{Context, CpuId};
    use keel_pal::SimPlatform;

    use super::*;
    use crate::irq::guardian;
    use crate::sched::thread::ThreadState;
    use crate::testutil;

    fn tick(system: &System) {
        system.platform().disable_interrupts();
        guardian(system, vector::TIMER);
    }

    #[test]
    fn test_install_publishes_once() {
        let sim: &'static SimPlatform = Box::leak(Box::new(SimPlatform::new(1)));
        let system = install(sim).unwrap();
        assert!(core::ptr::eq(system, super::system()));
        assert!(matches!(install(sim), Err(Error::AlreadyInstalled)));
    }

    struct BadCount(usize);

    impl Platform for BadCount {
        fn cpu_id(&self) -> CpuId {
            CpuId::BOOT
        }
        fn cpu_count(&self) -> usize {
            self.0
        }
        fn interrupts_enabled(&self) -> bool {
            true
        }
        fn disable_interrupts(&self) -> bool {
            true
        }
        fn restore_interrupts(&self, _was_enabled: bool) {}
        fn enable_interrupts(&self) {}
        fn ack_interrupt(&self) {}
        fn send_ipi(&self, _target: CpuId, _vector: u8) {}
        fn wait_for_interrupt(&self) {}
        fn mask_local_timer(&self, _masked: bool) {}
        unsafe fn prepare_context(
            &self,
            _context: *mut Context,
            _stack_top: usize,
            _entry: extern "C" fn(usize) -> !,
            _arg: usize,
        ) {
        }
        unsafe fn switch_context(&self, _from: *mut Context, _to: *mut Context) {}
        unsafe fn launch_context(&self, _to: *mut Context) {}
    }

    #[test]
    fn test_new_rejects_cpu_count_out_of_range() {
        static NONE: BadCount = BadCount(0);
        static TOO_MANY: BadCount = BadCount(CPU_MAX + 1);
        assert!(matches!(
            System::new(&NONE),
            Err(Error::CpuCountOutOfRange)
        ));
        assert!(matches!(
            System::new(&TOO_MANY),
            Err(Error::CpuCountOutOfRange)
        ));
    }

    #[test]
    fn test_init_cpu_twice_is_refused() {
        let (system, _sim) = testutil::fresh_system(1);
        system.init_cpu(testutil::STACK).unwrap();
        assert_eq!(system.init_cpu(testutil::STACK), Err(Error::AlreadyStarted));
    }

    #[test]
    fn test_created_thread_starts_new() {
        let (system, _sim) = testutil::fresh_system(1);
        let t = testutil::spawn(system);
        let mut secure = Secure::new(system);
        assert_eq!(secure.kernel().thread_state(t), Ok(ThreadState::New));
    }

    #[test]
    fn test_yield_exit_scenario() {
        let (system, _sim) = testutil::fresh_system(1);
        let t1 = testutil::spawn(system);
        let t2 = testutil::spawn(system);

        let mut secure = Secure::new(system);
        let kernel = secure.kernel();
        kernel.ready(t1).unwrap();
        kernel.ready(t2).unwrap();

        kernel.schedule();
        assert_eq!(kernel.active(CpuId::BOOT), Some(t1));

        kernel.resume();
        assert_eq!(kernel.active(CpuId::BOOT), Some(t2));

        kernel.exit();
        assert_eq!(kernel.active(CpuId::BOOT), Some(t1));
        assert!(kernel.is_empty());
    }

    /// Boot one CPU, let the worker sleep and drive the tick vector by
    /// hand: the bell must ring on the exact tick, and only once.
    #[test]
    fn test_sleep_round_trip_under_ticks() {
        let (system, _sim) = testutil::fresh_system(1);
        let worker = testutil::spawn(system);
        system.ready(worker).unwrap();

        system.start_cpu(testutil::STACK).unwrap();
        {
            let mut secure = Secure::new(system);
            assert_eq!(secure.kernel().active(CpuId::BOOT), Some(worker));
        }

        system.sleep(5);
        let idle = {
            let mut secure = Secure::new(system);
            secure.kernel().active(CpuId::BOOT)
        };
        assert_ne!(idle, Some(worker));

        for _ in 0..4 {
            tick(system);
            let mut secure = Secure::new(system);
            let kernel = secure.kernel();
            assert_eq!(kernel.active(CpuId::BOOT), idle);
            assert!(matches!(
                kernel.thread_state(worker),
                Ok(ThreadState::Blocked(_))
            ));
        }

        tick(system);
        {
            let mut secure = Secure::new(system);
            let kernel = secure.kernel();
            assert_eq!(kernel.active(CpuId::BOOT), Some(worker));
            assert!(kernel.is_empty());
        }

        // Later ticks find no bell and no contender; the worker keeps
        // the CPU and is never admitted a second time.
        for _ in 0..3 {
            tick(system);
            let mut secure = Secure::new(system);
            let kernel = secure.kernel();
            assert_eq!(kernel.active(CpuId::BOOT), Some(worker));
            assert!(kernel.is_empty());
        }
        assert_eq!(system.hints().pending_bells(), 0);
    }
}
