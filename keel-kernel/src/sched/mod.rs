//! Thread scheduling.
//!
//! One global FIFO ready queue feeds every CPU. A thread runs until it
//! yields through [`Kernel::resume`], blocks, or exits; preemption is the
//! periodic tick gate calling `resume` from its epilogue. All operations
//! here run inside the big-lock critical section, so they are written as
//! plain single-threaded state transitions.
//!
//! # Sections
//!
//! - [`thread`]: the thread arena entries and the first-activation
//!   trampoline.
//! - [`idle`]: the per-CPU idle threads and their halt policy.
//! - [`assassin`]: the cross-CPU kill gate.
//! - [`wakeup`]: the empty gate behind wake-up IPIs.
//!
//! A dying thread (kill flag set while running) is retired at its next
//! pass through a dispatch point; the switch out of its reclaimed slot
//! goes through a per-CPU scratch context that is never resumed.

pub mod assassin;
pub mod idle;
pub mod thread;
pub mod wakeup;

use core::array;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use alloc::boxed::Box;
use alloc::collections::VecDeque;

use keel_arch::{Context, CpuId, CPU_MAX};

use crate::error::Error;
use crate::irq::vector;
use crate::sync::room::RoomId;
use crate::system::Kernel;

use self::thread::{KickoffEnv, ThreadId, ThreadState};

/// Ready queue and per-CPU dispatch slots.
pub(crate) struct Sched {
    pub(crate) ready: VecDeque<ThreadId>,
    pub(crate) active: [Option<ThreadId>; CPU_MAX],
    pub(crate) idle: [Option<ThreadId>; CPU_MAX],
    /// Landing pads for switches out of a reclaimed thread.
    scratch: [Context; CPU_MAX],
}

impl Sched {
    pub(crate) fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            active: [None; CPU_MAX],
            idle: [None; CPU_MAX],
            scratch: array::from_fn(|_| Context::zeroed()),
        }
    }
}

/// Scheduler facts readable outside the critical section.
///
/// The idle loop decides whether to halt, and wake-up kicks pick a
/// target, without holding the big lock. These atomics shadow the
/// authoritative state inside [`Kernel`] and are refreshed on every
/// mutation; readers tolerate staleness because a pending interrupt
/// still gets them out of a stale halt.
pub struct SchedHints {
    ready: AtomicUsize,
    bells: AtomicUsize,
    halted: [AtomicBool; CPU_MAX],
}

impl SchedHints {
    pub(crate) fn new() -> Self {
        Self {
            ready: AtomicUsize::new(0),
            bells: AtomicUsize::new(0),
            halted: array::from_fn(|_| AtomicBool::new(false)),
        }
    }

    /// Number of threads in the ready queue.
    pub fn ready_threads(&self) -> usize {
        self.ready.load(Ordering::Acquire)
    }

    /// Number of bells pending on the bellringer's list.
    pub fn pending_bells(&self) -> usize {
        self.bells.load(Ordering::Acquire)
    }

    /// Whether the given CPU is parked in `wait_for_interrupt`.
    pub fn is_halted(&self, cpu: CpuId) -> bool {
        self.halted[cpu.index()].load(Ordering::Acquire)
    }

    pub(crate) fn set_ready(&self, n: usize) {
        self.ready.store(n, Ordering::Release);
    }

    pub(crate) fn set_bells(&self, n: usize) {
        self.bells.store(n, Ordering::Release);
    }

    pub(crate) fn set_halted(&self, cpu: CpuId, halted: bool) {
        self.halted[cpu.index()].store(halted, Ordering::Release);
    }
}

impl Kernel {
    /// Admit a thread to the ready queue.
    ///
    /// New threads start their life here; a blocked thread is pulled out
    /// of its waiting room first. Admitting a thread that is already
    /// ready or running is refused.
    pub fn ready(&mut self, t: ThreadId) -> Result<(), Error> {
        let state = self.threads.get(t.0).ok_or(Error::UnknownThread)?.state;
        match state {
            ThreadState::New => {}
            ThreadState::Blocked(room) => self.room_mut(room).remove(t),
            ThreadState::Ready | ThreadState::Running(_) => {
                return Err(Error::InvalidState);
            }
        }
        self.admit(t);
        Ok(())
    }

    /// First dispatch on the calling CPU.
    ///
    /// Launches the queue head, or this CPU's idle thread when the queue
    /// is empty. Must run inside the critical section; the launched
    /// thread inherits the big lock and releases it itself. On hardware
    /// this never returns.
    pub fn schedule(&mut self) {
        let cpu = self.platform.cpu_id();
        if self.sched.active[cpu.index()].is_some() {
            log::error!("schedule on {} but a thread is already active", cpu);
            panic!("schedule on an occupied cpu");
        }
        let next = self.next_or_idle(cpu);
        self.mark_running(next, cpu);
        log::debug!("{}: launching {:?}", cpu, next);
        let context: *mut Context = &mut self.thread_mut(next).context;
        // SAFETY: the context was prepared by `create_thread` and its
        // arena slot stays pinned while the thread exists.
        unsafe { self.platform.launch_context(context) };
    }

    /// Yield the calling thread.
    ///
    /// A dying caller is retired instead. Otherwise the caller rotates to
    /// the queue tail and the head runs; an idle caller is parked off the
    /// queue. With an empty queue this is a no-op and the caller carries
    /// on.
    pub fn resume(&mut self) {
        let cpu = self.platform.cpu_id();
        let Some(current) = self.sched.active[cpu.index()] else {
            log::error!("resume on {} with no active thread", cpu);
            panic!("resume with no active thread");
        };

        if self.thread(current).kill {
            self.finish_kill(current, cpu);
            return;
        }

        let Some(next) = self.sched.ready.pop_front() else {
            return;
        };
        if self.sched.idle[cpu.index()] == Some(current) {
            // Idle threads never enter the queue; they wait off to the side.
            self.thread_mut(current).state = ThreadState::New;
        } else {
            self.thread_mut(current).state = ThreadState::Ready;
            self.sched.ready.push_back(current);
        }
        self.sync_ready_hint();
        self.mark_running(next, cpu);
        self.switch(current, next);
    }

    /// Terminate the calling thread and dispatch the next one.
    pub fn exit(&mut self) {
        let cpu = self.platform.cpu_id();
        let Some(current) = self.sched.active[cpu.index()] else {
            log::error!("exit on {} with no active thread", cpu);
            panic!("exit with no active thread");
        };
        if self.sched.idle[cpu.index()] == Some(current) {
            log::error!("{}: the idle thread tried to exit", cpu);
            panic!("idle thread exit");
        }
        log::debug!("{}: exit of {:?}", cpu, current);
        self.sched.active[cpu.index()] = None;
        self.reclaim(current);
        self.depart(cpu);
    }

    /// Condemn a thread.
    ///
    /// A thread running elsewhere is flagged and its CPU told to retire
    /// it; one running here dies at its next dispatch point. Threads not
    /// running are removed and reclaimed on the spot. Killing a thread
    /// twice is a benign race; killing an idle thread is refused.
    pub fn kill(&mut self, t: ThreadId) -> Result<(), Error> {
        if !self.threads.contains(t.0) {
            return Err(Error::UnknownThread);
        }
        if self.sched.idle.iter().any(|slot| *slot == Some(t)) {
            return Err(Error::InvalidState);
        }
        let state = self.thread(t).state;
        match state {
            ThreadState::Running(cpu) => {
                let thread = self.thread_mut(t);
                if thread.kill {
                    return Ok(());
                }
                thread.kill = true;
                if cpu == self.platform.cpu_id() {
                    log::debug!("{:?} condemned on its own cpu", t);
                } else {
                    log::debug!("{:?} condemned, alerting {}", t, cpu);
                    self.platform.send_ipi(cpu, vector::ASSASSIN);
                }
            }
            ThreadState::Ready => {
                self.sched.ready.retain(|queued| *queued != t);
                self.sync_ready_hint();
                self.reclaim(t);
            }
            ThreadState::Blocked(room) => {
                self.room_mut(room).remove(t);
                self.reclaim(t);
            }
            ThreadState::New => self.reclaim(t),
        }
        Ok(())
    }

    /// Wake a blocked thread. Waking one that is not blocked is a benign
    /// race and changes nothing.
    pub fn wakeup(&mut self, t: ThreadId) -> Result<(), Error> {
        let state = self.threads.get(t.0).ok_or(Error::UnknownThread)?.state;
        if let ThreadState::Blocked(room) = state {
            self.room_mut(room).remove(t);
            self.admit(t);
        }
        Ok(())
    }

    /// True when the ready queue holds no thread.
    pub fn is_empty(&self) -> bool {
        self.sched.ready.is_empty()
    }

    /// The thread active on the given CPU, if dispatch has started there.
    pub fn active(&self, cpu: CpuId) -> Option<ThreadId> {
        self.sched.active[cpu.index()]
    }

    /// The thread the calling CPU is running right now.
    pub(crate) fn current(&self) -> ThreadId {
        let cpu = self.platform.cpu_id();
        match self.sched.active[cpu.index()] {
            Some(current) => current,
            None => {
                log::error!("{} asked for its thread before dispatch", cpu);
                panic!("no active thread");
            }
        }
    }

    /// A thread's current state; reclaimed handles report `UnknownThread`.
    pub fn thread_state(&self, t: ThreadId) -> Result<ThreadState, Error> {
        Ok(self.threads.get(t.0).ok_or(Error::UnknownThread)?.state)
    }

    /// Park the calling thread in a waiting room and dispatch the next.
    ///
    /// The caller must already be queued nowhere else. Nothing may run in
    /// the caller after the switch: continuation state belongs to whoever
    /// wakes it.
    pub(crate) fn block(&mut self, room: RoomId) {
        let cpu = self.platform.cpu_id();
        let Some(current) = self.sched.active[cpu.index()] else {
            log::error!("block on {} with no active thread", cpu);
            panic!("block with no active thread");
        };
        if self.sched.idle[cpu.index()] == Some(current) {
            log::error!("{}: the idle thread tried to block", cpu);
            panic!("idle thread blocked");
        }
        if self.thread(current).kill {
            // Condemned threads die at the dispatch point instead of parking.
            self.finish_kill(current, cpu);
            return;
        }

        self.thread_mut(current).state = ThreadState::Blocked(room);
        self.room_mut(room).enqueue(current);
        self.sched.active[cpu.index()] = None;

        let next = self.next_or_idle(cpu);
        self.mark_running(next, cpu);
        self.switch(current, next);
    }

    /// Retire the running thread if it has been condemned.
    pub(crate) fn exit_if_killed(&mut self) {
        let cpu = self.platform.cpu_id();
        let Some(current) = self.sched.active[cpu.index()] else {
            return;
        };
        if self.thread(current).kill {
            self.finish_kill(current, cpu);
        }
    }

    /// Put a thread on the queue tail and nudge a halted CPU.
    pub(crate) fn admit(&mut self, t: ThreadId) {
        self.thread_mut(t).state = ThreadState::Ready;
        self.sched.ready.push_back(t);
        self.sync_ready_hint();
        self.kick_halted();
    }

    fn sync_ready_hint(&self) {
        self.hints.set_ready(self.sched.ready.len());
    }

    /// Wake one CPU parked in `wait_for_interrupt`, if any.
    fn kick_halted(&mut self) {
        let here = self.platform.cpu_id();
        for index in 0..self.platform.cpu_count() {
            let Some(cpu) = CpuId::from_index(index) else {
                break;
            };
            if cpu != here && self.hints.is_halted(cpu) {
                self.platform.send_ipi(cpu, vector::WAKEUP);
                break;
            }
        }
    }

    /// Pop the queue head, falling back to this CPU's idle thread.
    fn next_or_idle(&mut self, cpu: CpuId) -> ThreadId {
        if let Some(next) = self.sched.ready.pop_front() {
            self.sync_ready_hint();
            return next;
        }
        match self.sched.idle[cpu.index()] {
            Some(idle) => idle,
            None => {
                log::error!("{} has no idle thread to fall back on", cpu);
                panic!("no idle thread");
            }
        }
    }

    fn mark_running(&mut self, t: ThreadId, cpu: CpuId) {
        self.sched.active[cpu.index()] = Some(t);
        self.thread_mut(t).state = ThreadState::Running(cpu);
    }

    /// Retire a condemned running thread and dispatch off its corpse.
    fn finish_kill(&mut self, current: ThreadId, cpu: CpuId) {
        log::debug!("{}: retiring condemned {:?}", cpu, current);
        self.sched.active[cpu.index()] = None;
        self.reclaim(current);
        self.depart(cpu);
    }

    /// Dispatch after the current thread's slot is gone, switching out
    /// through this CPU's scratch context.
    fn depart(&mut self, cpu: CpuId) {
        let next = self.next_or_idle(cpu);
        self.mark_running(next, cpu);
        let scratch: *mut Context = &mut self.sched.scratch[cpu.index()];
        let to: *mut Context = &mut self.thread_mut(next).context;
        // SAFETY: both pointers are pinned kernel storage; the scratch
        // save records a continuation that is never resumed.
        unsafe { self.platform.switch_context(scratch, to) };
    }

    /// Switch register state between two live arena threads.
    fn switch(&mut self, from: ThreadId, to: ThreadId) {
        let from_ctx: *mut Context = &mut self.thread_mut(from).context;
        let to_ctx: *mut Context = &mut self.thread_mut(to).context;
        // SAFETY: `from` and `to` are distinct live arena slots, and the
        // big lock travels with the switch to be released on the far side.
        unsafe { self.platform.switch_context(from_ctx, to_ctx) };
    }

    /// Return a thread's resources: held mutexes pass to their waiters,
    /// an unconsumed kickoff environment is freed, the arena slot opens.
    fn reclaim(&mut self, t: ThreadId) {
        self.release_all(t);
        let Some(thread) = self.threads.remove(t.0) else {
            return;
        };
        if thread.action.is_some() && thread.kickoff_arg != 0 {
            // SAFETY: kickoff never ran, so this is the environment's
            // sole remaining owner.
            unsafe { drop(Box::from_raw(thread.kickoff_arg as *mut KickoffEnv)) };
        }
        log::debug!("{:?} reclaimed", t);
    }
}
