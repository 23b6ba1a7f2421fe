//! Kernel threads.
//!
//! A thread is a saved register [`Context`], a caller-owned stack, and
//! lifecycle bookkeeping: its scheduler state, kill flag, held mutexes
//! and the action it runs on first activation. Threads live in the
//! kernel's arena and are referred to by [`ThreadId`] everywhere; the
//! kernel never frees a thread's stack.

use alloc::boxed::Box;
use alloc::vec::Vec;

use keel_arch::{Context, CpuId};

use crate::sync::mutex::MutexId;
use crate::sync::room::RoomId;
use crate::system::{Kernel, System};

/// Stable handle of one thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ThreadId(pub(crate) u32);

/// Scheduler state of one thread.
///
/// "Dying" from the abstract machine is the kill flag set while
/// `Running`; threads reclaimed in any other state disappear at once.
/// Idle threads are `New` whenever they are substituted off their CPU,
/// since they never enter the ready queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadState {
    /// Created (or parked idle thread), not yet admitted anywhere.
    New,
    /// In the ready queue.
    Ready,
    /// Active on the given CPU.
    Running(CpuId),
    /// In the given waiting room.
    Blocked(RoomId),
}

/// What a thread runs on its first activation.
pub(crate) type Action = Box<dyn FnOnce() + Send>;

pub(crate) struct Thread {
    pub(crate) context: Context,
    pub(crate) stack_top: usize,
    pub(crate) state: ThreadState,
    pub(crate) kill: bool,
    pub(crate) held: Vec<MutexId>,
    pub(crate) action: Option<Action>,
    /// Raw kickoff environment pointer, reclaimed if the thread dies
    /// before its first activation consumes it.
    pub(crate) kickoff_arg: usize,
}

impl Thread {
    fn new(stack_top: usize, action: Action) -> Self {
        Self {
            context: Context::zeroed(),
            stack_top,
            state: ThreadState::New,
            kill: false,
            held: Vec::new(),
            action: Some(action),
            kickoff_arg: 0,
        }
    }
}

/// What the first activation of a thread needs to find its way.
pub(crate) struct KickoffEnv {
    pub(crate) system: &'static System,
    pub(crate) thread: ThreadId,
}

/// Landing pad for a thread's very first activation.
///
/// The switch that lands here was performed inside the critical section,
/// so the big kernel lock is held on arrival: take the action, release
/// the section, run. An action that returns has nowhere valid to return
/// to, which is kernel corruption.
pub(crate) extern "C" fn kickoff(arg: usize) -> ! {
    // SAFETY: `arg` was produced by `Box::into_raw` in `create_thread`
    // and this landing pad is its only consumer.
    let env = unsafe { Box::from_raw(arg as *mut KickoffEnv) };
    let KickoffEnv { system, thread } = *env;

    let action = {
        // SAFETY: the big lock travelled with the switch into this thread.
        let kernel = unsafe { system.guard().kernel_mut() };
        kernel.note_first_activation(thread)
    };
    system.guard().leave();

    if let Some(action) = action {
        action();
    }

    log::error!("thread {:?} action returned", thread);
    panic!("thread action returned");
}

impl Kernel {
    /// Allocate a thread and prepare its first activation.
    ///
    /// The stack ending at `stack_top` is owned by the caller and must
    /// outlive the thread. The new thread is not yet admitted; pass it to
    /// `ready` when it should run.
    pub(crate) fn create_thread(
        &mut self,
        system: &'static System,
        stack_top: usize,
        action: Action,
    ) -> ThreadId {
        let id = ThreadId(self.threads.insert(Thread::new(stack_top, action)));

        let env = Box::new(KickoffEnv { system, thread: id });
        let arg = Box::into_raw(env) as usize;

        let thread = self
            .threads
            .get_mut(id.0)
            .expect("freshly inserted thread vanished");
        thread.kickoff_arg = arg;
        let context: *mut Context = &mut thread.context;
        // SAFETY: the context is freshly allocated and the stack contract
        // is passed through to our own caller.
        unsafe {
            self.platform.prepare_context(context, stack_top, kickoff, arg);
        }

        log::debug!("thread {:?} created, stack top {:#x}", id, stack_top);
        id
    }

    /// Take the action and mark the kickoff environment as consumed.
    pub(crate) fn note_first_activation(&mut self, t: ThreadId) -> Option<Action> {
        let thread = self.threads.get_mut(t.0)?;
        thread.kickoff_arg = 0;
        thread.action.take()
    }

    pub(crate) fn thread(&self, t: ThreadId) -> &Thread {
        self.threads.get(t.0).expect("stale thread handle")
    }

    pub(crate) fn thread_mut(&mut self, t: ThreadId) -> &mut Thread {
        self.threads.get_mut(t.0).expect("stale thread handle")
    }
}
