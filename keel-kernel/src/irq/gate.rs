//! The interrupt capability interface.
//!
//! A [`Gate`] is one interrupt source's kernel half. The prologue runs
//! immediately with this CPU's interrupts masked and decides whether
//! deferred work is needed; the epilogue runs later, interrupts enabled,
//! serialised under the big kernel lock, and may call anything in the
//! scheduler or synchronisation layers.
//!
//! Gates are process-wide singletons registered once in the plugbox. The
//! embedded [`GateLink`] carries the two flags that keep one gate from
//! appearing in a per-CPU epilogue queue more than once at a time.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::system::Kernel;

/// Shared reference to a registered gate.
pub type GateRef = &'static dyn Gate;

/// One interrupt source.
pub trait Gate: Send + Sync {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    /// First half, interrupts masked. Short and non-blocking.
    ///
    /// # Returns
    ///
    /// Whether the epilogue must run.
    fn prologue(&self) -> bool;

    /// Deferred half, interrupts enabled, big lock held. May block or
    /// switch threads.
    fn epilogue(&self, _kernel: &mut Kernel) {}

    /// The gate's queue membership flags.
    fn link(&self) -> &GateLink;
}

/// Queue membership state embedded in every gate.
///
/// `queued` is set while the gate sits in some CPU's epilogue queue; a
/// gate has one link, so insertion must be idempotent and a repeat relay
/// coalesces into the pending run. `dequeued` is held from the moment a
/// drainer pops the gate until that epilogue run completes. The two
/// overlap when a fresh interrupt re-queues the gate while its previous
/// epilogue is still unfinished; the queue entry then produces one more
/// run afterwards, so no interrupt's deferred work is lost.
pub struct GateLink {
    queued: AtomicBool,
    dequeued: AtomicBool,
}

impl GateLink {
    pub const fn new() -> Self {
        Self {
            queued: AtomicBool::new(false),
            dequeued: AtomicBool::new(false),
        }
    }

    /// Claim queue membership. False if the gate is already queued.
    pub(crate) fn try_enqueue(&self) -> bool {
        self.queued
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn clear_queued(&self) {
        self.queued.store(false, Ordering::Release);
    }

    pub(crate) fn is_queued(&self) -> bool {
        self.queued.load(Ordering::Acquire)
    }

    pub(crate) fn mark_dequeued(&self) {
        self.dequeued.store(true, Ordering::Release);
    }

    pub(crate) fn clear_dequeued(&self) {
        self.dequeued.store(false, Ordering::Release);
    }

    /// Whether a popped epilogue run of this gate is still unfinished.
    /// Epilogues may switch threads mid-run, so this can stay held well
    /// past the pop.
    pub fn is_dequeued(&self) -> bool {
        self.dequeued.load(Ordering::Acquire)
    }
}

impl Default for GateLink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_is_idempotent() {
        let link = GateLink::new();
        assert!(!link.is_queued());
        assert!(link.try_enqueue());
        assert!(!link.try_enqueue());
        link.clear_queued();
        assert!(link.try_enqueue());
    }

    #[test]
    fn test_flags_overlap_for_requeue_during_drain() {
        let link = GateLink::new();
        assert!(link.try_enqueue());

        // Drainer pops the gate and starts its epilogue.
        link.mark_dequeued();
        link.clear_queued();

        // A fresh interrupt re-queues it while the run is unfinished.
        assert!(link.try_enqueue());
        assert!(link.is_queued());
        assert!(link.is_dequeued());

        link.clear_dequeued();
        assert!(link.is_queued(), "the pending rerun survives");
    }
}
