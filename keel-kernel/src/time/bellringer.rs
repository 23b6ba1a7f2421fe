//! The bellringer's delta queue.
//!
//! Pending bells form a list ordered by expiry where every bell stores
//! only the tick delta to its predecessor; the head's delta is the time
//! to the next ring. One decrement per tick is all the bookkeeping the
//! common case needs, and arming or cancelling touches at most one
//! neighbour.

use alloc::collections::VecDeque;

use crate::error::Error;
use crate::system::Kernel;
use crate::time::bell::BellId;
use crate::time::TICK_MS;

pub(crate) struct Bellringer {
    list: VecDeque<BellId>,
}

impl Bellringer {
    pub(crate) fn new() -> Self {
        Self {
            list: VecDeque::new(),
        }
    }
}

impl Kernel {
    /// Arm a bell to ring in `ms` milliseconds.
    ///
    /// Re-arming a pending bell moves it to the new expiry.
    pub fn bell_job(&mut self, b: BellId, ms: usize) -> Result<(), Error> {
        if !self.bells.contains(b.0) {
            return Err(Error::UnknownBell);
        }
        self.arm(b, ms);
        Ok(())
    }

    /// Take a pending bell off the list before it rings. Cancelling a
    /// bell that is not pending changes nothing.
    pub fn cancel_bell(&mut self, b: BellId) -> Result<(), Error> {
        if !self.bells.contains(b.0) {
            return Err(Error::UnknownBell);
        }
        self.cancel_pending(b);
        Ok(())
    }

    /// Advance the delta queue by one tick and ring what is due.
    ///
    /// Runs in the tick owner's timer epilogue. Simultaneous expiries
    /// show up as zero deltas behind the head and ring in the same tick,
    /// in arming order.
    pub(crate) fn check_bells(&mut self) {
        let Some(&head) = self.ringer.list.front() else {
            return;
        };
        {
            let bell = self.bell_mut(head);
            if bell.delta > 0 {
                bell.delta -= 1;
            }
        }
        while let Some(&due) = self.ringer.list.front() {
            if self.bell(due).delta != 0 {
                break;
            }
            self.ringer.list.pop_front();
            self.sync_bells_hint();
            self.ring(due);
        }
    }

    pub(crate) fn arm(&mut self, b: BellId, ms: usize) {
        self.cancel_pending(b);

        // A fraction of a tick still waits a whole one; an expiry in the
        // past would otherwise never ring.
        let mut remaining = ms.div_ceil(TICK_MS).max(1);

        let mut index = self.ringer.list.len();
        for i in 0..self.ringer.list.len() {
            let queued = self.ringer.list[i];
            let queued_delta = self.bell(queued).delta;
            if remaining < queued_delta {
                index = i;
                break;
            }
            remaining -= queued_delta;
        }
        if let Some(&successor) = self.ringer.list.get(index) {
            self.bell_mut(successor).delta -= remaining;
        }
        self.bell_mut(b).delta = remaining;
        self.ringer.list.insert(index, b);
        self.sync_bells_hint();
        log::debug!("bell {:?} armed for {} ms", b, ms);
    }

    /// Wake everyone in the bell's room; a transient bell is freed by
    /// its ring.
    fn ring(&mut self, b: BellId) {
        let (room, transient) = {
            let bell = self.bell(b);
            (bell.room, bell.transient)
        };
        while let Some(sleeper) = self.room_mut(room).pop() {
            self.admit(sleeper);
        }
        log::trace!("bell {:?} rung", b);
        if transient {
            self.bells.remove(b.0);
            self.destroy_room(room);
        }
    }

    fn cancel_pending(&mut self, b: BellId) {
        let Some(index) = self.ringer.list.iter().position(|queued| *queued == b) else {
            return;
        };
        let delta = self.bell(b).delta;
        self.ringer.list.remove(index);
        if let Some(&successor) = self.ringer.list.get(index) {
            self.bell_mut(successor).delta += delta;
        }
        self.sync_bells_hint();
        log::debug!("bell {:?} cancelled", b);
    }

    fn sync_bells_hint(&self) {
        self.hints.set_bells(self.ringer.list.len());
    }
}
