//! Bells.

use crate::error::Error;
use crate::sync::room::RoomId;
use crate::system::Kernel;

/// Stable handle of one bell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct BellId(pub(crate) u32);

/// A waiting room with an expiry.
///
/// While pending on the bellringer's list, `delta` holds the ticks
/// remaining after the preceding list entry, not an absolute time.
pub(crate) struct Bell {
    pub(crate) room: RoomId,
    pub(crate) delta: usize,
    /// Transient bells carry one `sleep` call and are freed by the ring.
    pub(crate) transient: bool,
}

impl Kernel {
    /// Create a persistent bell that can be armed over and over.
    pub fn create_bell(&mut self) -> BellId {
        let room = self.create_room();
        let id = BellId(self.bells.insert(Bell {
            room,
            delta: 0,
            transient: false,
        }));
        log::debug!("bell {:?} created", id);
        id
    }

    /// Tear a bell down, waking any occupant of its room early.
    pub fn destroy_bell(&mut self, b: BellId) -> Result<(), Error> {
        self.cancel_bell(b)?;
        let bell = self.bells.remove(b.0).ok_or(Error::UnknownBell)?;
        self.destroy_room(bell.room);
        log::debug!("bell {:?} destroyed", b);
        Ok(())
    }

    /// Park the calling thread for at least `ms` milliseconds.
    ///
    /// Builds a transient bell, arms it and blocks the caller in its
    /// room; the ring both wakes the caller and frees the bell. A wait
    /// shorter than one tick still parks until the next tick.
    pub fn sleep(&mut self, ms: usize) {
        let room = self.create_room();
        let bell = BellId(self.bells.insert(Bell {
            room,
            delta: 0,
            transient: true,
        }));
        self.arm(bell, ms);
        log::trace!("{:?} sleeping {} ms in {:?}", self.current(), ms, bell);
        self.block(room);
    }

    pub(crate) fn bell(&self, b: BellId) -> &Bell {
        match self.bells.get(b.0) {
            Some(found) => found,
            None => {
                log::error!("bell {:?} does not exist", b);
                panic!("stale bell handle");
            }
        }
    }

    pub(crate) fn bell_mut(&mut self, b: BellId) -> &mut Bell {
        match self.bells.get_mut(b.0) {
            Some(found) => found,
            None => {
                log::error!("bell {:?} does not exist", b);
                panic!("stale bell handle");
            }
        }
    }
}
