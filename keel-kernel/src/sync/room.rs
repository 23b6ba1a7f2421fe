//! Waiting rooms.
//!
//! A waiting room is a FIFO of blocked threads. The scheduler's `block`
//! parks the caller at the tail; synchronisation objects wake from the
//! head. Destruction never strands anyone: every remaining occupant is
//! put back on the ready queue first.

use alloc::collections::VecDeque;

use crate::sched::thread::ThreadId;
use crate::system::Kernel;

/// Stable handle of one waiting room.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RoomId(pub(crate) u32);

pub(crate) struct Waitingroom {
    waiters: VecDeque<ThreadId>,
}

impl Waitingroom {
    pub(crate) fn new() -> Self {
        Self {
            waiters: VecDeque::new(),
        }
    }

    pub(crate) fn enqueue(&mut self, t: ThreadId) {
        self.waiters.push_back(t);
    }

    pub(crate) fn pop(&mut self) -> Option<ThreadId> {
        self.waiters.pop_front()
    }

    /// Drop a thread from the queue, wherever it sits. Used when a
    /// waiter is killed or woken out of turn.
    pub(crate) fn remove(&mut self, t: ThreadId) {
        self.waiters.retain(|waiter| *waiter != t);
    }
}

impl Kernel {
    pub(crate) fn create_room(&mut self) -> RoomId {
        RoomId(self.rooms.insert(Waitingroom::new()))
    }

    /// Wake every occupant, then drop the room.
    pub(crate) fn destroy_room(&mut self, room: RoomId) {
        while let Some(waiter) = self.room_mut(room).pop() {
            self.admit(waiter);
        }
        self.rooms.remove(room.0);
    }

    /// A blocked thread's room always exists; anything else is kernel
    /// corruption.
    pub(crate) fn room_mut(&mut self, room: RoomId) -> &mut Waitingroom {
        match self.rooms.get_mut(room.0) {
            Some(found) => found,
            None => {
                log::error!("waiting room {:?} does not exist", room);
                panic!("stale waiting room handle");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irq::guard::Secure;
    use crate::sched::thread::ThreadState;
    use crate::testutil;

    #[test]
    fn test_room_is_fifo() {
        let mut room = Waitingroom::new();
        room.enqueue(ThreadId(1));
        room.enqueue(ThreadId(2));
        room.enqueue(ThreadId(3));
        room.remove(ThreadId(2));
        assert_eq!(room.pop(), Some(ThreadId(1)));
        assert_eq!(room.pop(), Some(ThreadId(3)));
        assert_eq!(room.pop(), None);
    }

    #[test]
    fn test_destroy_room_wakes_occupants() {
        let (system, _sim) = testutil::fresh_system(1);
        system.init_cpu(testutil::STACK).unwrap();
        let a = testutil::spawn(system);
        let b = testutil::spawn(system);

        let mut secure = Secure::new(system);
        let kernel = secure.kernel();
        kernel.ready(a).unwrap();
        kernel.ready(b).unwrap();
        kernel.schedule();

        let room = kernel.create_room();
        kernel.block(room);
        assert!(matches!(
            kernel.thread_state(a),
            Ok(ThreadState::Blocked(_))
        ));

        kernel.destroy_room(room);
        assert_eq!(kernel.thread_state(a), Ok(ThreadState::Ready));
    }
}
