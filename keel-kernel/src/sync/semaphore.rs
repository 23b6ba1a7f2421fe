//! Counting semaphores.

use crate::error::Error;
use crate::sync::room::RoomId;
use crate::system::Kernel;

/// Stable handle of one semaphore.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct SemaphoreId(pub(crate) u32);

pub(crate) struct Semaphore {
    pub(crate) room: RoomId,
    counter: usize,
}

impl Kernel {
    /// Create a counting semaphore holding `counter` units.
    pub fn create_semaphore(&mut self, counter: usize) -> SemaphoreId {
        let room = self.create_room();
        let id = SemaphoreId(self.semaphores.insert(Semaphore { room, counter }));
        log::debug!("semaphore {:?} created with {} units", id, counter);
        id
    }

    /// Tear a semaphore down, waking everyone still waiting on it.
    pub fn destroy_semaphore(&mut self, s: SemaphoreId) -> Result<(), Error> {
        let sem = self.semaphores.remove(s.0).ok_or(Error::UnknownSemaphore)?;
        self.destroy_room(sem.room);
        log::debug!("semaphore {:?} destroyed", s);
        Ok(())
    }

    /// Take one unit, parking the caller while none is available.
    ///
    /// A parked caller receives its unit directly from a later `v`;
    /// nothing runs in the caller between parking and that handoff.
    pub fn p(&mut self, s: SemaphoreId) -> Result<(), Error> {
        let sem = self.semaphores.get_mut(s.0).ok_or(Error::UnknownSemaphore)?;
        if sem.counter > 0 {
            sem.counter -= 1;
            return Ok(());
        }
        let room = sem.room;
        self.block(room);
        Ok(())
    }

    /// Release one unit.
    ///
    /// Wake-before-increment: while anyone waits, the unit passes
    /// straight to the head waiter and the counter never moves, so a
    /// release cannot both bank a unit and leave a waiter asleep.
    pub fn v(&mut self, s: SemaphoreId) -> Result<(), Error> {
        let room = self.semaphores.get(s.0).ok_or(Error::UnknownSemaphore)?.room;
        if let Some(waiter) = self.room_mut(room).pop() {
            self.admit(waiter);
            return Ok(());
        }
        let sem = self.semaphores.get_mut(s.0).ok_or(Error::UnknownSemaphore)?;
        sem.counter += 1;
        Ok(())
    }

    /// Waiting room of a semaphore the kernel's own structures refer to;
    /// a stale handle here is kernel corruption.
    pub(crate) fn semaphore_room(&self, s: SemaphoreId) -> RoomId {
        match self.semaphores.get(s.0) {
            Some(sem) => sem.room,
            None => {
                log::error!("semaphore {:?} does not exist", s);
                panic!("stale semaphore handle");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use keel_arch::CpuId;

    use super::*;
    use crate::irq::guard::Secure;
    use crate::sched::thread::ThreadState;
    use crate::testutil;

    #[test]
    fn test_p_consumes_units_then_blocks() {
        let (system, _sim) = testutil::fresh_system(1);
        let a = testutil::spawn(system);
        let b = testutil::spawn(system);

        let mut secure = Secure::new(system);
        let kernel = secure.kernel();
        kernel.ready(a).unwrap();
        kernel.ready(b).unwrap();
        kernel.schedule();

        let s = kernel.create_semaphore(2);
        kernel.p(s).unwrap();
        kernel.p(s).unwrap();
        assert_eq!(kernel.active(CpuId::BOOT), Some(a));

        kernel.p(s).unwrap();
        assert!(matches!(
            kernel.thread_state(a),
            Ok(ThreadState::Blocked(_))
        ));
        assert_eq!(kernel.active(CpuId::BOOT), Some(b));
    }

    #[test]
    fn test_v_wakes_waiters_in_fifo_order() {
        let (system, _sim) = testutil::fresh_system(1);
        let a = testutil::spawn(system);
        let b = testutil::spawn(system);
        let c = testutil::spawn(system);

        let mut secure = Secure::new(system);
        let kernel = secure.kernel();
        for t in [a, b, c] {
            kernel.ready(t).unwrap();
        }
        kernel.schedule();

        let s = kernel.create_semaphore(0);
        kernel.p(s).unwrap();
        kernel.p(s).unwrap();
        assert_eq!(kernel.active(CpuId::BOOT), Some(c));

        kernel.v(s).unwrap();
        kernel.v(s).unwrap();
        assert_eq!(kernel.thread_state(a), Ok(ThreadState::Ready));
        assert_eq!(kernel.thread_state(b), Ok(ThreadState::Ready));

        // The earlier sleeper runs first.
        kernel.resume();
        assert_eq!(kernel.active(CpuId::BOOT), Some(a));
    }

    #[test]
    fn test_v_without_waiters_banks_the_unit() {
        let (system, _sim) = testutil::fresh_system(1);
        let a = testutil::spawn(system);

        let mut secure = Secure::new(system);
        let kernel = secure.kernel();
        kernel.ready(a).unwrap();
        kernel.schedule();

        let s = kernel.create_semaphore(0);
        kernel.v(s).unwrap();
        kernel.p(s).unwrap();
        assert_eq!(kernel.active(CpuId::BOOT), Some(a), "no blocking needed");
    }

    #[test]
    fn test_destroy_wakes_every_waiter() {
        let (system, _sim) = testutil::fresh_system(1);
        system.init_cpu(testutil::STACK).unwrap();
        let a = testutil::spawn(system);
        let b = testutil::spawn(system);

        let mut secure = Secure::new(system);
        let kernel = secure.kernel();
        kernel.ready(a).unwrap();
        kernel.ready(b).unwrap();
        kernel.schedule();

        let s = kernel.create_semaphore(0);
        kernel.p(s).unwrap();
        kernel.p(s).unwrap();

        kernel.destroy_semaphore(s).unwrap();
        assert_eq!(kernel.thread_state(a), Ok(ThreadState::Ready));
        assert_eq!(kernel.thread_state(b), Ok(ThreadState::Ready));
        assert_eq!(kernel.p(s), Err(Error::UnknownSemaphore));
    }

    #[test]
    fn test_killed_waiter_never_receives_the_unit() {
        let (system, _sim) = testutil::fresh_system(1);
        let a = testutil::spawn(system);
        let b = testutil::spawn(system);
        let c = testutil::spawn(system);

        let mut secure = Secure::new(system);
        let kernel = secure.kernel();
        for t in [a, b, c] {
            kernel.ready(t).unwrap();
        }
        kernel.schedule();

        let s = kernel.create_semaphore(0);
        kernel.p(s).unwrap();
        kernel.p(s).unwrap();

        kernel.kill(a).unwrap();
        kernel.v(s).unwrap();
        assert_eq!(kernel.thread_state(b), Ok(ThreadState::Ready));
    }
}
