//! Mutexes with ownership handoff.
//!
//! A mutex is a semaphore used purely for its waiting room, plus an
//! owner. The owner field is the whole truth about the lock state; the
//! semaphore's counter stays at zero. Unlocking passes ownership
//! straight to the head waiter, so a parked locker owns the mutex the
//! moment it is woken and never runs a take-over step of its own.

use crate::error::Error;
use crate::sched::thread::ThreadId;
use crate::sync::semaphore::SemaphoreId;
use crate::system::Kernel;

/// Stable handle of one mutex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MutexId(pub(crate) u32);

pub(crate) struct Mutex {
    sem: SemaphoreId,
    owner: Option<ThreadId>,
}

impl Kernel {
    /// Create an unowned mutex.
    pub fn create_mutex(&mut self) -> MutexId {
        let sem = self.create_semaphore(0);
        let id = MutexId(self.mutexes.insert(Mutex { sem, owner: None }));
        log::debug!("mutex {:?} created", id);
        id
    }

    /// Tear a mutex down, waking any waiter still queued on it.
    pub fn destroy_mutex(&mut self, m: MutexId) -> Result<(), Error> {
        let mutex = self.mutexes.remove(m.0).ok_or(Error::UnknownMutex)?;
        if let Some(owner) = mutex.owner {
            self.thread_mut(owner).held.retain(|held| *held != m);
        }
        self.destroy_semaphore(mutex.sem)?;
        log::debug!("mutex {:?} destroyed", m);
        Ok(())
    }

    /// Acquire a mutex, parking the caller while it is owned.
    ///
    /// Taking it again while already the owner is refused rather than
    /// self-deadlocking.
    pub fn lock_mutex(&mut self, m: MutexId) -> Result<(), Error> {
        let current = self.current();
        let mutex = self.mutexes.get(m.0).ok_or(Error::UnknownMutex)?;
        let (owner, sem) = (mutex.owner, mutex.sem);
        match owner {
            None => {
                self.mutex_mut(m).owner = Some(current);
                self.thread_mut(current).held.push(m);
                log::trace!("{:?} locked by {:?}", m, current);
                Ok(())
            }
            Some(owner) if owner == current => Err(Error::InvalidState),
            Some(_) => self.p(sem),
        }
    }

    /// Release a mutex held by the caller.
    pub fn unlock_mutex(&mut self, m: MutexId) -> Result<(), Error> {
        let current = self.current();
        let owner = self.mutexes.get(m.0).ok_or(Error::UnknownMutex)?.owner;
        if owner != Some(current) {
            return Err(Error::InvalidState);
        }
        self.thread_mut(current).held.retain(|held| *held != m);
        self.pass_on(m);
        Ok(())
    }

    /// The current owner, if any.
    pub fn mutex_owner(&self, m: MutexId) -> Result<Option<ThreadId>, Error> {
        Ok(self.mutexes.get(m.0).ok_or(Error::UnknownMutex)?.owner)
    }

    /// Unlock everything a dying thread still holds.
    pub(crate) fn release_all(&mut self, t: ThreadId) {
        while let Some(m) = self.thread_mut(t).held.pop() {
            log::debug!("{:?} released by dying {:?}", m, t);
            self.pass_on(m);
        }
    }

    /// Hand a mutex to its head waiter, or leave it free.
    fn pass_on(&mut self, m: MutexId) {
        let sem = self.mutex_mut(m).sem;
        let room = self.semaphore_room(sem);
        match self.room_mut(room).pop() {
            Some(waiter) => {
                self.mutex_mut(m).owner = Some(waiter);
                self.thread_mut(waiter).held.push(m);
                self.admit(waiter);
                log::trace!("{:?} handed to {:?}", m, waiter);
            }
            None => self.mutex_mut(m).owner = None,
        }
    }

    /// A live mutex handle held by the kernel's own structures always
    /// resolves; anything else is kernel corruption.
    fn mutex_mut(&mut self, m: MutexId) -> &mut Mutex {
        match self.mutexes.get_mut(m.0) {
            Some(found) => found,
            None => {
                log::error!("mutex {:?} does not exist", m);
                panic!("stale mutex handle");
            }
        }
    }
}
