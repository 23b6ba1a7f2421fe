//! Busy-waiting lock primitives.
//!
//! Two locks, both cross-CPU and both without any blocking semantics:
//!
//! - [`Spinlock`]: one-byte test-and-set lock with an RAII guard. No
//!   fairness guarantee; under heavy contention one CPU can win
//!   repeatedly.
//! - [`Ticketlock`]: fair lock granting strictly in `lock()` call order.
//!   Raw interface without a guard, because the big kernel lock built on
//!   it is acquired and released on different stacks across context
//!   switches.
//!
//! Interrupt masking is not part of either lock; callers that need it
//! (the guard layer of the kernel) sequence it explicitly through the
//! platform contract.

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Test-and-set spinlock protecting a value of type `T`.
pub struct Spinlock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: the lock serialises all access to `data`.
unsafe impl<T: Send> Sync for Spinlock<T> {}
unsafe impl<T: Send> Send for Spinlock<T> {}

impl<T> Spinlock<T> {
    /// Create a new unlocked spinlock.
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire the lock, busy-waiting until it is free.
    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }

        SpinlockGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Try to acquire the lock without waiting.
    pub fn try_lock(&self) -> Option<SpinlockGuard<'_, T>> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(SpinlockGuard {
                lock: self,
                _not_send: PhantomData,
            })
        } else {
            None
        }
    }

    /// Whether the lock is currently held by someone.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// RAII guard for [`Spinlock`]; releases on drop.
pub struct SpinlockGuard<'a, T> {
    lock: &'a Spinlock<T>,
    // A guard must be released on the CPU that acquired it.
    _not_send: PhantomData<*const ()>,
}

impl<T> Deref for SpinlockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves the lock is held.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinlockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves the lock is held exclusively.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinlockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// Fair busy-waiting lock.
///
/// `lock()` draws a ticket and spins until the `serving` counter reaches
/// it; `unlock()` advances `serving`. Acquisition order is therefore
/// exactly the order in which `lock()` was entered, which matters wherever
/// many CPUs hammer the same lock repeatedly.
///
/// The interface is raw on purpose: the kernel's big lock is conceptually
/// held "by the system" between a context switch and the next thread's
/// own release path, so acquire and release do not pair up in one scope.
/// Misuse (releasing a lock that is not held) corrupts the hand-out order
/// rather than memory; callers keep the protocol straight.
pub struct Ticketlock {
    next: AtomicUsize,
    serving: AtomicUsize,
}

impl Ticketlock {
    /// Create a new unlocked ticket lock.
    pub const fn new() -> Self {
        Self {
            next: AtomicUsize::new(0),
            serving: AtomicUsize::new(0),
        }
    }

    /// Draw a ticket and busy-wait until it is served.
    pub fn lock(&self) {
        let ticket = self.next.fetch_add(1, Ordering::Relaxed);
        while self.serving.load(Ordering::Acquire) != ticket {
            core::hint::spin_loop();
        }
    }

    /// Release the lock, admitting the next ticket holder.
    pub fn unlock(&self) {
        self.serving.fetch_add(1, Ordering::Release);
    }
}

impl Default for Ticketlock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use std::vec::Vec;

    use super::*;

    #[test]
    fn test_spinlock_guards_data() {
        let lock = Spinlock::new(41);
        {
            let mut guard = lock.lock();
            *guard += 1;
        }
        assert_eq!(*lock.lock(), 42);
    }

    #[test]
    fn test_spinlock_try_lock() {
        let lock = Spinlock::new(());
        let guard = lock.lock();
        assert!(lock.is_locked());
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert!(lock.try_lock().is_some());
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_ticketlock_reacquire() {
        let lock = Ticketlock::new();
        lock.lock();
        lock.unlock();
        lock.lock();
        lock.unlock();
    }

    #[test]
    fn test_spinlock_serialises_updates() {
        const THREADS: usize = 4;
        const ROUNDS: usize = 10_000;

        let counter = Arc::new(Spinlock::new(0u64));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        *counter.lock() += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*counter.lock(), (THREADS * ROUNDS) as u64);
    }

    /// A ticket-lock critical section never holds two occupants.
    #[test]
    fn test_ticketlock_is_exclusive() {
        const THREADS: usize = 4;
        const ROUNDS: usize = 2_000;

        let lock = Arc::new(Ticketlock::new());
        let inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        lock.lock();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        inside.fetch_sub(1, Ordering::SeqCst);
                        lock.unlock();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    /// Competing acquirers are granted the ticket lock in the order they
    /// called `lock()`.
    #[test]
    fn test_ticketlock_grants_in_call_order() {
        const CONTENDERS: usize = 8;

        let lock = Arc::new(Ticketlock::new());
        let grants = Arc::new(Spinlock::new(Vec::new()));
        let arrived = Arc::new(AtomicUsize::new(0));

        // Hold the lock so every contender queues up behind ticket 0.
        lock.lock();

        let mut handles = Vec::new();
        for k in 0..CONTENDERS {
            let lock = Arc::clone(&lock);
            let grants = Arc::clone(&grants);
            let thread_arrived = Arc::clone(&arrived);
            handles.push(thread::spawn(move || {
                thread_arrived.fetch_add(1, Ordering::SeqCst);
                lock.lock();
                grants.lock().push(k);
                lock.unlock();
            }));
            // Wait until contender k is about to draw its ticket, then
            // give it time to actually draw before the next one starts.
            while arrived.load(Ordering::SeqCst) <= k {
                thread::yield_now();
            }
            thread::sleep(Duration::from_millis(20));
        }

        lock.unlock();
        for handle in handles {
            handle.join().unwrap();
        }

        let grants = grants.lock();
        assert_eq!(*grants, (0..CONTENDERS).collect::<Vec<_>>());
    }
}
