//! Slotted object arena.
//!
//! Threads, waiting rooms, semaphores, mutexes and bells all live in
//! [`Slab`]s and are referred to by stable `u32` indices wrapped in typed
//! handles. Queues hold handles instead of intrusive pointers; O(1)
//! insert and remove is preserved through the free list. Indices are
//! reused without generation counters, so holding a handle across its
//! object's destruction is an application contract violation.

use alloc::vec::Vec;

pub(crate) struct Slab<T> {
    slots: Vec<Option<T>>,
    free: Vec<u32>,
}

impl<T> Slab<T> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Store `value`, returning its stable index.
    pub(crate) fn insert(&mut self, value: T) -> u32 {
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(value);
                index
            }
            None => {
                self.slots.push(Some(value));
                (self.slots.len() - 1) as u32
            }
        }
    }

    /// Remove and return the value at `index`, freeing the slot.
    pub(crate) fn remove(&mut self, index: u32) -> Option<T> {
        let slot = self.slots.get_mut(index as usize)?;
        let value = slot.take()?;
        self.free.push(index);
        Some(value)
    }

    pub(crate) fn get(&self, index: u32) -> Option<&T> {
        self.slots.get(index as usize)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.slots.get_mut(index as usize)?.as_mut()
    }

    pub(crate) fn contains(&self, index: u32) -> bool {
        matches!(self.slots.get(index as usize), Some(Some(_)))
    }
}
