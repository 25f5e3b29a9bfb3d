//! Free-list pool for message bodies.
//!
//! Each concrete message shape gets its own free list. Slots are handed out
//! as owned boxes and handed back by value, so a returned slot cannot be
//! reached through any remaining reference.

use parking_lot::Mutex;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters describing pool usage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Slots created because no free slot of the right shape existed.
    pub allocated: usize,
    /// Slots served from a free list.
    pub reused: usize,
    /// Slots currently waiting in free lists.
    pub pooled: usize,
}

/// Instance-owned message pool, shared between a machine and its wrapper.
#[derive(Debug)]
pub struct MessagePool {
    free: Mutex<HashMap<TypeId, Vec<Box<dyn Any + Send>>>>,
    capacity: usize,
    allocated: AtomicUsize,
    reused: AtomicUsize,
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::new()
    }
}

impl MessagePool {
    /// Free-list length kept per message shape unless configured otherwise.
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Pool keeping at most `capacity` free slots per message shape.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            free: Mutex::new(HashMap::new()),
            capacity,
            allocated: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn take<M: Default + Send + 'static>(&self) -> Box<M> {
        let recycled = self
            .free
            .lock()
            .get_mut(&TypeId::of::<M>())
            .and_then(Vec::pop);

        match recycled.map(|slot| slot.downcast::<M>()) {
            Some(Ok(slot)) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                slot
            }
            _ => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                Box::default()
            }
        }
    }

    /// Return a cleared slot. Slots beyond capacity are dropped.
    pub(crate) fn give_back<M: Send + 'static>(&self, slot: Box<M>) {
        let mut free = self.free.lock();
        let list = free.entry(TypeId::of::<M>()).or_default();
        if list.len() < self.capacity {
            list.push(slot);
        }
    }

    /// Number of free slots across all shapes.
    pub fn pooled_count(&self) -> usize {
        self.free.lock().values().map(Vec::len).sum()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            pooled: self.pooled_count(),
        }
    }
}
