//! Reusable buffer pools for the spanning-tree engines.
//!
//! The dense engines allocate edge vectors and heaps of C(V,2) entries every
//! iteration; recycling those buffers keeps the allocator out of the hot
//! loop. Pools hand out the most recently released buffer or allocate a
//! fresh one, and clear a buffer on release.

use std::collections::BinaryHeap;
use std::sync::Mutex;

use crate::error::{Result, SearchError};

/// A buffer that can be emptied and handed back to a pool.
pub trait Reusable: Default {
    /// Drops the contents, keeping the allocation.
    fn reset(&mut self);
}

impl<T> Reusable for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl<T: Ord> Reusable for BinaryHeap<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

/// Mutex-guarded stack of idle buffers.
#[derive(Debug, Default)]
pub struct Pool<T: Reusable> {
    idle: Mutex<Vec<T>>,
}

impl<T: Reusable> Pool<T> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Takes the most recently released buffer, or a fresh default one.
    ///
    /// # Errors
    /// Returns [`SearchError::PoolPoisoned`] when a previous holder panicked
    /// while the lock was held.
    pub fn acquire(&self) -> Result<T> {
        let mut idle = self.idle.lock().map_err(|_| SearchError::PoolPoisoned)?;
        Ok(idle.pop().unwrap_or_default())
    }

    /// Clears the buffer and returns it to the pool. A poisoned pool simply
    /// drops the buffer; nothing else can be salvaged at that point.
    pub fn release(&self, mut buffer: T) {
        buffer.reset();
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(buffer);
        }
    }

    /// Drops every idle buffer.
    ///
    /// # Errors
    /// Returns [`SearchError::PoolPoisoned`] when the lock is poisoned.
    pub fn clear(&self) -> Result<()> {
        let mut idle = self.idle.lock().map_err(|_| SearchError::PoolPoisoned)?;
        idle.clear();
        Ok(())
    }

    /// Number of idle buffers currently held.
    ///
    /// # Errors
    /// Returns [`SearchError::PoolPoisoned`] when the lock is poisoned.
    pub fn idle_len(&self) -> Result<usize> {
        let idle = self.idle.lock().map_err(|_| SearchError::PoolPoisoned)?;
        Ok(idle.len())
    }
}
