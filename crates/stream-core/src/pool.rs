//! Bounded pool of caller-visible stream handles.
//!
//! The pool is filled once with `[0, capacity)` and hands handles out in FIFO
//! order. A handle is never issued twice while it is in use; releasing a
//! handle appends it to the back of the free list.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use crate::error::{Result, StreamError};

/// Default number of handles in a host pool.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Integer identity of one stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamHandle(u32);

impl StreamHandle {
    /// Wrap a raw handle received from a host caller.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw integer value.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub struct HandlePool {
    capacity: usize,
    free: VecDeque<StreamHandle>,
    issued: HashSet<StreamHandle>,
}

impl HandlePool {
    /// Pre-allocate `capacity` handles in ascending order.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(u32::MAX as usize);
        Self {
            capacity,
            free: (0..capacity as u32).map(StreamHandle).collect(),
            issued: HashSet::with_capacity(capacity.min(DEFAULT_CAPACITY)),
        }
    }

    /// Take the oldest free handle.
    pub fn allocate(&mut self) -> Result<StreamHandle> {
        let handle = self.free.pop_front().ok_or(StreamError::PoolExhausted {
            capacity: self.capacity,
        })?;
        self.issued.insert(handle);
        tracing::trace!(handle = handle.raw(), free = self.free.len(), "handle allocated");
        Ok(handle)
    }

    /// Return an issued handle to the back of the free list.
    ///
    /// Returns `false` (and changes nothing) for handles that are not
    /// currently issued, so a double release cannot duplicate a handle.
    pub fn release(&mut self, handle: StreamHandle) -> bool {
        if !self.issued.remove(&handle) {
            return false;
        }
        self.free.push_back(handle);
        tracing::trace!(handle = handle.raw(), free = self.free.len(), "handle released");
        true
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn in_use(&self) -> usize {
        self.issued.len()
    }
}

impl Default for HandlePool {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
