//! Handle → stream map.
//!
//! Lookup is by hash; bulk sweeps (`close_all`, `update_all`) visit entries in
//! insertion order.

use std::collections::HashMap;

use crate::error::{Result, StreamError};
use crate::pool::StreamHandle;

#[derive(Debug)]
pub struct StreamRegistry<T> {
    entries: HashMap<StreamHandle, T>,
    order: Vec<StreamHandle>,
}

impl<T> StreamRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register `value` under `handle`, returning any previous entry.
    pub fn insert(&mut self, handle: StreamHandle, value: T) -> Option<T> {
        let previous = self.entries.insert(handle, value);
        if previous.is_none() {
            self.order.push(handle);
        }
        previous
    }

    pub fn get(&self, handle: StreamHandle) -> Result<&T> {
        self.entries
            .get(&handle)
            .ok_or(StreamError::HandleNotFound(handle))
    }

    pub fn get_mut(&mut self, handle: StreamHandle) -> Result<&mut T> {
        self.entries
            .get_mut(&handle)
            .ok_or(StreamError::HandleNotFound(handle))
    }

    pub fn remove(&mut self, handle: StreamHandle) -> Option<T> {
        let removed = self.entries.remove(&handle)?;
        self.order.retain(|h| *h != handle);
        Some(removed)
    }

    /// Visit every entry mutably, oldest registration first.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(StreamHandle, &mut T)) {
        for handle in &self.order {
            if let Some(value) = self.entries.get_mut(handle) {
                f(*handle, value);
            }
        }
    }

    /// Remove and return every entry matching `pred`, oldest first.
    pub fn drain_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> Vec<(StreamHandle, T)> {
        let matching: Vec<StreamHandle> = self
            .order
            .iter()
            .copied()
            .filter(|h| self.entries.get(h).map(&mut pred).unwrap_or(false))
            .collect();
        matching
            .into_iter()
            .filter_map(|h| self.remove(h).map(|v| (h, v)))
            .collect()
    }

    /// Registered handles in insertion order.
    pub fn handles(&self) -> &[StreamHandle] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for StreamRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
