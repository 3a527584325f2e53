//! Host configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::ControllerSettings;
use crate::pool::DEFAULT_CAPACITY;
use crate::pump::PumpBudget;

/// Tuning for a [`crate::StreamHost`]. Missing fields take their defaults, so
/// this can be embedded as a `[host]` table in a TOML file.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamHostConfig {
    /// Number of handles in the identifier pool.
    pub capacity: usize,
    /// Return a handle to the pool once its stream is closed. When `false`,
    /// closed streams stay registered and at most `capacity` streams can ever
    /// be created.
    pub recycle_handles: bool,
    /// Upper bound for blocking engine waits. `None` waits without limit.
    pub async_timeout_ms: Option<u64>,
    /// Status messages consumed per stream per tick.
    pub messages_per_tick: usize,
}

impl Default for StreamHostConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            recycle_handles: true,
            async_timeout_ms: None,
            messages_per_tick: 1,
        }
    }
}

impl StreamHostConfig {
    pub fn async_timeout(&self) -> Option<Duration> {
        self.async_timeout_ms.map(Duration::from_millis)
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            async_timeout: self.async_timeout(),
            pump: PumpBudget::new(self.messages_per_tick),
        }
    }
}
