use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use media_pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use stream_core::config::StreamHostConfig;

use crate::cli::Args;

/// Everything the player needs besides the play request itself.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    pub tick_ms: u64,
    pub host: StreamHostConfig,
    pub pipeline: PipelineConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            tick_ms: 16,
            host: StreamHostConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl PlayerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        toml::from_str::<PlayerConfig>(&raw).with_context(|| format!("parse config {:?}", path))
    }

    /// Config file (if any) with command-line flags applied on top.
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut cfg = match args.config.as_deref() {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        cfg.apply_overrides(args);
        Ok(cfg)
    }

    pub fn apply_overrides(&mut self, args: &Args) {
        if let Some(device) = normalize_device_name(args.device.clone()) {
            self.pipeline.device = Some(device);
        }
        if let Some(tick_ms) = args.tick_ms {
            self.tick_ms = tick_ms;
        }
        if let Some(frames) = args.chunk_frames {
            self.pipeline.chunk_frames = frames;
        }
        if let Some(frames) = args.refill_max_frames {
            self.pipeline.refill_max_frames = frames;
        }
        if let Some(secs) = args.buffer_seconds {
            self.pipeline.buffer_seconds = secs;
        }
        self.pipeline.device = normalize_device_name(self.pipeline.device.take());
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

/// One `play` invocation.
#[derive(Clone, Debug)]
pub struct PlayRequest {
    pub paths: Vec<PathBuf>,
    pub looping: bool,
    pub volume: f32,
    pub max_volume: f32,
    pub fade_in: f32,
    pub fade_out: f32,
    pub json: bool,
}

/// Trim a device name; blank names mean "use the default".
pub fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
