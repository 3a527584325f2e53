use serde::{Deserialize, Serialize};

/// Tuning shared by the decode, resample and output stages of every pipeline.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Output device by case-insensitive substring match; `None` uses the
    /// host default.
    pub device: Option<String>,
    /// Resampler input chunk size in frames.
    pub chunk_frames: usize,
    /// Max frames pulled per output callback refill.
    pub refill_max_frames: usize,
    /// Target queue duration in seconds.
    pub buffer_seconds: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            device: None,
            chunk_frames: 1024,
            refill_max_frames: 4096,
            buffer_seconds: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overrides_only_given_fields() {
        let cfg: PipelineConfig = toml::from_str("device = \"USB\"\nbuffer_seconds = 0.5\n").unwrap();
        assert_eq!(cfg.device.as_deref(), Some("USB"));
        assert_eq!(cfg.buffer_seconds, 0.5);
        assert_eq!(cfg.chunk_frames, 1024);
        assert_eq!(cfg.refill_max_frames, 4096);
    }
}
