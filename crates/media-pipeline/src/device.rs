//! Output device discovery and selection.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

/// Pick the first output device whose name contains `needle`
/// (case-insensitive), or the host default when `needle` is `None`.
pub fn select_output(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| {
                d.description()
                    .ok()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Choose the output config for a source rate.
///
/// Prefers the highest supported rate not above `target_rate`, then the
/// lowest rate above it; ties go to the better sample format.
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig> {
    let mut best: Option<(bool, u32, u8, cpal::SupportedStreamConfig)> = None;

    for range in device.supported_output_configs()? {
        let rate = pick_rate_for_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let below = target_rate.map(|t| rate <= t).unwrap_or(true);
        let format_rank = sample_format_rank(range.sample_format());
        let replace = match &best {
            None => true,
            Some((b_below, b_rate, b_rank, _)) => {
                is_better_candidate(below, rate, format_rank, *b_below, *b_rate, *b_rank)
            }
        };
        if replace {
            best = Some((below, rate, format_rank, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, _, _, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Largest fixed buffer size the device allows, capped at 16384 frames.
///
/// `None` leaves the device default in place.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            const MAX_FRAMES: u32 = 16_384;
            let chosen = if *max > MAX_FRAMES {
                (*min).max(MAX_FRAMES)
            } else {
                *max
            };
            Some(cpal::BufferSize::Fixed(chosen))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// One output device as shown by `--list-devices`.
#[derive(Clone, Debug, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub min_rate: u32,
    pub max_rate: u32,
    pub is_default: bool,
}

pub fn list_output_devices(host: &cpal::Host) -> Result<Vec<DeviceInfo>> {
    let default_name = host
        .default_output_device()
        .and_then(|d| d.description().ok())
        .map(|d| d.name().to_string());

    let mut out = Vec::new();
    for d in host.output_devices().context("No output devices")? {
        let name = d.description()?.name().to_string();
        let (mut min_rate, mut max_rate) = (u32::MAX, 0u32);
        if let Ok(ranges) = d.supported_output_configs() {
            for r in ranges {
                min_rate = min_rate.min(r.min_sample_rate());
                max_rate = max_rate.max(r.max_sample_rate());
            }
        }
        if max_rate == 0 {
            match d.default_output_config() {
                Ok(cfg) => {
                    min_rate = cfg.sample_rate();
                    max_rate = min_rate;
                }
                Err(e) => {
                    tracing::warn!(device = %name, "skipping device without output configs: {e}");
                    continue;
                }
            }
        }
        out.push(DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            min_rate,
            max_rate,
        });
    }
    Ok(out)
}

fn pick_rate_for_range(min: u32, max: u32, target_rate: Option<u32>) -> u32 {
    match target_rate {
        Some(target) => target.clamp(min, max.max(min)),
        None => max,
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn is_better_candidate(
    below: bool,
    rate: u32,
    format_rank: u8,
    best_below: bool,
    best_rate: u32,
    best_rank: u8,
) -> bool {
    if below != best_below {
        below && !best_below
    } else if rate != best_rate {
        // Below target: higher is closer. Above target: lower is closer.
        if below { rate > best_rate } else { rate < best_rate }
    } else {
        format_rank < best_rank
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
