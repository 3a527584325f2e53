//! Output stage: the CPAL callback.
//!
//! The callback refills a local buffer from the queue without blocking,
//! applies channel mapping and gain, and converts to the device sample
//! format. When paused it outputs silence without draining. When the queue is
//! drained after end of stream it posts one `EndOfStream` to the bus.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;
use crossbeam_channel::Sender;
use stream_core::engine::BusMessage;

use crate::queue::SharedAudio;

/// State shared between a pipeline, its decode worker and its callback.
#[derive(Debug)]
pub struct PlaybackShared {
    gain_bits: AtomicU32,
    paused: AtomicBool,
    played_frames: AtomicU64,
    eos_posted: AtomicBool,
}

impl PlaybackShared {
    /// Starts paused at unity gain.
    pub fn new() -> Self {
        Self {
            gain_bits: AtomicU32::new(1.0f32.to_bits()),
            paused: AtomicBool::new(true),
            played_frames: AtomicU64::new(0),
            eos_posted: AtomicBool::new(false),
        }
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain_bits.store(gain.to_bits(), Ordering::Relaxed);
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Output frames rendered since the last reset.
    pub fn played_frames(&self) -> u64 {
        self.played_frames.load(Ordering::Relaxed)
    }

    fn add_played(&self, frames: u64) {
        self.played_frames.fetch_add(frames, Ordering::Relaxed);
    }

    /// Restart position counting and re-arm end-of-stream reporting.
    pub fn reset_progress(&self) {
        self.played_frames.store(0, Ordering::Relaxed);
        self.eos_posted.store(false, Ordering::Release);
    }

    /// `true` the first time it is called after a reset.
    fn mark_eos(&self) -> bool {
        !self.eos_posted.swap(true, Ordering::AcqRel)
    }
}

impl Default for PlaybackShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a CPAL output stream that plays from `queue`.
///
/// `queue` must hold interleaved `f32` samples already at the device rate.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SharedAudio>,
    shared: &Arc<PlaybackShared>,
    bus: Sender<BusMessage>,
    refill_max_frames: usize,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(device, config, queue, shared, bus, refill_max_frames)
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(device, config, queue, shared, bus, refill_max_frames)
        }
        cpal::SampleFormat::I32 => {
            build_stream::<i32>(device, config, queue, shared, bus, refill_max_frames)
        }
        cpal::SampleFormat::U16 => {
            build_stream::<u16>(device, config, queue, shared, bus, refill_max_frames)
        }
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SharedAudio>,
    shared: &Arc<PlaybackShared>,
    bus: Sender<BusMessage>,
    refill_max_frames: usize,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let channels_out = (config.channels as usize).max(1);
    let refill_max_frames = refill_max_frames.max(1);
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);

    let mut st = LocalBuffer {
        pos: 0,
        src_channels: queue.channels(),
        src: Vec::new(),
        epoch: queue.epoch(),
    };
    let queue_cb = queue.clone();
    let shared_cb = shared.clone();
    let bus_cb = bus.clone();

    let err_fn = move |err: cpal::StreamError| {
        tracing::warn!("stream error: {err}");
        let _ = bus.send(BusMessage::Error {
            message: format!("output stream error: {err}"),
            debug: None,
        });
    };

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            if shared_cb.is_paused() {
                data.fill(silence);
                return;
            }

            let epoch = queue_cb.epoch();
            if epoch != st.epoch {
                st.epoch = epoch;
                st.src.clear();
                st.pos = 0;
            }

            let gain = shared_cb.gain();
            let frames = data.len() / channels_out;
            let mut filled_frames = 0u64;

            for frame in 0..frames {
                if st.pos >= st.src.len() {
                    st.pos = 0;
                    st.src.clear();
                    match queue_cb.pop_up_to(refill_max_frames) {
                        Some(v) => st.src = v,
                        None => {
                            data[frame * channels_out..].fill(silence);
                            if queue_cb.is_drained() && shared_cb.mark_eos() {
                                let _ = bus_cb.send(BusMessage::EndOfStream);
                            }
                            break;
                        }
                    }
                }
                for ch in 0..channels_out {
                    let sample = next_sample_mapped(&mut st, channels_out, ch) * gain;
                    data[frame * channels_out + ch] = <T as cpal::Sample>::from_sample::<f32>(sample);
                }
                filled_frames += 1;
            }

            if filled_frames > 0 {
                shared_cb.add_played(filled_frames);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Samples already taken from the queue but not yet written to the device.
struct LocalBuffer {
    pos: usize,
    src_channels: usize,
    src: Vec<f32>,
    epoch: u64,
}

/// Read one output sample for `dst_ch`, mapping channels.
///
/// Mono is duplicated to stereo, stereo is averaged to mono, other layouts
/// clamp to the available channels. `st.pos` advances after the last channel
/// of a frame.
fn next_sample_mapped(st: &mut LocalBuffer, dst_channels: usize, dst_ch: usize) -> f32 {
    if st.pos >= st.src.len() {
        return 0.0;
    }

    let frame_start = st.pos;
    let get_src = |ch: usize, st: &LocalBuffer| -> f32 {
        if ch < st.src_channels && frame_start + ch < st.src.len() {
            st.src[frame_start + ch]
        } else {
            0.0
        }
    };

    let out = match (st.src_channels, dst_channels) {
        (1, 1) => get_src(0, st),
        (2, 2) => get_src(dst_ch.min(1), st),
        (2, 1) => 0.5 * (get_src(0, st) + get_src(1, st)),
        (1, 2) => get_src(0, st),
        _ => get_src(dst_ch.min(st.src_channels.saturating_sub(1)), st),
    };

    if dst_ch + 1 == dst_channels {
        st.pos += st.src_channels;
    }
    out
}
