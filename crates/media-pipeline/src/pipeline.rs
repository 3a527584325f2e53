//! `stream-core` engine implementation over the decode worker and CPAL output.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use stream_core::MediaLocator;
use stream_core::engine::{
    BusMessage, Pipeline, PipelineEngine, PipelineState, SeekFlags, StateChange,
};

use crate::config::PipelineConfig;
use crate::decode::{self, DecodeWorker};
use crate::device;
use crate::playback::{self, PlaybackShared};
use crate::queue::{SharedAudio, calc_max_buffered_samples};
use crate::resample::StreamResampler;

const SEEK_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Engine playing local files on one CPAL output device.
pub struct NativeEngine {
    config: PipelineConfig,
    device: Option<cpal::Device>,
}

impl NativeEngine {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            device: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Name of the selected device once initialized.
    pub fn device_name(&self) -> Option<String> {
        self.device
            .as_ref()
            .and_then(|d| d.description().ok())
            .map(|d| d.name().to_string())
    }
}

impl PipelineEngine for NativeEngine {
    type Pipeline = NativePipeline;

    fn initialize(&mut self) -> Result<()> {
        if self.device.is_some() {
            return Ok(());
        }
        let host = cpal::default_host();
        let device = device::select_output(&host, self.config.device.as_deref())?;
        tracing::info!(
            host = ?host.id(),
            device = %device.description().map(|d| d.to_string()).unwrap_or_default(),
            "output device"
        );
        self.device = Some(device);
        Ok(())
    }

    fn build_pipeline(&self, media: &MediaLocator) -> Result<NativePipeline> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| anyhow!("engine not initialized"))?;
        NativePipeline::open(device, &self.config, media)
    }
}

/// One decode worker plus one output stream.
///
/// Seeks are always flushing and sample-accurate.
pub struct NativePipeline {
    media: MediaLocator,
    state: PipelineState,
    prerolling: bool,
    output_rate: u32,
    duration: Option<Duration>,
    seek_base: Duration,
    queue: Arc<SharedAudio>,
    shared: Arc<PlaybackShared>,
    bus_tx: Sender<BusMessage>,
    bus_rx: Receiver<BusMessage>,
    worker: DecodeWorker,
    stream: cpal::Stream,
}

impl NativePipeline {
    fn open(device: &cpal::Device, config: &PipelineConfig, media: &MediaLocator) -> Result<Self> {
        let source = decode::open_source(media)?;
        let info = source.info.clone();

        let supported = device::pick_output_config(device, Some(info.sample_rate))?;
        let mut stream_config: cpal::StreamConfig = supported.clone().into();
        if let Some(buf) = device::pick_buffer_size(&supported) {
            stream_config.buffer_size = buf;
        }
        let output_rate = stream_config.sample_rate;

        let resampler = StreamResampler::new(
            info.sample_rate,
            output_rate,
            info.channels,
            config.chunk_frames,
        )?;
        let queue = Arc::new(SharedAudio::new(
            info.channels,
            calc_max_buffered_samples(output_rate, info.channels, config.buffer_seconds),
        ));
        let shared = Arc::new(PlaybackShared::new());
        let (bus_tx, bus_rx) = crossbeam_channel::unbounded();

        let stream = playback::build_output_stream(
            device,
            &stream_config,
            supported.sample_format(),
            &queue,
            &shared,
            bus_tx.clone(),
            config.refill_max_frames,
        )
        .context("build output stream")?;
        let worker = DecodeWorker::spawn(
            source,
            resampler,
            queue.clone(),
            shared.clone(),
            bus_tx.clone(),
            media.to_string(),
        )?;

        if info.duration.is_some() {
            let _ = bus_tx.send(BusMessage::DurationChanged);
        }
        tracing::info!(
            media = %media,
            codec = info.codec.as_deref().unwrap_or("unknown"),
            channels = info.channels,
            source_rate_hz = info.sample_rate,
            output_rate_hz = output_rate,
            buffer_size = ?stream_config.buffer_size,
            "pipeline built"
        );

        Ok(Self {
            media: media.clone(),
            state: PipelineState::Null,
            prerolling: false,
            output_rate,
            duration: info.duration,
            seek_base: Duration::ZERO,
            queue,
            shared,
            bus_tx,
            bus_rx,
            worker,
            stream,
        })
    }

    pub fn media(&self) -> &MediaLocator {
        &self.media
    }
}

impl Pipeline for NativePipeline {
    fn set_state(&mut self, state: PipelineState) -> StateChange {
        let old = self.state;
        if old == state {
            return StateChange::Success;
        }

        let change = match state {
            PipelineState::Null => {
                self.shared.set_paused(true);
                self.prerolling = false;
                if let Err(e) = self.stream.pause() {
                    tracing::debug!(media = %self.media, "output pause unsupported: {e}");
                }
                StateChange::Success
            }
            PipelineState::Paused | PipelineState::Playing => {
                if let Err(e) = self.stream.play() {
                    tracing::warn!(media = %self.media, "output stream refused to start: {e}");
                    return StateChange::Failure;
                }
                self.shared.set_paused(state == PipelineState::Paused);
                if old == PipelineState::Null {
                    self.prerolling = true;
                    StateChange::Async
                } else {
                    StateChange::Success
                }
            }
        };

        self.state = state;
        let _ = self.bus_tx.send(BusMessage::StateChanged { old, new: state });
        change
    }

    fn wait_async_done(&mut self, timeout: Option<Duration>) -> bool {
        if !self.prerolling {
            return true;
        }
        if !self.queue.wait_ready(timeout) {
            return false;
        }
        self.prerolling = false;
        let _ = self.bus_tx.send(BusMessage::AsyncDone);
        true
    }

    fn current_state(&mut self, timeout: Option<Duration>) -> PipelineState {
        if self.prerolling {
            self.wait_async_done(timeout);
        }
        self.state
    }

    fn query_duration(&mut self) -> Option<Duration> {
        self.duration
    }

    fn query_position(&mut self) -> Option<Duration> {
        Some(self.seek_base + frames_to_duration(self.shared.played_frames(), self.output_rate))
    }

    fn seek(&mut self, position: Duration, _flags: SeekFlags) -> Result<()> {
        match self.duration {
            Some(duration) if position > duration => {
                return Err(anyhow!("position {position:?} beyond end ({duration:?})"));
            }
            _ => {}
        }
        self.worker.seek(position, SEEK_REPLY_TIMEOUT)?;
        self.seek_base = position;
        Ok(())
    }

    fn set_volume(&mut self, gain: f64) {
        self.shared.set_gain(gain.clamp(0.0, Self::MAX_GAIN) as f32);
    }

    fn pop_message(&mut self) -> Option<BusMessage> {
        self.bus_rx.try_recv().ok()
    }
}

impl Drop for NativePipeline {
    fn drop(&mut self) {
        self.shared.set_paused(true);
        self.worker.shutdown();
        tracing::debug!(media = %self.media, "pipeline released");
    }
}

fn frames_to_duration(frames: u64, rate: u32) -> Duration {
    if rate == 0 {
        return Duration::ZERO;
    }
    let rate = u64::from(rate);
    let nanos = (frames % rate).saturating_mul(1_000_000_000) / rate;
    Duration::new(frames / rate, nanos as u32)
}
