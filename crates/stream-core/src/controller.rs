//! Per-stream lifecycle controller.
//!
//! A controller owns exactly one engine pipeline and the logical playback
//! state for it. Transition logic trusts the cached [`StreamState`];
//! [`StreamController::is_playing`] and [`StreamController::is_paused`] go
//! back to the engine because pipeline transitions complete asynchronously.
//!
//! Calls that may block the calling thread: [`StreamController::load`],
//! [`StreamController::play`] (when the engine answers asynchronously), and
//! the two authoritative state queries.

use std::time::Duration;

use stream_types::{FadeAction, StreamState, StreamStatus};

use crate::clock::SharedClock;
use crate::engine::{Pipeline, PipelineEngine, PipelineState, SeekFlags, StateChange};
use crate::error::{Result, StreamError};
use crate::fade::{Fade, FadeStep};
use crate::log::SharedLogSink;
use crate::media::MediaLocator;
use crate::pool::StreamHandle;
use crate::pump::{self, PumpBudget, Reaction};

/// Behavior knobs shared by all controllers of a host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Limit for blocking engine waits; `None` waits forever.
    pub async_timeout: Option<Duration>,
    pub pump: PumpBudget,
}

pub struct StreamController<P: Pipeline> {
    handle: StreamHandle,
    media: Option<MediaLocator>,
    pipeline: Option<P>,
    state: StreamState,
    volume: f64,
    max_volume: f64,
    duration: Option<Duration>,
    looping: bool,
    fade: Option<Fade>,
    settings: ControllerSettings,
    log: SharedLogSink,
    clock: SharedClock,
}

impl<P: Pipeline> StreamController<P> {
    pub fn new(
        handle: StreamHandle,
        settings: ControllerSettings,
        log: SharedLogSink,
        clock: SharedClock,
    ) -> Self {
        Self {
            handle,
            media: None,
            pipeline: None,
            state: StreamState::Unloaded,
            volume: 1.0,
            max_volume: 1.0,
            duration: None,
            looping: false,
            fade: None,
            settings,
            log,
            clock,
        }
    }

    /// Build the pipeline for `media`, preroll it into the paused state and
    /// cache its duration. Blocks until the engine finishes prerolling.
    pub fn load<E>(&mut self, engine: &E, media: &MediaLocator) -> Result<()>
    where
        E: PipelineEngine<Pipeline = P>,
    {
        if self.pipeline.is_some() {
            self.release_pipeline();
        }
        self.state = StreamState::Loading;

        let mut pipeline = match engine.build_pipeline(media) {
            Ok(p) => p,
            Err(e) => return Err(self.load_failed(media, format!("{e:#}"))),
        };
        match pipeline.set_state(PipelineState::Paused) {
            StateChange::Failure => {
                drop(pipeline);
                return Err(self.load_failed(media, "pipeline refused to preroll".to_string()));
            }
            StateChange::Async => {
                if !pipeline.wait_async_done(self.settings.async_timeout) {
                    tracing::warn!(handle = self.handle.raw(), "preroll did not complete in time");
                }
            }
            StateChange::Success => {}
        }

        self.pipeline = Some(pipeline);
        self.media = Some(media.clone());
        self.state = StreamState::Paused;
        self.apply_volume();
        let _ = self.refresh_duration();
        tracing::debug!(
            handle = self.handle.raw(),
            media = %media,
            duration_secs = ?self.duration.map(|d| d.as_secs_f64()),
            "stream loaded"
        );
        Ok(())
    }

    fn load_failed(&mut self, media: &MediaLocator, reason: String) -> StreamError {
        self.state = StreamState::Unloaded;
        let err = StreamError::PipelineCreate {
            locator: media.to_string(),
            reason,
        };
        self.log.error(&err.to_string());
        err
    }

    /// Start rendering. `looping` replaces the loop flag when given.
    ///
    /// Blocks until the engine confirms the transition if it answers
    /// asynchronously. A pending pause-after-fade is cancelled.
    pub fn play(&mut self, looping: Option<bool>) {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return;
        };
        if let Some(looping) = looping {
            self.looping = looping;
        }
        if let Some(fade) = self.fade.as_mut() {
            fade.cancel_pause();
        }
        if self.state != StreamState::Finished {
            self.state = StreamState::Playing;
        }

        match pipeline.set_state(PipelineState::Playing) {
            StateChange::Async => {
                if !pipeline.wait_async_done(self.settings.async_timeout) {
                    tracing::warn!(handle = self.handle.raw(), "play did not complete in time");
                }
            }
            StateChange::Failure => self.log.error("Could not start playback"),
            StateChange::Success => {}
        }
        // Entering the playing state may reset the engine's gain.
        self.apply_volume();
    }

    pub fn pause(&mut self) {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return;
        };
        if self.state != StreamState::Finished {
            self.state = StreamState::Paused;
        }
        if pipeline.set_state(PipelineState::Paused) == StateChange::Failure {
            self.log.error("Could not pause playback");
        }
        self.apply_volume();
    }

    /// Drop the pipeline to idle and rewind to the start.
    ///
    /// The stream keeps ticking afterwards. A finished stream stays finished.
    pub fn stop(&mut self) {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return;
        };
        pipeline.set_state(PipelineState::Null);
        if let Err(e) = pipeline.seek(Duration::ZERO, SeekFlags::FLUSH) {
            tracing::debug!(handle = self.handle.raw(), "rewind on stop failed: {e:#}");
        }
        if self.state != StreamState::Finished {
            self.state = StreamState::Stopped;
        }
    }

    /// Release the pipeline. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.state == StreamState::Closed {
            return;
        }
        self.fade = None;
        self.release_pipeline();
        self.state = StreamState::Closed;
        tracing::debug!(handle = self.handle.raw(), "stream closed");
    }

    fn release_pipeline(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.set_state(PipelineState::Null);
            drop(pipeline);
        }
    }

    /// One host tick: advance the fade, then consume pending status messages.
    pub fn update(&mut self) {
        if !self.state.is_running() || self.pipeline.is_none() {
            return;
        }
        self.step_fade();

        for _ in 0..self.settings.pump.per_tick() {
            let Some(message) = self.pipeline.as_mut().and_then(|p| p.pop_message()) else {
                break;
            };
            match pump::react(&message) {
                Reaction::ReportError(text) => self.log.error(&text),
                Reaction::RefreshDuration => {
                    let _ = self.refresh_duration();
                }
                Reaction::EndOfStream => self.end_of_stream(),
                Reaction::Ignore => {}
            }
        }
    }

    fn step_fade(&mut self) {
        let now = self.clock.now();
        let Some(fade) = self.fade.as_mut() else {
            return;
        };
        match fade.step(now) {
            FadeStep::Ramp(volume) => {
                self.volume = volume;
                self.apply_volume();
            }
            FadeStep::Complete { volume, action } => {
                self.fade = None;
                self.volume = volume;
                self.apply_volume();
                tracing::debug!(handle = self.handle.raw(), ?action, volume, "fade complete");
                match action {
                    FadeAction::Close => self.close(),
                    FadeAction::Pause => self.pause(),
                    FadeAction::None => {}
                }
            }
        }
    }

    fn end_of_stream(&mut self) {
        if self.looping {
            tracing::debug!(handle = self.handle.raw(), "end of stream, restarting");
            let _ = self.set_position(0.0);
        } else {
            tracing::debug!(handle = self.handle.raw(), "end of stream");
            self.state = StreamState::Finished;
        }
    }

    /// Set the linear volume from a percentage and push it to the engine.
    pub fn set_volume(&mut self, percent: f32) {
        self.volume = percent_to_linear(percent);
        self.apply_volume();
    }

    /// Set the volume ceiling from a percentage and push it to the engine.
    pub fn set_max_volume(&mut self, percent: f32) {
        self.max_volume = percent_to_linear(percent);
        self.apply_volume();
    }

    /// Start a fade to `target_percent` over `seconds`, replacing any fade in
    /// progress.
    pub fn fade(&mut self, target_percent: f32, seconds: f32, action: FadeAction) {
        if self.state == StreamState::Closed {
            return;
        }
        self.fade = Some(Fade::start(
            self.volume,
            percent_to_linear(target_percent),
            f64::from(seconds),
            action,
            self.clock.now(),
        ));
    }

    /// Gain actually sent to the engine.
    pub fn effective_gain(&self) -> f64 {
        let gain = self.volume * self.max_volume;
        if gain.is_finite() {
            gain.clamp(0.0, P::MAX_GAIN)
        } else {
            0.0
        }
    }

    fn apply_volume(&mut self) {
        let gain = self.effective_gain();
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.set_volume(gain);
        }
    }

    /// Re-query the duration. On failure the cached value is kept.
    pub fn refresh_duration(&mut self) -> Result<Duration> {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Err(StreamError::DurationQuery);
        };
        match pipeline.query_duration() {
            Some(duration) => {
                self.duration = Some(duration);
                Ok(duration)
            }
            None => {
                self.log.error("Could not query duration");
                Err(StreamError::DurationQuery)
            }
        }
    }

    /// Cached duration, refreshed first when unknown or zero.
    pub fn length(&mut self) -> Option<Duration> {
        if !matches!(self.duration, Some(d) if d > Duration::ZERO) {
            let _ = self.refresh_duration();
        }
        self.duration
    }

    pub fn position(&mut self) -> Option<Duration> {
        self.pipeline.as_mut().and_then(|p| p.query_position())
    }

    /// Seek to `seconds`. Failures are reported and leave the state alone;
    /// callers re-query the position to observe the outcome.
    pub fn set_position(&mut self, seconds: f64) -> Result<()> {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Ok(());
        };
        let position = Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or_default();
        pipeline
            .seek(position, SeekFlags::FLUSH_ACCURATE)
            .map_err(|e| {
                let reason = format!("{e:#}");
                self.log.error(&format!("Seek failed: {reason}"));
                StreamError::Seek { position, reason }
            })
    }

    /// Engine reports playing and the stream has not finished. May block.
    pub fn is_playing(&mut self) -> bool {
        self.engine_state() == Some(PipelineState::Playing) && self.state != StreamState::Finished
    }

    /// Engine reports paused and the stream has not finished. May block.
    pub fn is_paused(&mut self) -> bool {
        self.engine_state() == Some(PipelineState::Paused) && self.state != StreamState::Finished
    }

    fn engine_state(&mut self) -> Option<PipelineState> {
        let timeout = self.settings.async_timeout;
        self.pipeline.as_mut().map(|p| p.current_state(timeout))
    }

    /// State the controller last committed to. Never blocks.
    pub fn last_known_state(&self) -> StreamState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == StreamState::Finished
    }

    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle
    }

    pub fn media(&self) -> Option<&MediaLocator> {
        self.media.as_ref()
    }

    pub fn volume_percent(&self) -> f32 {
        (self.volume * 100.0) as f32
    }

    pub fn max_volume_percent(&self) -> f32 {
        (self.max_volume * 100.0) as f32
    }

    pub fn status(&self) -> StreamStatus {
        StreamStatus {
            handle: self.handle.raw(),
            state: self.state,
            volume_percent: self.volume_percent(),
            max_volume_percent: self.max_volume_percent(),
            duration_secs: self.duration.map(|d| d.as_secs_f32()),
            looping: self.looping,
            fading: self.fade.is_some(),
            fade_action: self.fade.as_ref().map(Fade::action),
        }
    }
}

impl<P: Pipeline> Drop for StreamController<P> {
    fn drop(&mut self) {
        self.close();
    }
}

fn percent_to_linear(percent: f32) -> f64 {
    let linear = f64::from(percent) / 100.0;
    if linear.is_nan() {
        0.0
    } else {
        linear.clamp(0.0, 1.0)
    }
}
