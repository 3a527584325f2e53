//! Handle-based facade over many stream controllers.
//!
//! Every operation addresses a stream by [`StreamHandle`]. Unknown or stale
//! handles yield [`StreamError::HandleNotFound`]; nothing here panics.

use stream_types::{FadeAction, StreamStatus};

use crate::clock::{SharedClock, system_clock};
use crate::config::StreamHostConfig;
use crate::controller::StreamController;
use crate::engine::PipelineEngine;
use crate::error::{Result, StreamError};
use crate::log::SharedLogSink;
use crate::media::MediaLocator;
use crate::pool::{HandlePool, StreamHandle};
use crate::registry::StreamRegistry;

/// Returned by [`StreamHost::get_length`] and [`StreamHost::get_position`]
/// when the engine cannot tell.
pub const UNKNOWN_LENGTH: f32 = -1.0;

pub struct StreamHost<E: PipelineEngine> {
    engine: E,
    config: StreamHostConfig,
    log: SharedLogSink,
    clock: SharedClock,
    pool: Option<HandlePool>,
    streams: StreamRegistry<StreamController<E::Pipeline>>,
    global_max_volume: Option<f32>,
}

impl<E: PipelineEngine> StreamHost<E> {
    pub fn new(engine: E, config: StreamHostConfig, log: SharedLogSink) -> Self {
        Self::with_clock(engine, config, log, system_clock())
    }

    pub fn with_clock(
        engine: E,
        config: StreamHostConfig,
        log: SharedLogSink,
        clock: SharedClock,
    ) -> Self {
        Self {
            engine,
            config,
            log,
            clock,
            pool: None,
            streams: StreamRegistry::new(),
            global_max_volume: None,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &StreamHostConfig {
        &self.config
    }

    /// Initialize the engine runtime and fill the identifier pool.
    /// Repeated calls are no-ops.
    pub fn initialize(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Ok(());
        }
        if let Err(e) = self.engine.initialize() {
            let err = StreamError::EngineInit(format!("{e:#}"));
            self.log.error(&err.to_string());
            return Err(err);
        }
        self.pool = Some(HandlePool::new(self.config.capacity));
        tracing::info!(capacity = self.config.capacity, "stream host initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.is_some()
    }

    /// Load `media` into a new paused stream. Blocks while the engine
    /// prerolls.
    ///
    /// A failed load returns its handle to the pool.
    pub fn load_stream(&mut self, media: impl Into<MediaLocator>) -> Result<StreamHandle> {
        let media = media.into();
        let pool = self.pool.as_mut().ok_or(StreamError::NotInitialized)?;
        let handle = pool.allocate().inspect_err(|e| self.log.error(&e.to_string()))?;

        let mut stream = StreamController::new(
            handle,
            self.config.controller_settings(),
            self.log.clone(),
            self.clock.clone(),
        );
        if let Some(max) = self.global_max_volume {
            stream.set_max_volume(max);
        }
        if let Err(e) = stream.load(&self.engine, &media) {
            pool.release(handle);
            return Err(e);
        }

        self.streams.insert(handle, stream);
        tracing::debug!(handle = handle.raw(), media = %media, "stream registered");
        Ok(handle)
    }

    /// Close one stream and release its pipeline.
    ///
    /// With handle recycling on, the handle is gone once this returns, so a
    /// second call fails with [`StreamError::HandleNotFound`]. Without
    /// recycling the closed stream stays registered and repeated calls are
    /// `Ok`.
    pub fn close_stream(&mut self, handle: StreamHandle) -> Result<()> {
        self.streams.get_mut(handle)?.close();
        self.reap(handle);
        Ok(())
    }

    pub fn close_all(&mut self) {
        self.streams.for_each_mut(|_, stream| stream.close());
        self.reap_closed();
    }

    /// Advance one stream by one tick.
    pub fn update(&mut self, handle: StreamHandle) -> Result<()> {
        self.streams.get_mut(handle)?.update();
        self.reap(handle);
        Ok(())
    }

    /// Advance every registered stream by one tick, in load order.
    pub fn update_all(&mut self) {
        self.streams.for_each_mut(|_, stream| stream.update());
        self.reap_closed();
    }

    fn reap(&mut self, handle: StreamHandle) {
        if !self.config.recycle_handles {
            return;
        }
        let closed = self.streams.get(handle).is_ok_and(|s| s.is_closed());
        if closed && self.streams.remove(handle).is_some() {
            self.release_handle(handle);
        }
    }

    fn reap_closed(&mut self) {
        if !self.config.recycle_handles {
            return;
        }
        for (handle, _) in self.streams.drain_where(|s| s.is_closed()) {
            self.release_handle(handle);
        }
    }

    fn release_handle(&mut self, handle: StreamHandle) {
        if let Some(pool) = self.pool.as_mut() {
            pool.release(handle);
        }
        tracing::debug!(handle = handle.raw(), "stream handle recycled");
    }

    pub fn play(&mut self, handle: StreamHandle) -> Result<()> {
        self.streams.get_mut(handle)?.play(None);
        Ok(())
    }

    pub fn play_looped(&mut self, handle: StreamHandle, looping: bool) -> Result<()> {
        self.streams.get_mut(handle)?.play(Some(looping));
        Ok(())
    }

    pub fn pause(&mut self, handle: StreamHandle) -> Result<()> {
        self.streams.get_mut(handle)?.pause();
        Ok(())
    }

    pub fn stop(&mut self, handle: StreamHandle) -> Result<()> {
        self.streams.get_mut(handle)?.stop();
        Ok(())
    }

    pub fn set_volume(&mut self, handle: StreamHandle, percent: f32) -> Result<()> {
        self.streams.get_mut(handle)?.set_volume(percent);
        Ok(())
    }

    pub fn set_max_volume(&mut self, handle: StreamHandle, percent: f32) -> Result<()> {
        self.streams.get_mut(handle)?.set_max_volume(percent);
        Ok(())
    }

    /// Cap every live stream, and every stream loaded later, at `percent`.
    pub fn set_global_volume(&mut self, percent: f32) {
        self.global_max_volume = Some(percent);
        self.streams
            .for_each_mut(|_, stream| stream.set_max_volume(percent));
    }

    pub fn fade(&mut self, handle: StreamHandle, target_percent: f32, seconds: f32) -> Result<()> {
        self.start_fade(handle, target_percent, seconds, FadeAction::None)
    }

    pub fn fade_then_pause(
        &mut self,
        handle: StreamHandle,
        target_percent: f32,
        seconds: f32,
    ) -> Result<()> {
        self.start_fade(handle, target_percent, seconds, FadeAction::Pause)
    }

    pub fn fade_then_close(
        &mut self,
        handle: StreamHandle,
        target_percent: f32,
        seconds: f32,
    ) -> Result<()> {
        self.start_fade(handle, target_percent, seconds, FadeAction::Close)
    }

    fn start_fade(
        &mut self,
        handle: StreamHandle,
        target_percent: f32,
        seconds: f32,
        action: FadeAction,
    ) -> Result<()> {
        self.streams
            .get_mut(handle)?
            .fade(target_percent, seconds, action);
        Ok(())
    }

    /// Media length in seconds, or [`UNKNOWN_LENGTH`].
    pub fn get_length(&mut self, handle: StreamHandle) -> Result<f32> {
        Ok(self
            .streams
            .get_mut(handle)?
            .length()
            .map_or(UNKNOWN_LENGTH, |d| d.as_secs_f32()))
    }

    /// Playback position in seconds, or [`UNKNOWN_LENGTH`].
    pub fn get_position(&mut self, handle: StreamHandle) -> Result<f32> {
        Ok(self
            .streams
            .get_mut(handle)?
            .position()
            .map_or(UNKNOWN_LENGTH, |d| d.as_secs_f32()))
    }

    pub fn set_position(&mut self, handle: StreamHandle, seconds: f32) -> Result<()> {
        self.streams
            .get_mut(handle)?
            .set_position(f64::from(seconds))
    }

    /// Authoritative; may block while the engine settles.
    pub fn is_playing(&mut self, handle: StreamHandle) -> Result<bool> {
        Ok(self.streams.get_mut(handle)?.is_playing())
    }

    /// Authoritative; may block while the engine settles.
    pub fn is_paused(&mut self, handle: StreamHandle) -> Result<bool> {
        Ok(self.streams.get_mut(handle)?.is_paused())
    }

    pub fn is_finished(&self, handle: StreamHandle) -> Result<bool> {
        Ok(self.streams.get(handle)?.is_finished())
    }

    pub fn set_loop(&mut self, handle: StreamHandle, looping: bool) -> Result<()> {
        self.streams.get_mut(handle)?.set_loop(looping);
        Ok(())
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Handles in load order.
    pub fn handles(&self) -> Vec<StreamHandle> {
        self.streams.handles().to_vec()
    }

    /// Non-blocking snapshot of a stream.
    pub fn status(&self, handle: StreamHandle) -> Result<StreamStatus> {
        Ok(self.streams.get(handle)?.status())
    }

    /// Load and play `media`, closing it automatically once its length has
    /// elapsed. Volume ramps to full over that span.
    pub fn play_one_shot(&mut self, media: impl Into<MediaLocator>) -> Result<StreamHandle> {
        let handle = self.load_stream(media)?;
        let length = self.get_length(handle)?;
        let stream = self.streams.get_mut(handle)?;
        stream.play(Some(false));
        stream.fade(100.0, length.max(0.0), FadeAction::Close);
        Ok(handle)
    }
}
