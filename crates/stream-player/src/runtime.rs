//! Player runtime: device listing and the tick loop driving a stream host.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use media_pipeline::{NativeEngine, device};
use stream_core::engine::PipelineEngine;
use stream_core::log::{NumberedLogSink, TracingLogSink};
use stream_core::{MediaLocator, StreamHandle, StreamHost, StreamState, StreamStatus};

use crate::config::{PlayRequest, PlayerConfig};

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    for d in device::list_output_devices(&host)? {
        let marker = if d.is_default { "*" } else { " " };
        println!("{marker} {} ({}..{} Hz)", d.name, d.min_rate, d.max_rate);
    }
    Ok(())
}

/// Play every requested file until all streams end or `shutdown` is raised.
pub fn run_play(
    config: PlayerConfig,
    request: PlayRequest,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let engine = NativeEngine::new(config.pipeline.clone());
    let log = Arc::new(NumberedLogSink::new(TracingLogSink));
    let host = StreamHost::new(engine, config.host.clone(), log);
    let mut session = PlaySession::start(host, request)?;
    if let Some(name) = session.host().engine().device_name() {
        tracing::info!(device = %name, streams = session.live_count(), "playing");
    }

    let tick = config.tick();
    let report_every = (REPORT_INTERVAL.as_millis() / tick.as_millis()).max(1) as u64;
    loop {
        if !session.tick(shutdown.load(Ordering::Relaxed)) {
            break;
        }
        if session.ticks() % report_every == 0 {
            session.report()?;
        }
        std::thread::sleep(tick);
    }
    tracing::info!("all streams closed");
    Ok(())
}

/// A set of streams started from one [`PlayRequest`].
///
/// Non-looping streams start fading out once they are within `fade_out`
/// seconds of their end. A shutdown request fades every stream out and
/// closes it.
pub struct PlaySession<E: PipelineEngine> {
    host: StreamHost<E>,
    request: PlayRequest,
    ending: HashSet<StreamHandle>,
    shutting_down: bool,
    ticks: u64,
}

impl<E: PipelineEngine> PlaySession<E> {
    pub fn start(mut host: StreamHost<E>, request: PlayRequest) -> Result<Self> {
        host.initialize()?;
        for path in &request.paths {
            match host.load_stream(MediaLocator::from_path(path)) {
                Ok(handle) => start_stream(&mut host, handle, &request)?,
                Err(e) => tracing::warn!(path = %path.display(), "skipping: {e}"),
            }
        }
        if host.stream_count() == 0 {
            bail!("none of the {} requested files could be loaded", request.paths.len());
        }
        Ok(Self {
            host,
            request,
            ending: HashSet::new(),
            shutting_down: false,
            ticks: 0,
        })
    }

    pub fn host(&self) -> &StreamHost<E> {
        &self.host
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// Streams that have not been closed yet.
    pub fn live_count(&self) -> usize {
        self.statuses()
            .iter()
            .filter(|s| s.state != StreamState::Closed)
            .count()
    }

    pub fn statuses(&self) -> Vec<StreamStatus> {
        self.host
            .handles()
            .into_iter()
            .filter_map(|h| self.host.status(h).ok())
            .collect()
    }

    /// Advance all streams by one tick. Returns `false` once none are left.
    pub fn tick(&mut self, shutdown: bool) -> bool {
        self.ticks += 1;
        if shutdown && !self.shutting_down {
            self.shutting_down = true;
            tracing::info!(fade_out = self.request.fade_out, "shutting down");
            for handle in self.host.handles() {
                let _ = self.host.fade_then_close(handle, 0.0, self.request.fade_out);
            }
        }

        for handle in self.host.handles() {
            if self.host.is_finished(handle).unwrap_or(false) {
                let _ = self.host.close_stream(handle);
                continue;
            }
            if !self.shutting_down && !self.request.looping && !self.ending.contains(&handle) {
                self.fade_out_near_end(handle);
            }
        }

        self.host.update_all();
        let registered: HashSet<StreamHandle> = self.host.handles().into_iter().collect();
        self.ending.retain(|h| registered.contains(h));
        self.live_count() > 0
    }

    fn fade_out_near_end(&mut self, handle: StreamHandle) {
        let (Ok(length), Ok(position)) = (
            self.host.get_length(handle),
            self.host.get_position(handle),
        ) else {
            return;
        };
        if length <= 0.0 || position < 0.0 {
            return;
        }
        if length - position <= self.request.fade_out {
            tracing::debug!(handle = handle.raw(), position, length, "fading out before end");
            let _ = self.host.fade_then_close(handle, 0.0, self.request.fade_out);
            self.ending.insert(handle);
        }
    }

    /// Print one status line per stream.
    pub fn report(&mut self) -> Result<()> {
        for handle in self.host.handles() {
            let status = self.host.status(handle)?;
            let position = self.host.get_position(handle)?;
            if self.request.json {
                let mut line = serde_json::to_value(&status)?;
                line["position_secs"] = serde_json::json!(position);
                println!("{line}");
            } else {
                tracing::info!(
                    handle = status.handle,
                    state = ?status.state,
                    position,
                    length = ?status.duration_secs,
                    volume = status.volume_percent,
                    fading = status.fading,
                    "stream"
                );
            }
        }
        Ok(())
    }
}

fn start_stream<E: PipelineEngine>(
    host: &mut StreamHost<E>,
    handle: StreamHandle,
    request: &PlayRequest,
) -> Result<()> {
    host.set_max_volume(handle, request.max_volume)?;
    if request.fade_in > 0.0 {
        host.set_volume(handle, 0.0)?;
        host.fade(handle, request.volume, request.fade_in)?;
    } else {
        host.set_volume(handle, request.volume)?;
    }
    host.play_looped(handle, request.looping)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::path::PathBuf;
    use std::rc::Rc;

    use stream_core::config::StreamHostConfig;
    use stream_core::engine::{BusMessage, Pipeline, PipelineState, SeekFlags, StateChange};
    use stream_core::log::tracing_sink;

    /// Engine whose pipelines share one playhead and one end-of-stream switch.
    #[derive(Default)]
    struct StubEngine {
        position: Rc<Cell<Duration>>,
        eos: Rc<Cell<bool>>,
        reject: Option<&'static str>,
    }

    impl PipelineEngine for StubEngine {
        type Pipeline = StubPipeline;

        fn initialize(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn build_pipeline(&self, media: &MediaLocator) -> anyhow::Result<StubPipeline> {
            if self.reject.is_some_and(|name| media.as_uri().ends_with(name)) {
                anyhow::bail!("unsupported media");
            }
            Ok(StubPipeline {
                state: PipelineState::Null,
                position: self.position.clone(),
                eos: self.eos.clone(),
            })
        }
    }

    struct StubPipeline {
        state: PipelineState,
        position: Rc<Cell<Duration>>,
        eos: Rc<Cell<bool>>,
    }

    impl Pipeline for StubPipeline {
        fn set_state(&mut self, state: PipelineState) -> StateChange {
            self.state = state;
            StateChange::Success
        }

        fn wait_async_done(&mut self, _timeout: Option<Duration>) -> bool {
            true
        }

        fn current_state(&mut self, _timeout: Option<Duration>) -> PipelineState {
            self.state
        }

        fn query_duration(&mut self) -> Option<Duration> {
            Some(Duration::from_secs(10))
        }

        fn query_position(&mut self) -> Option<Duration> {
            Some(self.position.get())
        }

        fn seek(&mut self, position: Duration, _flags: SeekFlags) -> anyhow::Result<()> {
            self.position.set(position);
            Ok(())
        }

        fn set_volume(&mut self, _gain: f64) {}

        fn pop_message(&mut self) -> Option<BusMessage> {
            self.eos.get().then_some(BusMessage::EndOfStream)
        }
    }

    fn request(paths: &[&str], looping: bool) -> PlayRequest {
        PlayRequest {
            paths: paths.iter().map(PathBuf::from).collect(),
            looping,
            volume: 80.0,
            max_volume: 50.0,
            fade_in: 0.0,
            fade_out: 0.0,
            json: false,
        }
    }

    fn session(engine: StubEngine, request: PlayRequest) -> PlaySession<StubEngine> {
        let host = StreamHost::new(engine, StreamHostConfig::default(), tracing_sink());
        PlaySession::start(host, request).unwrap()
    }

    #[test]
    fn start_loads_and_plays_every_path() {
        let s = session(StubEngine::default(), request(&["/a.wav", "/b.wav"], false));
        let statuses = s.statuses();
        assert_eq!(statuses.len(), 2);
        for status in statuses {
            assert_eq!(status.state, StreamState::Playing);
            assert_eq!(status.volume_percent, 80.0);
            assert_eq!(status.max_volume_percent, 50.0);
        }
    }

    #[test]
    fn unloadable_paths_are_skipped() {
        let engine = StubEngine {
            reject: Some("bad.wav"),
            ..StubEngine::default()
        };
        let s = session(engine, request(&["/bad.wav", "/good.wav"], false));
        assert_eq!(s.live_count(), 1);
    }

    #[test]
    fn start_fails_when_nothing_loads() {
        let engine = StubEngine {
            reject: Some(".wav"),
            ..StubEngine::default()
        };
        let host = StreamHost::new(engine, StreamHostConfig::default(), tracing_sink());
        assert!(PlaySession::start(host, request(&["/a.wav"], false)).is_err());
    }

    #[test]
    fn fade_in_starts_from_silence() {
        let mut req = request(&["/a.wav"], false);
        req.fade_in = 5.0;
        let s = session(StubEngine::default(), req);
        let status = &s.statuses()[0];
        assert!(status.fading);
        assert!(status.volume_percent < 1.0);
    }

    #[test]
    fn shutdown_closes_every_stream() {
        let mut s = session(StubEngine::default(), request(&["/a.wav", "/b.wav"], true));
        assert!(s.tick(false));
        assert!(!s.tick(true));
        assert!(s.is_shutting_down());
        assert_eq!(s.host().stream_count(), 0);
    }

    #[test]
    fn finished_streams_are_closed() {
        let engine = StubEngine::default();
        let eos = engine.eos.clone();
        let mut s = session(engine, request(&["/a.wav"], false));
        eos.set(true);
        assert!(s.tick(false));
        assert_eq!(s.statuses()[0].state, StreamState::Finished);
        assert!(!s.tick(false));
    }

    #[test]
    fn non_looping_stream_fades_out_at_the_end() {
        let engine = StubEngine::default();
        let position = engine.position.clone();
        let mut s = session(engine, request(&["/a.wav"], false));
        assert!(s.tick(false));
        position.set(Duration::from_secs(10));
        assert!(!s.tick(false));
    }

    #[test]
    fn looping_stream_keeps_playing_at_the_end() {
        let engine = StubEngine::default();
        let position = engine.position.clone();
        let mut s = session(engine, request(&["/a.wav"], true));
        position.set(Duration::from_secs(10));
        assert!(s.tick(false));
        assert_eq!(s.statuses()[0].state, StreamState::Playing);
    }
}
