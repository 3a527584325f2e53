//! Boundary to the external media pipeline engine.
//!
//! The engine owns demuxing, decoding and rendering. The control layer only
//! builds pipelines, moves them between states, queries timing, seeks, sets
//! gain, and pops status messages. Dropping a [`Pipeline`] releases everything
//! it owns.

use std::time::Duration;

use anyhow::Result;

use crate::media::MediaLocator;

/// Pipeline states as reported by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Idle; no resources prerolled.
    Null,
    /// Prerolled, not advancing.
    Paused,
    /// Rendering.
    Playing,
}

/// Result of a state change request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateChange {
    /// The pipeline is already in the requested state.
    Success,
    /// The change completes later and is confirmed by [`BusMessage::AsyncDone`].
    Async,
    /// The engine refused the change.
    Failure,
}

/// Seek behavior flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeekFlags {
    /// Discard buffered data so playback resumes from the new position at once.
    pub flush: bool,
    /// Land exactly on the requested position instead of the nearest keyframe.
    pub accurate: bool,
}

impl SeekFlags {
    pub const FLUSH: SeekFlags = SeekFlags {
        flush: true,
        accurate: false,
    };
    pub const FLUSH_ACCURATE: SeekFlags = SeekFlags {
        flush: true,
        accurate: true,
    };
}

/// Status notification popped from a pipeline's message queue.
#[derive(Clone, Debug, PartialEq)]
pub enum BusMessage {
    /// Asynchronous pipeline failure.
    Error {
        message: String,
        debug: Option<String>,
    },
    /// The media duration may have changed; re-query it.
    DurationChanged,
    StateChanged {
        old: PipelineState,
        new: PipelineState,
    },
    EndOfStream,
    /// A pending asynchronous state change finished.
    AsyncDone,
    /// Any notification kind the controller does not act on.
    Other(String),
}

/// Factory for pipelines. One engine serves every stream of a host.
pub trait PipelineEngine {
    type Pipeline: Pipeline;

    /// Prepare the engine runtime. Called once by the host before any stream
    /// is loaded; calling it again must be harmless.
    fn initialize(&mut self) -> Result<()>;

    /// Build a playback graph for `media`. The returned pipeline is in
    /// [`PipelineState::Null`].
    fn build_pipeline(&self, media: &MediaLocator) -> Result<Self::Pipeline>;
}

/// One playback graph, exclusively owned by a stream controller.
pub trait Pipeline {
    /// Upper bound of the gain accepted by [`Pipeline::set_volume`].
    const MAX_GAIN: f64 = 1.0;

    fn set_state(&mut self, state: PipelineState) -> StateChange;

    /// Block until a pending asynchronous state change completes.
    ///
    /// `None` waits without limit. Returns `false` on timeout.
    fn wait_async_done(&mut self, timeout: Option<Duration>) -> bool;

    /// Authoritative current state.
    ///
    /// May block until a pending transition resolves (or `timeout` elapses).
    fn current_state(&mut self, timeout: Option<Duration>) -> PipelineState;

    fn query_duration(&mut self) -> Option<Duration>;

    fn query_position(&mut self) -> Option<Duration>;

    fn seek(&mut self, position: Duration, flags: SeekFlags) -> Result<()>;

    /// Apply a linear output gain in `0.0..=MAX_GAIN`.
    fn set_volume(&mut self, gain: f64);

    /// Pop the next pending status message without blocking.
    fn pop_message(&mut self) -> Option<BusMessage>;
}
