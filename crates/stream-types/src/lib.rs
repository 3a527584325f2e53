use serde::{Deserialize, Serialize};

/// Logical lifecycle state of one stream.
///
/// `Stopped` is a paused stream that has been rewound to the start.
/// `Finished` means playback reached the end without looping; the pipeline
/// is still allocated until the stream is closed.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// No pipeline has been built yet.
    #[default]
    Unloaded,
    /// The pipeline is being built and prerolled.
    Loading,
    /// Prerolled and holding position.
    Paused,
    /// Reset to the start and idle.
    Stopped,
    /// Rendering.
    Playing,
    /// End of stream reached with looping disabled.
    Finished,
    /// Resources released. Terminal.
    Closed,
}

impl StreamState {
    /// `true` for states in which per-tick processing still runs.
    pub fn is_running(self) -> bool {
        !matches!(self, StreamState::Unloaded | StreamState::Closed)
    }
}

/// Action applied once a volume fade reaches its target.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FadeAction {
    /// Keep playing at the target volume.
    #[default]
    None,
    /// Pause the stream.
    Pause,
    /// Close the stream and release its pipeline.
    Close,
}

/// Cheap, non-blocking snapshot of one stream.
///
/// The state here is the last state the controller committed to, not a fresh
/// engine query.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamStatus {
    /// Caller-visible handle.
    pub handle: u32,
    /// Last known lifecycle state.
    pub state: StreamState,
    /// Linear volume in percent (0..100).
    pub volume_percent: f32,
    /// Volume ceiling in percent (0..100).
    pub max_volume_percent: f32,
    /// Cached media length in seconds, when known.
    pub duration_secs: Option<f32>,
    /// Whether end of stream restarts playback.
    pub looping: bool,
    /// Whether a fade is in progress.
    pub fading: bool,
    /// Action queued behind the running fade.
    pub fade_action: Option<FadeAction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_excludes_unloaded_and_closed() {
        assert!(!StreamState::Unloaded.is_running());
        assert!(!StreamState::Closed.is_running());
        assert!(StreamState::Paused.is_running());
        assert!(StreamState::Stopped.is_running());
        assert!(StreamState::Finished.is_running());
    }

    #[test]
    fn status_serializes_snake_case_state() {
        let status = StreamStatus {
            handle: 3,
            state: StreamState::Playing,
            volume_percent: 50.0,
            max_volume_percent: 100.0,
            duration_secs: Some(2.5),
            looping: true,
            fading: true,
            fade_action: Some(FadeAction::Close),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "playing");
        assert_eq!(json["fade_action"], "close");
        assert_eq!(json["handle"], 3);
    }
}
