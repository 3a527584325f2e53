//! Error taxonomy for stream control.
//!
//! None of these are fatal to the process. Operations that fail leave the
//! affected stream in a safe state and report the failure to the caller.

use std::time::Duration;

use thiserror::Error;

use crate::pool::StreamHandle;

#[derive(Error, Debug)]
pub enum StreamError {
    /// The engine could not build a playback graph for the media.
    #[error("could not create pipeline for {locator}: {reason}")]
    PipelineCreate { locator: String, reason: String },

    /// The engine rejected a seek. Stream state is unchanged.
    #[error("seek to {position:?} failed: {reason}")]
    Seek { position: Duration, reason: String },

    /// The engine could not report a duration.
    #[error("could not query duration")]
    DurationQuery,

    /// Every handle in the pool is in use.
    #[error("identifier pool exhausted ({capacity} handles in use)")]
    PoolExhausted { capacity: usize },

    /// No stream is registered under the handle.
    #[error("no stream registered for handle {0}")]
    HandleNotFound(StreamHandle),

    /// A stream operation was attempted before `initialize`.
    #[error("stream host is not initialized")]
    NotInitialized,

    /// The engine runtime failed to initialize.
    #[error("engine initialization failed: {0}")]
    EngineInit(String),
}

pub type Result<T> = std::result::Result<T, StreamError>;
