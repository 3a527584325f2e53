//! Stream lifecycle control over an external media pipeline engine.
//!
//! A [`host::StreamHost`] multiplexes many playback streams behind integer
//! handles drawn from a bounded [`pool::HandlePool`]. Each stream is driven by
//! a [`controller::StreamController`] that owns one engine pipeline, tracks
//! the logical playback state, runs the volume [`fade`] engine, and drains
//! engine status messages through the [`pump`].
//!
//! There is no internal threading. The host calls `update` on every live
//! stream once per tick; `load`, `play` and the authoritative state queries
//! may block the calling thread while the engine completes a transition.

pub mod clock;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod fade;
pub mod host;
pub mod log;
pub mod media;
pub mod pool;
pub mod pump;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Result, StreamError};
pub use host::StreamHost;
pub use media::MediaLocator;
pub use pool::StreamHandle;
pub use stream_types::{FadeAction, StreamState, StreamStatus};
