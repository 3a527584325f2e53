//! Native pipeline engine for `stream-core`.
//!
//! Each pipeline runs one decode worker (Symphonia decode plus Rubato
//! resampling to the device rate) feeding a bounded queue, drained by a CPAL
//! output callback that applies gain and honors pause.

pub mod config;
pub mod decode;
pub mod device;
pub mod pipeline;
pub mod playback;
pub mod queue;
pub mod resample;

pub use config::PipelineConfig;
pub use pipeline::{NativeEngine, NativePipeline};
