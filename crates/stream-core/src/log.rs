//! Error reporting capability injected into the host.
//!
//! Stream failures that the caller cannot observe through return values
//! (pipeline errors surfacing on the message bus, failed seeks during a tick)
//! are reported as free-text strings to a [`LogSink`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub trait LogSink: Send + Sync {
    fn error(&self, message: &str);
}

pub type SharedLogSink = Arc<dyn LogSink>;

/// Forwards errors to `tracing` at error level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn error(&self, message: &str) {
        tracing::error!(target: "stream_core", "{message}");
    }
}

/// Prefixes each error with a running count, e.g. `"3) Seek failed"`.
pub struct NumberedLogSink<S> {
    inner: S,
    count: AtomicU64,
}

impl<S: LogSink> NumberedLogSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            count: AtomicU64::new(0),
        }
    }

    /// Number of errors reported so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl<S: LogSink> LogSink for NumberedLogSink<S> {
    fn error(&self, message: &str) {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.error(&format!("{n}) {message}"));
    }
}

/// Default sink used when the caller does not supply one.
pub fn tracing_sink() -> SharedLogSink {
    Arc::new(TracingLogSink)
}
