//! Mapping of pipeline status messages to controller reactions.
//!
//! The controller pops messages from its pipeline during `update` and feeds
//! each one through [`react`]. Pipeline errors are reported, never converted
//! into a terminal state; callers that need a hard failure signal must poll
//! the stream's status themselves.

use crate::engine::BusMessage;

/// What the controller should do in response to one message.
#[derive(Clone, Debug, PartialEq)]
pub enum Reaction {
    /// Report the text through the log sink; state is unchanged.
    ReportError(String),
    /// Re-query and cache the media duration.
    RefreshDuration,
    /// Restart when looping, otherwise mark the stream finished.
    EndOfStream,
    Ignore,
}

pub fn react(message: &BusMessage) -> Reaction {
    match message {
        BusMessage::Error {
            message,
            debug: details,
        } => {
            if let Some(details) = details {
                tracing::debug!(error = %message, details = %details, "pipeline error details");
            }
            Reaction::ReportError(message.clone())
        }
        BusMessage::DurationChanged => Reaction::RefreshDuration,
        BusMessage::EndOfStream => Reaction::EndOfStream,
        BusMessage::StateChanged { old, new } => {
            tracing::trace!(?old, ?new, "pipeline state changed");
            Reaction::Ignore
        }
        BusMessage::AsyncDone | BusMessage::Other(_) => Reaction::Ignore,
    }
}

/// How many messages one tick may consume.
///
/// Defaults to one. Larger budgets drain bursts faster; the fade step still
/// runs before any message of the same tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PumpBudget(usize);

impl PumpBudget {
    pub const SINGLE: PumpBudget = PumpBudget(1);

    pub fn new(per_tick: usize) -> Self {
        Self(per_tick.max(1))
    }

    pub fn per_tick(self) -> usize {
        self.0
    }
}

impl Default for PumpBudget {
    fn default() -> Self {
        Self::SINGLE
    }
}
