//! Scripted engine, clock and log sink for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};

use crate::clock::Clock;
use crate::engine::{BusMessage, Pipeline, PipelineEngine, PipelineState, SeekFlags, StateChange};
use crate::log::LogSink;
use crate::media::MediaLocator;

/// Everything a mock pipeline was asked to do, plus its scripted answers.
#[derive(Debug)]
pub(crate) struct PipelineProbe {
    pub state: PipelineState,
    pub state_requests: Vec<PipelineState>,
    pub volumes: Vec<f64>,
    pub seeks: Vec<(Duration, SeekFlags)>,
    pub messages: VecDeque<BusMessage>,
    pub duration: Option<Duration>,
    pub position: Option<Duration>,
    pub duration_queries: usize,
    pub state_queries: usize,
    pub async_waits: usize,
    pub releases: usize,
    pub fail_seeks: bool,
    pub refuse_states: bool,
}

impl Default for PipelineProbe {
    fn default() -> Self {
        Self {
            state: PipelineState::Null,
            state_requests: Vec::new(),
            volumes: Vec::new(),
            seeks: Vec::new(),
            messages: VecDeque::new(),
            duration: None,
            position: Some(Duration::ZERO),
            duration_queries: 0,
            state_queries: 0,
            async_waits: 0,
            releases: 0,
            fail_seeks: false,
            refuse_states: false,
        }
    }
}

pub(crate) type Probe = Rc<RefCell<PipelineProbe>>;

pub(crate) struct MockPipeline {
    probe: Probe,
}

impl Pipeline for MockPipeline {
    fn set_state(&mut self, state: PipelineState) -> StateChange {
        let mut p = self.probe.borrow_mut();
        p.state_requests.push(state);
        if p.refuse_states {
            return StateChange::Failure;
        }
        let previous = p.state;
        p.state = state;
        if previous == PipelineState::Null && state != PipelineState::Null {
            StateChange::Async
        } else {
            StateChange::Success
        }
    }

    fn wait_async_done(&mut self, _timeout: Option<Duration>) -> bool {
        self.probe.borrow_mut().async_waits += 1;
        true
    }

    fn current_state(&mut self, _timeout: Option<Duration>) -> PipelineState {
        let mut p = self.probe.borrow_mut();
        p.state_queries += 1;
        p.state
    }

    fn query_duration(&mut self) -> Option<Duration> {
        let mut p = self.probe.borrow_mut();
        p.duration_queries += 1;
        p.duration
    }

    fn query_position(&mut self) -> Option<Duration> {
        self.probe.borrow().position
    }

    fn seek(&mut self, position: Duration, flags: SeekFlags) -> Result<()> {
        let mut p = self.probe.borrow_mut();
        p.seeks.push((position, flags));
        if p.fail_seeks {
            return Err(anyhow!("seek rejected"));
        }
        p.position = Some(position);
        Ok(())
    }

    fn set_volume(&mut self, gain: f64) {
        self.probe.borrow_mut().volumes.push(gain);
    }

    fn pop_message(&mut self) -> Option<BusMessage> {
        self.probe.borrow_mut().messages.pop_front()
    }
}

impl Drop for MockPipeline {
    fn drop(&mut self) {
        self.probe.borrow_mut().releases += 1;
    }
}

/// Engine handing out [`MockPipeline`]s and keeping their probes.
#[derive(Default)]
pub(crate) struct MockEngine {
    pub probes: RefCell<Vec<Probe>>,
    pub duration: Option<Duration>,
    pub fail_builds: Cell<bool>,
    pub fail_init: bool,
    pub initialized: usize,
}

impl MockEngine {
    pub fn with_duration(duration: Duration) -> Self {
        Self {
            duration: Some(duration),
            ..Self::default()
        }
    }

    pub fn probe(&self, index: usize) -> Probe {
        self.probes.borrow()[index].clone()
    }

    pub fn last_probe(&self) -> Probe {
        self.probes
            .borrow()
            .last()
            .cloned()
            .expect("no pipeline built yet")
    }
}

impl PipelineEngine for MockEngine {
    type Pipeline = MockPipeline;

    fn initialize(&mut self) -> Result<()> {
        if self.fail_init {
            return Err(anyhow!("plugin registry unavailable"));
        }
        self.initialized += 1;
        Ok(())
    }

    fn build_pipeline(&self, media: &MediaLocator) -> Result<MockPipeline> {
        if self.fail_builds.get() {
            return Err(anyhow!("no decoder available for {media}"));
        }
        let probe = Rc::new(RefCell::new(PipelineProbe {
            duration: self.duration,
            ..PipelineProbe::default()
        }));
        self.probes.borrow_mut().push(probe.clone());
        Ok(MockPipeline { probe })
    }
}

/// Clock advanced by hand.
#[derive(Clone)]
pub(crate) struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

/// Log sink keeping every message.
#[derive(Clone, Default)]
pub(crate) struct RecordingLogSink {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingLogSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl LogSink for RecordingLogSink {
    fn error(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
