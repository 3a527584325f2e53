//! Time-driven linear volume fades.
//!
//! A fade is a pure function of elapsed wall-clock time: the controller asks
//! for a [`FadeStep`] once per tick and applies the returned volume. Starting a
//! new fade replaces the old one; fades never stack or blend.

use std::time::{Duration, Instant};

use stream_types::FadeAction;

/// Stopwatch measuring time since a fade started.
#[derive(Clone, Copy, Debug, Default)]
pub struct FadeTimer {
    started: Option<Instant>,
}

impl FadeTimer {
    pub fn start(&mut self, now: Instant) {
        self.started = Some(now);
    }

    pub fn stop(&mut self) {
        self.started = None;
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /// Time since `start`, or zero when stopped.
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.started
            .map(|s| now.saturating_duration_since(s))
            .unwrap_or_default()
    }
}

/// Outcome of one fade step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FadeStep {
    /// Still ramping; apply this volume.
    Ramp(f64),
    /// Reached the target. Apply `volume` exactly, then run `action`.
    Complete { volume: f64, action: FadeAction },
}

#[derive(Clone, Debug)]
pub struct Fade {
    start_volume: f64,
    target_volume: f64,
    seconds: f64,
    action: FadeAction,
    timer: FadeTimer,
}

impl Fade {
    /// Begin a fade from `start_volume` to `target_volume` (both linear,
    /// 0.0..=1.0) lasting `seconds`.
    ///
    /// Non-positive or non-finite durations complete on the first step.
    pub fn start(
        start_volume: f64,
        target_volume: f64,
        seconds: f64,
        action: FadeAction,
        now: Instant,
    ) -> Self {
        let mut timer = FadeTimer::default();
        timer.start(now);
        Self {
            start_volume,
            target_volume,
            seconds,
            action,
            timer,
        }
    }

    pub fn step(&mut self, now: Instant) -> FadeStep {
        let elapsed = self.timer.elapsed(now).as_secs_f64();
        match interpolate(self.start_volume, self.target_volume, elapsed, self.seconds) {
            Some(volume) => FadeStep::Ramp(volume),
            None => {
                self.timer.stop();
                FadeStep::Complete {
                    volume: self.target_volume,
                    action: self.action,
                }
            }
        }
    }

    pub fn action(&self) -> FadeAction {
        self.action
    }

    /// Drop a pending post-fade pause, keeping the ramp itself.
    pub fn cancel_pause(&mut self) {
        if self.action == FadeAction::Pause {
            self.action = FadeAction::None;
        }
    }
}

/// Linear volume at `elapsed` seconds into a fade of `duration` seconds.
///
/// Returns `None` once the fade is over, including when `duration` is zero,
/// negative or NaN.
pub fn interpolate(start: f64, target: f64, elapsed: f64, duration: f64) -> Option<f64> {
    if !(duration > 0.0) || !(elapsed < duration) {
        return None;
    }
    let t = (elapsed / duration).max(0.0);
    Some(start + (target - start) * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn interpolation_is_linear() {
        assert!(approx(interpolate(0.0, 1.0, 0.0, 2.0).unwrap(), 0.0));
        assert!(approx(interpolate(0.0, 1.0, 1.0, 2.0).unwrap(), 0.5));
        assert!(approx(interpolate(1.0, 0.2, 0.5, 1.0).unwrap(), 0.6));
        assert_eq!(interpolate(0.0, 1.0, 2.0, 2.0), None);
    }

    #[test]
    fn zero_or_negative_duration_completes_immediately() {
        assert_eq!(interpolate(0.3, 0.9, 0.0, 0.0), None);
        assert_eq!(interpolate(0.3, 0.9, 0.0, -1.0), None);
        assert_eq!(interpolate(0.3, 0.9, 0.0, f64::NAN), None);
    }

    #[test]
    fn fade_samples_follow_interpolation_law() {
        let t0 = Instant::now();
        let mut fade = Fade::start(0.0, 1.0, 2.0, FadeAction::None, t0);

        assert_eq!(fade.step(t0), FadeStep::Ramp(0.0));
        match fade.step(t0 + Duration::from_secs(1)) {
            FadeStep::Ramp(v) => assert!(approx(v, 0.5)),
            other => panic!("expected ramp, got {other:?}"),
        }
        assert_eq!(
            fade.step(t0 + Duration::from_secs(2)),
            FadeStep::Complete {
                volume: 1.0,
                action: FadeAction::None
            }
        );
    }

    #[test]
    fn completion_carries_action_and_stops_timer() {
        let t0 = Instant::now();
        let mut fade = Fade::start(0.8, 0.0, 1.0, FadeAction::Close, t0);
        let step = fade.step(t0 + Duration::from_millis(1500));
        assert_eq!(
            step,
            FadeStep::Complete {
                volume: 0.0,
                action: FadeAction::Close
            }
        );
        assert!(!fade.timer.is_running());
    }

    #[test]
    fn cancel_pause_keeps_close() {
        let t0 = Instant::now();
        let mut pausing = Fade::start(1.0, 0.0, 1.0, FadeAction::Pause, t0);
        pausing.cancel_pause();
        assert_eq!(pausing.action(), FadeAction::None);

        let mut closing = Fade::start(1.0, 0.0, 1.0, FadeAction::Close, t0);
        closing.cancel_pause();
        assert_eq!(closing.action(), FadeAction::Close);
    }

    #[test]
    fn stopped_timer_reports_zero() {
        let mut timer = FadeTimer::default();
        let now = Instant::now();
        assert_eq!(timer.elapsed(now), Duration::ZERO);
        timer.start(now);
        assert_eq!(
            timer.elapsed(now + Duration::from_millis(250)),
            Duration::from_millis(250)
        );
        timer.stop();
        assert_eq!(timer.elapsed(now + Duration::from_secs(9)), Duration::ZERO);
    }
}
