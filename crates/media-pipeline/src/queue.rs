//! Bounded queue of interleaved samples between the decode worker and the
//! output callback.
//!
//! The callback side never blocks. The worker side blocks while the queue is
//! full, and is released early by [`SharedAudio::close`] or
//! [`SharedAudio::flush`]. Every flush bumps an epoch counter so the callback
//! can drop samples it already pulled out before the flush.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Thread-safe bounded queue for interleaved `f32` samples.
///
/// Samples are stored interleaved: `frame0[ch0], frame0[ch1], frame1[ch0], ...`.
/// `done` lives under the same mutex as the samples so waiters never miss it.
pub struct SharedAudio {
    channels: usize,
    inner: Mutex<SharedInner>,
    cv: Condvar,
    max_buffered_samples: usize,
    epoch: AtomicU64,
}

struct SharedInner {
    queue: VecDeque<f32>,
    done: bool,
}

/// Queue capacity in samples for `buffer_seconds` of audio.
///
/// Non-finite or non-positive `buffer_seconds` falls back to two seconds.
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        2.0
    };

    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels).max(channels)
}

impl SharedAudio {
    pub fn new(channels: usize, max_buffered_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            inner: Mutex::new(SharedInner {
                queue: VecDeque::new(),
                done: false,
            }),
            cv: Condvar::new(),
            max_buffered_samples: max_buffered_samples.max(channels),
            epoch: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SharedInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn len_frames(&self) -> usize {
        self.lock().queue.len() / self.channels
    }

    /// Whether the producer has reached the end. Buffered samples may remain.
    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    /// `true` once the producer is done and every sample has been taken.
    pub fn is_drained(&self) -> bool {
        let g = self.lock();
        g.done && g.queue.is_empty()
    }

    /// Incremented by every [`flush`](Self::flush) and [`reopen`](Self::reopen).
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Mark the end of the stream and wake all waiters. Idempotent.
    pub fn close(&self) {
        self.lock().done = true;
        self.cv.notify_all();
    }

    /// Discard buffered samples and wake a blocked producer.
    pub fn flush(&self) {
        let mut g = self.lock();
        g.queue.clear();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        drop(g);
        self.cv.notify_all();
    }

    /// Discard buffered samples and accept new ones after a `close`.
    pub fn reopen(&self) {
        let mut g = self.lock();
        g.queue.clear();
        g.done = false;
        self.epoch.fetch_add(1, Ordering::AcqRel);
        drop(g);
        self.cv.notify_all();
    }

    /// Push samples, blocking while the queue is full.
    ///
    /// Returns early, dropping the rest, if the queue is closed or flushed
    /// while waiting.
    pub fn push_interleaved_blocking(&self, samples: &[f32]) {
        let start_epoch = self.epoch();
        let mut offset = 0;

        while offset < samples.len() {
            let mut g = self.lock();

            while g.queue.len() >= self.max_buffered_samples
                && !g.done
                && self.epoch() == start_epoch
            {
                g = self.cv.wait(g).unwrap_or_else(|poisoned| poisoned.into_inner());
            }
            if g.done || self.epoch() != start_epoch {
                return;
            }

            let room = self.max_buffered_samples - g.queue.len();
            let take = room.min(samples.len() - offset);
            g.queue.extend(&samples[offset..offset + take]);
            offset += take;

            drop(g);
            self.cv.notify_all();
        }
    }

    /// Take up to `max_frames` whole frames without blocking.
    pub fn pop_up_to(&self, max_frames: usize) -> Option<Vec<f32>> {
        let mut g = self.lock();

        let available_frames = g.queue.len() / self.channels;
        let take_samples = available_frames.min(max_frames) * self.channels;
        if take_samples == 0 {
            return None;
        }

        let out: Vec<f32> = g.queue.drain(..take_samples).collect();
        drop(g);
        self.cv.notify_all();
        Some(out)
    }

    /// Block until samples are buffered or the producer is done.
    ///
    /// `None` waits without limit. Returns `false` on timeout.
    pub fn wait_ready(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut g = self.lock();
        loop {
            if !g.queue.is_empty() || g.done {
                return true;
            }
            match deadline {
                None => {
                    g = self.cv.wait(g).unwrap_or_else(|poisoned| poisoned.into_inner());
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (ng, _) = self
                        .cv
                        .wait_timeout(g, deadline - now)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    g = ng;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn calc_max_buffered_samples_fallbacks() {
        assert_eq!(calc_max_buffered_samples(48_000, 2, 2.0), 192_000);
        assert_eq!(calc_max_buffered_samples(48_000, 2, -1.0), 192_000);
        assert_eq!(calc_max_buffered_samples(48_000, 2, f32::NAN), 192_000);
        assert_eq!(calc_max_buffered_samples(48_000, 2, f32::INFINITY), 192_000);
    }

    #[test]
    fn pop_empty_returns_none() {
        let q = SharedAudio::new(2, 16);
        assert!(q.pop_up_to(4).is_none());
    }

    #[test]
    fn pop_returns_whole_frames_only() {
        let q = SharedAudio::new(2, 64);
        q.push_interleaved_blocking(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(q.pop_up_to(8).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        assert!(q.pop_up_to(8).is_none());
    }

    #[test]
    fn blocked_push_is_released_by_consumer() {
        let q = Arc::new(SharedAudio::new(1, 4));
        let producer = q.clone();
        let handle = thread::spawn(move || {
            producer.push_interleaved_blocking(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        });

        let mut taken = Vec::new();
        while taken.len() < 6 {
            if let Some(chunk) = q.pop_up_to(2) {
                taken.extend(chunk);
            } else {
                thread::yield_now();
            }
        }
        handle.join().unwrap();
        assert_eq!(taken, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn flush_unblocks_producer_and_bumps_epoch() {
        let q = Arc::new(SharedAudio::new(1, 2));
        q.push_interleaved_blocking(&[1.0, 2.0]);
        let producer = q.clone();
        let handle = thread::spawn(move || {
            producer.push_interleaved_blocking(&[3.0, 4.0, 5.0]);
        });

        let before = q.epoch();
        while !handle.is_finished() {
            q.flush();
            thread::sleep(Duration::from_millis(1));
        }
        handle.join().unwrap();
        assert!(q.epoch() > before);
        assert!(q.len_frames() <= 2);
    }

    #[test]
    fn close_then_reopen_accepts_new_samples() {
        let q = SharedAudio::new(2, 16);
        q.push_interleaved_blocking(&[0.1, 0.2]);
        q.close();
        assert!(q.is_done());
        assert!(!q.is_drained());

        q.push_interleaved_blocking(&[0.3, 0.4]);
        assert_eq!(q.len_frames(), 1);

        q.reopen();
        assert!(!q.is_done());
        assert_eq!(q.len_frames(), 0);
        q.push_interleaved_blocking(&[0.5, 0.6]);
        assert_eq!(q.pop_up_to(1).unwrap(), vec![0.5, 0.6]);
    }

    #[test]
    fn wait_ready_sees_data_from_other_thread() {
        let q = Arc::new(SharedAudio::new(2, 64));
        let producer = q.clone();
        let handle = thread::spawn(move || {
            producer.push_interleaved_blocking(&[1.0, 2.0]);
        });
        assert!(q.wait_ready(None));
        handle.join().unwrap();
    }

    #[test]
    fn wait_ready_returns_on_close() {
        let q = SharedAudio::new(2, 64);
        q.close();
        assert!(q.wait_ready(Some(Duration::from_millis(10))));
        assert!(q.is_drained());
    }

    #[test]
    fn wait_ready_times_out() {
        let q = SharedAudio::new(2, 64);
        assert!(!q.wait_ready(Some(Duration::from_millis(10))));
    }
}
