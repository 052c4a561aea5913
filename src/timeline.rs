//! Pause-adjusted presentation timeline
//!
//! One coordinator exists per recording session. Producer threads call
//! `adjusted()` on their way into the sink; the controller drives
//! `begin_pause()`/`end_pause()` from its own context. Adjusted timestamps
//! are guaranteed non-decreasing for the lifetime of the session.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Tracks the session epoch and cumulative paused time, and converts raw
/// capture timestamps to adjusted presentation timestamps.
pub struct TimelineCoordinator {
    /// Raw timestamp of the first accepted video sample
    epoch: Mutex<Option<Duration>>,

    /// Total paused time accumulated by completed pauses, in nanoseconds
    cumulative_pause_ns: AtomicU64,

    /// When the current pause started, if paused
    pause_started_at: Mutex<Option<Instant>>,

    /// Last adjusted timestamp handed out, in nanoseconds
    last_adjusted_ns: AtomicU64,
}

impl TimelineCoordinator {
    pub fn new() -> Self {
        Self {
            epoch: Mutex::new(None),
            cumulative_pause_ns: AtomicU64::new(0),
            pause_started_at: Mutex::new(None),
            last_adjusted_ns: AtomicU64::new(0),
        }
    }

    /// Record the session epoch from the first accepted video sample.
    /// Later calls are no-ops.
    pub fn note_video_sample(&self, raw: Duration) {
        let mut epoch = self.epoch.lock();
        if epoch.is_none() {
            *epoch = Some(raw);
        }
    }

    /// Raw timestamp of the first accepted video sample, once one exists
    pub fn epoch(&self) -> Option<Duration> {
        *self.epoch.lock()
    }

    /// Enter the paused interval. No effect if already paused.
    pub fn begin_pause(&self) {
        let mut started = self.pause_started_at.lock();
        if started.is_none() {
            *started = Some(Instant::now());
        }
    }

    /// Leave the paused interval, folding its length into the cumulative
    /// pause duration. No effect if not paused.
    pub fn end_pause(&self) {
        let mut started = self.pause_started_at.lock();
        if let Some(at) = started.take() {
            let paused = at.elapsed();
            self.cumulative_pause_ns
                .fetch_add(paused.as_nanos() as u64, Ordering::SeqCst);
        }
    }

    /// Total paused time so far, including an ongoing pause
    pub fn paused_duration(&self) -> Duration {
        let completed = Duration::from_nanos(self.cumulative_pause_ns.load(Ordering::SeqCst));
        let ongoing = self
            .pause_started_at
            .lock()
            .map(|at| at.elapsed())
            .unwrap_or(Duration::ZERO);
        completed + ongoing
    }

    /// Convert a raw capture timestamp to the adjusted presentation
    /// timestamp: `raw - cumulative_pause`, clamped so the result never
    /// moves backwards across a pause boundary.
    pub fn adjusted(&self, raw: Duration) -> Duration {
        let paused = Duration::from_nanos(self.cumulative_pause_ns.load(Ordering::SeqCst));
        let adjusted = raw.saturating_sub(paused);
        let adjusted_ns = adjusted.as_nanos() as u64;

        let floor = self.last_adjusted_ns.fetch_max(adjusted_ns, Ordering::SeqCst);
        if adjusted_ns >= floor {
            adjusted
        } else {
            Duration::from_nanos(floor)
        }
    }
}

impl Default for TimelineCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
