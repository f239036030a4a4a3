//! Process-wide request counters

use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug)]
struct Window {
    period: Duration,
    started: Instant,
    count: u64,
}

impl Window {
    fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            started: now,
            count: 0,
        }
    }

    /// Returns true when the window rolled over
    fn roll(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.started) >= self.period {
            self.started = now;
            self.count = 0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct MetricsState {
    minute: Window,
    hour: Window,
    day: Window,
    failures: u64,
    total: u64,
}

impl MetricsState {
    fn roll(&mut self, now: Instant) {
        self.minute.roll(now);
        self.hour.roll(now);
        if self.day.roll(now) {
            self.failures = 0;
        }
    }
}

/// Counts of the current windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub minute: u64,
    pub hour: u64,
    pub day: u64,
    /// Failures in the current day window
    pub failures: u64,
    /// Requests since the process started
    pub total: u64,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} req/min, {} req/hour, {} req/day, {} failures, {} total",
            self.minute, self.hour, self.day, self.failures, self.total
        )
    }
}

/// Per-minute, per-hour and per-day request counts plus a failure count
///
/// Each window resets once its period has elapsed since it opened.
#[derive(Debug)]
pub struct RequestMetrics {
    state: Mutex<MetricsState>,
}

impl Default for RequestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestMetrics {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            state: Mutex::new(MetricsState {
                minute: Window::new(MINUTE, now),
                hour: Window::new(HOUR, now),
                day: Window::new(DAY, now),
                failures: 0,
                total: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_request(&self) {
        self.record_request_at(Instant::now());
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot_at(Instant::now())
    }

    fn record_request_at(&self, now: Instant) {
        let mut state = self.lock();
        state.roll(now);
        state.minute.count += 1;
        state.hour.count += 1;
        state.day.count += 1;
        state.total += 1;
    }

    fn record_failure_at(&self, now: Instant) {
        let mut state = self.lock();
        state.roll(now);
        state.failures += 1;
    }

    fn snapshot_at(&self, now: Instant) -> MetricsSnapshot {
        let mut state = self.lock();
        state.roll(now);
        MetricsSnapshot {
            minute: state.minute.count,
            hour: state.hour.count,
            day: state.day.count,
            failures: state.failures,
            total: state.total,
        }
    }
}
