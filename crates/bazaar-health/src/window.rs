//! Bucketed rolling window of call outcomes

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Outcome of a single call as seen by the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Success,
    Failure,
    Timeout,
}

#[derive(Debug, Clone)]
struct Bucket {
    started_at: Instant,
    successes: u64,
    failures: u64,
    timeouts: u64,
}

impl Bucket {
    fn new(started_at: Instant) -> Self {
        Self {
            started_at,
            successes: 0,
            failures: 0,
            timeouts: 0,
        }
    }
}

/// Totals over the live part of a rolling window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WindowStats {
    /// Successful calls in the window
    pub successes: u64,
    /// Failed calls in the window (timeouts excluded)
    pub failures: u64,
    /// Timed out calls in the window
    pub timeouts: u64,
}

impl WindowStats {
    /// All recorded calls
    pub fn total(&self) -> u64 {
        self.successes + self.failures + self.timeouts
    }

    /// Failures and timeouts as a percentage of all calls
    pub fn failure_percentage(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.failures + self.timeouts) as f64 * 100.0 / total as f64
    }
}

/// Window of `buckets` buckets, each `window / buckets` wide.
///
/// Buckets older than the full window are discarded lazily whenever the
/// window is touched.
#[derive(Debug, Clone)]
pub(crate) struct RollingWindow {
    window: Duration,
    bucket_width: Duration,
    capacity: usize,
    buckets: VecDeque<Bucket>,
}

impl RollingWindow {
    pub(crate) fn new(window: Duration, buckets: u32) -> Self {
        let capacity = buckets.max(1) as usize;
        Self {
            window,
            bucket_width: window / capacity as u32,
            capacity,
            buckets: VecDeque::with_capacity(capacity),
        }
    }

    pub(crate) fn record(&mut self, now: Instant, outcome: Outcome) {
        self.rotate(now);

        let needs_bucket = self
            .buckets
            .back()
            .map_or(true, |b| now.saturating_duration_since(b.started_at) >= self.bucket_width);
        if needs_bucket {
            self.buckets.push_back(Bucket::new(now));
            while self.buckets.len() > self.capacity {
                self.buckets.pop_front();
            }
        }

        if let Some(bucket) = self.buckets.back_mut() {
            match outcome {
                Outcome::Success => bucket.successes += 1,
                Outcome::Failure => bucket.failures += 1,
                Outcome::Timeout => bucket.timeouts += 1,
            }
        }
    }

    pub(crate) fn stats(&mut self, now: Instant) -> WindowStats {
        self.rotate(now);
        self.buckets
            .iter()
            .fold(WindowStats::default(), |mut acc, bucket| {
                acc.successes += bucket.successes;
                acc.failures += bucket.failures;
                acc.timeouts += bucket.timeouts;
                acc
            })
    }

    pub(crate) fn clear(&mut self) {
        self.buckets.clear();
    }

    fn rotate(&mut self, now: Instant) {
        while let Some(front) = self.buckets.front() {
            if now.saturating_duration_since(front.started_at) >= self.window {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }
}
