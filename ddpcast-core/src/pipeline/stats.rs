//! Pipeline counters and a rolling frame-rate meter.
//!
//! [`PipelineStats`] is shared between the capture thread, the sink and
//! whoever reports status; every field is a relaxed atomic. The
//! [`RateMeter`] tracks delivered frames over a rolling window and is
//! owned by the capture loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Live counters for one mirroring session.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_captured: AtomicU64,
    frames_reused: AtomicU64,
    frames_published: AtomicU64,
    overruns: AtomicU64,
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    send_failures: AtomicU64,
    /// Measured capture rate in milli-frames per second.
    rate_mfps: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub frames_captured: u64,
    pub frames_reused: u64,
    pub frames_published: u64,
    pub overruns: u64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub send_failures: u64,
    pub fps: f64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reused(&self) {
        self.frames_reused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self, bytes: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Returns the failure count including this one.
    pub fn record_send_failure(&self) -> u64 {
        self.send_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn set_rate(&self, fps: f64) {
        self.rate_mfps
            .store((fps * 1000.0).max(0.0) as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_reused: self.frames_reused.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            fps: self.rate_mfps.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}

// ── RateMeter ────────────────────────────────────────────────────

/// Rolling-window event-rate estimator.
pub struct RateMeter {
    samples: VecDeque<Instant>,
    window: Duration,
}

impl RateMeter {
    /// Create a meter with a 1-second rolling window.
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(64),
            window,
        }
    }

    pub fn record(&mut self) {
        self.record_at(Instant::now());
    }

    /// Record with an explicit timestamp (useful for testing).
    pub fn record_at(&mut self, when: Instant) {
        self.samples.push_back(when);
        while let Some(&ts) = self.samples.front() {
            if when.duration_since(ts) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Events per second over the samples currently in the window.
    pub fn rate(&self) -> f64 {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) if self.samples.len() > 1 => {
                let span = last.duration_since(*first).as_secs_f64();
                if span <= 0.0 {
                    0.0
                } else {
                    (self.samples.len() - 1) as f64 / span
                }
            }
            _ => 0.0,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

impl Default for RateMeter {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
