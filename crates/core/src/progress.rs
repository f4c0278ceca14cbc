//! Host callbacks for long-running scans.
//!
//! Storage handles never talk to a global host. Callers inject a
//! [`ProgressSink`] and/or a [`FeedbackSink`] and the handle reports through
//! them; without one, messages only go to `tracing`.

use std::sync::atomic::{AtomicBool, Ordering};

/// Receives percentage progress from full-grid scans.
pub trait ProgressSink: Send + Sync {
    /// Called with a value in `0..=100` and a short label for the running step.
    fn progress(&self, label: &str, percent: u8);

    /// Cooperative cancellation, checked between rows, never inside a single cell call.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Receives messages about degraded operations (swallowed I/O errors and the like).
pub trait FeedbackSink: Send + Sync {
    fn feedback(&self, message: &str);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn progress(&self, _label: &str, _percent: u8) {}
}

impl FeedbackSink for NullSink {
    fn feedback(&self, _message: &str) {}
}

/// Progress sink with an externally settable cancel flag.
#[derive(Debug, Default)]
pub struct CancelFlag {
    cancelled: AtomicBool,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

impl ProgressSink for CancelFlag {
    fn progress(&self, _label: &str, _percent: u8) {}

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Tracks the last reported percentage so sinks are called once per step.
#[derive(Debug, Clone, Copy)]
pub struct ProgressTicker {
    total: usize,
    last: Option<u8>,
}

impl ProgressTicker {
    pub fn new(total: usize) -> Self {
        Self { total, last: None }
    }

    /// Report `done` of `total` items; returns `true` when the scan should stop.
    pub fn tick(&mut self, sink: Option<&dyn ProgressSink>, label: &str, done: usize) -> bool {
        let Some(sink) = sink else {
            return false;
        };
        let percent = if self.total == 0 {
            100
        } else {
            ((done as f64 / self.total as f64) * 100.0).min(100.0) as u8
        };
        if self.last != Some(percent) {
            self.last = Some(percent);
            sink.progress(label, percent);
        }
        sink.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<u8>>);

    impl ProgressSink for Recorder {
        fn progress(&self, _label: &str, percent: u8) {
            self.0.lock().unwrap().push(percent);
        }
    }

    #[test]
    fn test_ticker_reports_each_step_once() {
        let rec = Recorder(Mutex::new(Vec::new()));
        let mut ticker = ProgressTicker::new(200);
        for i in 0..=200 {
            ticker.tick(Some(&rec), "scan", i);
        }
        let seen = rec.0.lock().unwrap();
        assert_eq!(seen.len(), 101);
        assert_eq!(seen[0], 0);
        assert_eq!(*seen.last().unwrap(), 100);
    }

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        let mut ticker = ProgressTicker::new(10);
        assert!(!ticker.tick(Some(&flag), "scan", 1));
        flag.cancel();
        assert!(ticker.tick(Some(&flag), "scan", 2));
        assert!(!ticker.tick(None, "scan", 3));
    }
}
