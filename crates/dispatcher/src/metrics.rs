//! Per-sink delivery counters

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// What happened to one event offered to a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `DataSink::write` returned Ok
    Written,
    /// `DataSink::write` returned an error
    Failed,
    /// Queue was full when the capture thread offered the event
    Dropped,
    /// Motion event skipped because the sink only takes observations
    Filtered,
}

impl Outcome {
    const ALL: [Outcome; 4] = [
        Outcome::Written,
        Outcome::Failed,
        Outcome::Dropped,
        Outcome::Filtered,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

/// Lock-free counters shared between the capture thread and a sink worker
#[derive(Debug, Default)]
pub struct SinkMetrics {
    queue_len: AtomicUsize,
    outcomes: [AtomicU64; 4],
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: Outcome) {
        self.outcomes[outcome.slot()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, outcome: Outcome) -> u64 {
        self.outcomes[outcome.slot()].load(Ordering::Relaxed)
    }

    /// Events still waiting in the worker queue, sampled by the worker
    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn observe_queue(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let [written, failed, dropped, filtered] = Outcome::ALL.map(|o| self.count(o));
        MetricsSnapshot {
            queue_len: self.queue_len(),
            written,
            failed,
            dropped,
            filtered,
        }
    }
}

/// Point-in-time copy of [`SinkMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub written: u64,
    pub failed: u64,
    pub dropped: u64,
    pub filtered: u64,
}

impl MetricsSnapshot {
    /// Events that reached the sink's queue (filtered ones never do)
    pub fn offered(&self) -> u64 {
        self.written + self.failed + self.dropped
    }

    /// Everything accounted for has been written
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.dropped == 0
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "written={} failed={} dropped={} filtered={} queued={}",
            self.written, self.failed, self.dropped, self.filtered, self.queue_len
        )
    }
}
