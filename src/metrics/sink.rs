//! Counters and histograms for the event workflow

use crate::core::sync::recover_mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Point-in-time view of a histogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    /// Lower median (exact, computed over all recorded samples).
    pub median: u64,
}

impl HistogramSnapshot {
    const EMPTY: HistogramSnapshot = HistogramSnapshot {
        count: 0,
        min: 0,
        max: 0,
        mean: 0.0,
        median: 0,
    };
}

/// Unbounded sample histogram.
///
/// Keeps every sample so snapshots are exact; fine for benchmark-scale
/// cardinalities, not meant for unbounded production retention.
#[derive(Default)]
pub struct Histogram {
    samples: Mutex<Vec<u64>>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, sample: u64) {
        recover_mutex(self.samples.lock()).push(sample);
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let mut samples = recover_mutex(self.samples.lock()).clone();
        if samples.is_empty() {
            return HistogramSnapshot::EMPTY;
        }
        samples.sort_unstable();

        let count = samples.len() as u64;
        let sum: u64 = samples.iter().sum();
        HistogramSnapshot {
            count,
            min: samples[0],
            max: samples[samples.len() - 1],
            mean: sum as f64 / samples.len() as f64,
            median: samples[(samples.len() - 1) / 2],
        }
    }
}

/// Histogram split by the `same_app` tag: `true` when the consuming
/// application instance also produced the event.
#[derive(Default)]
struct TaggedHistogram {
    same_app: Histogram,
    cross_app: Histogram,
}

impl TaggedHistogram {
    fn record(&self, sample: u64, same_app: bool) {
        if same_app {
            self.same_app.record(sample);
        } else {
            self.cross_app.record(sample);
        }
    }

    fn snapshot(&self, same_app: bool) -> HistogramSnapshot {
        if same_app {
            self.same_app.snapshot()
        } else {
            self.cross_app.snapshot()
        }
    }
}

/// Metrics sink for one application instance.
///
/// All recording methods use interior mutability and are safe to call from
/// any task; share the sink via `Arc`.
#[derive(Default)]
pub struct MetricsSink {
    produced_event_count: AtomicU64,
    handled_input_event_count: AtomicU64,
    invalid_consume_order_count: AtomicU64,
    fetched_batch_size: Histogram,
    create_consume_latency: TaggedHistogram,
    insert_consume_latency: TaggedHistogram,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one successfully enqueued event.
    pub fn record_produced(&self) {
        self.produced_event_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one event that reached a consumer handler.
    pub fn record_handled(&self) {
        self.handled_input_event_count
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Count one observation of apparently out-of-order delivery. Racing
    /// consumers make this expected, so it is counted, not prevented.
    pub fn record_invalid_consume_order(&self) {
        self.invalid_consume_order_count
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetched_batch_size(&self, size: usize) {
        self.fetched_batch_size.record(size as u64);
    }

    /// Milliseconds from event creation to consumption.
    pub fn record_create_consume_latency(&self, millis: u64, same_app: bool) {
        self.create_consume_latency.record(millis, same_app);
    }

    /// Milliseconds from durable insertion to consumption.
    pub fn record_insert_consume_latency(&self, millis: u64, same_app: bool) {
        self.insert_consume_latency.record(millis, same_app);
    }

    pub fn produced_event_count(&self) -> u64 {
        self.produced_event_count.load(Ordering::Relaxed)
    }

    pub fn handled_input_event_count(&self) -> u64 {
        self.handled_input_event_count.load(Ordering::Relaxed)
    }

    pub fn invalid_consume_order_count(&self) -> u64 {
        self.invalid_consume_order_count.load(Ordering::Relaxed)
    }

    pub fn fetched_batch_size(&self) -> HistogramSnapshot {
        self.fetched_batch_size.snapshot()
    }

    pub fn create_consume_latency(&self, same_app: bool) -> HistogramSnapshot {
        self.create_consume_latency.snapshot(same_app)
    }

    pub fn insert_consume_latency(&self, same_app: bool) -> HistogramSnapshot {
        self.insert_consume_latency.snapshot(same_app)
    }

    /// Emit a one-shot summary of every counter and histogram.
    pub fn log_summary(&self, scope: &str) {
        log::info!(
            "[{}] produced={} handled={} invalid_order={}",
            scope,
            self.produced_event_count(),
            self.handled_input_event_count(),
            self.invalid_consume_order_count()
        );
        log::info!(
            "[{}] fetched_batch_size: {:?}",
            scope,
            self.fetched_batch_size()
        );
        for same_app in [true, false] {
            log::info!(
                "[{}] create_consume_latency(same_app={}): {:?}",
                scope,
                same_app,
                self.create_consume_latency(same_app)
            );
            log::info!(
                "[{}] insert_consume_latency(same_app={}): {:?}",
                scope,
                same_app,
                self.insert_consume_latency(same_app)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let sink = MetricsSink::new();
        sink.record_produced();
        sink.record_produced();
        sink.record_handled();
        sink.record_invalid_consume_order();

        assert_eq!(sink.produced_event_count(), 2);
        assert_eq!(sink.handled_input_event_count(), 1);
        assert_eq!(sink.invalid_consume_order_count(), 1);
    }

    #[test]
    fn test_empty_histogram_snapshot_is_zeroed() {
        let histogram = Histogram::new();
        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.median, 0);
    }

    #[test]
    fn test_histogram_snapshot_statistics() {
        let histogram = Histogram::new();
        for sample in [5, 1, 9, 3, 7] {
            histogram.record(sample);
        }

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count, 5);
        assert_eq!(snapshot.min, 1);
        assert_eq!(snapshot.max, 9);
        assert_eq!(snapshot.median, 5);
        assert!((snapshot.mean - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_latency_histograms_are_split_by_same_app_tag() {
        let sink = MetricsSink::new();
        sink.record_create_consume_latency(10, true);
        sink.record_create_consume_latency(90, false);

        assert_eq!(sink.create_consume_latency(true).count, 1);
        assert_eq!(sink.create_consume_latency(true).max, 10);
        assert_eq!(sink.create_consume_latency(false).count, 1);
        assert_eq!(sink.create_consume_latency(false).max, 90);
    }
}
