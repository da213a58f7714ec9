//! Public API for workflow metrics

pub use crate::metrics::sink::{Histogram, HistogramSnapshot, MetricsSink};
