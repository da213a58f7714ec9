//! Workflow metrics
//!
//! One [`sink::MetricsSink`] per application instance, constructed
//! explicitly and passed down to producers and consumers. Tests build
//! isolated sinks instead of sharing process-wide state; snapshots expose
//! exact medians for latency assertions.

pub(crate) mod sink;

// Public API module - the only public interface for metrics
pub mod api;
