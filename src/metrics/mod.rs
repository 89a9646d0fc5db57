//! Prometheus metrics module
//!
//! Provides metrics collection and export for monitoring.

mod registry;
mod traits;

pub use registry::{get_metrics, init_metrics, Metrics};
pub use traits::{MetricsRecorder, NoopMetrics, PrometheusMetricsWrapper};
