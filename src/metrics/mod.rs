// STT service metrics for monitoring and observability
//
// This module contains the metrics for the STT service.
// It provides a Prometheus exporter and a no-op exporter behind one facade.

pub mod error;
#[allow(clippy::module_inception)]
pub mod metrics;
pub mod null;
pub mod prometheus;

pub use self::error::MetricsError;
pub use self::metrics::{create_metrics_exporter, Metrics, MetricsExporter};
