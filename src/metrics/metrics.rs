//! Metrics Module for the STT service
//!
//! Pluggable metrics: handlers talk to the [`Metrics`] facade, which forwards to
//! a [`MetricsExporter`] backend (Prometheus or no-op).
//!
//! Recording a metric never fails a request: the convenience methods log
//! exporter errors and carry on.

use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};

use crate::metrics::error::MetricsError;
use crate::metrics::null::NullExporter;
use crate::metrics::prometheus::PrometheusExporter;

/// Metrics exporter trait for pluggable monitoring systems
#[async_trait]
pub trait MetricsExporter: Send + Sync {
    /// Increment a counter metric
    async fn increment(&self, name: &str, labels: &[(&str, &str)]) -> Result<(), MetricsError>;

    /// Observe a value in a histogram metric
    async fn observe_histogram(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError>;

    /// Export metrics in the format expected by the monitoring system
    async fn export(&self) -> Result<Vec<u8>, MetricsError>;
}

/// Builds the exporter named by the configuration
///
/// Unknown names fall back to the no-op exporter.
pub fn create_metrics_exporter(exporter_type: &str) -> Arc<dyn MetricsExporter> {
    match exporter_type {
        "prometheus" => {
            info!("Using Prometheus metrics exporter");
            Arc::new(PrometheusExporter::new())
        }
        "none" | "disabled" => {
            info!("Metrics disabled");
            Arc::new(NullExporter)
        }
        other => {
            warn!("Unknown metrics backend '{}', metrics disabled", other);
            Arc::new(NullExporter)
        }
    }
}

/// Metrics facade for the application
#[derive(Clone)]
pub struct Metrics {
    exporter: Arc<dyn MetricsExporter>,
}

impl Metrics {
    pub fn new(exporter: Arc<dyn MetricsExporter>) -> Self {
        Self { exporter }
    }

    /// Metrics that record nothing
    pub fn disabled() -> Self {
        Self::new(Arc::new(NullExporter))
    }

    pub async fn increment(&self, name: &str, labels: &[(&str, &str)]) -> Result<(), MetricsError> {
        self.exporter.increment(name, labels).await
    }

    pub async fn observe_histogram(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError> {
        self.exporter.observe_histogram(name, value, labels).await
    }

    pub async fn export(&self) -> Result<Vec<u8>, MetricsError> {
        self.exporter.export().await
    }

    async fn increment_internal(&self, name: &str, labels: &[(&str, &str)]) {
        if let Err(e) = self.increment(name, labels).await {
            warn!("Failed to increment metric {}: {}", name, e);
        }
    }

    async fn observe_histogram_internal(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        if let Err(e) = self.observe_histogram(name, value, labels).await {
            warn!("Failed to observe metric {}: {}", name, e);
        }
    }

    // Convenience methods for common metrics

    /// Record HTTP request duration
    pub async fn record_http_request(
        &self,
        endpoint: &str,
        method: &str,
        status: &str,
        duration: f64,
    ) {
        let labels = [("endpoint", endpoint), ("method", method), ("status", status)];
        self.observe_histogram_internal("http_request_duration_seconds", duration, &labels)
            .await;
        self.increment_internal("http_requests_total", &labels).await;
    }

    /// Record the outcome of one transcription request
    ///
    /// `outcome` is one of "success", "client_error" or "failed".
    pub async fn record_transcription(&self, outcome: &str, duration: f64) {
        let labels = [("outcome", outcome)];
        self.observe_histogram_internal("transcription_duration_seconds", duration, &labels)
            .await;
        self.increment_internal("transcriptions_total", &labels).await;
    }

    /// Record size of an accepted upload
    pub async fn record_upload_size(&self, size_bytes: usize) {
        self.observe_histogram_internal("upload_size_bytes", size_bytes as f64, &[])
            .await;
    }
}
