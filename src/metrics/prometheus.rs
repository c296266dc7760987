//! Prometheus metrics exporter
//!
//! Metrics are created lazily on first use. The label set seen on first use
//! becomes the metric's schema; label names are sorted so callers may pass
//! them in any order.

use std::collections::HashMap;

use async_trait::async_trait;
use log::debug;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use tokio::sync::Mutex;

use crate::metrics::error::{validation, MetricsError};
use crate::metrics::metrics::MetricsExporter;

/// Prometheus implementation of MetricsExporter
pub struct PrometheusExporter {
    registry: Registry,
    counters: Mutex<HashMap<String, CounterVec>>,
    histograms: Mutex<HashMap<String, HistogramVec>>,
}

impl Default for PrometheusExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusExporter {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            counters: Mutex::new(HashMap::new()),
            histograms: Mutex::new(HashMap::new()),
        }
    }

    /// Help text derived from the metric name
    fn help_text(name: &str, metric_type: &str) -> String {
        format!("{} ({})", name.replace('_', " "), metric_type)
    }

    /// Histogram buckets chosen by what the metric measures
    fn histogram_buckets(name: &str) -> Vec<f64> {
        if name.contains("duration") || name.contains("seconds") {
            // Inference can take minutes on long clips
            vec![
                0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
            ]
        } else if name.contains("bytes") || name.contains("size") {
            vec![
                16384.0, 65536.0, 262144.0, 1048576.0, 4194304.0, 16777216.0, 67108864.0,
                268435456.0,
            ]
        } else {
            prometheus::DEFAULT_BUCKETS.to_vec()
        }
    }

    /// Sorts labels by name, returning names and the matching values
    fn split_labels<'a>(labels: &[(&'a str, &'a str)]) -> (Vec<&'a str>, Vec<&'a str>) {
        let mut sorted = labels.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        sorted.into_iter().unzip()
    }

    fn register<C>(&self, name: &str, collector: C) -> Result<(), MetricsError>
    where
        C: prometheus::core::Collector + 'static,
    {
        self.registry
            .register(Box::new(collector))
            .map_err(|e| MetricsError::registration_failed(name, e.to_string()))
    }

    async fn counter(&self, name: &str, label_names: &[&str]) -> Result<CounterVec, MetricsError> {
        let mut counters = self.counters.lock().await;
        if let Some(counter) = counters.get(name) {
            return Ok(counter.clone());
        }

        let opts = Opts::new(name, Self::help_text(name, "counter"));
        let counter = CounterVec::new(opts, label_names)
            .map_err(|e| MetricsError::registration_failed(name, e.to_string()))?;
        self.register(name, counter.clone())?;
        debug!("Registered counter {}", name);

        counters.insert(name.to_string(), counter.clone());
        Ok(counter)
    }

    async fn histogram(
        &self,
        name: &str,
        label_names: &[&str],
    ) -> Result<HistogramVec, MetricsError> {
        let mut histograms = self.histograms.lock().await;
        if let Some(histogram) = histograms.get(name) {
            return Ok(histogram.clone());
        }

        let opts = HistogramOpts::new(name, Self::help_text(name, "histogram"))
            .buckets(Self::histogram_buckets(name));
        let histogram = HistogramVec::new(opts, label_names)
            .map_err(|e| MetricsError::registration_failed(name, e.to_string()))?;
        self.register(name, histogram.clone())?;
        debug!("Registered histogram {}", name);

        histograms.insert(name.to_string(), histogram.clone());
        Ok(histogram)
    }
}

#[async_trait]
impl MetricsExporter for PrometheusExporter {
    async fn increment(&self, name: &str, labels: &[(&str, &str)]) -> Result<(), MetricsError> {
        validation::validate_metric_name(name)?;
        validation::validate_labels(labels)?;

        let (names, values) = Self::split_labels(labels);
        let counter = self.counter(name, &names).await?;
        counter
            .get_metric_with_label_values(&values)
            .map_err(|e| MetricsError::invalid_label(name, e.to_string()))?
            .inc();
        Ok(())
    }

    async fn observe_histogram(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError> {
        validation::validate_metric_name(name)?;
        validation::validate_labels(labels)?;
        validation::validate_numeric_value(value)?;

        let (names, values) = Self::split_labels(labels);
        let histogram = self.histogram(name, &names).await?;
        histogram
            .get_metric_with_label_values(&values)
            .map_err(|e| MetricsError::invalid_label(name, e.to_string()))?
            .observe(value);
        Ok(())
    }

    async fn export(&self) -> Result<Vec<u8>, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::export_failed(e.to_string()))?;
        Ok(buffer)
    }
}
