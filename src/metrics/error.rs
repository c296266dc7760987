//! Error types for the metrics system
//!
//! Metric names, labels and values are validated before they reach the
//! Prometheus client so that a bad call reports an error instead of panicking.

use std::fmt;
use thiserror::Error;

/// Error types for metrics operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    /// Invalid metric name (e.g., empty, invalid characters)
    #[error("Invalid metric name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Invalid label name or value
    #[error("Invalid label '{label}': {reason}")]
    InvalidLabel { label: String, reason: String },

    /// Invalid observed value (NaN, infinite)
    #[error("Invalid value '{value}': {reason}")]
    InvalidValue { value: String, reason: String },

    /// Metric creation or registration failed
    #[error("Failed to register metric '{name}': {reason}")]
    RegistrationFailed { name: String, reason: String },

    /// Metric export failed
    #[error("Failed to export metrics: {reason}")]
    ExportFailed { reason: String },
}

impl MetricsError {
    pub fn invalid_name<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_label<L: Into<String>, R: Into<String>>(label: L, reason: R) -> Self {
        Self::InvalidLabel {
            label: label.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_value<V: fmt::Display, R: Into<String>>(value: V, reason: R) -> Self {
        Self::InvalidValue {
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn registration_failed<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        Self::RegistrationFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn export_failed<R: Into<String>>(reason: R) -> Self {
        Self::ExportFailed {
            reason: reason.into(),
        }
    }
}

/// Validation functions for metric names, labels and values
pub mod validation {
    use super::MetricsError;
    use std::collections::HashSet;

    /// Label names reserved by Prometheus
    const RESERVED_LABELS: &[&str] = &["__name__", "__value__"];

    const MAX_NAME_LENGTH: usize = 512;
    const MAX_LABEL_VALUE_LENGTH: usize = 1024;

    /// Metric names start with a letter or underscore and contain only
    /// letters, digits, underscores and colons
    pub fn validate_metric_name(name: &str) -> Result<(), MetricsError> {
        let Some(first) = name.chars().next() else {
            return Err(MetricsError::invalid_name(name, "Metric name cannot be empty"));
        };

        if name.len() > MAX_NAME_LENGTH {
            return Err(MetricsError::invalid_name(name, "Metric name too long"));
        }

        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(MetricsError::invalid_name(
                name,
                "Metric name must start with a letter or underscore",
            ));
        }

        if let Some((i, ch)) = name
            .chars()
            .enumerate()
            .find(|(_, ch)| !ch.is_ascii_alphanumeric() && *ch != '_' && *ch != ':')
        {
            return Err(MetricsError::invalid_name(
                name,
                format!("Invalid character '{}' at position {}", ch, i),
            ));
        }

        Ok(())
    }

    pub fn validate_label_key(key: &str) -> Result<(), MetricsError> {
        let Some(first) = key.chars().next() else {
            return Err(MetricsError::invalid_label(key, "Label key cannot be empty"));
        };

        if RESERVED_LABELS.contains(&key) {
            return Err(MetricsError::invalid_label(
                key,
                "Label key is reserved by Prometheus",
            ));
        }

        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(MetricsError::invalid_label(
                key,
                "Label key must start with a letter or underscore",
            ));
        }

        if key.chars().any(|ch| !ch.is_ascii_alphanumeric() && ch != '_') {
            return Err(MetricsError::invalid_label(key, "Invalid character in label key"));
        }

        Ok(())
    }

    pub fn validate_label_value(value: &str) -> Result<(), MetricsError> {
        if value.len() > MAX_LABEL_VALUE_LENGTH {
            return Err(MetricsError::invalid_label(value, "Label value too long"));
        }

        if value
            .chars()
            .any(|ch| ch.is_control() && ch != '\t' && ch != '\n' && ch != '\r')
        {
            return Err(MetricsError::invalid_label(
                value,
                "Label value contains control characters",
            ));
        }

        Ok(())
    }

    pub fn validate_labels(labels: &[(&str, &str)]) -> Result<(), MetricsError> {
        let mut seen = HashSet::new();
        for (key, value) in labels {
            validate_label_key(key)?;
            validate_label_value(value)?;
            if !seen.insert(*key) {
                return Err(MetricsError::invalid_label(*key, "Duplicate label key"));
            }
        }
        Ok(())
    }

    pub fn validate_numeric_value(value: f64) -> Result<(), MetricsError> {
        if !value.is_finite() {
            return Err(MetricsError::invalid_value(
                value,
                "Value must be finite (not NaN or infinite)",
            ));
        }
        Ok(())
    }
}
