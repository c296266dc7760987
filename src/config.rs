// STT service configuration
//
// This module contains configuration structures and constants for the STT service.
// All values are read once at startup from environment variables (optionally seeded
// from the TOML config file, see `config_loader`) and are immutable afterwards.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Default values for configuration
pub mod defaults {
    // Model identifier (size class) or path to a model file
    pub const MODEL: &str = "small";

    // Execution device
    pub const DEVICE: &str = "cpu";

    // Numeric precision of the model weights
    pub const COMPUTE_TYPE: &str = "int8";

    // Default beam width when a request does not supply one
    pub const BEAM_SIZE: u32 = 1;

    // Directory holding the model artifacts
    pub const MODELS_DIR: &str = "./models";

    // Voice activity model file name, looked up inside the models directory
    pub const VAD_MODEL_FILE: &str = "ggml-silero-v5.1.2.bin";

    // Upper bound for the default decode thread count
    pub const MAX_DEFAULT_THREADS: usize = 8;

    // Number of engine invocations allowed to run at the same time
    pub const MAX_CONCURRENT_INFERENCES: usize = 1;

    // Sub-directory of the system temp dir used for staged uploads
    pub const TEMP_SUBDIR: &str = "stt_service";

    // Maximum upload size (512MB)
    pub const MAX_FILE_SIZE: usize = 536_870_912;

    // Server settings
    pub const HOST: &str = "0.0.0.0";
    pub const PORT: u16 = 8000;
    pub const TIMEOUT_SECONDS: u64 = 480;
    pub const KEEPALIVE_SECONDS: u64 = 480;

    // Metrics backend ("prometheus" or "none")
    pub const METRICS_BACKEND: &str = "prometheus";
}

/// Errors raised while reading the process configuration
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid<K: Into<String>, V: Into<String>, R: Into<String>>(
        key: K,
        value: V,
        reason: R,
    ) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Source of configuration values, keyed by variable name
///
/// The process environment is the production source; tests pass a closure over a map.
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

impl<F> ConfigSource for F
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        self(key)
    }
}

/// Reads variables from the process environment
fn env_source(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Returns the trimmed, non-empty value for `key`
fn lookup(source: &dyn ConfigSource, key: &str) -> Option<String> {
    source
        .get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses `key` if present, otherwise returns `default`
fn parse_or<T>(source: &dyn ConfigSource, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(source, key) {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, raw.as_str(), e.to_string())),
        None => Ok(default),
    }
}

/// Parses `key` as a strictly positive integer
fn positive_or<T>(source: &dyn ConfigSource, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default + Copy + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let value = parse_or(source, key, default)?;
    if value <= T::default() {
        return Err(ConfigError::invalid(
            key,
            value.to_string(),
            "must be a positive integer",
        ));
    }
    Ok(value)
}

/// Configuration of the transcription engine
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Model identifier (e.g. "small", "large-v3") or a path to a model file
    pub model: String,
    /// Execution device ("cpu", "cuda", "gpu", "auto")
    pub device: String,
    /// Numeric precision ("default", "float32", "float16", "int8", "int5")
    pub compute_type: String,
    /// Beam width used when a request omits `beam_size`
    pub default_beam_size: u32,
    /// Directory holding the model artifacts
    pub models_dir: PathBuf,
    /// Voice activity detection model
    pub vad_model: PathBuf,
    /// Number of threads used by one decode
    pub threads: usize,
    /// Number of decodes allowed to run at the same time
    pub max_concurrent_inferences: usize,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&env_source)
    }

    pub fn from_source(source: &dyn ConfigSource) -> Result<Self, ConfigError> {
        let models_dir = lookup(source, "STT_MODELS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(defaults::MODELS_DIR));
        let vad_model = lookup(source, "STT_VAD_MODEL")
            .map(PathBuf::from)
            .unwrap_or_else(|| models_dir.join(defaults::VAD_MODEL_FILE));
        let default_threads = num_cpus::get().clamp(1, defaults::MAX_DEFAULT_THREADS);

        Ok(Self {
            model: lookup(source, "STT_MODEL_SIZE").unwrap_or_else(|| defaults::MODEL.to_string()),
            device: lookup(source, "STT_DEVICE")
                .unwrap_or_else(|| defaults::DEVICE.to_string())
                .to_lowercase(),
            compute_type: lookup(source, "STT_COMPUTE_TYPE")
                .unwrap_or_else(|| defaults::COMPUTE_TYPE.to_string())
                .to_lowercase(),
            default_beam_size: positive_or(source, "STT_BEAM_SIZE", defaults::BEAM_SIZE)?,
            models_dir,
            vad_model,
            threads: positive_or(source, "STT_THREADS", default_threads)?,
            max_concurrent_inferences: positive_or(
                source,
                "STT_MAX_CONCURRENT_INFERENCES",
                defaults::MAX_CONCURRENT_INFERENCES,
            )?,
        })
    }
}

/// Configuration of the HTTP boundary and the staging area
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Client disconnect timeout in seconds
    pub timeout: u64,
    /// Keep-alive in seconds
    pub keep_alive: u64,
    /// Directory for staged uploads
    pub temp_dir: PathBuf,
    /// Maximum accepted upload size in bytes
    pub max_file_size: usize,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&env_source)
    }

    pub fn from_source(source: &dyn ConfigSource) -> Result<Self, ConfigError> {
        Ok(Self {
            host: lookup(source, "STT_HOST").unwrap_or_else(|| defaults::HOST.to_string()),
            port: parse_or(source, "STT_PORT", defaults::PORT)?,
            timeout: parse_or(source, "STT_TIMEOUT", defaults::TIMEOUT_SECONDS)?,
            keep_alive: parse_or(source, "STT_KEEPALIVE", defaults::KEEPALIVE_SECONDS)?,
            temp_dir: lookup(source, "STT_TMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join(defaults::TEMP_SUBDIR)),
            max_file_size: positive_or(source, "STT_MAX_FILE_SIZE", defaults::MAX_FILE_SIZE)?,
        })
    }

    /// Ensures the staging directory exists
    pub fn ensure_temp_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.temp_dir)
    }
}

/// Configuration for metrics collection and export
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Type of metrics exporter ("prometheus", "none")
    pub exporter_type: String,
}

impl MetricsConfig {
    pub fn from_env() -> Self {
        Self::from_source(&env_source)
    }

    pub fn from_source(source: &dyn ConfigSource) -> Self {
        let enabled = lookup(source, "STT_METRICS_ENABLED")
            .and_then(|s| s.parse::<bool>().ok())
            .unwrap_or(true);

        let exporter_type = if enabled {
            lookup(source, "STT_METRICS_BACKEND")
                .unwrap_or_else(|| defaults::METRICS_BACKEND.to_string())
                .to_lowercase()
        } else {
            "none".to_string()
        };

        Self { exporter_type }
    }
}
