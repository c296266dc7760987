//! Model artifact resolution
//!
//! Maps the configured model identifier, device and compute type onto concrete
//! files in the models directory, rejecting combinations that cannot be served.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::EngineConfig;
use crate::engine::StartupError;

/// Model identifiers with a known artifact naming scheme
pub const KNOWN_MODELS: &[&str] = &[
    "tiny",
    "tiny.en",
    "base",
    "base.en",
    "small",
    "small.en",
    "medium",
    "medium.en",
    "large-v1",
    "large-v2",
    "large-v3",
    "large-v3-turbo",
];

/// Execution device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Gpu,
    /// Offload to a GPU when the runtime has one, otherwise run on CPU
    Auto,
}

impl FromStr for Device {
    type Err = StartupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Gpu),
            "auto" => Ok(Self::Auto),
            _ => Err(StartupError::InvalidDevice(s.to_string())),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Gpu => write!(f, "gpu"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Numeric precision of the model weights
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeType {
    Default,
    Float32,
    Float16,
    Int8,
    Int5,
}

impl ComputeType {
    /// Artifact file name suffix for this precision
    pub fn file_suffix(self) -> &'static str {
        match self {
            Self::Default | Self::Float16 => "",
            Self::Float32 => "-f32",
            Self::Int8 => "-q8_0",
            Self::Int5 => "-q5_0",
        }
    }
}

impl FromStr for ComputeType {
    type Err = StartupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" | "auto" => Ok(Self::Default),
            "float32" | "f32" => Ok(Self::Float32),
            "float16" | "f16" => Ok(Self::Float16),
            "int8" | "q8_0" => Ok(Self::Int8),
            "int5" | "q5_0" => Ok(Self::Int5),
            _ => Err(StartupError::InvalidComputeType(s.to_string())),
        }
    }
}

/// Fully resolved model selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub model_path: PathBuf,
    pub vad_model_path: PathBuf,
    pub device: Device,
    pub compute_type: ComputeType,
    pub threads: usize,
}

impl ModelSpec {
    /// Validates the engine configuration and locates every artifact it needs
    pub fn resolve(config: &EngineConfig) -> Result<Self, StartupError> {
        let device: Device = config.device.parse()?;
        let compute_type: ComputeType = config.compute_type.parse()?;

        if device == Device::Cpu && compute_type == ComputeType::Float16 {
            return Err(StartupError::IncompatibleComputeType {
                device: config.device.clone(),
                compute_type: config.compute_type.clone(),
            });
        }

        let model_path = locate_model(&config.model, &config.models_dir, compute_type)?;

        if !config.vad_model.is_file() {
            return Err(StartupError::MissingArtifact(format!(
                "voice activity model {}",
                config.vad_model.display()
            )));
        }

        Ok(Self {
            model_path,
            vad_model_path: config.vad_model.clone(),
            device,
            compute_type,
            threads: config.threads,
        })
    }

    pub fn use_gpu(&self) -> bool {
        !matches!(self.device, Device::Cpu)
    }
}

/// Finds the model file for an identifier
///
/// An identifier that names an existing file is taken as-is.
fn locate_model(
    model: &str,
    models_dir: &Path,
    compute_type: ComputeType,
) -> Result<PathBuf, StartupError> {
    let direct = Path::new(model);
    if direct.is_file() {
        return Ok(direct.to_path_buf());
    }

    if !KNOWN_MODELS.contains(&model) {
        return Err(StartupError::UnknownModel(model.to_string()));
    }

    let path = models_dir.join(format!("ggml-{}{}.bin", model, compute_type.file_suffix()));
    if path.is_file() {
        Ok(path)
    } else {
        Err(StartupError::MissingArtifact(path.display().to_string()))
    }
}
