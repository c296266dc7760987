//! Transcription engine contract
//!
//! The request pipeline depends on the [`TranscriptionEngine`] trait rather than on a
//! concrete model runtime. The engine is initialised once at startup and shared by
//! every request; implementations must keep all per-decode state local to a call.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::audio_store::StagedAudio;
use crate::config::EngineConfig;

pub mod model;

#[cfg(feature = "whisper")]
pub mod audio;
#[cfg(feature = "whisper")]
pub mod whisper;

#[cfg(test)]
pub mod mock;

/// Per-request decoding parameters, already resolved by the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionConfig {
    /// Language code passed through verbatim; `None` means auto-detect
    pub language: Option<String>,
    /// Beam width, always positive
    pub beam_size: u32,
}

/// One span of recognised text
///
/// `text` is raw model output and usually carries surrounding whitespace.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    pub text: String,
}

/// Clip-level metadata reported alongside the segments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipInfo {
    /// Detected language, or the supplied one when detection was bypassed
    pub language: Option<String>,
    /// Clip duration in seconds, if known
    pub duration: Option<f64>,
}

/// Single-pass sequence of segments in clip order
pub type SegmentStream = Box<dyn Iterator<Item = Result<Segment, EngineError>> + Send>;

/// Output of one engine invocation
pub struct Transcription {
    pub segments: SegmentStream,
    pub info: ClipInfo,
}

/// Static description of the loaded model, reported by `/health`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub model: String,
    pub device: String,
    pub compute_type: String,
}

impl ModelInfo {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            model: config.model.clone(),
            device: config.device.clone(),
            compute_type: config.compute_type.clone(),
        }
    }
}

/// Failure during a single transcription
///
/// Callers treat every variant as one opaque condition; the variants only
/// exist to make the diagnostic message useful.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The staged file could not be read or decoded as audio
    #[error("audio decode failed: {0}")]
    Decode(String),

    /// The model failed while decoding
    #[error("{0}")]
    Inference(String),
}

/// Failure to bring the engine up; the service cannot start
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Unknown model identifier '{0}'")]
    UnknownModel(String),

    #[error("Unsupported device '{0}'. Valid devices are: cpu, cuda, gpu, auto")]
    InvalidDevice(String),

    #[error("Unsupported compute type '{0}'. Valid types are: default, float32, float16, int8, int5")]
    InvalidComputeType(String),

    #[error("Compute type '{compute_type}' is not supported on device '{device}'")]
    IncompatibleComputeType {
        device: String,
        compute_type: String,
    },

    #[error("Model artifact not found: {0}")]
    MissingArtifact(String),

    #[error("Failed to load model: {0}")]
    Load(String),

    #[error("Speech recognition support is not compiled into this build")]
    Unavailable,
}

/// Speech recognition capability shared by all requests
pub trait TranscriptionEngine: Send + Sync {
    /// Model identity reported by the health endpoint
    fn model_info(&self) -> &ModelInfo;

    /// Transcribes one staged clip
    ///
    /// Blocking; voice activity filtering is always applied. When
    /// `config.language` is set it is used as-is and no detection happens.
    fn transcribe(
        &self,
        audio: &StagedAudio,
        config: &TranscriptionConfig,
    ) -> Result<Transcription, EngineError>;
}

/// Loads the configured model
///
/// Called exactly once at startup, before the server binds.
#[cfg(feature = "whisper")]
pub fn initialize(config: &EngineConfig) -> Result<Arc<dyn TranscriptionEngine>, StartupError> {
    let engine = whisper::WhisperEngine::load(config)?;
    Ok(Arc::new(engine))
}

#[cfg(not(feature = "whisper"))]
pub fn initialize(config: &EngineConfig) -> Result<Arc<dyn TranscriptionEngine>, StartupError> {
    // Still validate the configuration so misconfigurations are reported first.
    model::ModelSpec::resolve(config)?;
    Err(StartupError::Unavailable)
}
