// STT Service Library
//
// This crate provides an HTTP API for speech-to-text transcription backed by a
// locally loaded Whisper model. Uploads are staged on disk for the duration of
// one engine call and released afterwards.

pub mod audio_store;
pub mod config;
pub mod config_loader;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod pipeline;

// Re-export common types for easier access
pub use audio_store::{AudioStore, StagedAudio};
pub use config::{EngineConfig, MetricsConfig, ServerConfig};
pub use engine::{StartupError, TranscriptionEngine};
pub use error::HandlerError;
pub use handlers::{health, transcribe};
pub use metrics::Metrics;
pub use models::{ErrorResponse, HealthResponse, TranscriptResult};
pub use pipeline::Pipeline;
