// STT service data models
//
// Response types shared by the pipeline and the HTTP handlers.

use serde::Serialize;

/// Folded transcription output returned by `POST /transcribe`
///
/// `language` and `duration` serialize as `null` when unknown.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TranscriptResult {
    /// Segment texts, trimmed and joined by single spaces
    pub text: String,
    /// Supplied language, or the detected one
    pub language: Option<String>,
    /// Clip duration in seconds
    pub duration: Option<f64>,
}

/// Response for `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub model: String,
    pub device: String,
    pub compute_type: String,
}

/// Error response for API
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub detail: String,
}
