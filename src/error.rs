// Error handling for the STT service
//
// This module defines the errors surfaced at the HTTP boundary and their mapping
// onto status codes. Every error renders as `{ "detail": <message> }`.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::ErrorResponse;
use crate::pipeline::PipelineError;

/// Errors that can occur in the STT service handlers
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Error when processing multipart form data
    #[error("Form error: {0}")]
    FormError(String),

    /// Error when no audio file was provided
    #[error("No audio file provided in the request")]
    NoAudioFile,

    /// Error when beam_size is not a positive integer
    #[error("Invalid beam_size: {0}. Must be a positive integer")]
    InvalidBeamSize(String),

    /// Error when a file is too large
    #[error("File too large: {0} bytes exceeds limit of {1} bytes")]
    FileTooLarge(usize, usize),

    /// Error when writing the upload to the staging area
    #[error("Failed to stage audio: {0}")]
    StagingFailed(String),

    /// Error raised by the transcription engine
    #[error("Transcription failed: {0}")]
    InferenceFailed(String),
}

impl HandlerError {
    /// Create a new FormError
    pub fn form_error<S: Into<String>>(msg: S) -> Self {
        Self::FormError(msg.into())
    }
}

impl ResponseError for HandlerError {
    fn status_code(&self) -> StatusCode {
        match self {
            HandlerError::FormError(_)
            | HandlerError::NoAudioFile
            | HandlerError::InvalidBeamSize(_) => StatusCode::BAD_REQUEST,
            HandlerError::FileTooLarge(_, _) => StatusCode::PAYLOAD_TOO_LARGE,
            HandlerError::StagingFailed(_) | HandlerError::InferenceFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            detail: self.to_string(),
        })
    }
}

/// Convert PipelineError to HandlerError
impl From<PipelineError> for HandlerError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NoAudioFile => HandlerError::NoAudioFile,
            PipelineError::InvalidBeamSize(value) => HandlerError::InvalidBeamSize(value),
            PipelineError::Staging(e) => HandlerError::StagingFailed(e.to_string()),
            PipelineError::Inference(message) => HandlerError::InferenceFailed(message),
        }
    }
}
