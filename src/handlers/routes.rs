// API route handlers for the STT service
//
// This module implements the HTTP endpoints: health, transcription and metrics.

use std::time::Instant;

use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{get, post, web, HttpResponse, ResponseError};
use log::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::HandlerError;
use crate::handlers::form::extract_form_data;
use crate::metrics::Metrics;
use crate::models::{HealthResponse, TranscriptResult};
use crate::pipeline::Pipeline;

/// Health endpoint
///
/// Reports the loaded model. The server only starts once the model is loaded,
/// so any answer from here is `ok: true`.
#[get("/health")]
pub async fn health(pipeline: web::Data<Pipeline>) -> HttpResponse {
    let info = pipeline.model_info();
    HttpResponse::Ok().json(HealthResponse {
        ok: true,
        model: info.model.clone(),
        device: info.device.clone(),
        compute_type: info.compute_type.clone(),
    })
}

/// Handler for transcription requests
///
/// Receives a multipart form with `file` (required), `language` and `beam_size`,
/// runs the pipeline, and returns `{ text, language, duration }`.
#[post("/transcribe")]
pub async fn transcribe(
    form: Multipart,
    pipeline: web::Data<Pipeline>,
    config: web::Data<ServerConfig>,
    metrics: web::Data<Metrics>,
) -> Result<HttpResponse, HandlerError> {
    let start_time = Instant::now();
    let result = run_transcription(form, &pipeline, &config, &metrics).await;

    let duration = start_time.elapsed().as_secs_f64();
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => e.status_code(),
    };
    let outcome = if status.is_success() {
        "success"
    } else if status.is_client_error() {
        "client_error"
    } else {
        "failed"
    };

    match &result {
        Ok(transcript) => info!(
            "Transcription completed in {:.2}s (language={})",
            duration,
            transcript.language.as_deref().unwrap_or("unknown")
        ),
        Err(e) if status.is_client_error() => warn!("Rejected transcription request: {}", e),
        Err(e) => error!("Transcription request failed: {}", e),
    }

    metrics.record_transcription(outcome, duration).await;
    metrics
        .record_http_request("/transcribe", "POST", status.as_str(), duration)
        .await;

    Ok(HttpResponse::Ok().json(result?))
}

async fn run_transcription(
    form: Multipart,
    pipeline: &Pipeline,
    config: &ServerConfig,
    metrics: &Metrics,
) -> Result<TranscriptResult, HandlerError> {
    let request = extract_form_data(form, config.max_file_size).await?;
    if let Some(upload) = &request.upload {
        metrics.record_upload_size(upload.data.len()).await;
    }
    Ok(pipeline.transcribe(request).await?)
}

/// Metrics endpoint handler
#[get("/metrics")]
pub async fn metrics_handler(metrics: web::Data<Metrics>) -> HttpResponse {
    match metrics.export().await {
        Ok(data) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4; charset=utf-8")
            .body(data),
        Err(e) => {
            error!("Failed to export metrics: {}", e);
            HttpResponse::InternalServerError().body(format!("Failed to export metrics: {}", e))
        }
    }
}
