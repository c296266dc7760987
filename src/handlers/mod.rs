// STT service HTTP handlers
//
// This module contains the HTTP handlers for the STT service.
// It provides the interface between HTTP requests and the request pipeline.

pub mod form;
pub mod routes;


use actix_web::web;

// Re-export handlers for easier access
pub use self::routes::{health, metrics_handler, transcribe};

/// Registers every route on an app
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(transcribe)
        .service(metrics_handler);
}
