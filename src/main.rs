use std::io;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::{error, info};

use stt_service::audio_store::AudioStore;
use stt_service::config::{EngineConfig, MetricsConfig, ServerConfig};
use stt_service::config_loader::{config_file_path, load_config};
use stt_service::engine;
use stt_service::handlers;
use stt_service::metrics::{create_metrics_exporter, Metrics};
use stt_service::pipeline::Pipeline;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Config file values only fill in variables the environment leaves unset
    load_config(&config_file_path());

    // Load configurations
    let to_io = |e: stt_service::config::ConfigError| {
        error!("Invalid configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e)
    };
    let engine_config = EngineConfig::from_env().map_err(to_io)?;
    let server_config = ServerConfig::from_env().map_err(to_io)?;
    let metrics_config = MetricsConfig::from_env();

    // The model is loaded before binding; a failure here ends the process
    info!(
        "Loading model '{}' (device={}, compute_type={})",
        engine_config.model, engine_config.device, engine_config.compute_type
    );
    let engine = engine::initialize(&engine_config).map_err(|e| {
        error!("Failed to initialize transcription engine: {}", e);
        io::Error::new(io::ErrorKind::Other, e)
    })?;

    // Initialize metrics
    let metrics = Metrics::new(create_metrics_exporter(&metrics_config.exporter_type));

    // Create tmp directory if it doesn't exist
    server_config.ensure_temp_dir().map_err(|e| {
        error!(
            "Failed to create temp directory {}: {}",
            server_config.temp_dir.display(),
            e
        );
        e
    })?;

    let pipeline = web::Data::new(Pipeline::new(
        engine,
        AudioStore::new(&server_config.temp_dir),
        engine_config.default_beam_size,
        engine_config.max_concurrent_inferences,
    ));

    info!(
        "Starting STT service on http://{}:{}",
        server_config.host, server_config.port
    );
    info!("Using temp directory: {}", server_config.temp_dir.display());
    info!("Metrics exporter: {}", metrics_config.exporter_type);

    let bind_addr = (server_config.host.clone(), server_config.port);
    let timeout = Duration::from_secs(server_config.timeout);
    let keep_alive = Duration::from_secs(server_config.keep_alive);
    let server_data = web::Data::new(server_config);
    let metrics = web::Data::new(metrics);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(pipeline.clone())
            .app_data(server_data.clone())
            .app_data(metrics.clone())
            .configure(handlers::configure)
    })
    .bind(bind_addr)?
    .client_disconnect_timeout(timeout)
    .keep_alive(keep_alive)
    .run()
    .await
}
