//! Consilium - simulated medical consultation trainer
//!
//! A Rust backend implementing a consultation session state machine for
//! medical students practicing against an AI patient.

mod api;
mod case;
mod collab;
mod context;
mod db;
mod llm;
mod service;
mod state_machine;

use api::{create_router, AppState};
use db::Database;
use llm::LlmConfig;
use service::ConsultService;
use std::net::SocketAddr;
use std::path::PathBuf;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "consilium=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let db_path = std::env::var("CONSILIUM_DB_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.consilium/consilium.db")
    });

    let port: u16 = std::env::var("CONSILIUM_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Initialize database
    tracing::info!(path = %db_path, "Opening database");
    let db = Database::open(&db_path)?;

    // Initialize the model provider
    let llm_config = LlmConfig::from_env();
    let model = llm_config.model.clone();
    let llm = llm_config.into_service();

    if llm.is_some() {
        tracing::info!(model = %model, "LLM provider initialized");
    } else {
        tracing::warn!("No LLM API key configured. Set OPENAI_API_KEY.");
    }

    // Create application state
    let state = AppState::new(ConsultService::new(db, llm));

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state).layer(cors).layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Consilium server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
