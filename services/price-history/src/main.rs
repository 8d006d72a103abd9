use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

/// Application state shared across handlers
pub struct AppState {
    pub service: price_history::PriceHistoryService,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting Price History Service...");

    let config = price_history::PriceHistoryConfig::load()?;
    let service = price_history::PriceHistoryService::from_config(&config)?;
    info!(
        "✓ {} historical sources configured",
        service.configured_sources().len()
    );

    let state = Arc::new(AppState { service });

    let app = Router::new()
        .route("/history/:source", get(handlers::get_history))
        .route("/twap/:source", get(handlers::get_twap))
        .route("/sources", get(handlers::list_sources))
        .route("/health", get(handlers::health_check))
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("🚀 Price History Service listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}

mod handlers;
