use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crosspost_common::Config;

mod routes;
mod session;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();
    config.log_redacted();

    let state = Arc::new(AppState::new(config.clone()));

    // Periodic TTL sweep over packaged archives.
    crosspost_media::spawn_sweeper(config.media_dir.clone());

    let app = Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/api/system-info", get(routes::system_info))
        // Session channel
        .route("/ws/crawl", get(session::ws_crawl))
        // Out-of-band cancellation
        .route("/api/cancel-crawl", post(routes::cancel_crawl))
        // Board-name suggestions
        .route("/autocomplete/{site}", get(routes::autocomplete))
        // Packaged media retrieval
        .route("/api/download-file/{name}", get(routes::download_file))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(addr = %addr, env = %config.app_env, "crosspost server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
