mod config;
mod routes;

use anyhow::Context;
use config::Config;
use routes::AppState;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load application configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.service.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let engine = interview_service::build_engine(&config.service)?;
    let state = AppState {
        engine: Arc::new(engine),
    };

    // Permissive CORS so a separately served frontend can call the API.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router(state).layer(cors);

    info!("Starting interview API, listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received Ctrl-C, shutting down...");
        })
        .await?;

    Ok(())
}
