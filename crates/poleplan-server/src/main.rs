//! PolePlan Server - HTTP front end for geodata export and permit summaries

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use poleplan_server::api;
use poleplan_server::config::Config;
use poleplan_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("poleplan_server=debug".parse()?))
        .init();

    tracing::info!("Starting PolePlan Server...");

    let config = Config::from_env();
    let port = config.server_port;
    let state = Arc::new(AppState::from_config(&config).context("building application state")?);

    let app = api::routes(&config)
        .with_state(state)
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
