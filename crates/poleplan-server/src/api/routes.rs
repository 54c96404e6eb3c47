//! REST API routes.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::api::{export, geodata, permit, targets};
use crate::config::Config;
use crate::state::AppState;

/// Create the API router.
pub fn create_router(config: &Config) -> Router<Arc<AppState>> {
    let geodata_routes = Router::new()
        .route("/v1/geodata", post(geodata::build_geodata))
        .route("/v1/export/formats", get(export::list_formats))
        .route("/v1/export/:format", post(export::export_job));

    let target_routes = Router::new()
        .route("/v1/targets", get(targets::list_targets))
        .route("/v1/targets/controlling", post(targets::controlling_target))
        .route("/v1/targets/:env", get(targets::get_target));

    let permit_routes = Router::new().route("/v1/permit/summary", post(permit::permit_summary));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(geodata_routes)
        .merge(target_routes)
        .merge(permit_routes)
        // Job payloads with photos attached run well past axum's 2 MiB default.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
}
