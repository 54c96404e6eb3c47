//! API routes for the PolePlan server.

pub mod error;
pub mod export;
pub mod geodata;
pub mod permit;
mod routes;
pub mod targets;

use crate::config::Config;
use axum::Router;

pub fn routes(config: &Config) -> Router<std::sync::Arc<crate::state::AppState>> {
    routes::create_router(config)
}

#[cfg(test)]
mod tests;
