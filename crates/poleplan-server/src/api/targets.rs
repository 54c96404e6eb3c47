//! Clearance target lookups against the server profile.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use poleplan_core::targets::{
    controlling_ground_target_detail, get_env_target, KNOWN_ENVIRONMENTS,
};
use poleplan_core::{ClearanceProfile, EnvSegment};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvTargetResponse {
    pub env: String,
    pub target_ft: f64,
}

/// Targets for every built-in environment the server profile resolves.
pub async fn list_targets(State(state): State<Arc<AppState>>) -> Json<Vec<EnvTargetResponse>> {
    Json(
        KNOWN_ENVIRONMENTS
            .iter()
            .filter_map(|env| {
                get_env_target(&state.profile, env).map(|target_ft| EnvTargetResponse {
                    env: (*env).to_string(),
                    target_ft,
                })
            })
            .collect(),
    )
}

pub async fn get_target(
    State(state): State<Arc<AppState>>,
    Path(env): Path<String>,
) -> Result<Json<EnvTargetResponse>, ApiError> {
    get_env_target(&state.profile, &env)
        .map(|target_ft| Json(EnvTargetResponse { env: env.clone(), target_ft }))
        .ok_or_else(|| ApiError::NotFound(format!("no clearance target configured for '{env}'")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllingRequest {
    #[serde(default)]
    pub segments: Vec<EnvSegment>,
    pub fallback_env: String,
    /// Keys layered over the server profile for this request only
    #[serde(default)]
    pub profile: Option<ClearanceProfile>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllingResponse {
    /// Controlling environment, `null` when nothing resolved
    pub env: Option<String>,
    pub target_ft: Option<f64>,
    pub from_fallback: bool,
}

pub async fn controlling_target(
    State(state): State<Arc<AppState>>,
    req: Result<Json<ControllingRequest>, JsonRejection>,
) -> Result<Json<ControllingResponse>, ApiError> {
    let Json(req) = req?;
    let profile = match &req.profile {
        Some(overrides) => state.profile.clone().merged(overrides),
        None => state.profile.clone(),
    };
    let response = match controlling_ground_target_detail(&profile, &req.segments, &req.fallback_env)
    {
        Some(target) => ControllingResponse {
            env: Some(target.env),
            target_ft: Some(target.target_ft),
            from_fallback: target.from_fallback,
        },
        None => ControllingResponse {
            env: None,
            target_ft: None,
            from_fallback: true,
        },
    };
    Ok(Json(response))
}
