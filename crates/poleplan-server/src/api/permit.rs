//! Permit summary endpoint.

use std::sync::Arc;

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use poleplan_core::{make_permit_summary, ClearanceProfile, PermitSummary, PermitSummaryInput};
use serde_json::Value;

use super::error::ApiError;
use crate::state::AppState;

const PROFILE_FIELD: &str = "effectiveProfile";

/// Assemble a permit summary.
///
/// `effectiveProfile` in the body is layered over the server profile rather
/// than replacing it, so clients only send the keys they changed.
pub async fn permit_summary(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PermitSummary>, ApiError> {
    let Json(mut body) = body?;
    let overrides = match body.as_object_mut() {
        Some(fields) => fields.remove(PROFILE_FIELD),
        None => return Err(ApiError::BadRequest("expected a JSON object".into())),
    };

    let mut input: PermitSummaryInput =
        serde_json::from_value(body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    input.effective_profile = match overrides {
        Some(Value::Null) | None => state.profile.clone(),
        Some(raw) => {
            let overrides: ClearanceProfile = serde_json::from_value(raw)
                .map_err(|e| ApiError::BadRequest(format!("invalid {PROFILE_FIELD}: {e}")))?;
            state.profile.clone().merged(&overrides)
        }
    };

    let summary = make_permit_summary(&input)?;
    tracing::info!(
        env = %summary.env,
        permit_type = summary.permit_type.label(),
        target_source = ?summary.span.target_source,
        "permit summary assembled"
    );
    Ok(Json(summary))
}
