//! Feature collection endpoint.

use std::sync::Arc;

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use poleplan_core::{
    autofill_bearings_and_pull, build_feature_collection, AutofillOptions, FeatureCollection,
    JobMeta, Pole, Span,
};
use serde::Deserialize;

use super::error::ApiError;
use crate::state::AppState;

/// Poles, spans and job metadata as posted by the field app.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    #[serde(default)]
    pub poles: Vec<Pole>,
    #[serde(default)]
    pub spans: Vec<Span>,
    #[serde(default)]
    pub job: JobMeta,
    /// Fill missing bearings and pulls before building features
    #[serde(default)]
    pub autofill: bool,
}

impl JobPayload {
    pub fn into_feature_collection(self, options: &AutofillOptions) -> FeatureCollection {
        let Self {
            mut poles,
            mut spans,
            job,
            autofill,
        } = self;
        if autofill {
            autofill_bearings_and_pull(&mut poles, &mut spans, options);
        }
        build_feature_collection(&poles, &spans, &job)
    }
}

/// Build the job's feature collection.
pub async fn build_geodata(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<JobPayload>, JsonRejection>,
) -> Result<Json<FeatureCollection>, ApiError> {
    let Json(payload) = payload?;
    let fc = payload.into_feature_collection(&state.autofill);
    tracing::debug!(features = fc.len(), "built feature collection");
    Ok(Json(fc))
}
