//! File export endpoint.
//!
//! The response body is the exported file. When the requested converter was
//! unavailable the body is GeoJSON and `X-Export-Fallback` carries the reason.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    Json,
};
use poleplan_core::{ExportFormat, ExportOutcome, MemorySink};
use serde::Deserialize;

use super::error::ApiError;
use super::geodata::JobPayload;
use crate::state::AppState;

pub const EXPORT_FALLBACK_HEADER: HeaderName = HeaderName::from_static("x-export-fallback");
pub const EXPORT_FORMAT_HEADER: HeaderName = HeaderName::from_static("x-export-format");

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[serde(flatten)]
    pub job: JobPayload,
    #[serde(default)]
    pub filename: Option<String>,
}

pub async fn export_job(
    State(state): State<Arc<AppState>>,
    Path(format): Path<String>,
    req: Result<Json<ExportRequest>, JsonRejection>,
) -> Result<(HeaderMap, Vec<u8>), ApiError> {
    let format = ExportFormat::parse(&format)
        .ok_or_else(|| ApiError::BadRequest(format!("unsupported export format '{format}'")))?;
    let Json(req) = req?;

    let filename = req
        .filename
        .clone()
        .unwrap_or_else(|| format!("poleplan.{}", format.extension()));
    let autofill = state.autofill;
    let exporter = state.exporter.clone();

    // Zip and XML encoding are CPU bound; keep them off the async workers.
    let (outcome, bytes) = tokio::task::spawn_blocking(move || {
        let fc = req.job.into_feature_collection(&autofill);
        let mut sink = MemorySink::new();
        let outcome = exporter.export(format, &fc, &filename, &mut sink)?;
        let bytes = sink.into_last().map(|a| a.bytes).unwrap_or_default();
        Ok::<_, ApiError>((outcome, bytes))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("export task failed: {e}")))??;

    tracing::info!(
        requested = %outcome.requested,
        delivered = %outcome.delivered,
        filename = %outcome.filename,
        bytes = outcome.bytes,
        "export served"
    );

    Ok((response_headers(&outcome)?, bytes))
}

fn response_headers(outcome: &ExportOutcome) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(outcome.mime_type),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(&format!(
            "attachment; filename=\"{}\"",
            header_safe(&outcome.filename).replace('"', "_")
        ))?,
    );
    headers.insert(
        EXPORT_FORMAT_HEADER,
        HeaderValue::from_static(outcome.delivered.as_str()),
    );
    if let Some(reason) = &outcome.fallback {
        headers.insert(
            EXPORT_FALLBACK_HEADER,
            header_value(&header_safe(&reason.to_string()))?,
        );
    }
    Ok(headers)
}

/// Replace anything outside visible ASCII so the text is a valid header value.
fn header_safe(text: &str) -> String {
    text.chars()
        .map(|c| if c == ' ' || c.is_ascii_graphic() { c } else { '_' })
        .collect()
}

fn header_value(text: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(text).map_err(|e| ApiError::Internal(format!("bad header value: {e}")))
}

/// Formats the server can be asked for, for discovery clients.
pub async fn list_formats(State(state): State<Arc<AppState>>) -> Json<Vec<FormatInfo>> {
    let registry = state.exporter.registry();
    Json(
        ExportFormat::ALL
            .into_iter()
            .map(|format| FormatInfo {
                format,
                extension: format.extension(),
                mime_type: format.mime_type(),
                native: format == ExportFormat::GeoJson || registry.contains(format),
            })
            .collect(),
    )
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatInfo {
    pub format: ExportFormat,
    pub extension: &'static str,
    pub mime_type: &'static str,
    /// False when requests for this format will be served as GeoJSON
    pub native: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_safe_replaces_control_and_unicode() {
        assert_eq!(header_safe("route\n7 – north.kml"), "route_7 _ north.kml");
        assert_eq!(header_safe("plain.kmz"), "plain.kmz");
    }
}
