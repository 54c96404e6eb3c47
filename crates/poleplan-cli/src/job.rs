//! Job files on disk.
//!
//! Two shapes are accepted: a record file `{ poles, spans, job }` as saved by
//! the field app, or a GeoJSON FeatureCollection exported earlier.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use poleplan_core::geodata::parse_feature_collection;
use poleplan_core::{
    autofill_bearings_and_pull, build_feature_collection, AutofillOptions, FeatureCollection,
    JobMeta, Pole, Span,
};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFile {
    #[serde(default)]
    pub poles: Vec<Pole>,
    #[serde(default)]
    pub spans: Vec<Span>,
    #[serde(default)]
    pub job: JobMeta,
}

impl JobFile {
    /// Build features, filling missing bearings and pulls first when asked.
    pub fn feature_collection(&mut self, autofill: Option<&AutofillOptions>) -> FeatureCollection {
        if let Some(options) = autofill {
            autofill_bearings_and_pull(&mut self.poles, &mut self.spans, options);
        }
        build_feature_collection(&self.poles, &self.spans, &self.job)
    }
}

/// Load a job file, detecting GeoJSON by its `type` member.
pub fn load_job(path: &Path) -> Result<JobFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading job file {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;

    if value.get("type").and_then(Value::as_str) == Some("FeatureCollection") {
        let imported = parse_feature_collection(&raw)
            .with_context(|| format!("importing GeoJSON {}", path.display()))?;
        if imported.skipped > 0 {
            tracing::warn!(
                path = %path.display(),
                skipped = imported.skipped,
                "some features could not be imported"
            );
        }
        return Ok(JobFile {
            poles: imported.poles,
            spans: imported.spans,
            job: JobMeta::default(),
        });
    }

    serde_json::from_value(value).with_context(|| format!("reading job records from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_record_files() {
        let file = write_temp(
            r#"{
                "poles": [{ "id": "A", "lat": 39.0, "lon": -80.0 }],
                "spans": [],
                "job": { "id": "J1" }
            }"#,
        );
        let job = load_job(file.path()).unwrap();
        assert_eq!(job.poles.len(), 1);
        assert_eq!(job.job.id.as_deref(), Some("J1"));
    }

    #[test]
    fn loads_geojson_files() {
        let file = write_temp(
            r#"{
                "type": "FeatureCollection",
                "features": [
                    { "type": "Feature", "geometry": { "type": "Point", "coordinates": [-80.0, 39.0] }, "properties": { "id": "A" } },
                    { "type": "Feature", "geometry": { "type": "Point", "coordinates": [-80.001, 39.001] }, "properties": { "id": "B" } },
                    { "type": "Feature", "geometry": { "type": "LineString", "coordinates": [[-80.0, 39.0], [-80.001, 39.001]] }, "properties": { "id": "S1" } }
                ]
            }"#,
        );
        let mut job = load_job(file.path()).unwrap();
        assert_eq!(job.poles.len(), 2);
        assert_eq!(job.spans.len(), 1);
        assert_eq!(job.feature_collection(None).len(), 3);
    }

    #[test]
    fn malformed_files_report_the_path() {
        let file = write_temp("{ not json");
        let err = load_job(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("parsing"));
    }
}
