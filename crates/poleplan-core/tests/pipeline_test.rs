//! End-to-end pipeline tests: records in, features, exports and permit summary out.

use std::sync::Arc;

use poleplan_core::permit::{make_permit_summary, Clearances};
use poleplan_core::{
    autofill_bearings_and_pull, build_feature_collection, AutofillOptions, CachedMidspan,
    ClearanceProfile, ConverterRegistry, DirectorySink, EngineeringResults, ExportFormat, Exporter,
    FeatureCollection, JobMeta, MemorySink, PermitSummaryInput, Pole, Span, TargetSource,
};
use serde_json::json;

fn job() -> JobMeta {
    JobMeta {
        id: Some("JOB-42".into()),
        name: Some("Route 7 crossing".into()),
        ..JobMeta::default()
    }
}

fn records() -> (Vec<Pole>, Vec<Span>) {
    let poles: Vec<Pole> = serde_json::from_value(json!([
        { "id": "A", "lat": 39.0, "lon": -80.0, "height": 40, "poleClass": "4" },
        { "id": "B", "lat": 39.001, "lon": -80.001, "height": "45", "hasTransformer": true },
        { "id": "C", "lat": 39.002, "lon": -80.001 },
        { "id": "D" }
    ]))
    .unwrap();
    let spans: Vec<Span> = serde_json::from_value(json!([
        { "id": "S1", "fromId": "A", "toId": "B", "length": 150, "environment": "road" },
        { "id": "S2", "fromId": "B", "toId": "C", "length": "120", "environment": "wvHighway" },
        { "id": "S3", "fromId": "C", "toId": "D", "length": 90 }
    ]))
    .unwrap();
    (poles, spans)
}

#[test]
fn scenario_builds_expected_features() {
    let poles = vec![Pole::new("A", 39.0, -80.0), Pole::new("B", 39.001, -80.001)];
    let spans = vec![Span::new("S1", "A", "B").with_length(150.0)];
    let fc = build_feature_collection(&poles, &spans, &job());
    assert_eq!(fc.points().count(), 2);
    assert_eq!(fc.lines().count(), 1);

    let mut without_b = poles.clone();
    without_b[1].latitude = None;
    without_b[1].longitude = None;
    let fc = build_feature_collection(&without_b, &spans, &job());
    assert_eq!(fc.len(), 1);
    assert_eq!(fc.features[0].id(), Some("A"));
}

#[test]
fn imported_records_flow_through_autofill_and_builder() {
    let (mut poles, mut spans) = records();
    let report = autofill_bearings_and_pull(&mut poles, &mut spans, &AutofillOptions::default());
    assert_eq!(report.pulls, 1, "only B sits between two resolved spans");

    let fc = build_feature_collection(&poles, &spans, &job());
    // D has no coordinates, so S3 is dropped too.
    assert_eq!(fc.points().count(), 3);
    assert_eq!(fc.lines().count(), 2);

    let b = &fc.features[1];
    assert_eq!(b.id(), Some("B"));
    assert_eq!(b.number("height"), Some(45.0));
    assert!(b.number("PULL_ft").is_some());
    assert_eq!(b.properties["hasTransformer"], true);
    assert_eq!(b.properties["jobId"], "JOB-42");
}

#[test]
fn every_format_exports_with_default_converters() {
    let (poles, spans) = records();
    let fc = build_feature_collection(&poles, &spans, &job());
    let exporter = Exporter::default();

    for format in ExportFormat::ALL {
        let mut sink = MemorySink::new();
        let name = format!("job.{}", format.extension());
        let outcome = exporter.export(format, &fc, &name, &mut sink).unwrap();
        assert_eq!(outcome.delivered, format, "{format} should not fall back");
        assert_eq!(outcome.filename, name);
        assert_eq!(sink.last().unwrap().mime_type, format.mime_type());
    }
}

#[test]
fn shapefile_absent_from_runtime_falls_back_to_geojson() {
    let (poles, spans) = records();
    let fc = build_feature_collection(&poles, &spans, &job());

    let mut registry = ConverterRegistry::with_defaults();
    registry.unregister(ExportFormat::Shapefile);
    let exporter = Exporter::new(Arc::new(registry));

    let dir = tempfile::tempdir().unwrap();
    let mut sink = DirectorySink::new(dir.path());
    let outcome = exporter.export_shapefile(&fc, "job.zip", &mut sink).unwrap();
    assert!(outcome.is_fallback());

    let written = std::fs::read(dir.path().join("job.geojson")).unwrap();
    let parsed: FeatureCollection = serde_json::from_slice(&written).unwrap();
    assert_eq!(parsed.len(), fc.len());
    assert_eq!(parsed.points().count(), fc.points().count());
    assert_eq!(parsed.lines().count(), fc.lines().count());
}

#[test]
fn permit_summary_reports_target_provenance() {
    let results = EngineeringResults {
        clearances: Clearances {
            ground_clearance: Some(17.2),
            ..Clearances::default()
        },
        ..EngineeringResults::default()
    };
    let mut input = PermitSummaryInput {
        env: "wvHighway".into(),
        results: Some(results),
        job: job(),
        effective_profile: ClearanceProfile::default(),
        ..PermitSummaryInput::default()
    };

    let summary = make_permit_summary(&input).unwrap();
    assert_eq!(summary.span.target_source, TargetSource::Computed);
    assert_eq!(summary.span.target_ft, Some(17.2));

    input.cached_midspans = vec![
        CachedMidspan::new("wvHighway", 19.0),
        CachedMidspan::new("wvHighway", 18.0),
    ];
    let summary = make_permit_summary(&input).unwrap();
    assert_eq!(summary.span.target_source, TargetSource::CachedMidspans);
    assert_eq!(summary.span.target_ft, Some(19.0));
    assert_eq!(summary.job.name, "Route 7 crossing");
    assert_eq!(summary.permit_type.label(), "WVDOH MM109");
}
