use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use poleplan_core::{ConverterRegistry, ExportFormat, Exporter};
use serde_json::{json, Value};
use std::io::{Cursor, Read};
use std::sync::Arc;
use tower::ServiceExt;

use crate::{api, config::Config, state::AppState};

fn setup_app_with(state: AppState) -> axum::Router {
    let config = Config::default();
    api::routes(&config).with_state(Arc::new(state))
}

fn setup_app() -> axum::Router {
    setup_app_with(AppState::default())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    let body = body.to_string();
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("content-length", body.len())
        .body(Body::from(body))
        .unwrap()
}

fn post_raw(uri: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("content-length", body.len())
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn read_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body")
        .to_vec()
}

async fn read_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&read_bytes(response).await).expect("parse json")
}

fn two_pole_job() -> Value {
    json!({
        "poles": [
            { "id": "A", "latitude": 39.0, "longitude": -80.0, "height": "40" },
            { "id": "B", "latitude": 39.001, "longitude": -80.001 }
        ],
        "spans": [
            { "id": "S1", "fromId": "A", "toId": "B", "length": 150 }
        ],
        "job": { "id": "JOB-1", "name": "Test job" }
    })
}

#[tokio::test]
async fn health_is_ok() {
    let res = setup_app().oneshot(get("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(read_bytes(res).await, b"OK");
}

#[tokio::test]
async fn geodata_builds_points_then_lines() {
    let res = setup_app()
        .oneshot(post_json("/v1/geodata", two_pole_job()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = read_json(res).await;
    assert_eq!(body["type"], "FeatureCollection");
    let features = body["features"].as_array().unwrap();
    assert_eq!(features.len(), 3);
    assert_eq!(features[0]["geometry"]["type"], "Point");
    assert_eq!(features[0]["properties"]["height"], 40.0);
    assert_eq!(features[0]["properties"]["jobId"], "JOB-1");
    assert_eq!(features[2]["geometry"]["type"], "LineString");
    assert_eq!(features[2]["properties"]["lengthFt"], 150.0);
}

#[tokio::test]
async fn geodata_drops_spans_with_a_missing_endpoint() {
    let mut job = two_pole_job();
    job["spans"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "id": "S2", "fromId": "B" }));
    job["poles"][0]["voltage"] = json!(7200);
    job["job"]["jobNumber"] = json!(4521);

    let res = setup_app()
        .oneshot(post_json("/v1/geodata", job))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = read_json(res).await;
    let features = body["features"].as_array().unwrap();
    let lines: Vec<_> = features
        .iter()
        .filter(|f| f["geometry"]["type"] == "LineString")
        .collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["properties"]["id"], "S1");
    assert_eq!(features[0]["properties"]["voltage"], 7200);
}

#[tokio::test]
async fn malformed_bodies_get_json_errors() {
    let res = setup_app()
        .oneshot(post_raw("/v1/geodata", "{ not json"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(read_json(res).await["error"].is_string());

    let res = setup_app()
        .oneshot(post_json("/v1/geodata", json!({ "poles": "A,B" })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(read_json(res).await["error"].is_string());

    let res = setup_app()
        .oneshot(post_raw("/v1/permit/summary", "[1,"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(read_json(res).await["error"].is_string());
}

#[tokio::test]
async fn geodata_autofill_is_opt_in() {
    let mut job = two_pole_job();
    let res = setup_app()
        .oneshot(post_json("/v1/geodata", job.clone()))
        .await
        .unwrap();
    let body = read_json(res).await;
    assert_eq!(body["features"][2]["properties"].get("outgoingBearingDeg"), None);

    job["autofill"] = json!(true);
    let res = setup_app()
        .oneshot(post_json("/v1/geodata", job))
        .await
        .unwrap();
    let body = read_json(res).await;
    assert!(body["features"][2]["properties"]["outgoingBearingDeg"].is_number());
    assert!(body["features"][0]["properties"]["outgoingBearingDeg"].is_number());
}

#[tokio::test]
async fn export_kml_sets_download_headers() {
    let mut job = two_pole_job();
    job["filename"] = json!("route.kml");
    let res = setup_app()
        .oneshot(post_json("/v1/export/kml", job))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()[header::CONTENT_TYPE],
        "application/vnd.google-earth.kml+xml"
    );
    assert_eq!(
        res.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"route.kml\""
    );
    assert_eq!(res.headers()["x-export-format"], "kml");
    assert!(res.headers().get("x-export-fallback").is_none());

    let kml = String::from_utf8(read_bytes(res).await).unwrap();
    assert_eq!(kml.matches("<Placemark>").count(), 3);
}

#[tokio::test]
async fn export_kmz_is_a_zip_with_doc_kml() {
    let res = setup_app()
        .oneshot(post_json("/v1/export/kmz", two_pole_job()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"poleplan.kmz\""
    );

    let bytes = read_bytes(res).await;
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut doc = String::new();
    archive
        .by_name("doc.kml")
        .unwrap()
        .read_to_string(&mut doc)
        .unwrap();
    assert!(doc.contains("<Folder>"));
}

#[tokio::test]
async fn export_without_converter_falls_back_to_geojson() {
    let mut registry = ConverterRegistry::with_defaults();
    registry.unregister(ExportFormat::Shapefile);
    let state = AppState {
        exporter: Exporter::new(Arc::new(registry)),
        ..AppState::default()
    };

    let mut job = two_pole_job();
    job["filename"] = json!("poles.zip");
    let res = setup_app_with(state)
        .oneshot(post_json("/v1/export/shapefile", job))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "application/geo+json");
    assert_eq!(
        res.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"poles.geojson\""
    );
    assert_eq!(res.headers()["x-export-format"], "geojson");
    assert_eq!(
        res.headers()["x-export-fallback"],
        "no shapefile converter is available"
    );

    let body = read_json(res).await;
    assert_eq!(body["features"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn export_unknown_format_is_bad_request() {
    let res = setup_app()
        .oneshot(post_json("/v1/export/gpx", two_pole_job()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = read_json(res).await;
    assert!(body["error"].as_str().unwrap().contains("gpx"));
}

#[tokio::test]
async fn export_formats_report_native_support() {
    let res = setup_app().oneshot(get("/v1/export/formats")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    let formats = body.as_array().unwrap();
    assert_eq!(formats.len(), 4);
    assert!(formats.iter().all(|f| f["native"] == true));
}

#[tokio::test]
async fn env_target_lookup() {
    let res = setup_app().oneshot(get("/v1/targets/wvHighway")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body, json!({ "env": "wvHighway", "targetFt": 18.0 }));

    let res = setup_app().oneshot(get("/v1/targets/moonbase")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn target_listing_covers_builtin_environments() {
    let res = setup_app().oneshot(get("/v1/targets")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    let targets = body.as_array().unwrap();
    assert_eq!(targets.len(), 11);
    assert!(targets
        .iter()
        .any(|t| t["env"] == "railroad" && t["targetFt"] == 27.0));
}

#[tokio::test]
async fn controlling_target_takes_the_worst_segment() {
    let res = setup_app()
        .oneshot(post_json(
            "/v1/targets/controlling",
            json!({
                "segments": [
                    { "env": "road", "portion": 40 },
                    { "env": "nonResidentialDriveway", "portion": 60 }
                ],
                "fallbackEnv": "road"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["env"], "nonResidentialDriveway");
    assert_eq!(body["targetFt"], 16.0);
    assert_eq!(body["fromFallback"], false);
}

#[tokio::test]
async fn controlling_target_falls_back_and_honours_overrides() {
    let res = setup_app()
        .oneshot(post_json(
            "/v1/targets/controlling",
            json!({
                "segments": [],
                "fallbackEnv": "road",
                "profile": { "envRoadFt": 17.25 }
            }),
        ))
        .await
        .unwrap();
    let body = read_json(res).await;
    assert_eq!(body["env"], "road");
    assert_eq!(body["targetFt"], 17.25);
    assert_eq!(body["fromFallback"], true);

    let res = setup_app()
        .oneshot(post_json(
            "/v1/targets/controlling",
            json!({ "segments": [{ "env": "moonbase" }], "fallbackEnv": "nowhere" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["targetFt"], Value::Null);
}

#[tokio::test]
async fn permit_summary_prefers_cached_measurements() {
    let res = setup_app()
        .oneshot(post_json(
            "/v1/permit/summary",
            json!({
                "env": "wvHighway",
                "results": { "clearances": { "groundClearance": 17.2 } },
                "job": { "name": "Route 7" },
                "cachedMidspans": [
                    { "environment": "wvHighway", "targetFt": 18 },
                    { "environment": "wvHighway", "targetFt": 19 },
                    { "environment": "road", "targetFt": 17 }
                ]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["type"], "WVDOH MM109");
    assert_eq!(body["span"]["targetFt"], 19.0);
    assert_eq!(body["span"]["targetSource"], "cachedMidspans");
    assert_eq!(body["span"]["computedGroundClearanceFt"], 17.2);
    assert_eq!(body["job"]["name"], "Route 7");
    assert_eq!(body["profile"]["envTargetFt"], 18.0);
}

#[tokio::test]
async fn permit_profile_overrides_layer_on_server_profile() {
    let res = setup_app()
        .oneshot(post_json(
            "/v1/permit/summary",
            json!({
                "env": "railroad",
                "results": {},
                "effectiveProfile": { "envRailroadFt": 28.5 }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["type"], "CSX Railroad Crossing");
    assert_eq!(body["profile"]["envTargetFt"], 28.5);
    assert_eq!(body["span"]["targetSource"], "computed");
    assert_eq!(body["span"]["targetFt"], Value::Null);
}

#[tokio::test]
async fn permit_without_results_is_unprocessable() {
    let res = setup_app()
        .oneshot(post_json("/v1/permit/summary", json!({ "env": "road" })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json(res).await;
    assert!(body["error"].as_str().unwrap().contains("engineering results"));
}

#[tokio::test]
async fn permit_needs_only_results() {
    let res = setup_app()
        .oneshot(post_json(
            "/v1/permit/summary",
            json!({
                "results": { "clearances": { "groundClearance": 16 } },
                "cachedMidspans": [
                    { "targetFt": 18 },
                    { "environment": "road", "targetFt": 17 }
                ]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = read_json(res).await;
    assert_eq!(body["type"], "General");
    assert_eq!(body["span"]["targetSource"], "computed");
    assert_eq!(body["span"]["targetFt"], 16.0);
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let config = Config {
        max_body_bytes: 64,
        ..Config::default()
    };
    let app = api::routes(&config).with_state(Arc::new(AppState::default()));
    let res = app
        .oneshot(post_json("/v1/geodata", two_pole_job()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
