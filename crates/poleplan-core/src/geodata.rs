//! GeoJSON feature collection built from poles and spans.
//!
//! Poles become `Point` features, spans become two-vertex `LineString`
//! features. Records without usable coordinates are dropped without error;
//! missing field data is routine, not exceptional.

use std::collections::HashMap;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::lenient;
use crate::models::{AsBuilt, JobMeta, Pole, Span};

const DEFAULT_STATUS: &str = "draft";

/// A GeoJSON `FeatureCollection`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn empty() -> Self {
        Self {
            features: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = &Feature> {
        self.features
            .iter()
            .filter(|f| matches!(f.geometry, Geometry::Point { .. }))
    }

    pub fn lines(&self) -> impl Iterator<Item = &Feature> {
        self.features
            .iter()
            .filter(|f| matches!(f.geometry, Geometry::LineString { .. }))
    }
}

/// A GeoJSON `Feature` with free-form properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    pub geometry: Geometry,
    #[serde(default, deserialize_with = "properties_or_empty")]
    pub properties: Map<String, Value>,
}

impl Feature {
    /// The `id` property, if it is a string.
    pub fn id(&self) -> Option<&str> {
        self.properties.get("id").and_then(Value::as_str)
    }

    /// Numeric property lookup.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.properties.get(key).and_then(lenient::finite_number)
    }
}

/// The only geometry kinds this pipeline emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    /// `[lon, lat]`
    Point {
        #[serde(deserialize_with = "position")]
        coordinates: [f64; 2],
    },
    LineString {
        #[serde(deserialize_with = "positions")]
        coordinates: Vec<[f64; 2]>,
    },
}

/// `"properties": null` is valid GeoJSON and reads as no properties.
fn properties_or_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A GeoJSON position; altitude and any further members are dropped.
fn position<'de, D>(deserializer: D) -> Result<[f64; 2], D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<f64>::deserialize(deserializer)?;
    lon_lat(&raw).ok_or_else(|| de::Error::invalid_length(raw.len(), &"at least 2 members"))
}

fn positions<'de, D>(deserializer: D) -> Result<Vec<[f64; 2]>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<Vec<f64>>::deserialize(deserializer)?
        .iter()
        .map(|raw| {
            lon_lat(raw).ok_or_else(|| de::Error::invalid_length(raw.len(), &"at least 2 members"))
        })
        .collect()
}

fn lon_lat(raw: &[f64]) -> Option<[f64; 2]> {
    match raw {
        [lon, lat, ..] => Some([*lon, *lat]),
        _ => None,
    }
}

/// Build the feature collection for a job.
///
/// All qualifying poles come first, in input order, followed by all spans
/// whose endpoints both resolve.
pub fn build_feature_collection(poles: &[Pole], spans: &[Span], job: &JobMeta) -> FeatureCollection {
    let mut features = Vec::with_capacity(poles.len() + spans.len());
    let mut index: HashMap<&str, [f64; 2]> = HashMap::with_capacity(poles.len());

    for pole in poles {
        let Some(position) = pole.position() else {
            continue;
        };
        if !pole.id.is_empty() {
            index.insert(pole.id.as_str(), position);
        }
        features.push(Feature {
            geometry: Geometry::Point {
                coordinates: position,
            },
            properties: pole_properties(pole, job),
        });
    }

    for span in spans {
        let (Some(from), Some(to)) = (
            index.get(span.from_id.as_str()),
            index.get(span.to_id.as_str()),
        ) else {
            continue;
        };
        features.push(Feature {
            geometry: Geometry::LineString {
                coordinates: vec![*from, *to],
            },
            properties: span_properties(span, job),
        });
    }

    FeatureCollection { features }
}

fn job_id_for(own: Option<&String>, job: &JobMeta) -> Value {
    own.or(job.id.as_ref())
        .map(|id| Value::String(id.clone()))
        .unwrap_or(Value::Null)
}

fn pole_properties(pole: &Pole, job: &JobMeta) -> Map<String, Value> {
    let mut props = Map::new();
    props.insert("id".into(), Value::String(pole.id.clone()));
    props.insert("jobId".into(), job_id_for(pole.job_id.as_ref(), job));
    props.insert(
        "status".into(),
        Value::String(
            pole.status
                .clone()
                .unwrap_or_else(|| DEFAULT_STATUS.to_string()),
        ),
    );
    props.insert("height".into(), number_or_null(pole.height));
    props.insert("poleClass".into(), pole.pole_class.clone().unwrap_or(Value::Null));
    props.insert("powerHeight".into(), number_or_null(pole.power_height));
    props.insert("voltage".into(), pole.voltage.clone().unwrap_or(Value::Null));
    props.insert("hasTransformer".into(), Value::Bool(pole.has_transformer));
    props.insert(
        "attachmentType".into(),
        pole.attachment_type.clone().unwrap_or(Value::Null),
    );
    props.insert(
        "incomingBearingDeg".into(),
        number_or_null(pole.incoming_bearing_deg),
    );
    props.insert(
        "outgoingBearingDeg".into(),
        number_or_null(pole.outgoing_bearing_deg),
    );
    props.insert("PULL_ft".into(), number_or_null(pole.pull_ft));
    props.insert("timestamp".into(), text_or_null(pole.timestamp.as_ref()));

    // Only-if-present: consumers need "not computed" to differ from zero.
    if let Some(AsBuilt {
        attach_height,
        power_height,
    }) = &pole.as_built
    {
        insert_number(&mut props, "asBuiltAttach", *attach_height);
        insert_number(&mut props, "asBuiltPower", *power_height);
    }
    insert_number(&mut props, "varianceIn", pole.variance_in);
    if let Some(pass) = pole.variance_pass {
        props.insert("variancePass".into(), Value::Bool(pass));
    }
    props
}

fn span_properties(span: &Span, job: &JobMeta) -> Map<String, Value> {
    let mut props = Map::new();
    props.insert("id".into(), Value::String(span.id.clone()));
    props.insert("jobId".into(), job_id_for(span.job_id.as_ref(), job));
    props.insert("fromId".into(), Value::String(span.from_id.clone()));
    props.insert("toId".into(), Value::String(span.to_id.clone()));
    props.insert("lengthFt".into(), number_or_null(span.length));
    props.insert("proposedAttach".into(), number_or_null(span.proposed_attach));
    props.insert("environment".into(), text_or_null(span.environment.as_ref()));
    insert_number(&mut props, "incomingBearingDeg", span.incoming_bearing_deg);
    insert_number(&mut props, "outgoingBearingDeg", span.outgoing_bearing_deg);
    insert_number(&mut props, "PULL_ft", span.pull_ft);
    props
}

fn number_or_null(value: Option<f64>) -> Value {
    lenient::finite(value)
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn text_or_null(value: Option<&String>) -> Value {
    value.map(|s| Value::String(s.clone())).unwrap_or(Value::Null)
}

fn insert_number(props: &mut Map<String, Value>, key: &str, value: Option<f64>) {
    if let Some(n) = lenient::finite(value).and_then(serde_json::Number::from_f64) {
        props.insert(key.to_string(), Value::Number(n));
    }
}

/// Errors from reading a feature collection back in.
#[derive(Debug, thiserror::Error)]
pub enum GeodataError {
    #[error("invalid GeoJSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Poles and spans recovered from a feature collection.
#[derive(Debug, Clone, Default)]
pub struct ImportedJob {
    pub poles: Vec<Pole>,
    pub spans: Vec<Span>,
    /// Features that could not be mapped back (unsupported geometry, missing id).
    pub skipped: usize,
}

/// Read a GeoJSON document into poles and spans.
///
/// Points become poles, two-vertex line strings become spans. Span endpoints
/// come from `fromId`/`toId` when present, otherwise they are matched to poles
/// by coordinate.
pub fn parse_feature_collection(json: &str) -> Result<ImportedJob, GeodataError> {
    let raw: Value = serde_json::from_str(json)?;
    let features = raw
        .get("features")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut imported = ImportedJob::default();
    let mut pending_lines = Vec::new();

    for (i, raw_feature) in features.into_iter().enumerate() {
        // Unsupported geometries (polygons etc.) are skipped rather than failing the whole file.
        let Ok(feature) = serde_json::from_value::<Feature>(raw_feature) else {
            imported.skipped += 1;
            continue;
        };
        match feature.geometry {
            Geometry::Point { coordinates } => {
                let mut props = Value::Object(feature.properties);
                fill_id(&mut props, || format!("pole-{}", i + 1));
                let Ok(mut pole) = serde_json::from_value::<Pole>(props) else {
                    imported.skipped += 1;
                    continue;
                };
                pole.longitude = Some(coordinates[0]);
                pole.latitude = Some(coordinates[1]);
                imported.poles.push(pole);
            }
            Geometry::LineString { coordinates } => {
                pending_lines.push((i, coordinates, feature.properties));
            }
        }
    }

    for (i, coordinates, properties) in pending_lines {
        match span_from_line(i, &coordinates, properties, &imported.poles) {
            Some(span) => imported.spans.push(span),
            None => imported.skipped += 1,
        }
    }

    Ok(imported)
}

fn fill_id(props: &mut Value, make: impl FnOnce() -> String) {
    if let Value::Object(map) = props {
        let missing = map
            .get("id")
            .and_then(lenient::text)
            .map_or(true, |id| id.trim().is_empty());
        if missing {
            map.insert("id".into(), Value::String(make()));
        }
    }
}

fn span_from_line(
    i: usize,
    coordinates: &[[f64; 2]],
    mut properties: Map<String, Value>,
    poles: &[Pole],
) -> Option<Span> {
    let (first, last) = (coordinates.first()?, coordinates.last()?);
    let from_id = endpoint_id(&properties, "fromId").or_else(|| pole_at(poles, *first))?;
    let to_id = endpoint_id(&properties, "toId").or_else(|| pole_at(poles, *last))?;

    properties.insert("fromId".into(), Value::String(from_id));
    properties.insert("toId".into(), Value::String(to_id));
    if let Some(length) = properties.remove("lengthFt") {
        properties.entry("length").or_insert(length);
    }
    let mut props = Value::Object(properties);
    fill_id(&mut props, || format!("span-{}", i + 1));
    serde_json::from_value(props).ok()
}

fn endpoint_id(properties: &Map<String, Value>, key: &str) -> Option<String> {
    properties
        .get(key)
        .and_then(lenient::text)
        .filter(|id| !id.trim().is_empty())
}

fn pole_at(poles: &[Pole], coordinate: [f64; 2]) -> Option<String> {
    const EPS_DEG: f64 = 1e-9;
    poles
        .iter()
        .find(|p| {
            p.position().is_some_and(|[lon, lat]| {
                (lon - coordinate[0]).abs() < EPS_DEG && (lat - coordinate[1]).abs() < EPS_DEG
            })
        })
        .map(|p| p.id.clone())
}
