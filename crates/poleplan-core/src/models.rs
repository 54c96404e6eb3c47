//! Core data models for pole-attachment jobs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::lenient;

/// A utility pole collected in the field or imported from CSV/GeoJSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pole {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub job_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<String>,
    #[serde(default, alias = "lat", deserialize_with = "lenient::opt_f64")]
    pub latitude: Option<f64>,
    #[serde(default, alias = "lon", alias = "lng", deserialize_with = "lenient::opt_f64")]
    pub longitude: Option<f64>,
    /// Pole height in feet
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub height: Option<f64>,
    /// Forwarded with its JSON type, e.g. `"4"` or `4`
    #[serde(default, deserialize_with = "lenient::opt_scalar")]
    pub pole_class: Option<Value>,
    /// Lowest power conductor attachment height in feet
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub power_height: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_scalar")]
    pub voltage: Option<Value>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub has_transformer: bool,
    #[serde(default, deserialize_with = "lenient::opt_scalar")]
    pub attachment_type: Option<Value>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub incoming_bearing_deg: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub outgoing_bearing_deg: Option<f64>,
    #[serde(rename = "PULL_ft", default, deserialize_with = "lenient::opt_f64")]
    pub pull_ft: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_built: Option<AsBuilt>,
    /// Variance against as-built, computed elsewhere and forwarded untouched.
    #[serde(
        rename = "_varianceIn",
        default,
        deserialize_with = "lenient::opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub variance_in: Option<f64>,
    #[serde(
        rename = "_variancePass",
        default,
        deserialize_with = "lenient::opt_flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub variance_pass: Option<bool>,
}

impl Pole {
    /// Create a pole with only an id and coordinates.
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            latitude: Some(latitude),
            longitude: Some(longitude),
            ..Self::default()
        }
    }

    /// `[lon, lat]` when both coordinates are finite.
    pub fn position(&self) -> Option<[f64; 2]> {
        let lat = lenient::finite(self.latitude)?;
        let lon = lenient::finite(self.longitude)?;
        Some([lon, lat])
    }
}

/// As-built measurements captured after construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsBuilt {
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub attach_height: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub power_height: Option<f64>,
}

/// A directed span between two poles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub job_id: Option<String>,
    /// Empty when the record names no endpoint; such spans never resolve
    #[serde(default, deserialize_with = "lenient::string")]
    pub from_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub to_id: String,
    /// Span length in feet
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub length: Option<f64>,
    /// Proposed attachment height in feet
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub proposed_attach: Option<f64>,
    /// Environment key used by the target resolver (e.g. `road`, `wvHighway`)
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub environment: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub incoming_bearing_deg: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub outgoing_bearing_deg: Option<f64>,
    #[serde(rename = "PULL_ft", default, deserialize_with = "lenient::opt_f64")]
    pub pull_ft: Option<f64>,
}

impl Span {
    pub fn new(id: impl Into<String>, from_id: impl Into<String>, to_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            from_id: from_id.into(),
            to_id: to_id.into(),
            ..Self::default()
        }
    }

    pub fn with_length(mut self, length_ft: f64) -> Self {
        self.length = Some(length_ft);
        self
    }
}

/// Job-level metadata supplied alongside poles and spans.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMeta {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub job_number: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub applicant_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub comm_company: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub power_company: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub comm_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub pole_id: Option<String>,
}

/// A measured or estimated controlling clearance for one crossing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedMidspan {
    /// Empty when the measurement was recorded without one; it then matches nothing
    #[serde(default, deserialize_with = "lenient::string")]
    pub environment: String,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub target_ft: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub span_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub span_ft: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub midspan_ft: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub attach_ft: Option<f64>,
    #[serde(default)]
    pub segments: Vec<EnvSegment>,
}

impl CachedMidspan {
    pub fn new(environment: impl Into<String>, target_ft: f64) -> Self {
        Self {
            environment: environment.into(),
            target_ft: Some(target_ft),
            ..Self::default()
        }
    }
}

/// Portion of a span crossing a given environment.
///
/// `portion` is kept for reporting; it never weights the controlling target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvSegment {
    #[serde(default, deserialize_with = "lenient::string")]
    pub env: String,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub portion: Option<f64>,
}

impl EnvSegment {
    pub fn new(env: impl Into<String>, portion: f64) -> Self {
        Self {
            env: env.into(),
            portion: Some(portion),
        }
    }
}
