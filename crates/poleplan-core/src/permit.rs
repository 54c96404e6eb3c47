//! Permit summary assembly.
//!
//! The summary is the single snapshot that field mappers and PDF drafts read
//! from. Text fields are always strings (possibly empty) and every number is
//! either finite or `null`, so downstream interpolation never prints junk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lenient;
use crate::models::{CachedMidspan, JobMeta};
use crate::targets::{self, ClearanceProfile};

#[derive(Debug, thiserror::Error)]
pub enum PermitError {
    #[error("engineering results are required to build a permit summary")]
    MissingResults,
}

/// Permit package type, fixed by the crossing environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermitType {
    #[serde(rename = "CSX Railroad Crossing")]
    CsxRailroadCrossing,
    #[serde(rename = "WVDOH MM109")]
    WvdohMm109,
    #[serde(rename = "General")]
    General,
}

impl PermitType {
    pub fn from_env(env: &str) -> Self {
        match env {
            "railroad" => Self::CsxRailroadCrossing,
            "wvHighway" => Self::WvdohMm109,
            _ => Self::General,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::CsxRailroadCrossing => "CSX Railroad Crossing",
            Self::WvdohMm109 => "WVDOH MM109",
            Self::General => "General",
        }
    }
}

/// Where `span.targetFt` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetSource {
    CachedMidspans,
    Computed,
}

/// Output of the clearance calculator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineeringResults {
    #[serde(default)]
    pub clearances: Clearances,
    #[serde(default)]
    pub span: SpanResults,
    #[serde(default)]
    pub attach: AttachResults,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clearances {
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub ground_clearance: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub midspan_clearance_ft: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub power_separation_ft: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanResults {
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub length_ft: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub sag_ft: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub midspan_ft: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachResults {
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub proposed_height_ft: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub existing_height_ft: Option<f64>,
}

/// Working values from the current session, used when the job record is silent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub job_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub job_number: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub applicant_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub job_location: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub comm_company: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub power_company: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub comm_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub pole_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub pole_height: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub pole_class: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub pole_latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub pole_longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub has_transformer: bool,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub existing_power_height: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub existing_power_voltage: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub span_distance: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub proposed_line_height: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub attachment_type: Option<String>,
}

/// Everything needed to assemble a summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitSummaryInput {
    /// Crossing environment; blank resolves to a general permit
    #[serde(default, deserialize_with = "lenient::string")]
    pub env: String,
    #[serde(default)]
    pub results: Option<EngineeringResults>,
    #[serde(default)]
    pub job: JobMeta,
    #[serde(default = "ClearanceProfile::default")]
    pub effective_profile: ClearanceProfile,
    #[serde(default)]
    pub cached_midspans: Vec<CachedMidspan>,
    #[serde(default)]
    pub store: StoreSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitSummary {
    #[serde(rename = "type")]
    pub permit_type: PermitType,
    pub env: String,
    pub job: JobSection,
    pub profile: ProfileSection,
    pub pole: PoleSection,
    pub power: PowerSection,
    pub span: SpanSection,
    pub attach: AttachSection,
    pub timestamps: Timestamps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSection {
    pub id: String,
    pub name: String,
    pub job_number: String,
    pub applicant: String,
    pub location: String,
    pub comm_company: String,
    pub power_company: String,
    pub comm_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSection {
    /// Profile key consulted for this environment, e.g. `envWVHighwayFt`
    pub env_key: String,
    pub env_target_ft: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoleSection {
    pub id: String,
    pub height_ft: Option<f64>,
    pub pole_class: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub has_transformer: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerSection {
    pub height_ft: Option<f64>,
    pub voltage: String,
    pub separation_ft: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanSection {
    pub length_ft: Option<f64>,
    pub environment: String,
    pub target_ft: Option<f64>,
    pub computed_ground_clearance_ft: Option<f64>,
    pub target_source: TargetSource,
    pub midspan_ft: Option<f64>,
    pub sag_ft: Option<f64>,
    /// Number of cached measurements considered for this environment
    pub cached_measurements: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachSection {
    pub proposed_height_ft: Option<f64>,
    pub existing_height_ft: Option<f64>,
    pub attachment_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timestamps {
    pub generated_at: DateTime<Utc>,
}

/// Assemble a permit summary stamped with the current time.
pub fn make_permit_summary(input: &PermitSummaryInput) -> Result<PermitSummary, PermitError> {
    make_permit_summary_at(input, Utc::now())
}

/// Assemble a permit summary with an explicit generation time.
pub fn make_permit_summary_at(
    input: &PermitSummaryInput,
    generated_at: DateTime<Utc>,
) -> Result<PermitSummary, PermitError> {
    let results = input.results.as_ref().ok_or(PermitError::MissingResults)?;
    let job = &input.job;
    let store = &input.store;
    let env = input.env.as_str();

    let computed = lenient::finite(results.clearances.ground_clearance);
    let cached_measurements = targets::measurements_for(&input.cached_midspans, env).count();
    let (target_ft, target_source) = match targets::cached_max(&input.cached_midspans, env) {
        Some(_) => (
            targets::max_target_from_cached(&input.cached_midspans, env, &input.effective_profile),
            TargetSource::CachedMidspans,
        ),
        None => (computed, TargetSource::Computed),
    };

    tracing::debug!(
        env,
        target_ft = ?target_ft,
        source = ?target_source,
        "assembled permit target"
    );

    Ok(PermitSummary {
        permit_type: PermitType::from_env(env),
        env: env.to_string(),
        job: JobSection {
            id: text(&[job.id.as_ref()]),
            name: text(&[job.name.as_ref(), store.job_name.as_ref()]),
            job_number: text(&[job.job_number.as_ref(), store.job_number.as_ref()]),
            applicant: text(&[job.applicant_name.as_ref(), store.applicant_name.as_ref()]),
            location: text(&[job.location.as_ref(), store.job_location.as_ref()]),
            comm_company: text(&[job.comm_company.as_ref(), store.comm_company.as_ref()]),
            power_company: text(&[job.power_company.as_ref(), store.power_company.as_ref()]),
            comm_id: text(&[job.comm_id.as_ref(), store.comm_id.as_ref()]),
        },
        profile: ProfileSection {
            env_key: targets::profile_key(env).unwrap_or_default(),
            env_target_ft: targets::get_env_target(&input.effective_profile, env),
        },
        pole: PoleSection {
            id: text(&[job.pole_id.as_ref(), store.pole_id.as_ref()]),
            height_ft: lenient::finite(store.pole_height),
            pole_class: text(&[store.pole_class.as_ref()]),
            latitude: lenient::finite(store.pole_latitude),
            longitude: lenient::finite(store.pole_longitude),
            has_transformer: store.has_transformer,
        },
        power: PowerSection {
            height_ft: lenient::finite(store.existing_power_height),
            voltage: text(&[store.existing_power_voltage.as_ref()]),
            separation_ft: lenient::finite(results.clearances.power_separation_ft),
        },
        span: SpanSection {
            length_ft: first_number(&[results.span.length_ft, store.span_distance]),
            environment: env.to_string(),
            target_ft,
            computed_ground_clearance_ft: computed,
            target_source,
            midspan_ft: first_number(&[
                results.span.midspan_ft,
                results.clearances.midspan_clearance_ft,
            ]),
            sag_ft: lenient::finite(results.span.sag_ft),
            cached_measurements,
        },
        attach: AttachSection {
            proposed_height_ft: first_number(&[
                results.attach.proposed_height_ft,
                store.proposed_line_height,
            ]),
            existing_height_ft: lenient::finite(results.attach.existing_height_ft),
            attachment_type: text(&[store.attachment_type.as_ref()]),
        },
        timestamps: Timestamps { generated_at },
    })
}

/// First non-blank candidate, else an empty string.
fn text(candidates: &[Option<&String>]) -> String {
    candidates
        .iter()
        .flatten()
        .find(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
        .unwrap_or_default()
}

fn first_number(candidates: &[Option<f64>]) -> Option<f64> {
    candidates.iter().find_map(|v| lenient::finite(*v))
}
