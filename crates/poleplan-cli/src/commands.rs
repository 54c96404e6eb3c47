//! Command implementations behind the `poleplan` binary.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use poleplan_core::targets::{controlling_ground_target_detail, get_env_target, ControllingTarget};
use poleplan_core::{
    make_permit_summary, AutofillOptions, ClearanceProfile, DirectorySink, EnvSegment,
    ExportFormat, ExportOutcome, Exporter, PermitSummary, PermitSummaryInput,
};

use crate::job::JobFile;

/// Export a loaded job into `out_dir`.
pub fn export_job(
    exporter: &Exporter,
    mut job: JobFile,
    format: ExportFormat,
    out_dir: &Path,
    filename: Option<&str>,
    autofill: Option<&AutofillOptions>,
) -> Result<ExportOutcome> {
    let fc = job.feature_collection(autofill);
    let filename = filename.map(str::to_string).unwrap_or_else(|| {
        let stem = job
            .job
            .id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or("poleplan");
        format!("{stem}.{}", format.extension())
    });

    let mut sink = DirectorySink::new(out_dir);
    let outcome = exporter
        .export(format, &fc, &filename, &mut sink)
        .with_context(|| format!("exporting {format}"))?;
    Ok(outcome)
}

/// Built-in profile with optional overrides from a JSON file.
pub fn load_profile(path: Option<&Path>) -> Result<ClearanceProfile> {
    Ok(match path {
        Some(path) => ClearanceProfile::from_json_file(path)?,
        None => ClearanceProfile::default(),
    })
}

/// Build a permit summary from an input file.
///
/// When `profile` is given it replaces whatever `effectiveProfile` the file carries.
pub fn permit_summary(input: &Path, profile: Option<ClearanceProfile>) -> Result<PermitSummary> {
    let raw = fs::read_to_string(input)
        .with_context(|| format!("reading permit input {}", input.display()))?;
    let mut input: PermitSummaryInput = serde_json::from_str(&raw)
        .with_context(|| format!("parsing permit input {}", input.display()))?;
    if let Some(profile) = profile {
        input.effective_profile = profile;
    }
    Ok(make_permit_summary(&input)?)
}

/// Parse `env` or `env:portion`, e.g. `road:40`.
pub fn parse_segment(text: &str) -> Result<EnvSegment> {
    let (env, portion) = match text.split_once(':') {
        Some((env, portion)) => {
            let portion: f64 = portion
                .trim()
                .parse()
                .map_err(|_| anyhow!("invalid portion in segment '{text}'"))?;
            (env.trim(), Some(portion))
        }
        None => (text.trim(), None),
    };
    if env.is_empty() {
        bail!("segment '{text}' has no environment");
    }
    Ok(EnvSegment {
        env: env.to_string(),
        portion,
    })
}

/// Single environment target, or the controlling target across segments.
pub fn resolve_target(
    profile: &ClearanceProfile,
    env: &str,
    segments: &[EnvSegment],
) -> Result<ControllingTarget> {
    if segments.is_empty() {
        let target_ft = get_env_target(profile, env)
            .ok_or_else(|| anyhow!("no clearance target configured for '{env}'"))?;
        return Ok(ControllingTarget {
            env: env.to_string(),
            target_ft,
            from_fallback: false,
        });
    }
    controlling_ground_target_detail(profile, segments, env)
        .ok_or_else(|| anyhow!("none of the segments or fallback '{env}' has a target"))
}
