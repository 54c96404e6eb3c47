//! Shared, read-only application state.

use anyhow::Result;
use poleplan_core::{AutofillOptions, ClearanceProfile, Exporter};

use crate::config::Config;

/// Application state shared by every handler.
///
/// Nothing here changes after startup, so handlers read it without locking.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub profile: ClearanceProfile,
    pub exporter: Exporter,
    pub autofill: AutofillOptions,
}

impl AppState {
    pub fn new(profile: ClearanceProfile, exporter: Exporter, autofill: AutofillOptions) -> Self {
        Self {
            profile,
            exporter,
            autofill,
        }
    }

    /// Build state from config, loading profile overrides if a path is set.
    pub fn from_config(config: &Config) -> Result<Self> {
        let profile = match &config.profile_path {
            Some(path) => {
                let profile = ClearanceProfile::from_json_file(path)?;
                tracing::info!(path = %path.display(), "using clearance profile overrides");
                profile
            }
            None => ClearanceProfile::default(),
        };

        Ok(Self::new(
            profile,
            Exporter::default(),
            AutofillOptions {
                pull_reference_ft: config.pull_reference_ft,
            },
        ))
    }
}
