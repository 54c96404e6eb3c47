//! Server configuration from environment.

use std::env;
use std::path::PathBuf;

use poleplan_core::autofill::DEFAULT_PULL_REFERENCE_FT;

const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    /// JSON file of clearance profile overrides, layered on the built-in profile
    pub profile_path: Option<PathBuf>,
    pub pull_reference_ft: f64,
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            profile_path: None,
            pull_reference_ft: DEFAULT_PULL_REFERENCE_FT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: env::var("POLEPLAN_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.server_port),
            profile_path: env::var("POLEPLAN_PROFILE_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            pull_reference_ft: env::var("POLEPLAN_PULL_REFERENCE_FT")
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v > 0.0)
                .unwrap_or(defaults.pull_reference_ft),
            max_body_bytes: env::var("POLEPLAN_MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_bytes),
        }
    }
}
