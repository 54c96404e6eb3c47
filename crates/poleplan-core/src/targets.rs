//! Regulatory ground-clearance targets.
//!
//! A span must satisfy the strictest environment it crosses, so every
//! resolver here takes a maximum. Portions never weight the result, and
//! unknown or malformed values are left out of the max instead of poisoning it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::lenient;
use crate::models::{CachedMidspan, EnvSegment};

/// Environment keys with a default clearance, in profile order.
pub const KNOWN_ENVIRONMENTS: &[&str] = &[
    "pedestrian",
    "residentialYard",
    "residentialDriveway",
    "road",
    "nonResidentialDriveway",
    "field",
    "waterway",
    "wvHighway",
    "interstate",
    "interstateNewCrossing",
    "railroad",
];

/// Keys whose profile name keeps an acronym in capitals.
const ACRONYM_KEYS: &[(&str, &str)] = &[("wvHighway", "envWVHighwayFt")];

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("reading clearance profile {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing clearance profile {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Flat clearance profile keyed `env<CamelCaseName>Ft`.
///
/// Other keys are allowed and carried along untouched, so a full job profile
/// (voltages, sag settings, ...) can be passed in as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClearanceProfile(BTreeMap<String, Value>);

impl Default for ClearanceProfile {
    /// NESC-style communication clearances in feet, with WVDOH and CSX overrides.
    fn default() -> Self {
        Self::from_pairs([
            ("envPedestrianFt", 9.5),
            ("envResidentialYardFt", 9.5),
            ("envResidentialDrivewayFt", 11.5),
            ("envRoadFt", 15.5),
            ("envNonResidentialDrivewayFt", 16.0),
            ("envFieldFt", 15.5),
            ("envWaterwayFt", 14.0),
            ("envWVHighwayFt", 18.0),
            ("envInterstateFt", 18.0),
            ("envInterstateNewCrossingFt", 21.0),
            ("envRailroadFt", 27.0),
        ])
    }
}

impl ClearanceProfile {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        let mut profile = Self::empty();
        for (key, value) in pairs {
            profile.set(key, value);
        }
        profile
    }

    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        let value = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null);
        self.0.insert(key.into(), value);
    }

    /// Finite numeric value stored under `key`.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(lenient::finite_number)
    }

    /// Overlay `other` on top of this profile; keys in `other` win.
    pub fn merged(mut self, other: &ClearanceProfile) -> Self {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Built-in defaults with the keys of a flat JSON file layered on top.
    pub fn from_json_file(path: &Path) -> Result<Self, ProfileError> {
        let raw = fs::read_to_string(path).map_err(|source| ProfileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let overrides: ClearanceProfile =
            serde_json::from_str(&raw).map_err(|source| ProfileError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(
            path = %path.display(),
            keys = overrides.keys().count(),
            "loaded clearance profile overrides"
        );
        Ok(Self::default().merged(&overrides))
    }
}

/// Profile key for an environment: `road` → `envRoadFt`, `wvHighway` → `envWVHighwayFt`.
pub fn profile_key(env_key: &str) -> Option<String> {
    if let Some((_, key)) = ACRONYM_KEYS.iter().find(|(env, _)| *env == env_key) {
        return Some((*key).to_string());
    }
    let mut chars = env_key.chars();
    let first = chars.next()?;
    Some(format!("env{}{}Ft", first.to_uppercase(), chars.as_str()))
}

/// Configured minimum clearance for one environment, if any.
pub fn get_env_target(profile: &ClearanceProfile, env_key: &str) -> Option<f64> {
    profile.number(&profile_key(env_key)?)
}

/// Which environment produced a controlling target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllingTarget {
    pub env: String,
    pub target_ft: f64,
    /// True when no listed segment resolved and the fallback environment was used
    pub from_fallback: bool,
}

/// Strictest target across the environments a span crosses.
///
/// Falls back to `fallback_env` when `segments` is empty or none of its
/// environments has a configured target.
pub fn controlling_ground_target(
    profile: &ClearanceProfile,
    segments: &[EnvSegment],
    fallback_env: &str,
) -> Option<f64> {
    controlling_ground_target_detail(profile, segments, fallback_env).map(|t| t.target_ft)
}

/// Like [`controlling_ground_target`] but reports the winning environment.
pub fn controlling_ground_target_detail(
    profile: &ClearanceProfile,
    segments: &[EnvSegment],
    fallback_env: &str,
) -> Option<ControllingTarget> {
    let mut best: Option<ControllingTarget> = None;
    for segment in segments {
        let Some(target) = get_env_target(profile, &segment.env) else {
            continue;
        };
        // Ties keep the first listed environment.
        if best.as_ref().map_or(true, |b| target > b.target_ft) {
            best = Some(ControllingTarget {
                env: segment.env.clone(),
                target_ft: target,
                from_fallback: false,
            });
        }
    }

    best.or_else(|| {
        get_env_target(profile, fallback_env).map(|target_ft| ControllingTarget {
            env: fallback_env.to_string(),
            target_ft,
            from_fallback: true,
        })
    })
}

/// Largest cached target recorded for `env_key`.
///
/// Any measurement for the environment beats the profile default, and the
/// highest one ever recorded wins regardless of when it was added.
pub fn max_target_from_cached(
    cached: &[CachedMidspan],
    env_key: &str,
    profile: &ClearanceProfile,
) -> Option<f64> {
    cached_max(cached, env_key).or_else(|| get_env_target(profile, env_key))
}

/// Max finite `targetFt` among measurements for `env_key`, without profile fallback.
pub(crate) fn cached_max(cached: &[CachedMidspan], env_key: &str) -> Option<f64> {
    measurements_for(cached, env_key)
        .filter_map(|m| lenient::finite(m.target_ft))
        .reduce(f64::max)
}

/// Measurements recorded for `env_key`. A blank environment never matches.
pub(crate) fn measurements_for<'a>(
    cached: &'a [CachedMidspan],
    env_key: &'a str,
) -> impl Iterator<Item = &'a CachedMidspan> + 'a {
    cached
        .iter()
        .filter(move |m| !env_key.is_empty() && m.environment == env_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ClearanceProfile {
        ClearanceProfile::default()
    }

    #[test]
    fn profile_keys_follow_naming_convention() {
        assert_eq!(profile_key("road").as_deref(), Some("envRoadFt"));
        assert_eq!(profile_key("wvHighway").as_deref(), Some("envWVHighwayFt"));
        assert_eq!(
            profile_key("interstateNewCrossing").as_deref(),
            Some("envInterstateNewCrossingFt")
        );
        assert_eq!(profile_key(""), None);
    }

    #[test]
    fn every_known_environment_has_a_default() {
        for env in KNOWN_ENVIRONMENTS {
            assert!(get_env_target(&profile(), env).is_some(), "{env}");
        }
    }

    #[test]
    fn unknown_env_is_absent() {
        assert_eq!(get_env_target(&profile(), "lunarSurface"), None);
    }

    #[test]
    fn malformed_profile_values_are_absent() {
        let profile: ClearanceProfile =
            serde_json::from_value(serde_json::json!({ "envRoadFt": "abc", "envFieldFt": "16" }))
                .unwrap();
        assert_eq!(get_env_target(&profile, "road"), None);
        assert_eq!(get_env_target(&profile, "field"), Some(16.0));
    }

    #[test]
    fn segment_worst_case_ignores_portion() {
        let segments = vec![
            EnvSegment::new("road", 40.0),
            EnvSegment::new("nonResidentialDriveway", 60.0),
        ];
        let road = get_env_target(&profile(), "road").unwrap();
        let driveway = get_env_target(&profile(), "nonResidentialDriveway").unwrap();
        assert_eq!(
            controlling_ground_target(&profile(), &segments, "road"),
            Some(road.max(driveway))
        );

        // A sliver of railroad still controls.
        let segments = vec![
            EnvSegment::new("road", 99.0),
            EnvSegment::new("railroad", 1.0),
        ];
        assert_eq!(
            controlling_ground_target(&profile(), &segments, "road"),
            Some(27.0)
        );
    }

    #[test]
    fn empty_segments_use_fallback_env() {
        assert_eq!(
            controlling_ground_target(&profile(), &[], "wvHighway"),
            get_env_target(&profile(), "wvHighway")
        );
        let detail = controlling_ground_target_detail(&profile(), &[], "wvHighway").unwrap();
        assert!(detail.from_fallback);
    }

    #[test]
    fn unknown_segment_env_is_excluded_from_max() {
        let segments = vec![
            EnvSegment::new("mystery", 50.0),
            EnvSegment::new("road", 50.0),
        ];
        let detail = controlling_ground_target_detail(&profile(), &segments, "railroad").unwrap();
        assert_eq!(detail.env, "road");
        assert_eq!(detail.target_ft, 15.5);
        assert!(!detail.from_fallback);

        let only_unknown = vec![EnvSegment::new("mystery", 100.0)];
        assert_eq!(
            controlling_ground_target(&profile(), &only_unknown, "road"),
            Some(15.5)
        );
        assert_eq!(
            controlling_ground_target(&profile(), &only_unknown, "alsoUnknown"),
            None
        );
    }

    #[test]
    fn cached_max_wins_regardless_of_order() {
        let mut cache = vec![
            CachedMidspan::new("wvHighway", 18.0),
            CachedMidspan::new("wvHighway", 19.0),
            CachedMidspan::new("road", 17.0),
        ];
        assert_eq!(max_target_from_cached(&cache, "wvHighway", &profile()), Some(19.0));
        cache.reverse();
        assert_eq!(max_target_from_cached(&cache, "wvHighway", &profile()), Some(19.0));
        // Later, lower measurement does not replace the higher one.
        cache.push(CachedMidspan::new("wvHighway", 12.0));
        assert_eq!(max_target_from_cached(&cache, "wvHighway", &profile()), Some(19.0));
    }

    #[test]
    fn cached_measurement_beats_higher_profile_default() {
        let cache = vec![CachedMidspan::new("railroad", 24.0)];
        assert_eq!(max_target_from_cached(&cache, "railroad", &profile()), Some(24.0));
    }

    #[test]
    fn empty_or_foreign_cache_falls_back_to_profile() {
        assert_eq!(
            max_target_from_cached(&[], "interstateNewCrossing", &profile()),
            get_env_target(&profile(), "interstateNewCrossing")
        );
        let cache = vec![CachedMidspan::new("road", 17.0)];
        assert_eq!(max_target_from_cached(&cache, "railroad", &profile()), Some(27.0));
    }

    #[test]
    fn non_finite_cached_targets_are_ignored() {
        let mut bad = CachedMidspan::new("road", 0.0);
        bad.target_ft = Some(f64::NAN);
        let cache = vec![bad.clone(), CachedMidspan::new("road", 16.25)];
        assert_eq!(max_target_from_cached(&cache, "road", &profile()), Some(16.25));

        // Only junk for the env: treated as no measurement at all.
        assert_eq!(max_target_from_cached(&[bad], "road", &profile()), Some(15.5));
    }

    #[test]
    fn blank_cached_environment_matches_nothing() {
        let cache = vec![CachedMidspan::default(), CachedMidspan::new("road", 17.0)];
        assert_eq!(cached_max(&cache, ""), None);
        assert_eq!(measurements_for(&cache, "road").count(), 1);
    }

    #[test]
    fn profile_file_layers_over_defaults() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "envRoadFt": 16.5, "envCustomFt": "12" }}"#).unwrap();
        let loaded = ClearanceProfile::from_json_file(file.path()).unwrap();
        assert_eq!(get_env_target(&loaded, "road"), Some(16.5));
        assert_eq!(get_env_target(&loaded, "custom"), Some(12.0));
        assert_eq!(get_env_target(&loaded, "railroad"), Some(27.0));

        let err = ClearanceProfile::from_json_file(Path::new("/nonexistent/profile.json")).unwrap_err();
        assert!(matches!(err, ProfileError::Read { .. }));
    }

    #[test]
    fn merged_profile_overrides_defaults() {
        let overrides = ClearanceProfile::from_pairs([("envRoadFt", 18.0), ("envCustomFt", 5.0)]);
        let merged = profile().merged(&overrides);
        assert_eq!(get_env_target(&merged, "road"), Some(18.0));
        assert_eq!(get_env_target(&merged, "custom"), Some(5.0));
        assert_eq!(get_env_target(&merged, "railroad"), Some(27.0));
    }
}
