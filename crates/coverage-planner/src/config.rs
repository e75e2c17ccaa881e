//! Planning profile and run configuration
//!
//! One `PlannerConfig` drives a whole run. It is validated once, before any
//! candidate is touched; every later stage assumes the invariants checked here.

use crate::{PlannerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// Mean-anomaly bins (orbital clock positions)
pub const DEFAULT_PHASE_BINS: usize = 12;

/// RAAN bins (orbital planes)
pub const DEFAULT_RAAN_BINS: usize = 8;

/// Coverage replay resolution in seconds
pub const DEFAULT_TIME_RESOLUTION_S: f64 = 30.0;

/// Fraction of the period that must meet the visible target
pub const DEFAULT_ACCEPTANCE_RATIO: f64 = 0.95;

/// Top scorers added per gap per remediation iteration
pub const DEFAULT_PER_GAP_BACKFILL_LIMIT: usize = 3;

/// Hard cap on remediation iterations
pub const DEFAULT_MAX_REMEDIATION_ITERATIONS: usize = 10;

/// Gaps longer than this are high severity (2 minutes)
pub const DEFAULT_MAX_GAP_S: f64 = 120.0;

/// Upper bound on coverage buckets per period; each candidate carries one mask
pub const MAX_COVERAGE_BUCKETS: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Restrict the run to one constellation tag (case-insensitive)
    pub constellation: Option<String>,
    /// Required simultaneously visible satellites
    pub min_visible_satellites: usize,
    /// Upper bound of the useful visible count (diagnostic only)
    pub max_visible_satellites: usize,
    /// Used to derive visibility for samples lacking the flag
    pub elevation_threshold_deg: f64,
    pub orbital_period_minutes: f64,
    pub phase_bins: usize,
    pub raan_bins: usize,
    pub time_resolution_seconds: f64,
    pub target_pool_size: usize,
    pub acceptance_ratio: f64,
    pub per_gap_backfill_limit: usize,
    pub max_remediation_iterations: usize,
    pub max_gap_seconds: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self::starlink_profile(None)
    }
}

impl PlannerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    fn starlink_profile(constellation: Option<String>) -> Self {
        Self {
            constellation,
            min_visible_satellites: 10,
            max_visible_satellites: 15,
            elevation_threshold_deg: 5.0,
            orbital_period_minutes: 96.0,
            phase_bins: DEFAULT_PHASE_BINS,
            raan_bins: DEFAULT_RAAN_BINS,
            time_resolution_seconds: DEFAULT_TIME_RESOLUTION_S,
            target_pool_size: 96,
            acceptance_ratio: DEFAULT_ACCEPTANCE_RATIO,
            per_gap_backfill_limit: DEFAULT_PER_GAP_BACKFILL_LIMIT,
            max_remediation_iterations: DEFAULT_MAX_REMEDIATION_ITERATIONS,
            max_gap_seconds: DEFAULT_MAX_GAP_S,
        }
    }

    /// Starlink shell at ~550 km: 10-15 visible above 5°, 96 min period
    pub fn starlink() -> Self {
        Self::starlink_profile(Some("starlink".to_string()))
    }

    /// OneWeb shell at ~1200 km: 3-6 visible above 10°, 109 min period
    pub fn oneweb() -> Self {
        Self {
            constellation: Some("oneweb".to_string()),
            min_visible_satellites: 3,
            max_visible_satellites: 6,
            elevation_threshold_deg: 10.0,
            orbital_period_minutes: 109.0,
            target_pool_size: 38,
            ..Self::starlink_profile(None)
        }
    }

    pub fn target_pool_size(mut self, n: usize) -> Self {
        self.target_pool_size = n;
        self
    }

    pub fn min_visible(mut self, n: usize) -> Self {
        self.min_visible_satellites = n;
        self
    }

    pub fn max_visible(mut self, n: usize) -> Self {
        self.max_visible_satellites = n;
        self
    }

    pub fn period_minutes(mut self, minutes: f64) -> Self {
        self.orbital_period_minutes = minutes;
        self
    }

    pub fn resolution_seconds(mut self, seconds: f64) -> Self {
        self.time_resolution_seconds = seconds;
        self
    }

    pub fn bins(mut self, phase_bins: usize, raan_bins: usize) -> Self {
        self.phase_bins = phase_bins;
        self.raan_bins = raan_bins;
        self
    }

    pub fn any_constellation(mut self) -> Self {
        self.constellation = None;
        self
    }

    pub fn orbital_period_seconds(&self) -> f64 {
        self.orbital_period_minutes * 60.0
    }

    /// True when the candidate tag passes the constellation filter
    pub fn accepts_constellation(&self, tag: &str) -> bool {
        self.constellation
            .as_deref()
            .map_or(true, |wanted| wanted.eq_ignore_ascii_case(tag.trim()))
    }

    /// Reject unusable profiles before any computation starts
    pub fn validate(&self) -> Result<()> {
        if self.target_pool_size == 0 {
            return Err(config_error("target_pool_size must be positive"));
        }
        if self.phase_bins == 0 {
            return Err(config_error("phase_bins must be positive"));
        }
        if self.raan_bins == 0 {
            return Err(config_error("raan_bins must be positive"));
        }
        if !(self.time_resolution_seconds.is_finite() && self.time_resolution_seconds > 0.0) {
            return Err(config_error(format!(
                "time_resolution_seconds must be positive, got {}",
                self.time_resolution_seconds
            )));
        }
        if !(self.orbital_period_minutes.is_finite() && self.orbital_period_minutes > 0.0) {
            return Err(config_error(format!(
                "orbital_period_minutes must be positive, got {}",
                self.orbital_period_minutes
            )));
        }
        let buckets = (self.orbital_period_seconds() / self.time_resolution_seconds).ceil();
        if buckets > MAX_COVERAGE_BUCKETS as f64 {
            return Err(config_error(format!(
                "time_resolution_seconds {} gives {:.0} buckets per period (max {})",
                self.time_resolution_seconds, buckets, MAX_COVERAGE_BUCKETS
            )));
        }
        if !(0.0..=1.0).contains(&self.acceptance_ratio) {
            return Err(config_error(format!(
                "acceptance_ratio must lie in [0, 1], got {}",
                self.acceptance_ratio
            )));
        }
        if self.max_visible_satellites < self.min_visible_satellites {
            return Err(config_error(format!(
                "max_visible_satellites ({}) below min_visible_satellites ({})",
                self.max_visible_satellites, self.min_visible_satellites
            )));
        }
        if self.max_remediation_iterations == 0 {
            return Err(config_error("max_remediation_iterations must be positive"));
        }
        if !self.elevation_threshold_deg.is_finite() {
            return Err(config_error("elevation_threshold_deg must be finite"));
        }
        if !(self.max_gap_seconds.is_finite() && self.max_gap_seconds >= 0.0) {
            return Err(config_error("max_gap_seconds must be non-negative"));
        }
        Ok(())
    }

    /// Load a profile from JSON; missing fields take the defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading planning profile from {:?}", path);

        let file = File::open(path)?;
        let config: PlannerConfig = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }
}

fn config_error(msg: impl Into<String>) -> PlannerError {
    PlannerError::Configuration(msg.into())
}

/// Named constellation profiles selectable from the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConstellationPreset {
    Starlink,
    Oneweb,
}

impl ConstellationPreset {
    pub fn config(&self) -> PlannerConfig {
        match self {
            Self::Starlink => PlannerConfig::starlink(),
            Self::Oneweb => PlannerConfig::oneweb(),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Starlink => "starlink",
            Self::Oneweb => "oneweb",
        }
    }
}

/// One planning profile per constellation tag, for mixed catalogs.
///
/// Tags are matched case-insensitively; every stored profile is pinned to
/// its own tag so its runs never see another constellation's candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConstellationProfiles {
    profiles: BTreeMap<String, PlannerConfig>,
}

impl ConstellationProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starlink and OneWeb side by side
    pub fn presets() -> Self {
        Self::from_presets(&[ConstellationPreset::Starlink, ConstellationPreset::Oneweb])
    }

    pub fn from_presets(presets: &[ConstellationPreset]) -> Self {
        presets
            .iter()
            .fold(Self::new(), |profiles, preset| profiles.with(preset.tag(), preset.config()))
    }

    pub fn with(mut self, tag: &str, config: PlannerConfig) -> Self {
        let tag = normalize_tag(tag);
        let config = PlannerConfig {
            constellation: Some(tag.clone()),
            ..config
        };
        self.profiles.insert(tag, config);
        self
    }

    pub fn get(&self, tag: &str) -> Option<&PlannerConfig> {
        self.profiles.get(&normalize_tag(tag))
    }

    /// Profiles in tag order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PlannerConfig)> {
        self.profiles.iter().map(|(tag, config)| (tag.as_str(), config))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.profiles.is_empty() {
            return Err(config_error("no constellation profiles given"));
        }
        for (tag, config) in &self.profiles {
            if tag.is_empty() {
                return Err(config_error("constellation tag must not be empty"));
            }
            config
                .validate()
                .map_err(|e| config_error(format!("profile {}: {}", tag, e)))?;
        }
        Ok(())
    }

    /// Load `{"<tag>": {profile}, ...}`; missing profile fields take the defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading constellation profiles from {:?}", path);

        let file = File::open(path)?;
        let raw: BTreeMap<String, PlannerConfig> = serde_json::from_reader(BufReader::new(file))?;
        Ok(raw
            .into_iter()
            .fold(Self::new(), |profiles, (tag, config)| profiles.with(&tag, config)))
    }
}

pub(crate) fn normalize_tag(tag: &str) -> String {
    tag.trim().to_ascii_lowercase()
}
