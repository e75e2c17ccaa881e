//! Coverage Planner
//!
//! Right-sizes a rotating working pool of LEO satellites for a fixed ground
//! observer, so that a target number of satellites stay simultaneously visible
//! across a full orbital period with bounded coverage gaps.
//!
//! # Pipeline
//!
//! ```text
//! candidates ─► visibility ─► phase ─► selector ─► coverage ──► validation
//!                                          ▲          │
//!                                          └─ remediation (per gap)
//! ```
//!
//! | Stage        | Module          | Output                               |
//! |--------------|-----------------|--------------------------------------|
//! | Ingestion    | [`loader`]      | catalog + skipped candidate ledger   |
//! | Windows      | [`visibility`]  | visibility windows, visible mask     |
//! | Phase bins   | [`phase`]       | run-scoped (MA, RAAN) bin index      |
//! | Selection    | [`selector`]    | [`SatellitePool`]                    |
//! | Continuity   | [`coverage`]    | [`CoverageReport`]                   |
//! | Repair       | [`remediation`] | grown pool + iteration history       |
//! | Verdict      | [`validation`]  | pass/fail with diagnostics           |
//!
//! Propagation is upstream: every candidate arrives with precomputed
//! position samples relative to the observer.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

pub mod config;
pub mod coverage;
pub mod loader;
pub mod phase;
pub mod planner;
pub mod remediation;
pub mod selector;
pub mod validation;
pub mod visibility;

pub use config::{ConstellationPreset, ConstellationProfiles, PlannerConfig};
pub use coverage::{CoverageAnalyzer, CoverageGap, CoverageGrid, CoverageReport, GapSeverity};
pub use loader::{IngestRules, LoadedCatalog};
pub use phase::{DiversityRating, PhaseBin, PhaseClassifier, PhaseIndex};
pub use planner::{extend, plan, plan_constellations, ConstellationPlanOutcome, PlanOutcome};
pub use remediation::{GapRemediator, RemediationOutcome, TerminationReason};
pub use selector::{DiversitySelector, RankedCandidates, Selection};
pub use validation::{validate, ValidationProfile, Verdict};
pub use visibility::{VisibilityProfile, VisibilityWindow};

/// Full circle in degrees
pub const FULL_CIRCLE_DEG: f64 = 360.0;

/// Standard deviation of a uniform spread over [0, 360): 360 / (2·√3)
pub const UNIFORM_SPREAD_STD_DEG: f64 = 103.923048454;

/// Minutes per day, for mean motion conversion
const MINUTES_PER_DAY: f64 = 1440.0;

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, PlannerError>;

/// Keplerian elements as delivered by the upstream element source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitalElements {
    pub inclination_deg: f64,
    /// Right ascension of the ascending node
    pub raan_deg: f64,
    pub mean_anomaly_deg: f64,
    #[serde(default)]
    pub eccentricity: f64,
    pub period_minutes: f64,
}

impl OrbitalElements {
    /// Mean motion in revolutions per day (0 for a non-positive period)
    pub fn mean_motion_rev_per_day(&self) -> f64 {
        if self.period_minutes > 0.0 {
            MINUTES_PER_DAY / self.period_minutes
        } else {
            0.0
        }
    }
}

/// One propagated observation of a candidate from the ground observer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// Seconds from the planning epoch
    pub time_offset_seconds: f64,
    pub elevation_deg: f64,
    pub azimuth_deg: f64,
    pub range_km: f64,
    /// Elevation at or above the constellation threshold
    pub is_visible: bool,
}

impl PositionSample {
    /// Visible and carrying a usable time offset
    pub fn counts_as_visible(&self) -> bool {
        self.is_visible && self.time_offset_seconds.is_finite()
    }
}

/// A satellite eligible for the working pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSatellite {
    pub satellite_id: String,
    pub constellation: String,
    pub orbital_elements: OrbitalElements,
    pub position_timeseries: Vec<PositionSample>,
}

impl CandidateSatellite {
    pub fn new(
        satellite_id: impl Into<String>,
        constellation: impl Into<String>,
        orbital_elements: OrbitalElements,
        position_timeseries: Vec<PositionSample>,
    ) -> Self {
        Self {
            satellite_id: satellite_id.into(),
            constellation: constellation.into(),
            orbital_elements,
            position_timeseries,
        }
    }

    pub fn visible_sample_count(&self) -> usize {
        self.position_timeseries
            .iter()
            .filter(|s| s.counts_as_visible())
            .count()
    }
}

/// Why a candidate was left out of the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    MissingId,
    DuplicateId,
    EmptyTimeseries,
    MalformedElements,
    /// Record of the wrong JSON shape, or a field of the wrong type
    MalformedRecord,
    ConstellationMismatch,
    /// Batch-level: the input held no candidates at all
    EmptyCatalog,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedCandidate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satellite_id: Option<String>,
    /// Position in the raw input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_index: Option<usize>,
    pub reason: SkipReason,
}

/// Ordered set of unique catalog indices, bounded by a target size
///
/// Members are positions in the run's catalog slice; insertion order is kept
/// so reports list satellites in the order they were selected.
#[derive(Debug, Clone, PartialEq)]
pub struct SatellitePool {
    target_size: usize,
    members: Vec<usize>,
    index: HashSet<usize>,
}

impl SatellitePool {
    pub fn new(target_size: usize) -> Self {
        Self {
            target_size,
            members: Vec::with_capacity(target_size),
            index: HashSet::with_capacity(target_size),
        }
    }

    /// Add a member. Returns false when already present or the pool is full.
    pub fn try_insert(&mut self, catalog_index: usize) -> bool {
        if self.is_full() || self.index.contains(&catalog_index) {
            return false;
        }
        self.index.insert(catalog_index);
        self.members.push(catalog_index);
        true
    }

    pub fn contains(&self, catalog_index: usize) -> bool {
        self.index.contains(&catalog_index)
    }

    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.target_size
    }

    /// Slots left before the target size is reached
    pub fn remaining(&self) -> usize {
        self.target_size.saturating_sub(self.members.len())
    }

    pub fn satellite_ids(&self, catalog: &[CandidateSatellite]) -> Vec<String> {
        self.members
            .iter()
            .filter_map(|&i| catalog.get(i).map(|c| c.satellite_id.clone()))
            .collect()
    }

    pub fn candidates<'a>(&self, catalog: &'a [CandidateSatellite]) -> Vec<&'a CandidateSatellite> {
        self.members.iter().filter_map(|&i| catalog.get(i)).collect()
    }
}

/// Normalize an angle into [0, 360). Non-finite input maps to 0.
pub fn normalize_degrees(angle_deg: f64) -> f64 {
    if !angle_deg.is_finite() {
        return 0.0;
    }
    let normalized = angle_deg.rem_euclid(FULL_CIRCLE_DEG);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if normalized >= FULL_CIRCLE_DEG {
        0.0
    } else {
        normalized
    }
}
