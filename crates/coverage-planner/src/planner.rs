//! Run orchestration
//!
//! classify → select → analyze → remediate → validate, strictly in that
//! order. Every run-scoped structure (phase index, bucket grid, pool) is
//! created here and dropped with the run.

use crate::config::{normalize_tag, ConstellationProfiles, PlannerConfig};
use crate::coverage::{CoverageAnalyzer, CoverageReport};
use crate::loader::LoadedCatalog;
use crate::phase::PhaseClassifier;
use crate::remediation::{GapRemediator, RemediationStep, TerminationReason};
use crate::selector::{DiversitySelector, RankedCandidates, SelectionSummary};
use crate::validation::{validate, ValidationProfile, Verdict};
use crate::visibility::extract_all;
use crate::{CandidateSatellite, Result, SatellitePool, SkipReason, SkippedCandidate};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct PlanMetadata {
    pub run_id: String,
    pub generated_at: String,
    pub total_candidates: usize,
    pub accepted_candidates: usize,
    pub skipped_count: usize,
    /// Members carried over from an earlier pool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_pool_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolSummary {
    pub target_size: usize,
    pub satellite_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionSummary>,
}

/// Bin occupancy of the candidate catalog
#[derive(Debug, Clone, Serialize)]
pub struct PhaseSummary {
    pub mean_anomaly_bin_counts: Vec<usize>,
    pub raan_bin_counts: Vec<usize>,
    pub mean_anomaly_uniformity: f64,
    pub raan_uniformity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemediationSummary {
    pub initial_coverage_ratio: f64,
    pub steps: Vec<RemediationStep>,
    pub termination: TerminationReason,
}

/// Everything a planning run produces
#[derive(Debug, Clone, Serialize)]
pub struct PlanOutcome {
    pub metadata: PlanMetadata,
    pub pool: PoolSummary,
    pub selected: Vec<CandidateSatellite>,
    pub phase: PhaseSummary,
    pub report: CoverageReport,
    pub remediation: RemediationSummary,
    pub verdict: Verdict,
    pub skipped: Vec<SkippedCandidate>,
}

impl PlanOutcome {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Plan a pool from scratch
pub fn plan(config: &PlannerConfig, catalog: LoadedCatalog) -> Result<PlanOutcome> {
    run(config, catalog, None)
}

/// Grow an existing pool gap-first instead of selecting from scratch.
///
/// Seed ids not present in the catalog are ignored; seeds beyond the target
/// size are dropped in the order given.
pub fn extend(config: &PlannerConfig, catalog: LoadedCatalog, seed_ids: &[String]) -> Result<PlanOutcome> {
    run(config, catalog, Some(seed_ids))
}

/// Header of a run that planned several constellations side by side
#[derive(Debug, Clone, Serialize)]
pub struct ConstellationPlanMetadata {
    pub run_id: String,
    pub generated_at: String,
    pub total_candidates: usize,
    pub accepted_candidates: usize,
    pub skipped_count: usize,
    pub constellations: Vec<String>,
}

/// One independent plan per constellation profile
#[derive(Debug, Clone, Serialize)]
pub struct ConstellationPlanOutcome {
    pub metadata: ConstellationPlanMetadata,
    /// Every constellation passed its own validation
    pub passed: bool,
    pub constellations: BTreeMap<String, PlanOutcome>,
    /// Catalog-level skips, plus candidates no profile claimed
    pub skipped: Vec<SkippedCandidate>,
}

impl ConstellationPlanOutcome {
    pub fn get(&self, tag: &str) -> Option<&PlanOutcome> {
        self.constellations.get(&normalize_tag(tag))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Plan every constellation in `profiles` from one mixed catalog.
///
/// Candidates are partitioned by constellation tag and each partition runs
/// the full pipeline under its own profile. Pools never mix constellations.
pub fn plan_constellations(
    profiles: &ConstellationProfiles,
    catalog: LoadedCatalog,
) -> Result<ConstellationPlanOutcome> {
    profiles.validate()?;

    let run_id = Uuid::new_v4();
    let LoadedCatalog {
        candidates,
        mut skipped,
        total_records,
    } = catalog;
    let accepted_candidates = candidates.len();

    let mut groups: BTreeMap<String, Vec<CandidateSatellite>> = BTreeMap::new();
    for candidate in candidates {
        groups
            .entry(normalize_tag(&candidate.constellation))
            .or_default()
            .push(candidate);
    }

    info!(
        "Multi-constellation run {}: {} candidates across {} profiles",
        run_id,
        accepted_candidates,
        profiles.len()
    );

    let mut constellations = BTreeMap::new();
    for (tag, config) in profiles.iter() {
        let members = groups.remove(tag).unwrap_or_default();
        let sub_catalog = LoadedCatalog {
            total_records: members.len(),
            candidates: members,
            skipped: Vec::new(),
        };
        constellations.insert(tag.to_string(), run(config, sub_catalog, None)?);
    }

    // Only reachable when the catalog was loaded under looser rules
    for (tag, leftovers) in groups {
        warn!("No profile for constellation {:?}: {} candidates unplanned", tag, leftovers.len());
        skipped.extend(leftovers.into_iter().map(|c| SkippedCandidate {
            satellite_id: Some(c.satellite_id),
            record_index: None,
            reason: SkipReason::ConstellationMismatch,
        }));
    }

    let passed = constellations.values().all(|outcome| outcome.verdict.passed);
    if !passed {
        warn!(
            "Run {}: failed constellations {:?}",
            run_id,
            constellations
                .iter()
                .filter(|(_, outcome)| !outcome.verdict.passed)
                .map(|(tag, _)| tag.as_str())
                .collect::<Vec<_>>()
        );
    }

    Ok(ConstellationPlanOutcome {
        metadata: ConstellationPlanMetadata {
            run_id: run_id.to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            total_candidates: total_records,
            accepted_candidates,
            skipped_count: skipped.len(),
            constellations: constellations.keys().cloned().collect(),
        },
        passed,
        constellations,
        skipped,
    })
}

fn run(config: &PlannerConfig, catalog: LoadedCatalog, seed_ids: Option<&[String]>) -> Result<PlanOutcome> {
    // Fail fast, before any run state exists
    config.validate()?;
    let classifier = PhaseClassifier::from_config(config)?;

    let run_id = Uuid::new_v4();
    let LoadedCatalog {
        candidates,
        skipped,
        total_records,
    } = catalog;

    info!(
        "Planning run {}: {} candidates, target pool {}, >= {} visible over {:.0} min",
        run_id,
        candidates.len(),
        config.target_pool_size,
        config.min_visible_satellites,
        config.orbital_period_minutes
    );

    let index = classifier.build_index(&candidates);
    let analyzer = CoverageAnalyzer::from_config(&candidates, config);

    let (pool, selection) = match seed_ids {
        Some(ids) => (seed_pool(&candidates, ids, config.target_pool_size), None),
        None => {
            let profiles = extract_all(&candidates);
            let ranked = RankedCandidates::new(&profiles);
            let selection = DiversitySelector::from_config(config).select(&index, &ranked);
            (selection.pool, Some(selection.summary))
        }
    };
    let seed_pool_size = seed_ids.map(|_| pool.len());

    let initial_report = analyzer.analyze(&pool);
    let initial_coverage_ratio = initial_report.time_coverage_ratio;

    let outcome = GapRemediator::from_config(&analyzer, config).remediate(pool, initial_report);
    let verdict = validate(&outcome.report, &ValidationProfile::from_config(config));

    if verdict.passed {
        info!(
            "Run {} passed: {} satellites, {:.1}% coverage, diversity {:.2} ({:?})",
            run_id,
            outcome.pool.len(),
            verdict.coverage_ratio * 100.0,
            verdict.phase_diversity,
            verdict.diversity_rating
        );
    } else {
        warn!("Run {} failed validation", run_id);
        for diagnostic in &verdict.diagnostics {
            warn!("  {}", diagnostic);
        }
    }

    let satellite_ids = outcome.pool.satellite_ids(&candidates);
    let selected: Vec<CandidateSatellite> = outcome
        .pool
        .candidates(&candidates)
        .into_iter()
        .cloned()
        .collect();

    Ok(PlanOutcome {
        metadata: PlanMetadata {
            run_id: run_id.to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            total_candidates: total_records,
            accepted_candidates: candidates.len(),
            skipped_count: skipped.len(),
            seed_pool_size,
        },
        pool: PoolSummary {
            target_size: config.target_pool_size,
            satellite_ids,
            selection,
        },
        selected,
        phase: PhaseSummary {
            mean_anomaly_bin_counts: index.phase_bin_counts(),
            raan_bin_counts: index.raan_bin_counts(),
            mean_anomaly_uniformity: index.phase_uniformity(),
            raan_uniformity: index.raan_uniformity(),
        },
        report: outcome.report,
        remediation: RemediationSummary {
            initial_coverage_ratio,
            steps: outcome.steps,
            termination: outcome.termination,
        },
        verdict,
        skipped,
    })
}

fn seed_pool(candidates: &[CandidateSatellite], ids: &[String], target_size: usize) -> SatellitePool {
    let by_id: HashMap<&str, usize> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (c.satellite_id.as_str(), i))
        .collect();

    let mut pool = SatellitePool::new(target_size);
    for id in ids {
        match by_id.get(id.trim()) {
            Some(&idx) => {
                if !pool.try_insert(idx) && pool.is_full() {
                    warn!("Seed {} dropped: pool already at target size", id);
                }
            }
            None => warn!("Seed {} not in catalog, ignoring", id),
        }
    }
    info!("Seeded pool with {} of {} ids", pool.len(), ids.len());
    pool
}
