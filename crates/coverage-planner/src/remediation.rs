//! Gap Remediation Loop
//!
//! score → augment → re-analyze, until the acceptance ratio is met, the pool
//! is full, nothing scores positively on any remaining gap, or the iteration
//! cap is hit. The pool is replaced wholesale each iteration so every report
//! describes exactly the membership it was computed from.

use crate::config::{
    PlannerConfig, DEFAULT_ACCEPTANCE_RATIO, DEFAULT_MAX_REMEDIATION_ITERATIONS,
    DEFAULT_PER_GAP_BACKFILL_LIMIT,
};
use crate::coverage::{CoverageAnalyzer, CoverageGap, CoverageReport, VisibilityTimeline};
use crate::SatellitePool;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    AcceptanceMet,
    PoolFull,
    NoImprovingCandidate,
    IterationCapReached,
}

impl TerminationReason {
    /// Stopped without reaching the acceptance ratio
    pub fn is_shortfall(&self) -> bool {
        !matches!(self, Self::AcceptanceMet)
    }
}

/// Fraction of a gap one candidate covers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapScore {
    pub catalog_index: usize,
    pub score: f64,
}

/// One score → augment → re-analyze round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationStep {
    pub iteration: usize,
    pub gaps_targeted: usize,
    pub added: Vec<String>,
    pub pool_size_before: usize,
    pub pool_size_after: usize,
    pub coverage_ratio_before: f64,
    pub coverage_ratio_after: f64,
}

#[derive(Debug, Clone)]
pub struct RemediationOutcome {
    pub pool: SatellitePool,
    pub report: CoverageReport,
    pub steps: Vec<RemediationStep>,
    pub termination: TerminationReason,
}

/// Score every unselected candidate against one gap.
///
/// Score = visible buckets inside the gap / gap buckets. Only positive
/// scores are returned, best first, ties in catalog order.
pub fn score_gap(
    timeline: &VisibilityTimeline,
    pool: &SatellitePool,
    gap: &CoverageGap,
) -> Vec<GapScore> {
    let gap_buckets = gap.bucket_len();
    if gap_buckets == 0 {
        return Vec::new();
    }

    let mut scores: Vec<GapScore> = (0..timeline.len())
        .into_par_iter()
        .filter(|&i| !pool.contains(i))
        .map(|i| GapScore {
            catalog_index: i,
            score: timeline.visible_buckets(i, gap.start_bucket, gap.end_bucket) as f64
                / gap_buckets as f64,
        })
        .filter(|s| s.score > 0.0)
        .collect();

    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scores
}

pub struct GapRemediator<'a> {
    analyzer: &'a CoverageAnalyzer<'a>,
    acceptance_ratio: f64,
    per_gap_limit: usize,
    max_iterations: usize,
}

impl<'a> GapRemediator<'a> {
    pub fn new(analyzer: &'a CoverageAnalyzer<'a>) -> Self {
        Self {
            analyzer,
            acceptance_ratio: DEFAULT_ACCEPTANCE_RATIO,
            per_gap_limit: DEFAULT_PER_GAP_BACKFILL_LIMIT,
            max_iterations: DEFAULT_MAX_REMEDIATION_ITERATIONS,
        }
    }

    pub fn from_config(analyzer: &'a CoverageAnalyzer<'a>, config: &PlannerConfig) -> Self {
        Self::new(analyzer)
            .acceptance_ratio(config.acceptance_ratio)
            .per_gap_limit(config.per_gap_backfill_limit)
            .max_iterations(config.max_remediation_iterations)
    }

    pub fn acceptance_ratio(mut self, ratio: f64) -> Self {
        self.acceptance_ratio = ratio;
        self
    }

    pub fn per_gap_limit(mut self, limit: usize) -> Self {
        self.per_gap_limit = limit;
        self
    }

    pub fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn remediate(&self, pool: SatellitePool, report: CoverageReport) -> RemediationOutcome {
        let catalog = self.analyzer.catalog();
        let timeline = self.analyzer.timeline();
        let mut pool = pool;
        let mut report = report;
        let mut steps: Vec<RemediationStep> = Vec::new();

        let termination = loop {
            if report.time_coverage_ratio >= self.acceptance_ratio {
                break TerminationReason::AcceptanceMet;
            }
            if pool.is_full() {
                break TerminationReason::PoolFull;
            }
            if steps.len() >= self.max_iterations {
                break TerminationReason::IterationCapReached;
            }

            let mut next = pool.clone();
            let mut added = Vec::new();
            let mut gaps_targeted = 0;

            for gap in &report.gaps {
                if next.is_full() {
                    break;
                }
                let mut took_any = false;
                for scored in score_gap(timeline, &next, gap).into_iter().take(self.per_gap_limit) {
                    if next.try_insert(scored.catalog_index) {
                        took_any = true;
                        if let Some(candidate) = catalog.get(scored.catalog_index) {
                            debug!(
                                "Gap {:.0}s-{:.0}s: added {} (score {:.2})",
                                gap.start_seconds, gap.end_seconds, candidate.satellite_id, scored.score
                            );
                            added.push(candidate.satellite_id.clone());
                        }
                    }
                }
                if took_any {
                    gaps_targeted += 1;
                }
            }

            if next.len() == pool.len() {
                break TerminationReason::NoImprovingCandidate;
            }

            let next_report = self.analyzer.analyze(&next);
            let step = RemediationStep {
                iteration: steps.len() + 1,
                gaps_targeted,
                added,
                pool_size_before: pool.len(),
                pool_size_after: next.len(),
                coverage_ratio_before: report.time_coverage_ratio,
                coverage_ratio_after: next_report.time_coverage_ratio,
            };
            info!(
                "Remediation #{}: +{} satellites over {} gaps, coverage {:.1}% -> {:.1}%",
                step.iteration,
                step.pool_size_after - step.pool_size_before,
                step.gaps_targeted,
                step.coverage_ratio_before * 100.0,
                step.coverage_ratio_after * 100.0
            );
            steps.push(step);

            pool = next;
            report = next_report;
        };

        if termination.is_shortfall() {
            warn!(
                "Remediation stopped ({:?}) at {:.1}% coverage, below {:.1}% acceptance",
                termination,
                report.time_coverage_ratio * 100.0,
                self.acceptance_ratio * 100.0
            );
        } else {
            info!("Remediation complete after {} iterations", steps.len());
        }

        RemediationOutcome {
            pool,
            report,
            steps,
            termination,
        }
    }
}
