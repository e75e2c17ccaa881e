//! Coverage Continuity Analyzer
//!
//! Replays a pool over one orbital period on a fixed bucket grid and counts
//! simultaneously visible members per bucket:
//!
//! ```text
//! bucket   0    1    2    3    4    5    6    7
//! count    9   11   12    7    6   10   10    4     target = 8
//!                         └─gap─┘              └gap┘ (closed at period end)
//! ```
//!
//! Reports are always computed fresh for one pool snapshot.

use crate::config::PlannerConfig;
use crate::phase::phase_diversity_score;
use crate::{CandidateSatellite, SatellitePool};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Time axis of a replay: `ceil(period / resolution)` buckets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageGrid {
    period_seconds: f64,
    resolution_seconds: f64,
    bucket_count: usize,
}

impl CoverageGrid {
    pub fn new(period_seconds: f64, resolution_seconds: f64) -> Self {
        let bucket_count = if period_seconds > 0.0 && resolution_seconds > 0.0 {
            (period_seconds / resolution_seconds).ceil() as usize
        } else {
            0
        };
        Self {
            period_seconds,
            resolution_seconds,
            bucket_count,
        }
    }

    pub fn from_config(config: &PlannerConfig) -> Self {
        Self::new(config.orbital_period_seconds(), config.time_resolution_seconds)
    }

    pub fn period_seconds(&self) -> f64 {
        self.period_seconds
    }

    pub fn resolution_seconds(&self) -> f64 {
        self.resolution_seconds
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Bucket holding an offset; `None` outside `[0, period)`
    pub fn bucket_of(&self, offset_seconds: f64) -> Option<usize> {
        if self.bucket_count == 0
            || !offset_seconds.is_finite()
            || offset_seconds < 0.0
            || offset_seconds >= self.period_seconds
        {
            return None;
        }
        let idx = (offset_seconds / self.resolution_seconds).floor() as usize;
        Some(idx.min(self.bucket_count.saturating_sub(1)))
    }

    pub fn bucket_start(&self, bucket: usize) -> f64 {
        bucket as f64 * self.resolution_seconds
    }

    /// Exclusive end of a bucket run, clipped to the period
    pub fn bucket_end(&self, end_bucket: usize) -> f64 {
        (end_bucket as f64 * self.resolution_seconds).min(self.period_seconds)
    }
}

/// Per-candidate visible buckets for a whole catalog
#[derive(Debug, Clone)]
pub struct VisibilityTimeline {
    grid: CoverageGrid,
    masks: Vec<Vec<bool>>,
}

impl VisibilityTimeline {
    pub fn build(catalog: &[CandidateSatellite], grid: CoverageGrid) -> Self {
        let masks = catalog
            .par_iter()
            .map(|candidate| {
                let mut mask = vec![false; grid.bucket_count()];
                for sample in candidate.position_timeseries.iter().filter(|s| s.counts_as_visible()) {
                    if let Some(bucket) = grid.bucket_of(sample.time_offset_seconds) {
                        mask[bucket] = true;
                    }
                }
                mask
            })
            .collect();

        Self { grid, masks }
    }

    pub fn grid(&self) -> &CoverageGrid {
        &self.grid
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    pub fn mask(&self, catalog_index: usize) -> &[bool] {
        self.masks.get(catalog_index).map(|m| m.as_slice()).unwrap_or(&[])
    }

    /// Visible buckets of one candidate inside `[start_bucket, end_bucket)`
    pub fn visible_buckets(&self, catalog_index: usize, start_bucket: usize, end_bucket: usize) -> usize {
        let mask = self.mask(catalog_index);
        let end = end_bucket.min(mask.len());
        if start_bucket >= end {
            return 0;
        }
        mask[start_bucket..end].iter().filter(|&&v| v).count()
    }

    /// Simultaneously visible pool members per bucket
    pub fn visible_counts(&self, pool: &SatellitePool) -> Vec<usize> {
        let mut counts = vec![0usize; self.grid.bucket_count()];
        for &member in pool.members() {
            for (count, &visible) in counts.iter_mut().zip(self.mask(member)) {
                if visible {
                    *count += 1;
                }
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapSeverity {
    Low,
    Medium,
    High,
}

impl GapSeverity {
    pub fn classify(duration_seconds: f64, max_gap_seconds: f64) -> Self {
        if duration_seconds <= max_gap_seconds / 2.0 {
            Self::Low
        } else if duration_seconds <= max_gap_seconds {
            Self::Medium
        } else {
            Self::High
        }
    }
}

/// `[start, end)` where the pool fell below its visible target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub duration_seconds: f64,
    pub start_bucket: usize,
    /// Exclusive
    pub end_bucket: usize,
    /// Lowest visible count inside the gap
    pub min_visible: usize,
    pub severity: GapSeverity,
}

impl CoverageGap {
    pub fn bucket_len(&self) -> usize {
        self.end_bucket - self.start_bucket
    }

    pub fn duration_minutes(&self) -> f64 {
        self.duration_seconds / 60.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub pool_size: usize,
    pub min_visible_target: usize,
    pub period_seconds: f64,
    pub resolution_seconds: f64,
    pub bucket_count: usize,
    /// Fraction of buckets meeting the visible target
    pub time_coverage_ratio: f64,
    pub min_visible_satellites: usize,
    pub max_visible_satellites: usize,
    pub avg_visible_satellites: f64,
    /// Disjoint, time-ordered
    pub gaps: Vec<CoverageGap>,
    pub phase_diversity_score: f64,
}

impl CoverageReport {
    pub fn gaps_count(&self) -> usize {
        self.gaps.len()
    }

    pub fn max_gap_seconds(&self) -> f64 {
        self.gaps
            .iter()
            .map(|g| g.duration_seconds)
            .fold(0.0, f64::max)
    }

    pub fn gaps_exceeding(&self, threshold_seconds: f64) -> usize {
        self.gaps
            .iter()
            .filter(|g| g.duration_seconds > threshold_seconds)
            .count()
    }
}

pub struct CoverageAnalyzer<'a> {
    catalog: &'a [CandidateSatellite],
    timeline: VisibilityTimeline,
    min_visible_target: usize,
    max_gap_seconds: f64,
}

impl<'a> CoverageAnalyzer<'a> {
    pub fn new(catalog: &'a [CandidateSatellite], grid: CoverageGrid, min_visible_target: usize) -> Self {
        Self {
            catalog,
            timeline: VisibilityTimeline::build(catalog, grid),
            min_visible_target,
            max_gap_seconds: crate::config::DEFAULT_MAX_GAP_S,
        }
    }

    pub fn from_config(catalog: &'a [CandidateSatellite], config: &PlannerConfig) -> Self {
        Self::new(catalog, CoverageGrid::from_config(config), config.min_visible_satellites)
            .max_gap_seconds(config.max_gap_seconds)
    }

    pub fn max_gap_seconds(mut self, seconds: f64) -> Self {
        self.max_gap_seconds = seconds;
        self
    }

    pub fn catalog(&self) -> &'a [CandidateSatellite] {
        self.catalog
    }

    pub fn timeline(&self) -> &VisibilityTimeline {
        &self.timeline
    }

    pub fn min_visible_target(&self) -> usize {
        self.min_visible_target
    }

    pub fn analyze(&self, pool: &SatellitePool) -> CoverageReport {
        let grid = self.timeline.grid();
        let counts = self.timeline.visible_counts(pool);
        let bucket_count = counts.len();

        let meeting = counts.iter().filter(|&&c| c >= self.min_visible_target).count();
        // An empty pool covers nothing, whatever the target
        let time_coverage_ratio = if pool.is_empty() || bucket_count == 0 {
            0.0
        } else {
            meeting as f64 / bucket_count as f64
        };

        let min_visible_satellites = counts.iter().copied().min().unwrap_or(0);
        let max_visible_satellites = counts.iter().copied().max().unwrap_or(0);
        let avg_visible_satellites = if bucket_count == 0 {
            0.0
        } else {
            counts.iter().sum::<usize>() as f64 / bucket_count as f64
        };

        let gaps = self.find_gaps(&counts);
        let phase_diversity_score = phase_diversity_score(
            pool.candidates(self.catalog)
                .into_iter()
                .map(|c| &c.orbital_elements),
        );

        info!(
            "Coverage: pool {} -> {:.1}% of period at >= {} visible (min {}, max {}, avg {:.1}), {} gaps",
            pool.len(),
            time_coverage_ratio * 100.0,
            self.min_visible_target,
            min_visible_satellites,
            max_visible_satellites,
            avg_visible_satellites,
            gaps.len()
        );

        CoverageReport {
            pool_size: pool.len(),
            min_visible_target: self.min_visible_target,
            period_seconds: grid.period_seconds(),
            resolution_seconds: grid.resolution_seconds(),
            bucket_count,
            time_coverage_ratio,
            min_visible_satellites,
            max_visible_satellites,
            avg_visible_satellites,
            gaps,
            phase_diversity_score,
        }
    }

    /// Below-target runs, in time order
    fn find_gaps(&self, counts: &[usize]) -> Vec<CoverageGap> {
        let mut gaps = Vec::new();
        let mut open: Option<usize> = None;

        for (idx, &count) in counts.iter().enumerate() {
            let below = count < self.min_visible_target;
            match (below, open) {
                (true, None) => open = Some(idx),
                (false, Some(start)) => {
                    gaps.push(self.make_gap(counts, start, idx));
                    open = None;
                }
                _ => {}
            }
        }

        // Still below target at scan end
        if let Some(start) = open {
            gaps.push(self.make_gap(counts, start, counts.len()));
        }

        gaps
    }

    fn make_gap(&self, counts: &[usize], start_bucket: usize, end_bucket: usize) -> CoverageGap {
        let grid = self.timeline.grid();
        let start_seconds = grid.bucket_start(start_bucket);
        let end_seconds = grid.bucket_end(end_bucket);
        let duration_seconds = end_seconds - start_seconds;
        let min_visible = counts[start_bucket..end_bucket]
            .iter()
            .copied()
            .min()
            .unwrap_or(0);
        let severity = GapSeverity::classify(duration_seconds, self.max_gap_seconds);

        debug!(
            "Gap {:.0}s-{:.0}s ({:.0}s, min {} visible, {:?})",
            start_seconds, end_seconds, duration_seconds, min_visible, severity
        );

        CoverageGap {
            start_seconds,
            end_seconds,
            duration_seconds,
            start_bucket,
            end_bucket,
            min_visible,
            severity,
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::{OrbitalElements, PositionSample};
    use proptest::prelude::*;

    fn catalog_from(masks: &[Vec<bool>]) -> Vec<CandidateSatellite> {
        masks
            .iter()
            .enumerate()
            .map(|(i, flags)| {
                let samples = flags
                    .iter()
                    .enumerate()
                    .map(|(t, &v)| PositionSample {
                        time_offset_seconds: t as f64 * 30.0,
                        elevation_deg: if v { 20.0 } else { 0.0 },
                        azimuth_deg: 0.0,
                        range_km: 1000.0,
                        is_visible: v,
                    })
                    .collect();
                let elements = OrbitalElements {
                    inclination_deg: 53.0,
                    raan_deg: i as f64 * 17.0,
                    mean_anomaly_deg: i as f64 * 29.0,
                    eccentricity: 0.0,
                    period_minutes: 96.0,
                };
                CandidateSatellite::new(format!("s{}", i), "starlink", elements, samples)
            })
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn fuzz_ratio_non_decreasing_as_pool_grows(
            masks in proptest::collection::vec(proptest::collection::vec(any::<bool>(), 20), 1..12),
            target in 0usize..5,
        ) {
            let catalog = catalog_from(&masks);
            let analyzer = CoverageAnalyzer::new(&catalog, CoverageGrid::new(600.0, 30.0), target);

            let mut pool = SatellitePool::new(catalog.len());
            let mut previous = analyzer.analyze(&pool);
            for i in 0..catalog.len() {
                pool.try_insert(i);
                let report = analyzer.analyze(&pool);
                prop_assert!(report.time_coverage_ratio >= previous.time_coverage_ratio);
                prop_assert!(report.min_visible_satellites >= previous.min_visible_satellites);
                prop_assert!((0.0..=1.0).contains(&report.time_coverage_ratio));
                for pair in report.gaps.windows(2) {
                    prop_assert!(pair[0].end_bucket <= pair[1].start_bucket);
                }
                previous = report;
            }
        }
    }
}
