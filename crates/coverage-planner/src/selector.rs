//! Diversity-aware pool selection
//!
//! Three deterministic passes over one ranked structure:
//!
//! 1. Temporal spread: per mean-anomaly bin, best-ranked members up to
//!    `ceil(target / phase_bins)` each
//! 2. Spatial backfill: RAAN bins in index order
//! 3. Best effort: remaining candidates by global rank
//!
//! Rank is total visible duration descending, ties by catalog order.

use crate::config::PlannerConfig;
use crate::phase::PhaseIndex;
use crate::visibility::VisibilityProfile;
use crate::SatellitePool;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, info};

/// Binning axis walked by a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinAxis {
    MeanAnomaly,
    Raan,
}

/// One step of a ranked walk: `rank` is the position inside `bin`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedEntry {
    pub bin: usize,
    pub rank: usize,
    pub catalog_index: usize,
}

/// Candidates sorted once by visible duration, shared by every pass
#[derive(Debug, Clone)]
pub struct RankedCandidates {
    durations: Vec<f64>,
    order: Vec<usize>,
    rank_of: Vec<usize>,
}

impl RankedCandidates {
    pub fn new(profiles: &[VisibilityProfile]) -> Self {
        let durations: Vec<f64> = profiles.iter().map(|p| p.total_visible_seconds).collect();
        Self::from_durations(durations)
    }

    pub fn from_durations(mut durations: Vec<f64>) -> Self {
        for d in durations.iter_mut().filter(|d| !d.is_finite()) {
            *d = 0.0;
        }

        let mut order: Vec<usize> = (0..durations.len()).collect();
        // sort_by is stable, so equal durations keep catalog order
        order.sort_by(|&a, &b| {
            durations[b]
                .partial_cmp(&durations[a])
                .unwrap_or(Ordering::Equal)
        });

        let mut rank_of = vec![0; durations.len()];
        for (rank, &idx) in order.iter().enumerate() {
            rank_of[idx] = rank;
        }

        Self {
            durations,
            order,
            rank_of,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Catalog indices, best first
    pub fn global(&self) -> &[usize] {
        &self.order
    }

    pub fn duration(&self, catalog_index: usize) -> f64 {
        self.durations.get(catalog_index).copied().unwrap_or(0.0)
    }

    /// Members of a bin re-ordered by global rank
    pub fn rank_members(&self, members: &[usize]) -> Vec<usize> {
        let mut ranked: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&i| i < self.rank_of.len())
            .collect();
        ranked.sort_by_key(|&i| self.rank_of[i]);
        ranked
    }

    /// Walk bins in index order, each bin's members in rank order
    pub fn bin_sequence(&self, index: &PhaseIndex, axis: BinAxis) -> Vec<RankedEntry> {
        let bin_count = match axis {
            BinAxis::MeanAnomaly => index.phase_bins(),
            BinAxis::Raan => index.raan_bins(),
        };

        let mut sequence = Vec::with_capacity(self.len());
        for bin in 0..bin_count {
            let members = match axis {
                BinAxis::MeanAnomaly => index.phase_members(bin),
                BinAxis::Raan => index.raan_members(bin),
            };
            for (rank, catalog_index) in self.rank_members(members).into_iter().enumerate() {
                sequence.push(RankedEntry {
                    bin,
                    rank,
                    catalog_index,
                });
            }
        }
        sequence
    }
}

/// Members added by each pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SelectionSummary {
    pub per_bin_quota: usize,
    pub temporal_spread: usize,
    pub spatial_backfill: usize,
    pub best_effort: usize,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub pool: SatellitePool,
    pub summary: SelectionSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiversitySelector {
    target_pool_size: usize,
}

impl DiversitySelector {
    pub fn new(target_pool_size: usize) -> Self {
        Self { target_pool_size }
    }

    pub fn from_config(config: &PlannerConfig) -> Self {
        Self::new(config.target_pool_size)
    }

    pub fn select(&self, index: &PhaseIndex, ranked: &RankedCandidates) -> Selection {
        let mut pool = SatellitePool::new(self.target_pool_size);
        let per_bin_quota = self.target_pool_size.div_ceil(index.phase_bins().max(1));
        let mut summary = SelectionSummary {
            per_bin_quota,
            ..Default::default()
        };

        info!(
            "Selecting up to {} of {} candidates ({} per mean-anomaly bin)",
            self.target_pool_size,
            ranked.len(),
            per_bin_quota
        );

        // Pass 1: temporal spread
        for entry in ranked.bin_sequence(index, BinAxis::MeanAnomaly) {
            if pool.is_full() {
                break;
            }
            if entry.rank < per_bin_quota && pool.try_insert(entry.catalog_index) {
                summary.temporal_spread += 1;
                debug!(
                    "MA bin {}: took #{} (rank {}, {:.0}s visible)",
                    entry.bin,
                    entry.catalog_index,
                    entry.rank,
                    ranked.duration(entry.catalog_index)
                );
            }
        }

        // Pass 2: spatial backfill
        if !pool.is_full() {
            for entry in ranked.bin_sequence(index, BinAxis::Raan) {
                if pool.is_full() {
                    break;
                }
                if pool.try_insert(entry.catalog_index) {
                    summary.spatial_backfill += 1;
                }
            }
        }

        // Pass 3: best effort
        if !pool.is_full() {
            for &catalog_index in ranked.global() {
                if pool.is_full() {
                    break;
                }
                if pool.try_insert(catalog_index) {
                    summary.best_effort += 1;
                }
            }
        }

        info!(
            "Selected {} satellites (temporal {}, spatial {}, best-effort {})",
            pool.len(),
            summary.temporal_spread,
            summary.spatial_backfill,
            summary.best_effort
        );
        if !pool.is_full() {
            info!(
                "Pool short of target by {} (candidates exhausted)",
                pool.remaining()
            );
        }

        Selection { pool, summary }
    }
}
