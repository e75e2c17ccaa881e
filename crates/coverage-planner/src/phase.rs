//! Orbital Phase Classifier
//!
//! Buckets candidates along two axes:
//!
//! | Axis          | Element         | Meaning                      | Default bins |
//! |---------------|-----------------|------------------------------|--------------|
//! | Orbital clock | mean anomaly    | where in the orbit right now | 12           |
//! | Orbital plane | RAAN            | which plane                  | 8            |
//!
//! The bin→members index and occupancy matrix live in a [`PhaseIndex`] that
//! is built from scratch for every run and never patched.

use crate::config::PlannerConfig;
use crate::{
    normalize_degrees, CandidateSatellite, OrbitalElements, PlannerError, Result,
    FULL_CIRCLE_DEG, UNIFORM_SPREAD_STD_DEG,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// (mean-anomaly bin, RAAN bin) label of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhaseBin {
    pub mean_anomaly_bin: usize,
    pub raan_bin: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseClassifier {
    phase_bins: usize,
    raan_bins: usize,
}

impl PhaseClassifier {
    pub fn new(phase_bins: usize, raan_bins: usize) -> Result<Self> {
        if phase_bins == 0 || raan_bins == 0 {
            return Err(PlannerError::Configuration(format!(
                "bin counts must be positive (phase_bins={}, raan_bins={})",
                phase_bins, raan_bins
            )));
        }
        Ok(Self {
            phase_bins,
            raan_bins,
        })
    }

    pub fn from_config(config: &PlannerConfig) -> Result<Self> {
        Self::new(config.phase_bins, config.raan_bins)
    }

    pub fn phase_bins(&self) -> usize {
        self.phase_bins
    }

    pub fn raan_bins(&self) -> usize {
        self.raan_bins
    }

    pub fn classify(&self, mean_anomaly_deg: f64, raan_deg: f64) -> PhaseBin {
        PhaseBin {
            mean_anomaly_bin: bin_index(mean_anomaly_deg, self.phase_bins),
            raan_bin: bin_index(raan_deg, self.raan_bins),
        }
    }

    pub fn classify_elements(&self, elements: &OrbitalElements) -> PhaseBin {
        self.classify(elements.mean_anomaly_deg, elements.raan_deg)
    }

    /// Build the run-scoped index for a catalog
    pub fn build_index(&self, candidates: &[CandidateSatellite]) -> PhaseIndex {
        let mut index = PhaseIndex {
            phase_bins: self.phase_bins,
            raan_bins: self.raan_bins,
            assignments: Vec::with_capacity(candidates.len()),
            phase_members: vec![Vec::new(); self.phase_bins],
            raan_members: vec![Vec::new(); self.raan_bins],
            occupancy: vec![vec![0; self.raan_bins]; self.phase_bins],
        };

        for (i, candidate) in candidates.iter().enumerate() {
            let bin = self.classify_elements(&candidate.orbital_elements);
            index.assignments.push(bin);
            index.phase_members[bin.mean_anomaly_bin].push(i);
            index.raan_members[bin.raan_bin].push(i);
            index.occupancy[bin.mean_anomaly_bin][bin.raan_bin] += 1;
        }

        info!(
            "Phase index: {} candidates over {}x{} bins (MA uniformity {:.2}, RAAN uniformity {:.2})",
            candidates.len(),
            self.phase_bins,
            self.raan_bins,
            index.phase_uniformity(),
            index.raan_uniformity()
        );

        index
    }
}

/// normalize → divide by bin width → floor → clamp to [0, count-1]
pub fn bin_index(angle_deg: f64, bin_count: usize) -> usize {
    if bin_count == 0 {
        return 0;
    }
    let width = FULL_CIRCLE_DEG / bin_count as f64;
    let raw = (normalize_degrees(angle_deg) / width).floor();
    // Clamp guards the 360° boundary after floating-point division
    (raw.max(0.0) as usize).min(bin_count - 1)
}

/// Run-scoped bin membership and 2-D occupancy
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseIndex {
    phase_bins: usize,
    raan_bins: usize,
    assignments: Vec<PhaseBin>,
    phase_members: Vec<Vec<usize>>,
    raan_members: Vec<Vec<usize>>,
    occupancy: Vec<Vec<usize>>,
}

impl PhaseIndex {
    pub fn phase_bins(&self) -> usize {
        self.phase_bins
    }

    pub fn raan_bins(&self) -> usize {
        self.raan_bins
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn bin_of(&self, catalog_index: usize) -> Option<PhaseBin> {
        self.assignments.get(catalog_index).copied()
    }

    /// Catalog indices in a mean-anomaly bin, catalog order
    pub fn phase_members(&self, bin: usize) -> &[usize] {
        self.phase_members.get(bin).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Catalog indices in a RAAN bin, catalog order
    pub fn raan_members(&self, bin: usize) -> &[usize] {
        self.raan_members.get(bin).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn occupancy(&self, mean_anomaly_bin: usize, raan_bin: usize) -> usize {
        self.occupancy
            .get(mean_anomaly_bin)
            .and_then(|row| row.get(raan_bin))
            .copied()
            .unwrap_or(0)
    }

    pub fn phase_bin_counts(&self) -> Vec<usize> {
        self.phase_members.iter().map(|m| m.len()).collect()
    }

    pub fn raan_bin_counts(&self) -> Vec<usize> {
        self.raan_members.iter().map(|m| m.len()).collect()
    }

    pub fn phase_uniformity(&self) -> f64 {
        uniformity(&self.phase_bin_counts())
    }

    pub fn raan_uniformity(&self) -> f64 {
        uniformity(&self.raan_bin_counts())
    }
}

/// 1 − (max − min) / max(max, 1) over bin counts
pub fn uniformity(counts: &[usize]) -> f64 {
    let (Some(&max), Some(&min)) = (counts.iter().max(), counts.iter().min()) else {
        return 0.0;
    };
    1.0 - (max - min) as f64 / max.max(1) as f64
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Spread of a pool's orbital phases against a uniform spread, in [0, 1].
///
/// Each axis' standard deviation (angles normalized to [0, 360)) is divided
/// by the uniform-spread deviation; the two ratios are averaged and capped.
pub fn phase_diversity_score<'a>(elements: impl IntoIterator<Item = &'a OrbitalElements>) -> f64 {
    let (mean_anomalies, raans): (Vec<f64>, Vec<f64>) = elements
        .into_iter()
        .map(|e| (normalize_degrees(e.mean_anomaly_deg), normalize_degrees(e.raan_deg)))
        .unzip();

    if mean_anomalies.len() < 2 {
        return 0.0;
    }

    let ma_ratio = population_std(&mean_anomalies) / UNIFORM_SPREAD_STD_DEG;
    let raan_ratio = population_std(&raans) / UNIFORM_SPREAD_STD_DEG;
    ((ma_ratio + raan_ratio) / 2.0).min(1.0)
}

/// Qualitative band of a phase diversity score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiversityRating {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

impl DiversityRating {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.85 {
            Self::Excellent
        } else if score >= 0.70 {
            Self::Good
        } else if score >= 0.55 {
            Self::Acceptable
        } else {
            Self::Poor
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elements(ma: f64, raan: f64) -> OrbitalElements {
        OrbitalElements {
            inclination_deg: 53.0,
            raan_deg: raan,
            mean_anomaly_deg: ma,
            eccentricity: 0.0,
            period_minutes: 96.0,
        }
    }

    fn candidate(id: &str, ma: f64, raan: f64) -> CandidateSatellite {
        CandidateSatellite::new(id, "starlink", elements(ma, raan), Vec::new())
    }

    #[test]
    fn test_classify_basic() {
        let classifier = PhaseClassifier::new(12, 8).unwrap();
        assert_eq!(
            classifier.classify(0.0, 0.0),
            PhaseBin { mean_anomaly_bin: 0, raan_bin: 0 }
        );
        assert_eq!(
            classifier.classify(45.0, 90.0),
            PhaseBin { mean_anomaly_bin: 1, raan_bin: 2 }
        );
        assert_eq!(
            classifier.classify(359.999, 359.999),
            PhaseBin { mean_anomaly_bin: 11, raan_bin: 7 }
        );
    }

    #[test]
    fn test_classify_wraps_out_of_range_angles() {
        let classifier = PhaseClassifier::new(12, 8).unwrap();
        assert_eq!(classifier.classify(360.0, 360.0), classifier.classify(0.0, 0.0));
        assert_eq!(classifier.classify(-30.0, -45.0), classifier.classify(330.0, 315.0));
        assert_eq!(classifier.classify(750.0, 0.0).mean_anomaly_bin, 1);
    }

    #[test]
    fn test_zero_bins_rejected() {
        assert!(PhaseClassifier::new(0, 8).is_err());
        assert!(PhaseClassifier::new(12, 0).is_err());
    }

    #[test]
    fn test_index_is_rebuilt_from_scratch() {
        let classifier = PhaseClassifier::new(4, 2).unwrap();
        let first = classifier.build_index(&[candidate("a", 10.0, 10.0), candidate("b", 100.0, 200.0)]);
        let second = classifier.build_index(&[candidate("c", 280.0, 200.0)]);

        assert_eq!(first.phase_members(0), &[0]);
        assert_eq!(first.phase_members(1), &[1]);
        assert_eq!(first.occupancy(1, 1), 1);

        // No residue from the previous run
        assert_eq!(second.len(), 1);
        assert!(second.phase_members(0).is_empty());
        assert_eq!(second.phase_members(3), &[0]);
        assert_eq!(second.raan_members(1), &[0]);
        assert_eq!(second.bin_of(0), Some(PhaseBin { mean_anomaly_bin: 3, raan_bin: 1 }));
        assert_eq!(second.bin_of(1), None);
    }

    #[test]
    fn test_uniformity() {
        assert_eq!(uniformity(&[3, 3, 3]), 1.0);
        assert_eq!(uniformity(&[4, 0, 2]), 0.0);
        assert_eq!(uniformity(&[0, 0]), 1.0);
        assert_eq!(uniformity(&[]), 0.0);
    }

    #[test]
    fn test_diversity_score_bounds() {
        assert_eq!(phase_diversity_score(&Vec::<OrbitalElements>::new()), 0.0);
        assert_eq!(phase_diversity_score(&[elements(10.0, 10.0)]), 0.0);

        let clustered = [elements(10.0, 10.0), elements(11.0, 11.0), elements(12.0, 12.0)];
        assert!(phase_diversity_score(&clustered) < 0.02);

        let spread: Vec<OrbitalElements> = (0..36)
            .map(|i| elements(i as f64 * 10.0, ((i * 7) % 36) as f64 * 10.0))
            .collect();
        let score = phase_diversity_score(&spread);
        assert!(score > 0.95 && score <= 1.0, "score {}", score);
    }

    #[test]
    fn test_diversity_score_independent_of_pool_size() {
        let small: Vec<OrbitalElements> = (0..12).map(|i| elements(i as f64 * 30.0, i as f64 * 30.0)).collect();
        let large: Vec<OrbitalElements> = small.iter().chain(small.iter()).copied().collect();
        let a = phase_diversity_score(&small);
        let b = phase_diversity_score(&large);
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn test_diversity_rating() {
        assert_eq!(DiversityRating::from_score(0.9), DiversityRating::Excellent);
        assert_eq!(DiversityRating::from_score(0.7), DiversityRating::Good);
        assert_eq!(DiversityRating::from_score(0.6), DiversityRating::Acceptable);
        assert_eq!(DiversityRating::from_score(0.1), DiversityRating::Poor);
    }
}
