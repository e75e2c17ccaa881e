//! Validation/Reporting Facade
//!
//! Pure pass/fail over a [`CoverageReport`]. Passing requires all three:
//!
//! | Check          | Requirement                             |
//! |----------------|-----------------------------------------|
//! | coverage_ratio | ≥ acceptance ratio (0.95 by default)    |
//! | min_visible    | ≥ 0.8 × min visible target              |
//! | avg_visible    | ≥ min visible target                    |
//!
//! Gap severity and phase diversity are reported as diagnostics only.

use crate::config::{PlannerConfig, DEFAULT_ACCEPTANCE_RATIO, DEFAULT_MAX_GAP_S};
use crate::coverage::CoverageReport;
use crate::phase::DiversityRating;
use serde::{Deserialize, Serialize};

/// Worst-bucket tolerance relative to the visible target
pub const MIN_VISIBLE_TOLERANCE: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationProfile {
    pub min_visible_target: usize,
    pub max_visible_target: usize,
    pub orbital_period_minutes: f64,
    pub acceptance_ratio: f64,
    pub max_gap_seconds: f64,
}

impl ValidationProfile {
    pub fn new(min_visible_target: usize, max_visible_target: usize, orbital_period_minutes: f64) -> Self {
        Self {
            min_visible_target,
            max_visible_target,
            orbital_period_minutes,
            acceptance_ratio: DEFAULT_ACCEPTANCE_RATIO,
            max_gap_seconds: DEFAULT_MAX_GAP_S,
        }
    }

    pub fn from_config(config: &PlannerConfig) -> Self {
        Self {
            min_visible_target: config.min_visible_satellites,
            max_visible_target: config.max_visible_satellites,
            orbital_period_minutes: config.orbital_period_minutes,
            acceptance_ratio: config.acceptance_ratio,
            max_gap_seconds: config.max_gap_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub name: String,
    pub passed: bool,
    pub actual: f64,
    pub required: f64,
}

impl ValidationCheck {
    fn at_least(name: &str, actual: f64, required: f64) -> Self {
        Self {
            name: name.to_string(),
            passed: actual >= required,
            actual,
            required,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    pub coverage_ratio: f64,
    pub min_visible: usize,
    pub max_visible: usize,
    pub avg_visible: f64,
    pub gaps_count: usize,
    pub max_gap_minutes: f64,
    pub phase_diversity: f64,
    pub diversity_rating: DiversityRating,
    pub checks: Vec<ValidationCheck>,
    pub diagnostics: Vec<String>,
}

pub fn validate(report: &CoverageReport, profile: &ValidationProfile) -> Verdict {
    let min_target = profile.min_visible_target as f64;
    let checks = vec![
        ValidationCheck::at_least("coverage_ratio", report.time_coverage_ratio, profile.acceptance_ratio),
        ValidationCheck::at_least(
            "min_visible",
            report.min_visible_satellites as f64,
            MIN_VISIBLE_TOLERANCE * min_target,
        ),
        ValidationCheck::at_least("avg_visible", report.avg_visible_satellites, min_target),
    ];
    // An empty pool never passes, even against a zero target
    let passed = report.pool_size > 0 && checks.iter().all(|c| c.passed);

    let diversity_rating = DiversityRating::from_score(report.phase_diversity_score);
    let diagnostics = diagnose(report, profile, &checks, diversity_rating);

    Verdict {
        passed,
        coverage_ratio: report.time_coverage_ratio,
        min_visible: report.min_visible_satellites,
        max_visible: report.max_visible_satellites,
        avg_visible: report.avg_visible_satellites,
        gaps_count: report.gaps_count(),
        max_gap_minutes: report.max_gap_seconds() / 60.0,
        phase_diversity: report.phase_diversity_score,
        diversity_rating,
        checks,
        diagnostics,
    }
}

fn diagnose(
    report: &CoverageReport,
    profile: &ValidationProfile,
    checks: &[ValidationCheck],
    rating: DiversityRating,
) -> Vec<String> {
    let mut diagnostics = Vec::new();

    if report.pool_size == 0 {
        diagnostics.push("pool is empty: no candidates were selected".to_string());
    }

    for check in checks.iter().filter(|c| !c.passed) {
        let message = match check.name.as_str() {
            "coverage_ratio" => format!(
                "coverage {:.1}% of the period is below the {:.1}% acceptance ratio",
                check.actual * 100.0,
                check.required * 100.0
            ),
            "min_visible" => format!(
                "worst moment has {} visible satellites, needs at least {:.1}",
                check.actual, check.required
            ),
            _ => format!(
                "average of {:.2} visible satellites is below the target of {}",
                check.actual, check.required
            ),
        };
        diagnostics.push(message);
    }

    let long_gaps = report.gaps_exceeding(profile.max_gap_seconds);
    if long_gaps > 0 {
        diagnostics.push(format!(
            "{} gaps exceed {:.1} min (longest {:.1} min)",
            long_gaps,
            profile.max_gap_seconds / 60.0,
            report.max_gap_seconds() / 60.0
        ));
    }

    if report.max_visible_satellites > profile.max_visible_target {
        diagnostics.push(format!(
            "peak of {} visible satellites exceeds the useful maximum of {}",
            report.max_visible_satellites, profile.max_visible_target
        ));
    }

    if rating == DiversityRating::Poor && report.pool_size > 1 {
        diagnostics.push(format!(
            "phase diversity {:.2} is poor: pool is clustered in mean anomaly or RAAN",
            report.phase_diversity_score
        ));
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::{CoverageGap, GapSeverity};

    fn report(ratio: f64, min: usize, avg: f64) -> CoverageReport {
        CoverageReport {
            pool_size: 40,
            min_visible_target: 10,
            period_seconds: 5760.0,
            resolution_seconds: 30.0,
            bucket_count: 192,
            time_coverage_ratio: ratio,
            min_visible_satellites: min,
            max_visible_satellites: 14,
            avg_visible_satellites: avg,
            gaps: Vec::new(),
            phase_diversity_score: 0.9,
        }
    }

    fn profile() -> ValidationProfile {
        ValidationProfile::new(10, 15, 96.0)
    }

    #[test]
    fn test_passing_report() {
        let verdict = validate(&report(0.97, 8, 11.5), &profile());
        assert!(verdict.passed);
        assert_eq!(verdict.diversity_rating, DiversityRating::Excellent);
        assert!(verdict.diagnostics.is_empty());
    }

    #[test]
    fn test_each_criterion_can_fail_alone() {
        assert!(!validate(&report(0.94, 10, 12.0), &profile()).passed);
        assert!(!validate(&report(1.0, 7, 12.0), &profile()).passed);
        assert!(!validate(&report(1.0, 10, 9.9), &profile()).passed);
    }

    #[test]
    fn test_min_visible_uses_real_threshold() {
        // 0.8 × 8 = 6.4, so 6 fails and 7 passes
        let profile = ValidationProfile::new(8, 12, 96.0);
        let mut r = report(1.0, 6, 9.0);
        assert!(!validate(&r, &profile).passed);
        r.min_visible_satellites = 7;
        assert!(validate(&r, &profile).passed);
    }

    #[test]
    fn test_diagnostics_explain_failures() {
        let mut r = report(0.5, 2, 4.0);
        r.gaps.push(CoverageGap {
            start_seconds: 0.0,
            end_seconds: 600.0,
            duration_seconds: 600.0,
            start_bucket: 0,
            end_bucket: 20,
            min_visible: 2,
            severity: GapSeverity::High,
        });
        let verdict = validate(&r, &profile());
        assert!(!verdict.passed);
        assert_eq!(verdict.gaps_count, 1);
        assert_eq!(verdict.max_gap_minutes, 10.0);
        assert_eq!(verdict.checks.iter().filter(|c| !c.passed).count(), 3);
        assert_eq!(verdict.diagnostics.len(), 4);
    }

    #[test]
    fn test_empty_pool_fails() {
        let mut r = report(0.0, 0, 0.0);
        r.pool_size = 0;
        let verdict = validate(&r, &ValidationProfile::new(0, 0, 96.0));
        assert!(!verdict.passed);
    }

    #[test]
    fn test_acceptance_ratio_from_config() {
        let mut config = PlannerConfig::default();
        config.acceptance_ratio = 0.9;
        let profile = ValidationProfile::from_config(&config);
        assert!(validate(&report(0.92, 10, 12.0), &profile).passed);
    }
}
