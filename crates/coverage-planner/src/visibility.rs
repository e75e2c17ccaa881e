//! Visibility Window Extractor
//!
//! Turns a candidate's time-ordered position samples into contiguous
//! visibility windows (AOS to LOS) and a per-sample visible mask.

use crate::{CandidateSatellite, PositionSample};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Contiguous visibility of one candidate, `[start, end)` in seconds from epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisibilityWindow {
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl VisibilityWindow {
    pub fn duration_seconds(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }

    /// Seconds of this window falling inside `[start, end)`
    pub fn overlap_seconds(&self, start: f64, end: f64) -> f64 {
        (self.end_seconds.min(end) - self.start_seconds.max(start)).max(0.0)
    }
}

/// Everything the later stages need from one candidate's samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisibilityProfile {
    pub windows: Vec<VisibilityWindow>,
    /// `is_visible` per sample, aligned with the position timeseries
    pub visible_mask: Vec<bool>,
    pub total_visible_seconds: f64,
}

impl VisibilityProfile {
    pub fn from_samples(samples: &[PositionSample]) -> Self {
        let windows = extract_windows(samples);
        let total_visible_seconds = windows.iter().map(|w| w.duration_seconds()).sum();
        Self {
            windows,
            visible_mask: samples.iter().map(|s| s.counts_as_visible()).collect(),
            total_visible_seconds,
        }
    }

    pub fn visible_fraction(&self, period_seconds: f64) -> f64 {
        if period_seconds > 0.0 {
            (self.total_visible_seconds / period_seconds).min(1.0)
        } else {
            0.0
        }
    }
}

/// Single scan with an in-window flag.
///
/// A window opens on the first visible sample after an invisible one (or at
/// sequence start) and closes at the first invisible sample after a visible
/// run, or at the last sample's offset when the sequence ends mid-pass.
pub fn extract_windows(samples: &[PositionSample]) -> Vec<VisibilityWindow> {
    let mut windows = Vec::new();
    let mut in_view = false;
    let mut aos = 0.0;

    for sample in samples {
        let visible = sample.counts_as_visible();

        if visible && !in_view {
            in_view = true;
            aos = sample.time_offset_seconds;
        } else if !visible && in_view && sample.time_offset_seconds.is_finite() {
            in_view = false;
            push_window(&mut windows, aos, sample.time_offset_seconds);
        }
    }

    // Pass still in progress at end of data
    if in_view {
        if let Some(last) = samples.iter().rev().find(|s| s.time_offset_seconds.is_finite()) {
            push_window(&mut windows, aos, last.time_offset_seconds);
        }
    }

    windows
}

fn push_window(windows: &mut Vec<VisibilityWindow>, start: f64, end: f64) {
    // A lone trailing visible sample has no measurable extent
    if end > start {
        windows.push(VisibilityWindow {
            start_seconds: start,
            end_seconds: end,
        });
    }
}

/// Extract profiles for every candidate, in catalog order
pub fn extract_all(candidates: &[CandidateSatellite]) -> Vec<VisibilityProfile> {
    let profiles: Vec<VisibilityProfile> = candidates
        .par_iter()
        .map(|c| VisibilityProfile::from_samples(&c.position_timeseries))
        .collect();

    for (candidate, profile) in candidates.iter().zip(&profiles) {
        debug!(
            "{}: {} windows, {:.0}s visible",
            candidate.satellite_id,
            profile.windows.len(),
            profile.total_visible_seconds
        );
    }

    profiles
}
