//! Candidate ingestion from JSON
//!
//! Required fields are validated here, once. Downstream stages only ever see
//! well-formed [`CandidateSatellite`] records; anything unusable is recorded in
//! the skip ledger instead of aborting the run.
//!
//! Records and samples are typed one at a time, so a wrongly typed field
//! costs at most its own record (or sample), never the whole load.

use crate::config::{ConstellationProfiles, PlannerConfig};
use crate::{
    CandidateSatellite, OrbitalElements, PositionSample, Result, SkipReason, SkippedCandidate,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info, warn};

/// Constellation-dependent ingestion rules
pub trait IngestRules {
    fn accepts_constellation(&self, tag: &str) -> bool;

    /// Threshold used when a sample carries elevation but no visibility flag
    fn elevation_threshold_deg(&self, tag: &str) -> f64;
}

impl IngestRules for PlannerConfig {
    fn accepts_constellation(&self, tag: &str) -> bool {
        PlannerConfig::accepts_constellation(self, tag)
    }

    fn elevation_threshold_deg(&self, _tag: &str) -> f64 {
        self.elevation_threshold_deg
    }
}

impl IngestRules for ConstellationProfiles {
    fn accepts_constellation(&self, tag: &str) -> bool {
        self.get(tag).is_some()
    }

    fn elevation_threshold_deg(&self, tag: &str) -> f64 {
        // Unknown tags are skipped as mismatches; derive nothing for them
        self.get(tag)
            .map(|config| config.elevation_threshold_deg)
            .unwrap_or(f64::INFINITY)
    }
}

/// Raw orbital elements from JSON
#[derive(Debug, Deserialize)]
struct RawElements {
    inclination_deg: Option<Value>,
    raan_deg: Option<Value>,
    mean_anomaly_deg: Option<Value>,
    eccentricity: Option<Value>,
    period_minutes: Option<Value>,
}

/// Raw position sample from JSON
#[derive(Debug, Deserialize)]
struct RawSample {
    time_offset_seconds: Option<Value>,
    elevation_deg: Option<Value>,
    azimuth_deg: Option<Value>,
    range_km: Option<Value>,
    is_visible: Option<Value>,
}

/// Raw candidate record from JSON
#[derive(Debug, Deserialize)]
struct RawCandidate {
    satellite_id: Option<Value>,
    constellation: Option<Value>,
    orbital_elements: Option<Value>,
    position_timeseries: Option<Value>,
}

/// Accepted candidates in catalog order plus everything that was skipped
#[derive(Debug, Clone, Default)]
pub struct LoadedCatalog {
    pub candidates: Vec<CandidateSatellite>,
    pub skipped: Vec<SkippedCandidate>,
    /// Records present in the input
    pub total_records: usize,
}

impl LoadedCatalog {
    /// Apply ingestion rules to already-typed candidates
    pub fn from_candidates(candidates: Vec<CandidateSatellite>, rules: &impl IngestRules) -> Self {
        let total_records = candidates.len();
        let mut catalog = Self {
            candidates: Vec::with_capacity(total_records),
            skipped: Vec::new(),
            total_records,
        };
        if total_records == 0 {
            catalog.skip(None, None, SkipReason::EmptyCatalog);
            return catalog;
        }

        let mut seen = HashSet::new();
        for (i, mut candidate) in candidates.into_iter().enumerate() {
            let id = candidate.satellite_id.trim().to_string();
            if id.is_empty() {
                catalog.skip(None, Some(i), SkipReason::MissingId);
                continue;
            }
            candidate.satellite_id = id;
            if let Some(reason) = check_candidate(&candidate, rules, &seen) {
                catalog.skip(Some(candidate.satellite_id), Some(i), reason);
                continue;
            }
            seen.insert(candidate.satellite_id.clone());
            candidate
                .position_timeseries
                .retain(|s| s.time_offset_seconds.is_finite());
            sort_samples(&mut candidate.position_timeseries);
            catalog.candidates.push(candidate);
        }
        catalog.log_summary();
        catalog
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    fn skip(&mut self, satellite_id: Option<String>, record_index: Option<usize>, reason: SkipReason) {
        warn!(
            "Skipping candidate {} (record {:?}): {:?}",
            satellite_id.as_deref().unwrap_or("<unknown>"),
            record_index,
            reason
        );
        self.skipped.push(SkippedCandidate {
            satellite_id,
            record_index,
            reason,
        });
    }

    fn log_summary(&self) {
        info!(
            "Catalog: {} accepted, {} skipped of {} records",
            self.candidates.len(),
            self.skipped.len(),
            self.total_records
        );
    }
}

fn check_candidate(
    candidate: &CandidateSatellite,
    rules: &impl IngestRules,
    seen: &HashSet<String>,
) -> Option<SkipReason> {
    if seen.contains(&candidate.satellite_id) {
        return Some(SkipReason::DuplicateId);
    }
    if !rules.accepts_constellation(&candidate.constellation) {
        return Some(SkipReason::ConstellationMismatch);
    }
    let elements = &candidate.orbital_elements;
    if !elements.raan_deg.is_finite() || !elements.mean_anomaly_deg.is_finite() {
        return Some(SkipReason::MalformedElements);
    }
    if !candidate
        .position_timeseries
        .iter()
        .any(|s| s.time_offset_seconds.is_finite())
    {
        return Some(SkipReason::EmptyTimeseries);
    }
    None
}

fn sort_samples(samples: &mut [PositionSample]) {
    samples.sort_by(|a, b| {
        a.time_offset_seconds
            .partial_cmp(&b.time_offset_seconds)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Finite number, or `None` when missing or of the wrong type
fn number(value: &Option<Value>) -> Option<f64> {
    value.as_ref().and_then(Value::as_f64).filter(|v| v.is_finite())
}

/// Convert a raw sample; `None` when it has no usable time offset
fn convert_sample(raw: RawSample, elevation_threshold_deg: f64) -> Option<PositionSample> {
    let time_offset_seconds = number(&raw.time_offset_seconds)?;
    let elevation_deg = number(&raw.elevation_deg);

    // Missing or malformed elevation never counts as visible
    let is_visible = match (&raw.is_visible, elevation_deg) {
        (_, None) => false,
        (None, Some(el)) => el >= elevation_threshold_deg,
        (Some(Value::Bool(flag)), Some(_)) => *flag,
        // Malformed flag
        (Some(_), Some(_)) => false,
    };

    Some(PositionSample {
        time_offset_seconds,
        elevation_deg: elevation_deg.unwrap_or(f64::NEG_INFINITY),
        azimuth_deg: number(&raw.azimuth_deg).unwrap_or(0.0),
        range_km: number(&raw.range_km).unwrap_or(0.0),
        is_visible,
    })
}

fn convert_elements(raw: RawElements) -> Option<OrbitalElements> {
    Some(OrbitalElements {
        inclination_deg: number(&raw.inclination_deg).unwrap_or(0.0),
        raan_deg: number(&raw.raan_deg)?,
        mean_anomaly_deg: number(&raw.mean_anomaly_deg)?,
        eccentricity: number(&raw.eccentricity).unwrap_or(0.0),
        period_minutes: number(&raw.period_minutes).unwrap_or(0.0),
    })
}

/// Why a record could not be typed, with whatever id it carried
type RecordRejection = (Option<String>, SkipReason);

fn id_hint(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        other => Some(other.to_string()),
    }
}

fn convert_record(
    record: Value,
    rules: &impl IngestRules,
) -> std::result::Result<CandidateSatellite, RecordRejection> {
    let hint = record.get("satellite_id").and_then(id_hint);
    let raw: RawCandidate = serde_json::from_value(record).map_err(|e| {
        debug!("Untyped record: {}", e);
        (hint.clone(), SkipReason::MalformedRecord)
    })?;

    let satellite_id = match raw.satellite_id {
        None => String::new(),
        Some(Value::String(id)) => id,
        Some(_) => return Err((hint, SkipReason::MalformedRecord)),
    };
    let constellation = match raw.constellation {
        None => String::new(),
        Some(Value::String(tag)) => tag,
        Some(_) => return Err((hint, SkipReason::MalformedRecord)),
    };
    let elements = raw
        .orbital_elements
        .and_then(|v| serde_json::from_value::<RawElements>(v).ok())
        .and_then(convert_elements)
        .ok_or_else(|| (hint.clone(), SkipReason::MalformedElements))?;
    let raw_samples = match raw.position_timeseries {
        None => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => return Err((hint, SkipReason::MalformedRecord)),
    };

    let threshold = rules.elevation_threshold_deg(&constellation);
    let offered = raw_samples.len();
    let samples: Vec<PositionSample> = raw_samples
        .into_iter()
        .filter_map(|v| serde_json::from_value::<RawSample>(v).ok())
        .filter_map(|s| convert_sample(s, threshold))
        .collect();
    if samples.len() < offered {
        debug!(
            "{}: dropped {} of {} samples without a usable time offset",
            satellite_id,
            offered - samples.len(),
            offered
        );
    }

    Ok(CandidateSatellite::new(satellite_id, constellation, elements, samples))
}

fn ingest(records: Vec<Value>, rules: &impl IngestRules) -> LoadedCatalog {
    let total_records = records.len();
    let mut typed = Vec::with_capacity(total_records);
    let mut early_skips = Vec::new();

    for (i, record) in records.into_iter().enumerate() {
        match convert_record(record, rules) {
            Ok(candidate) => typed.push((i, candidate)),
            Err((satellite_id, reason)) => early_skips.push(SkippedCandidate {
                satellite_id,
                record_index: Some(i),
                reason,
            }),
        }
    }

    for skip in &early_skips {
        warn!(
            "Skipping candidate {} (record {:?}): {:?}",
            skip.satellite_id.as_deref().unwrap_or("<unknown>"),
            skip.record_index,
            skip.reason
        );
    }

    // Keep raw record positions in the ledger even though typing dropped some
    let record_positions: Vec<usize> = typed.iter().map(|(i, _)| *i).collect();
    let mut catalog = LoadedCatalog::from_candidates(
        typed.into_iter().map(|(_, c)| c).collect(),
        rules,
    );
    for skip in catalog.skipped.iter_mut() {
        if let Some(pos) = skip.record_index {
            skip.record_index = record_positions.get(pos).copied();
        }
    }
    if total_records > 0 {
        catalog.skipped.retain(|s| s.reason != SkipReason::EmptyCatalog);
    }
    catalog.skipped.extend(early_skips);
    catalog.skipped.sort_by_key(|s| s.record_index);
    catalog.total_records = total_records;
    catalog
}

/// Parse candidates from a reader holding either an array or `{"candidates": [...]}`
pub fn parse_candidates(reader: impl Read, rules: &impl IngestRules) -> Result<LoadedCatalog> {
    let raw: Value = serde_json::from_reader(reader)?;

    let records: Vec<Value> = match raw {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("candidates") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    Ok(ingest(records, rules))
}

/// Load candidates from a JSON file
pub fn load_candidates(path: impl AsRef<Path>, rules: &impl IngestRules) -> Result<LoadedCatalog> {
    let path = path.as_ref();
    info!("Loading candidates from {:?}", path);

    let file = File::open(path)?;
    parse_candidates(BufReader::new(file), rules)
}

/// Read pool ids from a JSON array of strings or a previous plan output
/// (`pool.satellite_ids`)
pub fn load_seed_ids(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    info!("Loading seed pool from {:?}", path);

    let raw: Value = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    let list = raw
        .get("pool")
        .and_then(|pool| pool.get("satellite_ids"))
        .unwrap_or(&raw);

    let ids: Vec<String> = match list.as_array() {
        Some(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => Vec::new(),
    };

    info!("Read {} seed ids", ids.len());
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample(t: f64, el: f64, visible: bool) -> PositionSample {
        PositionSample {
            time_offset_seconds: t,
            elevation_deg: el,
            azimuth_deg: 0.0,
            range_km: 800.0,
            is_visible: visible,
        }
    }

    fn elements() -> OrbitalElements {
        OrbitalElements {
            inclination_deg: 53.0,
            raan_deg: 10.0,
            mean_anomaly_deg: 20.0,
            eccentricity: 0.0,
            period_minutes: 96.0,
        }
    }

    #[test]
    fn test_load_candidates_array() {
        let json = r#"[
            {"satellite_id": "STARLINK-1", "constellation": "starlink",
             "orbital_elements": {"inclination_deg": 53.0, "raan_deg": 12.0, "mean_anomaly_deg": 40.0, "period_minutes": 96.0},
             "position_timeseries": [
                {"time_offset_seconds": 30.0, "elevation_deg": 12.0, "azimuth_deg": 90.0, "range_km": 900.0, "is_visible": true},
                {"time_offset_seconds": 0.0, "elevation_deg": 2.0, "azimuth_deg": 80.0, "range_km": 1500.0, "is_visible": false}
             ]},
            {"satellite_id": "STARLINK-2", "constellation": "starlink",
             "orbital_elements": {"inclination_deg": 53.0, "raan_deg": 12.0, "mean_anomaly_deg": 40.0, "period_minutes": 96.0},
             "position_timeseries": []}
        ]"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let catalog = load_candidates(file.path(), &PlannerConfig::new()).unwrap();
        assert_eq!(catalog.total_records, 2);
        assert_eq!(catalog.candidates.len(), 1);
        assert_eq!(catalog.candidates[0].satellite_id, "STARLINK-1");
        // Sorted by time offset
        assert_eq!(catalog.candidates[0].position_timeseries[0].time_offset_seconds, 0.0);
        assert_eq!(catalog.skipped.len(), 1);
        assert_eq!(catalog.skipped[0].reason, SkipReason::EmptyTimeseries);
        assert_eq!(catalog.skipped[0].record_index, Some(1));
    }

    #[test]
    fn test_load_candidates_wrapped_object() {
        let json = r#"{"candidates": [
            {"satellite_id": "ONEWEB-7", "constellation": "oneweb",
             "orbital_elements": {"raan_deg": 100.0, "mean_anomaly_deg": 200.0},
             "position_timeseries": [{"time_offset_seconds": 0.0, "elevation_deg": 15.0}]}
        ]}"#;

        let catalog = parse_candidates(json.as_bytes(), &PlannerConfig::oneweb()).unwrap();
        assert_eq!(catalog.candidates.len(), 1);
        // Visibility derived from the 10° OneWeb threshold
        assert!(catalog.candidates[0].position_timeseries[0].is_visible);
    }

    #[test]
    fn test_malformed_samples_degrade_to_not_visible() {
        let json = r#"[
            {"satellite_id": "S-1", "constellation": "starlink",
             "orbital_elements": {"raan_deg": 0.0, "mean_anomaly_deg": 0.0},
             "position_timeseries": [
                {"time_offset_seconds": 0.0, "is_visible": true},
                {"time_offset_seconds": 30.0, "elevation_deg": 3.0},
                {"elevation_deg": 40.0, "is_visible": true},
                {"time_offset_seconds": 60.0, "elevation_deg": 30.0}
             ]}
        ]"#;

        let catalog = parse_candidates(json.as_bytes(), &PlannerConfig::new()).unwrap();
        let samples = &catalog.candidates[0].position_timeseries;
        // Sample without a time offset is dropped
        assert_eq!(samples.len(), 3);
        assert!(!samples[0].is_visible); // flag without elevation
        assert!(!samples[1].is_visible); // below 5°
        assert!(samples[2].is_visible);
    }

    #[test]
    fn test_missing_elements_and_ids_are_skipped() {
        let json = r#"[
            {"satellite_id": "NO-ELEMENTS", "constellation": "starlink",
             "position_timeseries": [{"time_offset_seconds": 0.0, "elevation_deg": 20.0}]},
            {"constellation": "starlink",
             "orbital_elements": {"raan_deg": 0.0, "mean_anomaly_deg": 0.0},
             "position_timeseries": [{"time_offset_seconds": 0.0, "elevation_deg": 20.0}]},
            {"satellite_id": "OK", "constellation": "starlink",
             "orbital_elements": {"raan_deg": 0.0, "mean_anomaly_deg": 0.0},
             "position_timeseries": [{"time_offset_seconds": 0.0, "elevation_deg": 20.0}]}
        ]"#;

        let catalog = parse_candidates(json.as_bytes(), &PlannerConfig::new()).unwrap();
        assert_eq!(catalog.candidates.len(), 1);
        let reasons: Vec<_> = catalog.skipped.iter().map(|s| (s.record_index, s.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                (Some(0), SkipReason::MalformedElements),
                (Some(1), SkipReason::MissingId),
            ]
        );
    }

    #[test]
    fn test_duplicates_and_constellation_filter() {
        let candidates = vec![
            CandidateSatellite::new("A", "starlink", elements(), vec![sample(0.0, 20.0, true)]),
            CandidateSatellite::new("A", "starlink", elements(), vec![sample(0.0, 20.0, true)]),
            CandidateSatellite::new("B", "oneweb", elements(), vec![sample(0.0, 20.0, true)]),
        ];

        let catalog = LoadedCatalog::from_candidates(candidates, &PlannerConfig::starlink());
        assert_eq!(catalog.candidates.len(), 1);
        assert_eq!(catalog.skipped[0].reason, SkipReason::DuplicateId);
        assert_eq!(catalog.skipped[1].reason, SkipReason::ConstellationMismatch);
    }

    #[test]
    fn test_empty_input_is_recorded() {
        let catalog = parse_candidates("[]".as_bytes(), &PlannerConfig::new()).unwrap();
        assert!(catalog.is_empty());
        assert_eq!(catalog.skipped.len(), 1);
        assert_eq!(catalog.skipped[0].reason, SkipReason::EmptyCatalog);
    }

    #[test]
    fn test_seed_ids_from_list_or_plan_output() {
        let mut list = NamedTempFile::new().unwrap();
        list.write_all(br#"["A", " B ", "", 7]"#).unwrap();
        assert_eq!(load_seed_ids(list.path()).unwrap(), vec!["A".to_string(), "B".to_string()]);

        let mut plan = NamedTempFile::new().unwrap();
        plan.write_all(br#"{"pool": {"target_size": 4, "satellite_ids": ["X", "Y"]}}"#)
            .unwrap();
        assert_eq!(load_seed_ids(plan.path()).unwrap(), vec!["X".to_string(), "Y".to_string()]);
    }

    #[test]
    fn test_badly_typed_sample_fields_degrade_per_sample() {
        let json = r#"[
            {"satellite_id": "GOOD", "constellation": "starlink",
             "orbital_elements": {"raan_deg": 0.0, "mean_anomaly_deg": 0.0},
             "position_timeseries": [{"time_offset_seconds": 0.0, "elevation_deg": 20.0, "is_visible": true}]},
            {"satellite_id": "ODD-SAMPLES", "constellation": "starlink",
             "orbital_elements": {"raan_deg": 90.0, "mean_anomaly_deg": 90.0},
             "position_timeseries": [
                {"time_offset_seconds": 0.0, "elevation_deg": "n/a", "is_visible": true},
                {"time_offset_seconds": 30.0, "elevation_deg": 25.0, "is_visible": "true"},
                {"time_offset_seconds": "soon", "elevation_deg": 25.0, "is_visible": true},
                42,
                {"time_offset_seconds": 60.0, "elevation_deg": 25.0, "azimuth_deg": "east", "is_visible": true}
             ]}
        ]"#;

        let catalog = parse_candidates(json.as_bytes(), &PlannerConfig::new()).unwrap();
        assert_eq!(catalog.candidates.len(), 2);
        assert!(catalog.skipped.is_empty());

        let samples = &catalog.candidates[1].position_timeseries;
        assert_eq!(samples.len(), 3);
        assert!(!samples[0].is_visible);
        assert!(!samples[1].is_visible);
        assert!(samples[2].is_visible);
        assert_eq!(samples[2].azimuth_deg, 0.0);
    }

    #[test]
    fn test_badly_typed_records_are_skipped_not_fatal() {
        let json = r#"{"candidates": [
            {"satellite_id": "GOOD", "constellation": "starlink",
             "orbital_elements": {"raan_deg": 0.0, "mean_anomaly_deg": 0.0},
             "position_timeseries": [{"time_offset_seconds": 0.0, "elevation_deg": 20.0}]},
            {"satellite_id": 44713, "constellation": "starlink",
             "orbital_elements": {"raan_deg": 0.0, "mean_anomaly_deg": 0.0},
             "position_timeseries": [{"time_offset_seconds": 0.0, "elevation_deg": 20.0}]},
            "not a record",
            {"satellite_id": "BAD-ELEMENTS", "constellation": "starlink",
             "orbital_elements": {"raan_deg": "ten", "mean_anomaly_deg": 0.0},
             "position_timeseries": [{"time_offset_seconds": 0.0, "elevation_deg": 20.0}]},
            {"satellite_id": "BAD-SERIES", "constellation": "starlink",
             "orbital_elements": {"raan_deg": 0.0, "mean_anomaly_deg": 0.0},
             "position_timeseries": "pending"}
        ]}"#;

        let catalog = parse_candidates(json.as_bytes(), &PlannerConfig::new()).unwrap();
        assert_eq!(catalog.total_records, 5);
        assert_eq!(catalog.candidates.len(), 1);
        assert_eq!(catalog.candidates[0].satellite_id, "GOOD");

        let ledger: Vec<_> = catalog
            .skipped
            .iter()
            .map(|s| (s.record_index, s.satellite_id.clone(), s.reason))
            .collect();
        assert_eq!(
            ledger,
            vec![
                (Some(1), Some("44713".to_string()), SkipReason::MalformedRecord),
                (Some(2), None, SkipReason::MalformedRecord),
                (Some(3), Some("BAD-ELEMENTS".to_string()), SkipReason::MalformedElements),
                (Some(4), Some("BAD-SERIES".to_string()), SkipReason::MalformedRecord),
            ]
        );
    }

    #[test]
    fn test_profiles_apply_per_constellation_threshold() {
        let json = r#"[
            {"satellite_id": "S-1", "constellation": "starlink",
             "orbital_elements": {"raan_deg": 0.0, "mean_anomaly_deg": 0.0},
             "position_timeseries": [{"time_offset_seconds": 0.0, "elevation_deg": 7.0}]},
            {"satellite_id": "O-1", "constellation": "OneWeb",
             "orbital_elements": {"raan_deg": 0.0, "mean_anomaly_deg": 0.0},
             "position_timeseries": [{"time_offset_seconds": 0.0, "elevation_deg": 7.0}]},
            {"satellite_id": "K-1", "constellation": "kuiper",
             "orbital_elements": {"raan_deg": 0.0, "mean_anomaly_deg": 0.0},
             "position_timeseries": [{"time_offset_seconds": 0.0, "elevation_deg": 70.0}]}
        ]"#;

        let catalog = parse_candidates(json.as_bytes(), &ConstellationProfiles::presets()).unwrap();
        assert_eq!(catalog.candidates.len(), 2);
        // 7° clears the 5° Starlink mask but not the 10° OneWeb mask
        assert!(catalog.candidates[0].position_timeseries[0].is_visible);
        assert!(!catalog.candidates[1].position_timeseries[0].is_visible);
        assert_eq!(catalog.skipped.len(), 1);
        assert_eq!(catalog.skipped[0].reason, SkipReason::ConstellationMismatch);
    }
}
