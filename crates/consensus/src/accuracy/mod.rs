//! Source accuracy against a trusted ground-truth set.
//!
//! Ground truth is filtered to valid coordinates; each source's located
//! records are paired with ground-truth points inside the search radius and
//! reduced to the nearest pair per (entity, source). Building and campus
//! granularities run their own dedup pass with their own denominators.
//! Capacity accuracy reuses the retained building matches; attribute
//! completeness looks at every record regardless of location.

pub mod capacity;
pub mod clusters;
pub mod completeness;
pub mod matching;
pub mod stats;

use std::collections::{BTreeMap, BTreeSet};

use log::{info, warn};

use crate::config::{AccuracyConfig, ConsensusConfig};
use crate::model::{
    AccuracyMeta, AccuracyReport, FacilityRecord, FieldErrors, GranularityReport, Granularity, GroundTruthFacility,
    GroupAccuracy, MatchPair, SourceAccuracy, WorstCase,
};

pub use capacity::capacity_accuracy;
pub use clusters::validate_clusters;
pub use completeness::attribute_completeness;
use matching::{candidate_pairs, nearest_per_entity, Entity};
use stats::{band_counts, classify_band, distance_stats, pct, threshold_counts};

pub fn evaluate_accuracy(
    ground_truth: &[GroundTruthFacility],
    records: &[FacilityRecord],
    config: &ConsensusConfig,
) -> AccuracyReport {
    let valid: Vec<&GroundTruthFacility> = ground_truth.iter().filter(|g| g.is_valid()).collect();
    let invalid = ground_truth.len() - valid.len();
    if invalid > 0 {
        warn!("{invalid} ground-truth rows have no usable coordinate and are excluded");
    }

    let sources: BTreeSet<&str> = records.iter().map(|r| r.source()).collect();
    let building_pairs = match_entities(Granularity::Building, &valid, records, &config.accuracy);
    let campus_pairs = match_entities(Granularity::Campus, &valid, records, &config.accuracy);
    let capacity = capacity_accuracy(&valid, records, &building_pairs, &config.accuracy.capacity);
    let building = evaluate_granularity(Granularity::Building, &valid, &building_pairs, &sources, &config.accuracy);
    let campus = evaluate_granularity(Granularity::Campus, &valid, &campus_pairs, &sources, &config.accuracy);

    AccuracyReport {
        meta: AccuracyMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            search_radius_m: config.accuracy.search_radius_m,
        },
        ground_truth_total: ground_truth.len(),
        ground_truth_valid: valid.len(),
        ground_truth_invalid: invalid,
        building,
        campus,
        capacity,
        attributes: attribute_completeness(records, &config.accuracy.attributes),
        ground_truth_field_errors: FieldErrors::default(),
    }
}

fn entity_key(g: &GroundTruthFacility, granularity: Granularity) -> &str {
    match granularity {
        Granularity::Building => &g.building_key,
        Granularity::Campus => g.campus(),
    }
}

fn entities<'a>(granularity: Granularity, valid: &[&'a GroundTruthFacility]) -> Vec<Entity<'a>> {
    valid
        .iter()
        .copied()
        .filter_map(|g| {
            g.coordinate().map(|at| Entity {
                key: entity_key(g, granularity),
                at,
            })
        })
        .collect()
}

/// Candidate pairs at one granularity, deduplicated to the nearest per
/// (entity, source).
pub fn match_entities(
    granularity: Granularity,
    valid: &[&GroundTruthFacility],
    records: &[FacilityRecord],
    config: &AccuracyConfig,
) -> Vec<MatchPair> {
    nearest_per_entity(candidate_pairs(&entities(granularity, valid), records, config.search_radius_m))
}

pub fn evaluate_granularity(
    granularity: Granularity,
    valid: &[&GroundTruthFacility],
    pairs: &[MatchPair],
    sources: &BTreeSet<&str>,
    config: &AccuracyConfig,
) -> GranularityReport {
    let keys: BTreeSet<&str> = entities(granularity, valid).iter().map(|e| e.key).collect();
    let denominator = keys.len();

    let retained: Vec<&MatchPair> = pairs.iter().filter(|p| p.retained).collect();
    info!(
        "{granularity} accuracy: {denominator} entities, {} candidate pairs, {} retained",
        pairs.len(),
        retained.len()
    );

    let source_rows: Vec<SourceAccuracy> = sources
        .iter()
        .map(|s| source_accuracy(s, &retained, denominator, config))
        .collect();

    let region_of = group_modes(valid, granularity, |g| g.region.as_deref());
    let status_of = group_modes(valid, granularity, |g| g.status.as_deref());

    GranularityReport {
        granularity,
        denominator,
        candidates: pairs.len(),
        retained: retained.len(),
        sources: source_rows,
        by_region: breakdown(&region_of, &retained, sources, config),
        by_status: breakdown(&status_of, &retained, sources, config),
        worst_cases: worst_cases(&retained, config),
    }
}

fn source_accuracy(source: &str, retained: &[&MatchPair], denominator: usize, config: &AccuracyConfig) -> SourceAccuracy {
    let distances: Vec<f64> = retained
        .iter()
        .filter(|p| p.source == source)
        .map(|p| p.distance_m)
        .collect();
    SourceAccuracy {
        source: source.to_string(),
        detected: distances.len(),
        denominator,
        recall_pct: pct(distances.len(), denominator),
        stats: distance_stats(&distances),
        thresholds: threshold_counts(&distances, &config.thresholds_m),
        bands: band_counts(&distances, &config.bands),
    }
}

/// Entity key → most common non-null group value across its ground-truth
/// rows. Ties resolve to the lexicographically smallest value.
fn group_modes<'a, F>(
    valid: &[&'a GroundTruthFacility],
    granularity: Granularity,
    value: F,
) -> BTreeMap<&'a str, &'a str>
where
    F: Fn(&'a GroundTruthFacility) -> Option<&'a str>,
{
    let mut tallies: BTreeMap<&str, BTreeMap<&str, usize>> = BTreeMap::new();
    for &g in valid {
        let Some(v) = value(g).map(str::trim).filter(|v| !v.is_empty()) else {
            continue;
        };
        *tallies
            .entry(entity_key(g, granularity))
            .or_default()
            .entry(v)
            .or_insert(0) += 1;
    }
    tallies
        .into_iter()
        .filter_map(|(key, counts)| {
            counts
                .into_iter()
                .min_by(|(va, ca), (vb, cb)| cb.cmp(ca).then(va.cmp(vb)))
                .map(|(v, _)| (key, v))
        })
        .collect()
}

fn breakdown(
    group_of: &BTreeMap<&str, &str>,
    retained: &[&MatchPair],
    sources: &BTreeSet<&str>,
    config: &AccuracyConfig,
) -> Vec<GroupAccuracy> {
    let mut denominators: BTreeMap<&str, usize> = BTreeMap::new();
    for group in group_of.values() {
        *denominators.entry(*group).or_insert(0) += 1;
    }

    denominators
        .into_iter()
        .map(|(group, denominator)| {
            let in_group: Vec<&MatchPair> = retained
                .iter()
                .copied()
                .filter(|p| group_of.get(p.entity_key.as_str()) == Some(&group))
                .collect();
            GroupAccuracy {
                group: group.to_string(),
                denominator,
                sources: sources
                    .iter()
                    .map(|s| source_accuracy(s, &in_group, denominator, config))
                    .collect(),
            }
        })
        .collect()
}

/// Top-K largest retained distances per source.
fn worst_cases(retained: &[&MatchPair], config: &AccuracyConfig) -> Vec<WorstCase> {
    let mut by_source: BTreeMap<&str, Vec<&MatchPair>> = BTreeMap::new();
    for &p in retained {
        by_source.entry(p.source.as_str()).or_default().push(p);
    }

    let mut out = Vec::new();
    for (source, mut pairs) in by_source {
        pairs.sort_by(|a, b| {
            b.distance_m
                .total_cmp(&a.distance_m)
                .then_with(|| a.entity_key.cmp(&b.entity_key))
        });
        out.extend(pairs.into_iter().take(config.worst_case_k).map(|p| WorstCase {
            source: source.to_string(),
            entity_key: p.entity_key.clone(),
            unique_id: p.unique_id.clone(),
            distance_m: p.distance_m,
            band: classify_band(p.distance_m, &config.bands),
        }));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{offset_north, Coordinate};
    use crate::model::{CanonicalKey, RawFacilityRecord};

    fn gt(building: &str, campus: &str, at: Option<Coordinate>, region: &str, status: &str) -> GroundTruthFacility {
        GroundTruthFacility {
            building_key: building.into(),
            campus_key: Some(campus.into()),
            latitude: at.map(|c| c.lat),
            longitude: at.map(|c| c.lon),
            region: Some(region.into()),
            status: Some(status.into()),
            it_load_mw: None,
        }
    }

    fn rec(source: &str, id: &str, at: Coordinate) -> FacilityRecord {
        FacilityRecord {
            raw: RawFacilityRecord {
                source: source.into(),
                source_record_id: id.into(),
                ..Default::default()
            },
            key: CanonicalKey {
                unique_id: format!("{source}_{id}"),
                campus_id: "c".into(),
                campus_name: None,
                building: None,
                unknown_id_fallback: false,
            },
            coordinate: Some(at),
        }
    }

    fn origin() -> Coordinate {
        Coordinate { lat: 41.65, lon: -93.47 }
    }

    /// F1 and F2 valid, F3 at (0, 0); source S has two records near F1 and
    /// one near F2.
    fn scenario() -> (Vec<GroundTruthFacility>, Vec<FacilityRecord>) {
        let f1 = origin();
        let f2 = offset_north(&f1, 20_000.0);
        let ground_truth = vec![
            gt("F1", "C1", Some(f1), "AMER", "Active"),
            gt("F2", "C2", Some(f2), "AMER", "Planned"),
            GroundTruthFacility {
                latitude: Some(0.0),
                longitude: Some(0.0),
                ..gt("F3", "C3", None, "EMEA", "Active")
            },
        ];
        let records = vec![
            rec("S", "a", offset_north(&f1, 300.0)),
            rec("S", "b", offset_north(&f1, 800.0)),
            rec("S", "c", offset_north(&f2, 1500.0)),
        ];
        (ground_truth, records)
    }

    #[test]
    fn null_island_excluded_and_closer_match_kept() {
        let (ground_truth, records) = scenario();
        let report = evaluate_accuracy(&ground_truth, &records, &ConsensusConfig::default());
        assert_eq!(report.ground_truth_valid, 2);
        assert_eq!(report.ground_truth_invalid, 1);

        let b = &report.building;
        assert_eq!(b.denominator, 2);
        assert_eq!(b.candidates, 3);
        assert_eq!(b.retained, 2);
        let s = &b.sources[0];
        assert_eq!(s.detected, 2);
        assert!((s.recall_pct - 100.0).abs() < 1e-9);
        let stats = s.stats.as_ref().unwrap();
        assert!((stats.min_m - 300.0).abs() < 1e-6);
        assert!((stats.max_m - 1500.0).abs() < 1e-6);
    }

    #[test]
    fn zero_matches_is_zero_recall() {
        let (ground_truth, _) = scenario();
        let far = offset_north(&origin(), 200_000.0);
        let records = vec![rec("Lonely", "1", far)];
        let report = evaluate_accuracy(&ground_truth, &records, &ConsensusConfig::default());
        let s = &report.building.sources[0];
        assert_eq!(s.source, "Lonely");
        assert_eq!(s.detected, 0);
        assert_eq!(s.recall_pct, 0.0);
        assert!(s.stats.is_none());
        assert!(s.thresholds.iter().all(|t| t.count == 0 && t.pct == 0.0));
    }

    #[test]
    fn campus_level_dedups_across_buildings() {
        let f1 = origin();
        let ground_truth = vec![
            gt("B1", "C", Some(f1), "AMER", "Active"),
            gt("B2", "C", Some(offset_north(&f1, 500.0)), "AMER", "Active"),
        ];
        let records = vec![rec("S", "1", offset_north(&f1, 450.0))];
        let report = evaluate_accuracy(&ground_truth, &records, &ConsensusConfig::default());
        assert_eq!(report.building.denominator, 2);
        assert_eq!(report.building.sources[0].detected, 2);
        assert_eq!(report.campus.denominator, 1);
        assert_eq!(report.campus.sources[0].detected, 1);
        let d = report.campus.sources[0].stats.as_ref().unwrap().min_m;
        assert!((d - 50.0).abs() < 1e-6);
    }

    #[test]
    fn breakdowns_use_group_denominators() {
        let (ground_truth, records) = scenario();
        let report = evaluate_accuracy(&ground_truth, &records, &ConsensusConfig::default());
        let regions: Vec<&str> = report.building.by_region.iter().map(|g| g.group.as_str()).collect();
        // F3 is invalid, so EMEA has no entities
        assert_eq!(regions, vec!["AMER"]);
        assert_eq!(report.building.by_region[0].denominator, 2);

        let planned = report
            .building
            .by_status
            .iter()
            .find(|g| g.group == "Planned")
            .unwrap();
        assert_eq!(planned.denominator, 1);
        assert_eq!(planned.sources[0].detected, 1);
        assert!((planned.sources[0].recall_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn worst_cases_are_capped_and_descending() {
        let (ground_truth, records) = scenario();
        let mut config = ConsensusConfig::default();
        config.accuracy.worst_case_k = 1;
        let report = evaluate_accuracy(&ground_truth, &records, &config);
        let worst = &report.building.worst_cases;
        assert_eq!(worst.len(), 1);
        assert_eq!(worst[0].entity_key, "F2");
        assert_eq!(worst[0].band, crate::model::QualityBand::Good);
    }

    #[test]
    fn capacity_and_attributes_ride_on_building_matches() {
        let (mut ground_truth, mut records) = scenario();
        ground_truth[0].it_load_mw = Some(30.0);
        records[0].raw.set("mw_2023", crate::model::FieldValue::Number(33.0));
        // farther record at F1 is not the retained match
        records[1].raw.set("mw_2023", crate::model::FieldValue::Number(90.0));

        let report = evaluate_accuracy(&ground_truth, &records, &ConsensusConfig::default());
        let building: Vec<_> = report
            .capacity
            .rows
            .iter()
            .filter(|r| r.granularity == Granularity::Building)
            .collect();
        assert_eq!(building.len(), 1);
        assert_eq!(building[0].field, "mw_2023");
        assert_eq!(building[0].metrics.n, 1);
        assert_eq!(building[0].metrics.predicted_mean_mw, Some(33.0));
        // default min_samples is 5
        assert!(building[0].metrics.mape_pct.is_none());

        let s = &report.attributes.sources[0];
        assert_eq!(s.records, 3);
        let mw = s.fields.iter().find(|f| f.field == "mw_2023").unwrap();
        assert_eq!(mw.filled, 2);
        assert!(report.ground_truth_field_errors.is_empty());
    }

    #[test]
    fn region_mode_breaks_ties_lexicographically() {
        let f = origin();
        let rows = vec![
            gt("B1", "C", Some(f), "EMEA", "Active"),
            gt("B2", "C", Some(f), "AMER", "Active"),
        ];
        let valid: Vec<&GroundTruthFacility> = rows.iter().collect();
        let modes = group_modes(&valid, Granularity::Campus, |g| g.region.as_deref());
        assert_eq!(modes["C"], "AMER");
    }
}
