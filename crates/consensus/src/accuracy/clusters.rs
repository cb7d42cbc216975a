use std::collections::{BTreeMap, BTreeSet};

use log::info;

use crate::config::AccuracyConfig;
use crate::geo::{centroid, distance_m, Coordinate};
use crate::model::{
    ClusterMatch, ClusterSummary, ClusterValidation, GroundTruthFacility, UndetectedCampus, UnmatchedCluster,
};

use super::stats::classify_band;

struct GroundTruthCampus<'a> {
    key: &'a str,
    center: Coordinate,
    buildings: usize,
    statuses: BTreeSet<&'a str>,
}

fn campuses(ground_truth: &[GroundTruthFacility]) -> Vec<GroundTruthCampus<'_>> {
    let mut grouped: BTreeMap<&str, Vec<&GroundTruthFacility>> = BTreeMap::new();
    for g in ground_truth.iter().filter(|g| g.is_valid()) {
        grouped.entry(g.campus()).or_default().push(g);
    }
    grouped
        .into_iter()
        .filter_map(|(key, rows)| {
            let points: Vec<Coordinate> = rows.iter().filter_map(|g| g.coordinate()).collect();
            Some(GroundTruthCampus {
                key,
                center: centroid(&points)?,
                buildings: rows.len(),
                statuses: rows.iter().filter_map(|g| g.status.as_deref()).collect(),
            })
        })
        .collect()
}

/// Match each located cluster centroid to the nearest ground-truth campus
/// centroid within `cluster_match_radius_m`.
pub fn validate_clusters(
    clusters: &[ClusterSummary],
    ground_truth: &[GroundTruthFacility],
    config: &AccuracyConfig,
) -> ClusterValidation {
    let gt = campuses(ground_truth);
    let mut detected: BTreeSet<&str> = BTreeSet::new();
    let mut matched = Vec::new();
    let mut unmatched = Vec::new();
    let mut checked = 0;

    for cluster in clusters {
        let Some(center) = cluster.centroid else {
            continue;
        };
        checked += 1;

        let nearest = gt
            .iter()
            .map(|c| (c, distance_m(&center, &c.center)))
            .min_by(|(a, da), (b, db)| da.total_cmp(db).then_with(|| a.key.cmp(b.key)));

        match nearest {
            Some((campus, d)) if d <= config.cluster_match_radius_m => {
                detected.insert(campus.key);
                matched.push(ClusterMatch {
                    cluster_id: cluster.cluster_id,
                    display_name: cluster.display_name.clone(),
                    source_count: cluster.source_count,
                    sources: cluster.sources.clone(),
                    campus_key: campus.key.to_string(),
                    campus_buildings: campus.buildings,
                    distance_m: d,
                    band: classify_band(d, &config.bands),
                });
            }
            _ => unmatched.push(UnmatchedCluster {
                cluster_id: cluster.cluster_id,
                display_name: cluster.display_name.clone(),
                source_count: cluster.source_count,
                sources: cluster.sources.clone(),
                likely_false_positive: cluster.source_count == 1,
            }),
        }
    }

    let undetected: Vec<UndetectedCampus> = gt
        .iter()
        .filter(|c| !detected.contains(c.key))
        .map(|c| UndetectedCampus {
            campus_key: c.key.to_string(),
            building_count: c.buildings,
            statuses: c.statuses.iter().map(|s| s.to_string()).collect(),
        })
        .collect();

    info!(
        "cluster validation: {} of {checked} clusters matched, {} of {} campuses detected",
        matched.len(),
        detected.len(),
        gt.len()
    );

    ClusterValidation {
        clusters_checked: checked,
        campuses_total: gt.len(),
        campuses_detected: detected.len(),
        matched,
        unmatched,
        undetected,
    }
}
