use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};

use crate::config::ConsensusConfig;
use crate::disjoint_set::DisjointSet;
use crate::error::ConsensusError;
use crate::geo::{centroid, distance_m, span_m, Coordinate};
use crate::model::{Cluster, ClusterSummary, FacilityRecord};

/// Partition `records` into facility clusters.
///
/// Located records are unioned whenever two of them are within
/// `clustering.threshold_m`; the result is the transitive closure, so a
/// cluster can be wider than the threshold (flagged `chained`). Unlocated
/// records become singleton clusters after the located ones.
pub fn cluster_records(
    records: &[FacilityRecord],
    config: &ConsensusConfig,
) -> Result<Vec<Cluster>, ConsensusError> {
    let threshold = config.clustering.threshold_m;

    let located: Vec<(usize, Coordinate)> = records
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.coordinate.map(|c| (i, c)))
        .collect();

    let limit = config.clustering.max_records;
    if located.len() > limit {
        return Err(ConsensusError::InputTooLarge {
            records: located.len(),
            limit,
        });
    }

    let mut ds = DisjointSet::new(located.len());
    for (a, (_, pa)) in located.iter().enumerate() {
        for (b, (_, pb)) in located.iter().enumerate().skip(a + 1) {
            if distance_m(pa, pb) <= threshold {
                ds.union(a, b);
            }
        }
    }

    let mut groups: Vec<Vec<usize>> = ds
        .groups()
        .into_iter()
        .map(|g| g.into_iter().map(|slot| located[slot].0).collect())
        .collect();
    // Stable ids: order by the smallest unique_id in each group
    for g in &mut groups {
        g.sort_by(|a, b| records[*a].unique_id().cmp(records[*b].unique_id()));
    }
    groups.sort_by(|a, b| records[a[0]].unique_id().cmp(records[b[0]].unique_id()));

    let mut unlocated: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.coordinate.is_none())
        .map(|(i, _)| i)
        .collect();
    unlocated.sort_by(|a, b| records[*a].unique_id().cmp(records[*b].unique_id()));

    let mut clusters = Vec::with_capacity(groups.len() + unlocated.len());
    for members in groups {
        let id = clusters.len() + 1;
        let points: Vec<Coordinate> = members.iter().filter_map(|i| records[*i].coordinate).collect();
        let span = span_m(&points);
        let chained = span > threshold;
        if chained {
            warn!(
                "cluster {id}: {} members span {span:.0} m, beyond the {threshold} m threshold",
                members.len()
            );
        }
        clusters.push(Cluster {
            id,
            display_name: display_name(id, &members, records, config),
            centroid: centroid(&points),
            span_m: Some(span),
            chained,
            located: true,
            members,
        });
    }
    let located_clusters = clusters.len();

    for idx in unlocated {
        let id = clusters.len() + 1;
        let members = vec![idx];
        clusters.push(Cluster {
            id,
            display_name: display_name(id, &members, records, config),
            centroid: None,
            span_m: None,
            chained: false,
            located: false,
            members,
        });
    }

    info!(
        "clustered {} located records into {located_clusters} clusters ({} unlocated singletons)",
        located.len(),
        clusters.len() - located_clusters
    );
    Ok(clusters)
}

/// Most frequent parsed campus name; ties go to the name carried by the
/// highest-priority source, then lexicographic order. Falls back to
/// `Cluster_{id}` when no member has a name.
pub fn display_name(
    id: usize,
    members: &[usize],
    records: &[FacilityRecord],
    config: &ConsensusConfig,
) -> String {
    // name → (count, best priority)
    let mut tally: BTreeMap<&str, (usize, u32)> = BTreeMap::new();
    for &i in members {
        let rec = &records[i];
        let Some(name) = rec.key.campus_name.as_deref() else {
            continue;
        };
        let priority = config.sources.priority(rec.source());
        let entry = tally.entry(name).or_insert((0, u32::MAX));
        entry.0 += 1;
        entry.1 = entry.1.min(priority);
    }

    let best = tally
        .into_iter()
        .min_by(|(na, (ca, pa)), (nb, (cb, pb))| cb.cmp(ca).then(pa.cmp(pb)).then(na.cmp(nb)));
    match best {
        Some((name, _)) => name.to_string(),
        None => {
            debug!("cluster {id}: no campus name among members");
            format!("Cluster_{id}")
        }
    }
}

pub fn summarize_cluster(cluster: &Cluster, records: &[FacilityRecord]) -> ClusterSummary {
    let sources: BTreeSet<&str> = cluster.members.iter().map(|i| records[*i].source()).collect();
    ClusterSummary {
        cluster_id: cluster.id,
        display_name: cluster.display_name.clone(),
        located: cluster.located,
        record_count: cluster.members.len(),
        source_count: sources.len(),
        sources: sources.into_iter().map(String::from).collect(),
        member_ids: cluster
            .members
            .iter()
            .map(|i| records[*i].unique_id().to_string())
            .collect(),
        centroid: cluster.centroid,
        span_m: cluster.span_m,
        chained: cluster.chained,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::offset_north;
    use crate::model::{CanonicalKey, RawFacilityRecord};

    fn rec(source: &str, id: &str, name: Option<&str>, at: Option<Coordinate>) -> FacilityRecord {
        FacilityRecord {
            raw: RawFacilityRecord {
                source: source.into(),
                source_record_id: id.into(),
                latitude: at.map(|c| c.lat),
                longitude: at.map(|c| c.lon),
                ..Default::default()
            },
            key: CanonicalKey {
                unique_id: format!("{}_{id}", source.to_lowercase()),
                campus_id: "x|y|z".into(),
                campus_name: name.map(String::from),
                building: None,
                unknown_id_fallback: false,
            },
            coordinate: at,
        }
    }

    fn origin() -> Coordinate {
        Coordinate { lat: 41.65, lon: -93.47 }
    }

    fn config(threshold_m: f64) -> ConsensusConfig {
        let mut c = ConsensusConfig::default();
        c.clustering.threshold_m = threshold_m;
        c
    }

    #[test]
    fn chaining_joins_through_intermediary() {
        let a = origin();
        let records = vec![
            rec("A", "1", None, Some(a)),
            rec("B", "2", None, Some(offset_north(&a, 400.0))),
            rec("C", "3", None, Some(offset_north(&a, 800.0))),
        ];
        let clusters = cluster_records(&records, &config(500.0)).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 3);
        assert!(clusters[0].chained);
        assert!((clusters[0].span_m.unwrap() - 800.0).abs() < 1e-6);
    }

    #[test]
    fn far_records_stay_apart() {
        let a = origin();
        let records = vec![
            rec("A", "1", None, Some(a)),
            rec("B", "2", None, Some(offset_north(&a, 1500.0))),
        ];
        let clusters = cluster_records(&records, &config(1000.0)).unwrap();
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| !c.chained));
    }

    #[test]
    fn threshold_is_inclusive() {
        let a = origin();
        let b = offset_north(&a, 250.0);
        let d = distance_m(&a, &b);
        let records = vec![rec("A", "1", None, Some(a)), rec("B", "2", None, Some(b))];
        assert_eq!(cluster_records(&records, &config(d)).unwrap().len(), 1);
    }

    #[test]
    fn unlocated_records_become_singletons_after_located() {
        let a = origin();
        let records = vec![
            rec("Z", "9", Some("Nowhere"), None),
            rec("A", "1", None, Some(a)),
            rec("B", "2", None, Some(offset_north(&a, 50.0))),
            rec("Y", "8", None, None),
        ];
        let clusters = cluster_records(&records, &config(1000.0)).unwrap();
        assert_eq!(clusters.len(), 3);
        assert!(clusters[0].located);
        assert_eq!(clusters[0].members, vec![1, 2]);
        assert_eq!(clusters[1].members, vec![3]);
        assert_eq!(clusters[2].members, vec![0]);
        assert!(!clusters[1].located && clusters[1].centroid.is_none());
        assert_eq!(clusters[2].display_name, "Nowhere");
        assert_eq!(clusters[1].display_name, "Cluster_2");
        let ids: Vec<usize> = clusters.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn every_record_in_exactly_one_cluster() {
        let a = origin();
        let records: Vec<FacilityRecord> = (0..12)
            .map(|i| {
                let at = if i % 5 == 0 { None } else { Some(offset_north(&a, 700.0 * i as f64)) };
                rec("S", &i.to_string(), None, at)
            })
            .collect();
        let clusters = cluster_records(&records, &config(1000.0)).unwrap();
        let mut seen: Vec<usize> = clusters.iter().flat_map(|c| c.members.clone()).collect();
        seen.sort();
        assert_eq!(seen, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn display_name_majority_then_priority() {
        let a = origin();
        let records = vec![
            rec("WoodMac", "1", Some("Altoona"), Some(a)),
            rec("Synergy", "2", Some("Altoona"), Some(a)),
            rec("DataCenterMap", "3", Some("Meta Altoona"), Some(a)),
        ];
        let clusters = cluster_records(&records, &config(1000.0)).unwrap();
        assert_eq!(clusters[0].display_name, "Altoona");

        // One vote each: DataCenterMap has the best priority
        let records = vec![
            rec("WoodMac", "1", Some("Altoona"), Some(a)),
            rec("DataCenterMap", "3", Some("Meta Altoona"), Some(a)),
        ];
        let clusters = cluster_records(&records, &config(1000.0)).unwrap();
        assert_eq!(clusters[0].display_name, "Meta Altoona");
    }

    #[test]
    fn centroid_is_mean_of_members() {
        let a = origin();
        let b = offset_north(&a, 200.0);
        let records = vec![rec("A", "1", None, Some(a)), rec("B", "2", None, Some(b))];
        let clusters = cluster_records(&records, &config(1000.0)).unwrap();
        let c = clusters[0].centroid.unwrap();
        assert!((c.lat - (a.lat + b.lat) / 2.0).abs() < 1e-12);
        assert_eq!(c.lon, a.lon);
    }

    #[test]
    fn fails_fast_above_max_records() {
        let a = origin();
        let records: Vec<FacilityRecord> =
            (0..4).map(|i| rec("S", &i.to_string(), None, Some(a))).collect();
        let mut cfg = config(1000.0);
        cfg.clustering.max_records = 3;
        let err = cluster_records(&records, &cfg).unwrap_err();
        assert!(matches!(err, ConsensusError::InputTooLarge { records: 4, limit: 3 }));
    }

    #[test]
    fn summary_lists_sources() {
        let a = origin();
        let records = vec![
            rec("B", "2", None, Some(a)),
            rec("A", "1", None, Some(a)),
            rec("A", "3", None, Some(a)),
        ];
        let clusters = cluster_records(&records, &config(1000.0)).unwrap();
        let s = summarize_cluster(&clusters[0], &records);
        assert_eq!(s.record_count, 3);
        assert_eq!(s.source_count, 2);
        assert_eq!(s.sources, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(s.member_ids, vec!["a_1", "a_3", "b_2"]);
    }
}
