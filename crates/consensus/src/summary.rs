use std::collections::{BTreeMap, BTreeSet};

use crate::model::{CampusRecord, Cluster, ConsensusRecord, ConsensusSummary, FacilityRecord, FieldErrors};

/// Compute run totals from the pipeline's intermediate and final outputs.
pub fn compute_summary(
    records: &[FacilityRecord],
    clusters: &[Cluster],
    buildings: &[ConsensusRecord],
    campuses: &[CampusRecord],
    field_errors: &FieldErrors,
) -> ConsensusSummary {
    let located = records.iter().filter(|r| r.coordinate.is_some()).count();

    let multi_source = clusters
        .iter()
        .filter(|c| {
            let sources: BTreeSet<&str> = c.members.iter().map(|i| records[*i].source()).collect();
            sources.len() > 1
        })
        .count();

    let mut winning_sources: BTreeMap<String, usize> = BTreeMap::new();
    for b in buildings {
        *winning_sources.entry(b.source.clone()).or_insert(0) += 1;
    }

    ConsensusSummary {
        total_records: records.len(),
        located_records: located,
        unlocated_records: records.len() - located,
        clusters: clusters.len(),
        multi_source_clusters: multi_source,
        chained_clusters: clusters.iter().filter(|c| c.chained).count(),
        merged_records: buildings.iter().filter(|b| !b.merged_from.is_empty()).count(),
        campuses: campuses.len(),
        unknown_id_fallbacks: records.iter().filter(|r| r.key.unknown_id_fallback).count(),
        field_errors: field_errors.clone(),
        winning_sources,
    }
}
