use std::cmp::Ordering;
use std::collections::BTreeSet;

use log::debug;

use crate::config::ConsensusConfig;
use crate::model::{Cluster, ConsensusRecord, FacilityRecord, MergeProvenance, RawFacilityRecord};
use crate::score::{score_record, RecordScore};

/// A cluster's members ranked for merging.
#[derive(Debug, Clone)]
pub struct Ranking {
    pub primary: usize,
    pub primary_score: RecordScore,
    /// Weight descending, then source name, then unique_id.
    pub secondaries: Vec<usize>,
}

/// Pick the primary (highest score; ties by source name then unique_id) and
/// order the rest for gap filling.
pub fn rank_members(members: &[usize], records: &[FacilityRecord], config: &ConsensusConfig) -> Ranking {
    let mut scored: Vec<(usize, RecordScore)> = members
        .iter()
        .map(|&i| (i, score_record(&records[i].raw, config)))
        .collect();

    scored.sort_by(|(a, sa), (b, sb)| {
        sb.score
            .partial_cmp(&sa.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| records[*a].source().cmp(records[*b].source()))
            .then_with(|| records[*a].unique_id().cmp(records[*b].unique_id()))
    });

    let (primary, primary_score) = scored[0];
    let mut secondaries: Vec<(usize, f64)> = scored[1..]
        .iter()
        .map(|(i, s)| (*i, s.source_weight))
        .collect();
    secondaries.sort_by(|(a, wa), (b, wb)| {
        wb.partial_cmp(wa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| records[*a].source().cmp(records[*b].source()))
            .then_with(|| records[*a].unique_id().cmp(records[*b].unique_id()))
    });

    Ranking {
        primary,
        primary_score,
        secondaries: secondaries.into_iter().map(|(i, _)| i).collect(),
    }
}

/// Fill the primary's empty fields from secondaries, scanning them in order.
/// A filled primary value is never touched.
pub fn merge_fields(
    primary: &RawFacilityRecord,
    secondaries: &[&FacilityRecord],
    fields: &[String],
) -> (RawFacilityRecord, Vec<MergeProvenance>) {
    let mut merged = primary.clone();
    let mut provenance = Vec::new();

    for field in fields {
        if merged.is_filled(field) {
            continue;
        }
        let donor = secondaries
            .iter()
            .find_map(|s| s.raw.get(field).map(|v| (*s, v)));
        if let Some((donor, value)) = donor {
            merged.set(field, value);
            provenance.push(MergeProvenance {
                field: field.clone(),
                source: donor.source().to_string(),
                unique_id: donor.unique_id().to_string(),
            });
        }
    }

    (merged, provenance)
}

/// Building-level consensus record for one cluster.
pub fn build_consensus(cluster: &Cluster, records: &[FacilityRecord], config: &ConsensusConfig) -> ConsensusRecord {
    let ranking = rank_members(&cluster.members, records, config);
    let primary = &records[ranking.primary];
    let secondaries: Vec<&FacilityRecord> = ranking.secondaries.iter().map(|i| &records[*i]).collect();

    let (merged, merged_from) = merge_fields(&primary.raw, &secondaries, &config.merge.fields);
    if !merged_from.is_empty() {
        debug!(
            "cluster {}: primary {} filled {} field(s) from secondaries",
            cluster.id,
            primary.unique_id(),
            merged_from.len()
        );
    }

    let sources: BTreeSet<&str> = cluster.members.iter().map(|i| records[*i].source()).collect();

    ConsensusRecord {
        cluster_id: cluster.id,
        unique_id: primary.key.unique_id.clone(),
        source: merged.source.clone(),
        campus_id: primary.key.campus_id.clone(),
        display_name: cluster.display_name.clone(),
        campus_name: primary.key.campus_name.clone(),
        building: primary.key.building.clone(),
        company: merged.company,
        city: merged.city,
        country: merged.country,
        region: merged.region,
        status: merged.status,
        latitude: primary.coordinate.map(|c| c.lat),
        longitude: primary.coordinate.map(|c| c.lon),
        attributes: merged.attributes,
        consensus_score: ranking.primary_score.score,
        source_count: sources.len(),
        sources_available: sources.into_iter().map(String::from).collect(),
        merged_from,
        member_ids: cluster
            .members
            .iter()
            .map(|i| records[*i].unique_id().to_string())
            .collect(),
        located: cluster.located,
        unknown_id_fallback: primary.key.unknown_id_fallback,
    }
}
