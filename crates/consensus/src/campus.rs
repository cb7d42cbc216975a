//! Campus-level rollup of building consensus records.

use std::collections::{BTreeMap, BTreeSet};

use log::info;

use crate::config::CampusConfig;
use crate::geo::{centroid, Coordinate};
use crate::model::{CampusRecord, ConsensusRecord, FieldValue};

/// Group buildings by `campus_id`. The first building (lowest cluster id)
/// supplies descriptive attributes. Additive fields are summed over the
/// buildings that report them; a zero total is null only for the
/// `null_when_zero` fields.
pub fn rollup_campuses(buildings: &[ConsensusRecord], config: &CampusConfig) -> Vec<CampusRecord> {
    let mut groups: BTreeMap<&str, Vec<&ConsensusRecord>> = BTreeMap::new();
    for b in buildings {
        groups.entry(b.campus_id.as_str()).or_default().push(b);
    }

    let campuses: Vec<CampusRecord> = groups
        .into_iter()
        .map(|(campus_id, mut members)| {
            members.sort_by_key(|b| b.cluster_id);
            rollup_one(campus_id, &members, config)
        })
        .collect();

    info!(
        "rolled {} building records into {} campuses",
        buildings.len(),
        campuses.len()
    );
    campuses
}

fn rollup_one(campus_id: &str, members: &[&ConsensusRecord], config: &CampusConfig) -> CampusRecord {
    let first = members[0];

    let mut attributes = first.attributes.clone();
    for field in &config.additive_fields {
        let values: Vec<f64> = members
            .iter()
            .filter_map(|b| b.attributes.get(field).and_then(FieldValue::as_number))
            .collect();
        let total: f64 = values.iter().sum();
        let keep = !values.is_empty() && (total != 0.0 || !config.null_when_zero.contains(field));
        if keep {
            attributes.insert(field.clone(), FieldValue::Number(total));
        } else {
            attributes.remove(field);
        }
    }

    let points: Vec<Coordinate> = members.iter().filter_map(|b| b.coordinate()).collect();
    let center = centroid(&points);

    let sources: BTreeSet<&str> = members
        .iter()
        .flat_map(|b| b.sources_available.iter().map(String::as_str))
        .collect();

    let score = members.iter().map(|b| b.consensus_score).sum::<f64>() / members.len() as f64;

    CampusRecord {
        campus_id: campus_id.to_string(),
        display_name: first.campus_name.clone().unwrap_or_else(|| first.display_name.clone()),
        campus_name: first.campus_name.clone(),
        company: first.company.clone(),
        city: first.city.clone(),
        country: first.country.clone(),
        region: first.region.clone(),
        status: first.status.clone(),
        latitude: center.map(|c| c.lat),
        longitude: center.map(|c| c.lon),
        attributes,
        building_count: members.len(),
        building_ids: members.iter().map(|b| b.unique_id.clone()).collect(),
        source_count: sources.len(),
        sources_available: sources.into_iter().map(String::from).collect(),
        consensus_score: score,
        unknown_id_fallback: members.iter().any(|b| b.unknown_id_fallback),
    }
}
