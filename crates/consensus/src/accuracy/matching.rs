use std::collections::BTreeMap;

use crate::geo::{distance_m, Coordinate};
use crate::model::{FacilityRecord, MatchPair};

/// A ground-truth point paired with its entity key at some granularity.
#[derive(Debug, Clone)]
pub struct Entity<'a> {
    pub key: &'a str,
    pub at: Coordinate,
}

/// Every (entity, located record) pair within `radius_m`, one-to-many.
pub fn candidate_pairs(entities: &[Entity<'_>], records: &[FacilityRecord], radius_m: f64) -> Vec<MatchPair> {
    let mut pairs = Vec::new();
    for entity in entities {
        for rec in records {
            let Some(at) = rec.coordinate else {
                continue;
            };
            let d = distance_m(&entity.at, &at);
            if d <= radius_m {
                pairs.push(MatchPair {
                    source: rec.source().to_string(),
                    entity_key: entity.key.to_string(),
                    unique_id: rec.unique_id().to_string(),
                    distance_m: d,
                    retained: false,
                });
            }
        }
    }
    pairs
}

/// Reduce one-to-many candidates to the single nearest pair per
/// (entity, source). Ties go to the smaller unique_id. The returned list
/// holds every candidate, ordered by source, entity, then distance, with
/// exactly one `retained` pair per (entity, source).
pub fn nearest_per_entity(mut pairs: Vec<MatchPair>) -> Vec<MatchPair> {
    pairs.sort_by(|a, b| {
        a.source
            .cmp(&b.source)
            .then_with(|| a.entity_key.cmp(&b.entity_key))
            .then_with(|| a.distance_m.total_cmp(&b.distance_m))
            .then_with(|| a.unique_id.cmp(&b.unique_id))
    });

    let mut previous: Option<(String, String)> = None;
    for pair in &mut pairs {
        let key = (pair.source.clone(), pair.entity_key.clone());
        pair.retained = previous.as_ref() != Some(&key);
        previous = Some(key);
    }
    pairs
}

/// Retained distances grouped by source.
pub fn retained_by_source(pairs: &[MatchPair]) -> BTreeMap<&str, Vec<&MatchPair>> {
    let mut out: BTreeMap<&str, Vec<&MatchPair>> = BTreeMap::new();
    for p in pairs.iter().filter(|p| p.retained) {
        out.entry(p.source.as_str()).or_default().push(p);
    }
    out
}
