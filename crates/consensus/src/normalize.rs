use std::collections::BTreeMap;

use log::{debug, warn};

use crate::config::ConsensusConfig;
use crate::error::ConsensusError;
use crate::geo::Coordinate;
use crate::identity::{build_campus_id, build_unique_id, normalize_country, normalize_region, parse_campus_name_with};
use crate::model::{CanonicalKey, FacilityRecord, RawFacilityRecord};

/// Compute canonical keys for every record.
///
/// Fails on a blank source record id, or when two records share a unique_id
/// (every offending key is reported, nothing is overwritten).
pub fn normalize_records(
    records: &[RawFacilityRecord],
    config: &ConsensusConfig,
) -> Result<Vec<FacilityRecord>, ConsensusError> {
    let mut out = Vec::with_capacity(records.len());
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();

    for (position, raw) in records.iter().enumerate() {
        let tag = config.sources.tag(&raw.source);
        let unique_id = build_unique_id(&tag, &raw.source_record_id).ok_or_else(|| {
            ConsensusError::MissingRecordId {
                source: raw.source.clone(),
                line: raw.line.unwrap_or(position + 1),
            }
        })?;
        *seen.entry(unique_id.clone()).or_insert(0) += 1;

        let mut raw = raw.clone();
        raw.country = normalize_country(raw.country.as_deref(), &config.regions);
        raw.region = normalize_region(raw.region.as_deref(), raw.country.as_deref(), &config.regions);

        let parsed = parse_campus_name_with(raw.campus_name_raw.as_deref(), &config.naming.rules);
        let campus = build_campus_id(
            raw.company.as_deref(),
            raw.city.as_deref(),
            parsed.campus.as_deref(),
            raw.latitude,
            raw.longitude,
        );
        if campus.unknown_fallback {
            warn!("{unique_id}: campus_id fell back to '{}'", campus.id);
        }

        let coordinate = Coordinate::from_parts(raw.latitude, raw.longitude);
        if coordinate.is_none() {
            debug!("{unique_id}: no usable coordinate, will be unlocated");
        }

        out.push(FacilityRecord {
            key: CanonicalKey {
                unique_id,
                campus_id: campus.id,
                campus_name: parsed.campus,
                building: parsed.building,
                unknown_id_fallback: campus.unknown_fallback,
            },
            coordinate,
            raw,
        });
    }

    let duplicates: Vec<String> = seen
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(id, _)| id)
        .collect();
    if !duplicates.is_empty() {
        return Err(ConsensusError::DuplicateUniqueIds(duplicates));
    }

    Ok(out)
}
