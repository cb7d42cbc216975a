//! CSV feeds into the canonical record shape.
//!
//! Loading is fail-soft per cell: malformed numbers, dates and coordinates
//! become null and are counted in [`FieldErrors`]. Structural problems
//! (unreadable CSV, missing key columns) are errors.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use log::{debug, warn};

use crate::config::ColumnConfig;
use crate::error::ConsensusError;
use crate::geo::in_range;
use crate::model::{ConsensusInput, FieldErrors, FieldValue, GroundTruthFacility, GroundTruthInput, RawFacilityRecord};
use crate::resolve::FieldResolver;

/// Canonical attributes that map onto named record fields rather than the
/// attribute map.
const DESCRIPTIVE: [(&str, &str); 7] = [
    ("company", "company"),
    ("city", "city"),
    ("country", "country"),
    ("region", "region"),
    ("campus_name", "campus_name_raw"),
    ("status", "status"),
    ("building_key", "building_key"),
];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d-%b-%Y"];

pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',' && *c != '_').collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Accepts ISO dates, US `m/d/Y`, and timestamps whose date part is ISO.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.split(['T', ' ']).next().unwrap_or(raw);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

fn read_headers(reader: &mut csv::Reader<&[u8]>) -> Result<Vec<String>, ConsensusError> {
    Ok(reader.headers()?.iter().map(|h| h.to_string()).collect())
}

/// Parse a coordinate part; malformed or out-of-range values are counted.
fn coordinate_part(
    resolver: &FieldResolver,
    row: &csv::StringRecord,
    field: &str,
    errors: &mut FieldErrors,
) -> Option<f64> {
    let raw = resolver.get(row, field)?;
    let value = match parse_number(raw) {
        Some(v) => v,
        None => {
            errors.record(field);
            return None;
        }
    };
    let ok = match field {
        "latitude" => in_range(value, 0.0),
        _ => in_range(0.0, value),
    };
    if ok {
        Some(value)
    } else {
        errors.record(field);
        None
    }
}

/// Load the normalized facility feed.
pub fn load_records(csv_data: &str, columns: &ColumnConfig) -> Result<ConsensusInput, ConsensusError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());
    let headers = read_headers(&mut reader)?;
    let resolver = FieldResolver::new(&headers, &columns.aliases);

    let source_idx = resolver.require("source", "records")?;
    let id_idx = resolver.require("source_record_id", "records")?;

    // Columns consumed by named fields; everything else is an attribute.
    let mut consumed: BTreeSet<usize> = [source_idx, id_idx].into_iter().collect();
    for canonical in ["latitude", "longitude"].into_iter().chain(DESCRIPTIVE.iter().map(|(c, _)| *c)) {
        if let Some(i) = resolver.index(canonical) {
            consumed.insert(i);
        }
    }
    let attribute_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, h)| !consumed.contains(i) && !h.trim().is_empty())
        .map(|(i, h)| (i, canonical_attribute(h, columns)))
        .collect();

    let mut input = ConsensusInput::default();
    for (row_no, row) in reader.records().enumerate() {
        let row = row?;
        let line = row.position().map_or(row_no + 2, |p| p.line() as usize);
        let Some(source) = resolver.get(&row, "source") else {
            warn!("records line {line}: blank source, skipped");
            input.field_errors.record("source");
            continue;
        };

        let mut rec = RawFacilityRecord {
            source: source.to_string(),
            source_record_id: row.get(id_idx).unwrap_or("").trim().to_string(),
            latitude: coordinate_part(&resolver, &row, "latitude", &mut input.field_errors),
            longitude: coordinate_part(&resolver, &row, "longitude", &mut input.field_errors),
            line: Some(line),
            ..Default::default()
        };
        for (canonical, field) in DESCRIPTIVE {
            if let Some(v) = resolver.get(&row, canonical) {
                rec.set(field, FieldValue::Text(v.to_string()));
            }
        }
        for (i, name) in &attribute_columns {
            let Some(cell) = row.get(*i).map(str::trim).filter(|c| !c.is_empty()) else {
                continue;
            };
            if let Some(value) = coerce(name, cell, columns, &mut input.field_errors) {
                rec.attributes.insert(name.clone(), value);
            }
        }
        input.records.push(rec);
    }

    debug!(
        "loaded {} records ({} attribute columns, {} field errors)",
        input.records.len(),
        attribute_columns.len(),
        input.field_errors.total()
    );
    Ok(input)
}

/// Configured numeric/date field names are matched case-insensitively; other
/// headers are kept as written.
fn canonical_attribute(header: &str, columns: &ColumnConfig) -> String {
    let h = header.trim();
    columns
        .numeric_fields
        .iter()
        .chain(&columns.date_fields)
        .find(|f| f.eq_ignore_ascii_case(h))
        .cloned()
        .unwrap_or_else(|| h.to_string())
}

fn coerce(name: &str, cell: &str, columns: &ColumnConfig, errors: &mut FieldErrors) -> Option<FieldValue> {
    if columns.is_numeric(name) {
        let parsed = parse_number(cell).map(FieldValue::Number);
        if parsed.is_none() {
            errors.record(name);
        }
        return parsed;
    }
    if columns.is_date(name) {
        let parsed = parse_date(cell).map(FieldValue::Date);
        if parsed.is_none() {
            errors.record(name);
        }
        return parsed;
    }
    Some(FieldValue::Text(cell.to_string()))
}

/// Load the ground-truth feed. Rows without a building key are skipped and
/// counted; invalid coordinates and IT loads are kept (as null) so the
/// validity filter can report them.
pub fn load_ground_truth(
    csv_data: &str,
    columns: &ColumnConfig,
) -> Result<GroundTruthInput, ConsensusError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());
    let headers = read_headers(&mut reader)?;
    let resolver = FieldResolver::new(&headers, &columns.aliases);
    resolver.require("building_key", "ground_truth")?;

    let mut errors = FieldErrors::default();
    let mut facilities = Vec::new();
    for row in reader.records() {
        let row = row?;
        let Some(building_key) = resolver.get(&row, "building_key") else {
            errors.record("building_key");
            continue;
        };
        facilities.push(GroundTruthFacility {
            building_key: building_key.to_string(),
            campus_key: resolver.get(&row, "campus_key").map(String::from),
            latitude: coordinate_part(&resolver, &row, "latitude", &mut errors),
            longitude: coordinate_part(&resolver, &row, "longitude", &mut errors),
            region: resolver.get(&row, "region").map(String::from),
            status: resolver.get(&row, "status").map(String::from),
            it_load_mw: resolver.get(&row, "it_load_mw").and_then(|raw| {
                let parsed = parse_number(raw);
                if parsed.is_none() {
                    errors.record("it_load_mw");
                }
                parsed
            }),
        });
    }

    debug!("loaded {} ground-truth rows ({} field errors)", facilities.len(), errors.total());
    Ok(GroundTruthInput { facilities, field_errors: errors })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = "\
source_name,source_unique_id,company_clean,city,country,latitude,longitude,campus_name,full_capacity_mw,cod,Notes
DataCenterMap,8f2a-11,Meta,Altoona,USA,41.6501,-93.4702,Meta Altoona - Building 2,\"1,200\",2021-06-30,
WoodMac,77,Meta,Altoona,USA,abc,-93.4702,,n/a,06/30/2021,phase 2
Synergy,9,,,,95.0,10.0,,,,
,10,,,,,,,,,
";

    #[test]
    fn maps_aliases_and_coerces() {
        let input = load_records(FEED, &ColumnConfig::default()).unwrap();
        assert_eq!(input.records.len(), 3);

        let dcm = &input.records[0];
        assert_eq!(dcm.source, "DataCenterMap");
        assert_eq!(dcm.source_record_id, "8f2a-11");
        assert_eq!(dcm.company.as_deref(), Some("Meta"));
        assert_eq!(dcm.campus_name_raw.as_deref(), Some("Meta Altoona - Building 2"));
        assert_eq!(dcm.latitude, Some(41.6501));
        assert_eq!(dcm.attributes["full_capacity_mw"], FieldValue::Number(1200.0));
        assert_eq!(
            dcm.attributes["cod"],
            FieldValue::Date(NaiveDate::from_ymd_opt(2021, 6, 30).unwrap())
        );
        assert!(!dcm.attributes.contains_key("Notes"));

        let wm = &input.records[1];
        assert_eq!(wm.latitude, None);
        assert!(!wm.attributes.contains_key("full_capacity_mw"));
        assert!(wm.attributes.contains_key("cod"));
        assert_eq!(wm.attributes["Notes"], FieldValue::Text("phase 2".into()));
    }

    #[test]
    fn counts_field_errors() {
        let input = load_records(FEED, &ColumnConfig::default()).unwrap();
        let errs = &input.field_errors;
        assert_eq!(errs.get("latitude"), 2); // "abc" and 95.0
        assert_eq!(errs.get("full_capacity_mw"), 1);
        assert_eq!(errs.get("source"), 1);
        assert_eq!(errs.get("cod"), 0);
    }

    #[test]
    fn missing_key_column_is_an_error() {
        let err = load_records("company,city\nMeta,Altoona\n", &ColumnConfig::default()).unwrap_err();
        assert!(matches!(err, ConsensusError::MissingColumn { ref column, .. } if column == "source"));
    }

    #[test]
    fn ground_truth_rows() {
        let csv = "\
canonical_datacenter,canonical_location_key,lat,lon,region_derived,new_build_status,it_load_total
ALT-1,ALT,41.65,-93.47,AMER,Active,\"1,150\"
ALT-2,ALT,0,0,AMER,Planned,tbd
,ALT,41.6,-93.4,AMER,Active,
PRN-1,,44.29,-120.83,,,
";
        let loaded = load_ground_truth(csv, &ColumnConfig::default()).unwrap();
        let gt = &loaded.facilities;
        assert_eq!(gt.len(), 3);
        assert_eq!(loaded.field_errors.get("building_key"), 1);
        assert_eq!(loaded.field_errors.get("it_load_mw"), 1);
        assert_eq!(gt[0].it_load_mw, Some(1150.0));
        assert_eq!(gt[1].it_load_mw, None);
        assert!(gt[0].is_valid());
        assert!(!gt[1].is_valid());
        assert_eq!(gt[2].campus(), "PRN-1");
        assert_eq!(gt[0].status.as_deref(), Some("Active"));
    }

    #[test]
    fn date_formats() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(parse_date("2024-03-01"), Some(d));
        assert_eq!(parse_date("03/01/2024"), Some(d));
        assert_eq!(parse_date("2024-03-01T12:00:00Z"), Some(d));
        assert_eq!(parse_date("2024-03-01 08:15:00"), Some(d));
        assert_eq!(parse_date("Q3 2024"), None);
    }

    #[test]
    fn numbers() {
        assert_eq!(parse_number(" 1,250.5 "), Some(1250.5));
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("TBD"), None);
    }
}
