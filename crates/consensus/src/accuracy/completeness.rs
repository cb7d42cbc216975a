//! Attribute fill rates per source.
//!
//! Fields that no record of any source carries are left out, so a category
//! average only reflects attributes the feed actually exposes.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::AttributeAuditConfig;
use crate::model::{AttributeCompleteness, FacilityRecord, FieldCompleteness, FieldLeader, SourceCompleteness};

use super::stats::pct;

pub fn attribute_completeness(records: &[FacilityRecord], config: &AttributeAuditConfig) -> AttributeCompleteness {
    let mut by_source: BTreeMap<&str, Vec<&FacilityRecord>> = BTreeMap::new();
    for rec in records {
        by_source.entry(rec.source()).or_default().push(rec);
    }

    let present: BTreeSet<&str> = config
        .categories
        .values()
        .flatten()
        .map(String::as_str)
        .filter(|f| records.iter().any(|r| r.raw.is_filled(f)))
        .collect();

    let sources: Vec<SourceCompleteness> = by_source
        .iter()
        .map(|(source, recs)| source_completeness(source, recs, config, &present))
        .collect();
    let leaders = field_leaders(&sources);

    AttributeCompleteness { sources, leaders }
}

fn source_completeness(
    source: &str,
    records: &[&FacilityRecord],
    config: &AttributeAuditConfig,
    present: &BTreeSet<&str>,
) -> SourceCompleteness {
    let mut fields = Vec::new();
    let mut categories = BTreeMap::new();
    for (category, names) in &config.categories {
        let before = fields.len();
        for field in names.iter().filter(|f| present.contains(f.as_str())) {
            let filled = records.iter().filter(|r| r.raw.is_filled(field)).count();
            fields.push(FieldCompleteness {
                category: category.clone(),
                field: field.clone(),
                filled,
                pct: pct(filled, records.len()),
            });
        }
        let in_category = &fields[before..];
        if !in_category.is_empty() {
            let mean = in_category.iter().map(|f| f.pct).sum::<f64>() / in_category.len() as f64;
            categories.insert(category.clone(), mean);
        }
    }
    let overall_pct = if categories.is_empty() {
        0.0
    } else {
        categories.values().sum::<f64>() / categories.len() as f64
    };

    SourceCompleteness {
        source: source.to_string(),
        records: records.len(),
        fields,
        categories,
        overall_pct,
    }
}

/// Highest fill rate per field; ties go to the first source by name.
fn field_leaders(sources: &[SourceCompleteness]) -> Vec<FieldLeader> {
    let mut per_field: BTreeMap<(&str, &str), Vec<(&str, f64)>> = BTreeMap::new();
    for s in sources {
        for f in &s.fields {
            per_field
                .entry((f.category.as_str(), f.field.as_str()))
                .or_default()
                .push((s.source.as_str(), f.pct));
        }
    }

    let mut leaders: Vec<FieldLeader> = per_field
        .into_iter()
        .filter_map(|((category, field), rows)| {
            let (source, best) = rows
                .iter()
                .copied()
                .reduce(|best, row| if row.1 > best.1 { row } else { best })?;
            Some(FieldLeader {
                category: category.to_string(),
                field: field.to_string(),
                source: source.to_string(),
                pct: best,
                sources_with_data: rows.iter().filter(|(_, p)| *p > 0.0).map(|(s, _)| s.to_string()).collect(),
            })
        })
        .collect();
    leaders.sort_by(|a, b| a.category.cmp(&b.category).then(b.pct.total_cmp(&a.pct)).then(a.field.cmp(&b.field)));
    leaders
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CanonicalKey, FieldValue, RawFacilityRecord};

    fn rec(source: &str, id: &str, attrs: &[(&str, FieldValue)]) -> FacilityRecord {
        let mut raw = RawFacilityRecord {
            source: source.into(),
            source_record_id: id.into(),
            ..Default::default()
        };
        for (k, v) in attrs {
            raw.set(k, v.clone());
        }
        FacilityRecord {
            raw,
            key: CanonicalKey {
                unique_id: format!("{source}_{id}"),
                campus_id: "c".into(),
                campus_name: None,
                building: None,
                unknown_id_fallback: false,
            },
            coordinate: None,
        }
    }

    fn config() -> AttributeAuditConfig {
        let mut categories = BTreeMap::new();
        categories.insert("capacity".to_string(), vec!["full_capacity_mw".to_string(), "mw_2030".to_string()]);
        categories.insert("land".to_string(), vec!["total_site_acres".to_string()]);
        categories.insert("cost".to_string(), vec!["total_cost_usd_million".to_string()]);
        AttributeAuditConfig { categories }
    }

    fn records() -> Vec<FacilityRecord> {
        vec![
            rec("Hawk", "1", &[("full_capacity_mw", FieldValue::Number(120.0)), ("mw_2030", FieldValue::Number(90.0))]),
            rec("Hawk", "2", &[("full_capacity_mw", FieldValue::Number(40.0))]),
            rec("Map", "1", &[("total_site_acres", FieldValue::Number(300.0))]),
            rec("Map", "2", &[("full_capacity_mw", FieldValue::Text("  ".into()))]),
        ]
    }

    #[test]
    fn per_source_field_and_category_rates() {
        let report = attribute_completeness(&records(), &config());
        assert_eq!(report.sources.len(), 2);

        let hawk = &report.sources[0];
        assert_eq!(hawk.source, "Hawk");
        assert_eq!(hawk.records, 2);
        let full = hawk.fields.iter().find(|f| f.field == "full_capacity_mw").unwrap();
        assert_eq!(full.filled, 2);
        assert!((full.pct - 100.0).abs() < 1e-9);
        // (100 + 50) / 2
        assert!((hawk.categories["capacity"] - 75.0).abs() < 1e-9);
        assert_eq!(hawk.categories["land"], 0.0);
        assert!((hawk.overall_pct - 37.5).abs() < 1e-9);
    }

    #[test]
    fn fields_nobody_carries_are_left_out() {
        let report = attribute_completeness(&records(), &config());
        for s in &report.sources {
            assert!(!s.categories.contains_key("cost"));
            assert!(s.fields.iter().all(|f| f.field != "total_cost_usd_million"));
        }
    }

    #[test]
    fn blank_text_does_not_count() {
        let report = attribute_completeness(&records(), &config());
        let map = &report.sources[1];
        let full = map.fields.iter().find(|f| f.field == "full_capacity_mw").unwrap();
        assert_eq!(full.filled, 0);
    }

    #[test]
    fn leaders_name_the_best_source() {
        let report = attribute_completeness(&records(), &config());
        let acres = report.leaders.iter().find(|l| l.field == "total_site_acres").unwrap();
        assert_eq!(acres.source, "Map");
        assert!((acres.pct - 50.0).abs() < 1e-9);
        assert_eq!(acres.sources_with_data, vec!["Map".to_string()]);

        let capacity: Vec<&str> = report
            .leaders
            .iter()
            .filter(|l| l.category == "capacity")
            .map(|l| l.field.as_str())
            .collect();
        assert_eq!(capacity, vec!["full_capacity_mw", "mw_2030"]);
    }
}
