//! Vendor MW figures against ground-truth IT load.
//!
//! Building level compares each retained building match directly. Campus
//! level sums a source's matched records per ground-truth campus (each
//! record once) against the campus's summed IT load. Only pairs where both
//! sides are positive count.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::config::CapacityAccuracyConfig;
use crate::model::{
    CapacityAccuracy, CapacityMetrics, CapacityReport, FacilityRecord, Granularity, GroundTruthFacility, MatchPair,
};

pub fn capacity_accuracy(
    valid: &[&GroundTruthFacility],
    records: &[FacilityRecord],
    building_pairs: &[MatchPair],
    config: &CapacityAccuracyConfig,
) -> CapacityReport {
    let by_building: BTreeMap<&str, &GroundTruthFacility> =
        valid.iter().map(|g| (g.building_key.as_str(), *g)).collect();
    let by_id: BTreeMap<&str, &FacilityRecord> = records.iter().map(|r| (r.unique_id(), r)).collect();

    let mut campus_load: BTreeMap<&str, f64> = BTreeMap::new();
    for g in valid {
        if let Some(mw) = g.it_load_mw {
            *campus_load.entry(g.campus()).or_insert(0.0) += mw;
        }
    }

    let mut by_source: BTreeMap<&str, Vec<(&GroundTruthFacility, &FacilityRecord)>> = BTreeMap::new();
    for p in building_pairs.iter().filter(|p| p.retained) {
        if let (Some(g), Some(r)) = (by_building.get(p.entity_key.as_str()), by_id.get(p.unique_id.as_str())) {
            by_source.entry(p.source.as_str()).or_default().push((*g, *r));
        }
    }

    let mut building = Vec::new();
    let mut campus = Vec::new();
    for (source, matches) in &by_source {
        let divisor = config.pue_divisor(source);
        for field in &config.vendor_fields {
            let vendor = |r: &FacilityRecord| {
                r.raw
                    .get(field)
                    .and_then(|v| v.as_number())
                    .map(|mw| divisor.map_or(mw, |pue| mw / pue))
            };

            let pairs: Vec<(f64, f64)> = matches
                .iter()
                .filter_map(|(g, r)| Some((g.it_load_mw?, vendor(*r)?)))
                .collect();
            building.push(row(Granularity::Building, source, field, divisor.is_some(), &pairs, config));

            let mut seen: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
            let mut vendor_sum: BTreeMap<&str, f64> = BTreeMap::new();
            for (g, r) in matches {
                if !seen.entry(g.campus()).or_default().insert(r.unique_id()) {
                    continue;
                }
                if let Some(mw) = vendor(*r) {
                    *vendor_sum.entry(g.campus()).or_insert(0.0) += mw;
                }
            }
            let pairs: Vec<(f64, f64)> = vendor_sum
                .iter()
                .filter_map(|(c, predicted)| Some((*campus_load.get(c)?, *predicted)))
                .collect();
            campus.push(row(Granularity::Campus, source, field, divisor.is_some(), &pairs, config));
        }
    }

    let rows: Vec<CapacityAccuracy> = building
        .into_iter()
        .chain(campus)
        .filter(|r| r.metrics.n > 0)
        .collect();
    debug!("capacity accuracy: {} comparable (source, field) rows", rows.len());
    CapacityReport {
        pue: config.pue,
        min_samples: config.min_samples,
        rows,
    }
}

fn row(
    granularity: Granularity,
    source: &str,
    field: &str,
    pue_adjusted: bool,
    pairs: &[(f64, f64)],
    config: &CapacityAccuracyConfig,
) -> CapacityAccuracy {
    CapacityAccuracy {
        granularity,
        source: source.to_string(),
        field: field.to_string(),
        pue_adjusted,
        metrics: capacity_metrics(pairs, config.min_samples),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Error metrics over `(actual, predicted)` pairs. Non-positive values on
/// either side drop the pair; below `min_samples` only the means are given.
pub fn capacity_metrics(pairs: &[(f64, f64)], min_samples: usize) -> CapacityMetrics {
    let valid: Vec<(f64, f64)> = pairs
        .iter()
        .copied()
        .filter(|(a, p)| a.is_finite() && p.is_finite() && *a > 0.0 && *p > 0.0)
        .collect();
    let n = valid.len();
    let actual_mean = mean(valid.iter().map(|(a, _)| *a));
    let predicted_mean = mean(valid.iter().map(|(_, p)| *p));

    let mut metrics = CapacityMetrics {
        n,
        actual_mean_mw: actual_mean,
        predicted_mean_mw: predicted_mean,
        mae_mw: None,
        mape_pct: None,
        bias_mw: None,
        bias_pct: None,
        rmse_mw: None,
        correlation: None,
    };
    let (Some(am), Some(pm)) = (actual_mean, predicted_mean) else {
        return metrics;
    };
    if n < min_samples {
        return metrics;
    }

    let bias = mean(valid.iter().map(|(a, p)| p - a));
    metrics.mae_mw = mean(valid.iter().map(|(a, p)| (a - p).abs()));
    metrics.mape_pct = mean(valid.iter().map(|(a, p)| ((a - p) / a).abs())).map(|m| m * 100.0);
    metrics.bias_mw = bias;
    metrics.bias_pct = bias.map(|b| b / am * 100.0);
    metrics.rmse_mw = mean(valid.iter().map(|(a, p)| (a - p).powi(2))).map(f64::sqrt);

    if n > 2 {
        let cov: f64 = valid.iter().map(|(a, p)| (a - am) * (p - pm)).sum();
        let var_a: f64 = valid.iter().map(|(a, _)| (a - am).powi(2)).sum();
        let var_p: f64 = valid.iter().map(|(_, p)| (p - pm).powi(2)).sum();
        if var_a > 0.0 && var_p > 0.0 {
            metrics.correlation = Some(cov / (var_a * var_p).sqrt());
        }
    }
    metrics
}
