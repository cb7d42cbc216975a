use log::{info, warn};

use crate::accuracy::{evaluate_accuracy, validate_clusters};
use crate::campus::rollup_campuses;
use crate::cluster::{cluster_records, summarize_cluster};
use crate::config::ConsensusConfig;
use crate::error::ConsensusError;
use crate::merge::build_consensus;
use crate::model::{
    AccuracyReport, ClusterValidation, ConsensusInput, ConsensusMeta, ConsensusRecord, ConsensusResult,
    GroundTruthFacility, GroundTruthInput,
};
use crate::normalize::normalize_records;
use crate::summary::compute_summary;

/// Run the consensus pipeline: normalize, cluster, score, merge, roll up.
pub fn run(config: &ConsensusConfig, input: &ConsensusInput) -> Result<ConsensusResult, ConsensusError> {
    info!("{}: {} input records", config.name, input.records.len());
    if !input.field_errors.is_empty() {
        for (field, n) in input.field_errors.iter() {
            warn!("{field}: {n} value(s) could not be parsed and were treated as null");
        }
    }

    let records = normalize_records(&input.records, config)?;
    let clusters = cluster_records(&records, config)?;

    let buildings: Vec<ConsensusRecord> = clusters
        .iter()
        .map(|c| build_consensus(c, &records, config))
        .collect();
    let campuses = rollup_campuses(&buildings, &config.campus);

    let summary = compute_summary(&records, &clusters, &buildings, &campuses, &input.field_errors);
    info!(
        "{} clusters ({} multi-source, {} chained), {} campuses",
        summary.clusters, summary.multi_source_clusters, summary.chained_clusters, summary.campuses
    );
    if summary.unknown_id_fallbacks > 0 {
        warn!("{} records fell back to an 'unknown' campus id", summary.unknown_id_fallbacks);
    }

    Ok(ConsensusResult {
        meta: ConsensusMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            threshold_m: config.clustering.threshold_m,
        },
        summary,
        clusters: clusters.iter().map(|c| summarize_cluster(c, &records)).collect(),
        buildings,
        campuses,
    })
}

/// Per-source accuracy of the raw feed against ground truth.
pub fn run_accuracy(
    config: &ConsensusConfig,
    input: &ConsensusInput,
    ground_truth: &GroundTruthInput,
) -> Result<AccuracyReport, ConsensusError> {
    for (field, n) in ground_truth.field_errors.iter() {
        warn!("ground truth {field}: {n} value(s) could not be parsed and were treated as null");
    }
    let records = normalize_records(&input.records, config)?;
    let mut report = evaluate_accuracy(&ground_truth.facilities, &records, config);
    report.ground_truth_field_errors = ground_truth.field_errors.clone();
    Ok(report)
}

/// Consensus clusters checked against ground-truth campuses.
pub fn run_cluster_validation(
    config: &ConsensusConfig,
    result: &ConsensusResult,
    ground_truth: &[GroundTruthFacility],
) -> ClusterValidation {
    validate_clusters(&result.clusters, ground_truth, &config.accuracy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::load_records;

    const FEED: &str = "\
source_name,source_record_id,company,city,country,latitude,longitude,campus_name_raw,full_capacity_mw,commissioned_power_mw,mw_2030,facility_sqft
DataCenterHawk,h-1,Meta,Altoona,USA,41.6500,-93.4700,Meta Altoona Campus,,50,,
DataCenterMap,m-1,Meta,Altoona,USA,41.6504,-93.4700,Meta Altoona - Building 1,120,,,300000
WoodMac,w-1,Meta,Altoona,USA,41.6502,-93.4702,Meta Altoona,,,90,
DataCenterMap,m-2,Meta,Prineville,USA,44.2900,-120.8300,Prineville Data Center,80,,,
Synergy,s-1,Meta,Nowhere,USA,,,,,,,
";

    fn result() -> ConsensusResult {
        let input = load_records(FEED, &ConsensusConfig::default().columns).unwrap();
        run(&ConsensusConfig::default(), &input).unwrap()
    }

    #[test]
    fn pipeline_end_to_end() {
        let r = result();
        assert_eq!(r.summary.total_records, 5);
        assert_eq!(r.summary.unlocated_records, 1);
        assert_eq!(r.summary.clusters, 3);
        assert_eq!(r.summary.multi_source_clusters, 1);
        assert_eq!(r.buildings.len(), 3);

        let altoona = &r.buildings[0];
        assert_eq!(altoona.source, "DataCenterHawk");
        assert_eq!(altoona.source_count, 3);
        assert_eq!(altoona.display_name, "Meta Altoona");
        // primary has commissioned power only; full capacity and the forecast get filled
        let fields: Vec<(&str, &str)> = altoona
            .merged_from
            .iter()
            .map(|p| (p.field.as_str(), p.source.as_str()))
            .collect();
        assert_eq!(fields, vec![("full_capacity_mw", "DataCenterMap"), ("mw_2030", "WoodMac")]);
        assert_eq!(altoona.attributes["full_capacity_mw"], crate::model::FieldValue::Number(120.0));
        assert_eq!(r.summary.merged_records, 1);
        assert_eq!(r.summary.winning_sources["DataCenterMap"], 1);
    }

    #[test]
    fn unlocated_record_is_kept() {
        let r = result();
        let last = r.clusters.last().unwrap();
        assert!(!last.located);
        assert_eq!(last.member_ids, vec!["synergy_s-1".to_string()]);
        assert!(r.buildings.iter().any(|b| b.unique_id == "synergy_s-1" && !b.located));
    }

    #[test]
    fn duplicate_ids_abort_the_run() {
        let feed = format!("{FEED}WoodMac,w-1,Meta,Altoona,USA,41.0,-93.0,,,,,\n");
        let input = load_records(&feed, &ConsensusConfig::default().columns).unwrap();
        let err = run(&ConsensusConfig::default(), &input).unwrap_err();
        assert!(matches!(err, ConsensusError::DuplicateUniqueIds(ref ids) if ids == &vec!["woodmac_w-1".to_string()]));
    }

    #[test]
    fn ground_truth_field_errors_reach_the_report() {
        let config = ConsensusConfig::default();
        let input = load_records(FEED, &config.columns).unwrap();
        let truth = crate::load::load_ground_truth(
            "building_key,campus_key,latitude,longitude,it_load_mw\n\
             ALT-1,ALT,41.6501,-93.4701,n/a\n\
             PRN-1,PRN,north,-120.83,40\n",
            &config.columns,
        )
        .unwrap();
        let report = run_accuracy(&config, &input, &truth).unwrap();
        assert_eq!(report.ground_truth_field_errors.get("it_load_mw"), 1);
        assert_eq!(report.ground_truth_field_errors.get("latitude"), 1);
        assert_eq!(report.ground_truth_invalid, 1);
    }

    #[test]
    fn field_errors_surface_in_summary() {
        let feed = format!("{FEED}WoodMac,w-9,Meta,Altoona,USA,41.0,-93.0,,lots,,,\n");
        let input = load_records(&feed, &ConsensusConfig::default().columns).unwrap();
        let r = run(&ConsensusConfig::default(), &input).unwrap();
        assert_eq!(r.summary.field_errors.get("full_capacity_mw"), 1);
    }
}
