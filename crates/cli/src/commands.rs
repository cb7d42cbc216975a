//! `sitemerge run | accuracy | validate` - config-driven consensus commands.

use std::path::{Path, PathBuf};

use clap::Args;
use serde::Serialize;

use sitemerge_consensus::{
    load_ground_truth, load_records, AccuracyReport, ClusterValidation, ConsensusConfig, ConsensusInput,
    GroundTruthInput,
};

use crate::exit_codes::{EXIT_INVALID_CONFIG, EXIT_RUNTIME};
use crate::CliError;

#[derive(Args)]
pub struct RunArgs {
    /// Path to the consensus TOML config
    pub config: PathBuf,

    /// Record feed CSV (overrides [input] records)
    #[arg(long)]
    pub records: Option<PathBuf>,

    /// Output JSON to stdout
    #[arg(long)]
    pub json: bool,

    /// Write JSON output to file
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct AccuracyArgs {
    /// Path to the consensus TOML config
    pub config: PathBuf,

    /// Record feed CSV (overrides [input] records)
    #[arg(long)]
    pub records: Option<PathBuf>,

    /// Ground-truth CSV (overrides [input] ground_truth)
    #[arg(long)]
    pub ground_truth: Option<PathBuf>,

    /// Also run the consensus pipeline and validate its clusters
    #[arg(long)]
    pub clusters: bool,

    /// Output JSON to stdout
    #[arg(long)]
    pub json: bool,

    /// Write JSON output to file
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Serialize)]
struct AccuracyOutput {
    #[serde(flatten)]
    report: AccuracyReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    cluster_validation: Option<ClusterValidation>,
}

fn runtime_err(msg: impl Into<String>) -> CliError {
    CliError::new(EXIT_RUNTIME, msg)
}

fn read_config(path: &Path) -> Result<ConsensusConfig, CliError> {
    let config_str = std::fs::read_to_string(path)
        .map_err(|e| runtime_err(format!("cannot read config {}: {e}", path.display())))?;
    ConsensusConfig::from_toml(&config_str).map_err(CliError::from)
}

/// Flag wins; otherwise the `[input]` entry, relative to the config's directory.
fn resolve_input(
    flag: Option<PathBuf>,
    configured: Option<&str>,
    config_path: &Path,
    what: &str,
    flag_name: &str,
) -> Result<PathBuf, CliError> {
    if let Some(path) = flag {
        return Ok(path);
    }
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    configured.map(|p| base_dir.join(p)).ok_or_else(|| {
        CliError::usage(format!("no {what} file given"))
            .with_hint(format!("pass {flag_name} or set it under [input] in the config"))
    })
}

fn read_csv(path: &Path) -> Result<String, CliError> {
    log::debug!("reading {}", path.display());
    std::fs::read_to_string(path).map_err(|e| runtime_err(format!("cannot read {}: {e}", path.display())))
}

fn load_feed(path: &Path, config: &ConsensusConfig) -> Result<ConsensusInput, CliError> {
    let csv_data = read_csv(path)?;
    Ok(load_records(&csv_data, &config.columns)?)
}

fn load_truth(path: &Path, config: &ConsensusConfig) -> Result<GroundTruthInput, CliError> {
    let csv_data = read_csv(path)?;
    Ok(load_ground_truth(&csv_data, &config.columns)?)
}

fn emit<T: Serialize>(value: &T, json_output: bool, output_file: Option<&Path>) -> Result<(), CliError> {
    let json_str = serde_json::to_string_pretty(value)
        .map_err(|e| runtime_err(format!("JSON serialization error: {e}")))?;

    if let Some(path) = output_file {
        std::fs::write(path, &json_str).map_err(|e| runtime_err(format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{json_str}");
    }
    Ok(())
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let config = read_config(&args.config)?;
    let records_path = resolve_input(
        args.records,
        config.input.records.as_deref(),
        &args.config,
        "record feed",
        "--records",
    )?;
    let input = load_feed(&records_path, &config)?;

    let result = sitemerge_consensus::run(&config, &input)?;
    emit(&result, args.json, args.output.as_deref())?;

    let s = &result.summary;
    eprintln!(
        "{}: {} records ({} unlocated) into {} clusters, {} multi-source, {} chained; {} campuses",
        result.meta.config_name,
        s.total_records,
        s.unlocated_records,
        s.clusters,
        s.multi_source_clusters,
        s.chained_clusters,
        s.campuses,
    );
    if s.unknown_id_fallbacks > 0 {
        eprintln!("{} record(s) fell back to an unknown campus id", s.unknown_id_fallbacks);
    }
    Ok(())
}

pub fn cmd_accuracy(args: AccuracyArgs) -> Result<(), CliError> {
    let config = read_config(&args.config)?;
    let records_path = resolve_input(
        args.records,
        config.input.records.as_deref(),
        &args.config,
        "record feed",
        "--records",
    )?;
    let truth_path = resolve_input(
        args.ground_truth,
        config.input.ground_truth.as_deref(),
        &args.config,
        "ground-truth",
        "--ground-truth",
    )?;

    let input = load_feed(&records_path, &config)?;
    let ground_truth = load_truth(&truth_path, &config)?;

    let report = sitemerge_consensus::run_accuracy(&config, &input, &ground_truth)?;
    let cluster_validation = if args.clusters {
        let result = sitemerge_consensus::run(&config, &input)?;
        Some(sitemerge_consensus::run_cluster_validation(&config, &result, &ground_truth.facilities))
    } else {
        None
    };

    let output = AccuracyOutput { report, cluster_validation };
    emit(&output, args.json, args.output.as_deref())?;

    let report = &output.report;
    eprintln!(
        "{}: {} ground-truth buildings ({} invalid), {} campuses",
        report.meta.config_name,
        report.building.denominator,
        report.ground_truth_invalid,
        report.campus.denominator,
    );
    if !report.ground_truth_field_errors.is_empty() {
        eprintln!("{} ground-truth value(s) unparseable", report.ground_truth_field_errors.total());
    }
    for s in &report.building.sources {
        let median = s.stats.as_ref().map(|st| format!("{:.0} m", st.median_m)).unwrap_or_else(|| "-".into());
        eprintln!(
            "  {:<20} building recall {:>5.1}%  median {}",
            s.source, s.recall_pct, median
        );
    }
    if let Some(v) = &output.cluster_validation {
        eprintln!(
            "clusters: {} checked, {} matched, {} unmatched; {}/{} campuses detected",
            v.clusters_checked,
            v.matched.len(),
            v.unmatched.len(),
            v.campuses_detected,
            v.campuses_total,
        );
    }
    Ok(())
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config_str = std::fs::read_to_string(&config_path)
        .map_err(|e| runtime_err(format!("cannot read config: {e}")))?;

    match ConsensusConfig::from_toml(&config_str) {
        Ok(config) => {
            eprintln!(
                "valid: '{}' with {} weighted source(s), {} merge field(s), threshold {} m",
                config.name,
                config.sources.weights.len(),
                config.merge.fields.len(),
                config.clustering.threshold_m,
            );
            Ok(())
        }
        Err(e) => Err(CliError::new(EXIT_INVALID_CONFIG, e.to_string())),
    }
}
