// sitemerge CLI - multi-source facility consensus and source accuracy

mod commands;
mod exit_codes;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::{cmd_accuracy, cmd_run, cmd_validate, AccuracyArgs, RunArgs};
use exit_codes::{consensus_exit_code, EXIT_SUCCESS, EXIT_USAGE};
use sitemerge_consensus::ConsensusError;

#[derive(Parser)]
#[command(name = "sitemerge")]
#[command(about = "Resolve vendor facility records into consensus facilities")]
#[command(version, long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("SITEMERGE_COMMIT"), ")"))]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster, score, and merge a record feed into consensus records
    #[command(after_help = "\
Examples:
  sitemerge run consensus.toml
  sitemerge run consensus.toml --records feeds/q3.csv --json
  sitemerge run consensus.toml --output consensus.json")]
    Run(RunArgs),

    /// Measure each source's spatial accuracy against ground truth
    #[command(after_help = "\
Examples:
  sitemerge accuracy consensus.toml
  sitemerge accuracy consensus.toml --ground-truth gt/buildings.csv --json
  sitemerge accuracy consensus.toml --clusters --output accuracy.json")]
    Accuracy(AccuracyArgs),

    /// Validate a consensus config without running
    #[command(after_help = "\
Examples:
  sitemerge validate consensus.toml")]
    Validate {
        /// Path to the consensus TOML config
        config: std::path::PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Accuracy(args) => cmd_accuracy(args),
        Commands::Validate { config } => cmd_validate(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ConsensusError> for CliError {
    fn from(err: ConsensusError) -> Self {
        let hint = match &err {
            ConsensusError::DuplicateUniqueIds(_) => {
                Some("source_record_id must be unique within each source".to_string())
            }
            ConsensusError::InputTooLarge { .. } => {
                Some("raise clustering.max_records or split the feed by region".to_string())
            }
            ConsensusError::MissingColumn { column, .. } => {
                Some(format!("add the feed's header name to [columns.aliases] {column}"))
            }
            _ => None,
        };
        Self { code: consensus_exit_code(&err), message: err.to_string(), hint }
    }
}
