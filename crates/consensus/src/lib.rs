//! `sitemerge-consensus`: multi-source facility entity resolution and consensus engine.
//!
//! Pure engine crate: receives pre-loaded vendor records, clusters them into
//! facilities, merges each cluster into one consensus record, and measures
//! source accuracy against ground truth. The CSV loaders take `&str` input;
//! file IO belongs to callers.

pub mod accuracy;
pub mod campus;
pub mod cluster;
pub mod config;
pub mod disjoint_set;
pub mod engine;
pub mod error;
pub mod geo;
pub mod identity;
pub mod load;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod resolve;
pub mod score;
pub mod summary;

pub use config::ConsensusConfig;
pub use engine::{run, run_accuracy, run_cluster_validation};
pub use error::ConsensusError;
pub use load::{load_ground_truth, load_records};
pub use model::{
    AccuracyReport, ClusterValidation, ConsensusInput, ConsensusResult, GroundTruthFacility, GroundTruthInput,
    RawFacilityRecord,
};
