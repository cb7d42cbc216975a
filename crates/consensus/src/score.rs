use serde::Serialize;

use crate::config::{ConsensusConfig, ScoringConfig};
use crate::model::RawFacilityRecord;

/// Components of one record's consensus score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecordScore {
    pub source_weight: f64,
    pub completeness: f64,
    pub capacity_bonus: bool,
    pub score: f64,
}

/// Share of configured completeness fields that are filled, in [0, 1].
pub fn completeness_score(record: &RawFacilityRecord, scoring: &ScoringConfig) -> f64 {
    let fields = scoring.completeness_fields();
    if fields.is_empty() {
        return 0.0;
    }
    let filled = fields.iter().filter(|f| record.is_filled(f)).count();
    filled as f64 / fields.len() as f64
}

/// Any capacity field carries a non-zero number.
pub fn has_capacity_bonus(record: &RawFacilityRecord, scoring: &ScoringConfig) -> bool {
    scoring.capacity_fields.iter().any(|f| {
        record
            .get(f)
            .and_then(|v| v.as_number())
            .is_some_and(|n| n != 0.0)
    })
}

pub fn score_record(record: &RawFacilityRecord, config: &ConsensusConfig) -> RecordScore {
    let s = &config.scoring;
    let source_weight = config.sources.weight(&record.source);
    let completeness = completeness_score(record, s);
    let capacity_bonus = has_capacity_bonus(record, s);
    let bonus = if capacity_bonus { 1.0 } else { 0.0 };
    RecordScore {
        source_weight,
        completeness,
        capacity_bonus,
        score: s.source_weight * source_weight + s.completeness_weight * completeness + s.capacity_weight * bonus,
    }
}
