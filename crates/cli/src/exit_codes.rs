//! CLI Exit Code Registry
//!
//! This is the single source of truth for all `sitemerge` exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                                   |
//! |------|-----------------------------------------------------------|
//! | 0    | Success                                                   |
//! | 2    | Usage error (bad args, no input path configured)          |
//! | 3    | Invalid config (TOML parse or validation failure)         |
//! | 4    | Runtime / IO error (unreadable file, missing column, ...) |
//! | 5    | Duplicate unique_id values in the record feed             |
//! | 6    | Located records exceed `clustering.max_records`           |

use sitemerge_consensus::ConsensusError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, no record or ground-truth path anywhere.
pub const EXIT_USAGE: u8 = 2;

/// Config file could not be parsed or failed validation.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// File IO, CSV structure, or missing key column.
pub const EXIT_RUNTIME: u8 = 4;

/// Two records produced the same unique_id; the run was aborted.
pub const EXIT_DUPLICATE_IDS: u8 = 5;

/// Batch too large for pairwise clustering under the configured bound.
pub const EXIT_INPUT_TOO_LARGE: u8 = 6;

/// Map an engine error to its exit code.
pub fn consensus_exit_code(err: &ConsensusError) -> u8 {
    match err {
        ConsensusError::ConfigParse(_) | ConsensusError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        ConsensusError::DuplicateUniqueIds(_) => EXIT_DUPLICATE_IDS,
        ConsensusError::InputTooLarge { .. } => EXIT_INPUT_TOO_LARGE,
        ConsensusError::MissingColumn { .. } | ConsensusError::Io(_) | ConsensusError::MissingRecordId { .. } => {
            EXIT_RUNTIME
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_USAGE,
            EXIT_INVALID_CONFIG,
            EXIT_RUNTIME,
            EXIT_DUPLICATE_IDS,
            EXIT_INPUT_TOO_LARGE,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn engine_errors_map() {
        assert_eq!(consensus_exit_code(&ConsensusError::ConfigParse("x".into())), EXIT_INVALID_CONFIG);
        assert_eq!(consensus_exit_code(&ConsensusError::DuplicateUniqueIds(vec![])), EXIT_DUPLICATE_IDS);
        assert_eq!(
            consensus_exit_code(&ConsensusError::InputTooLarge { records: 2, limit: 1 }),
            EXIT_INPUT_TOO_LARGE
        );
        assert_eq!(consensus_exit_code(&ConsensusError::Io("x".into())), EXIT_RUNTIME);
    }
}
