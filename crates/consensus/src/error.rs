use std::fmt;

#[derive(Debug)]
pub enum ConsensusError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad threshold, weight out of range, etc.).
    ConfigValidation(String),
    /// Required column could not be resolved from the feed header.
    MissingColumn { feed: String, column: String },
    /// IO / CSV read error.
    Io(String),
    /// A record arrived without a source record id. `line` is the feed line
    /// for CSV-loaded records, else the 1-based position in the batch.
    MissingRecordId { source: String, line: usize },
    /// Two or more records produced the same unique_id.
    DuplicateUniqueIds(Vec<String>),
    /// Batch exceeds the configured pairwise-clustering safety bound.
    InputTooLarge { records: usize, limit: usize },
}

impl fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MissingColumn { feed, column } => {
                write!(f, "{feed} feed: no column found for '{column}'")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::MissingRecordId { source, line } => {
                write!(f, "source '{source}', line {line}: missing source record id")
            }
            Self::DuplicateUniqueIds(keys) => {
                write!(f, "duplicate unique_id values ({}): {}", keys.len(), keys.join(", "))
            }
            Self::InputTooLarge { records, limit } => {
                write!(
                    f,
                    "{records} located records exceed the clustering limit of {limit} (raise clustering.max_records)"
                )
            }
        }
    }
}

impl std::error::Error for ConsensusError {}

impl From<csv::Error> for ConsensusError {
    fn from(e: csv::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<std::io::Error> for ConsensusError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_ids_listed_in_message() {
        let err = ConsensusError::DuplicateUniqueIds(vec!["dcm_1".into(), "dch_9".into()]);
        let msg = err.to_string();
        assert!(msg.contains("(2)"));
        assert!(msg.contains("dcm_1, dch_9"));
    }

    #[test]
    fn input_too_large_names_the_knob() {
        let err = ConsensusError::InputTooLarge { records: 10, limit: 5 };
        assert!(err.to_string().contains("clustering.max_records"));
    }
}
