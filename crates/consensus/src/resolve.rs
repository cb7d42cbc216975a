//! Header → canonical attribute mapping.
//!
//! Each canonical attribute has an ordered list of candidate header names.
//! The first candidate present in the header (case-insensitive, trimmed)
//! wins. Attributes without an alias list match their own name.

use std::collections::{BTreeMap, HashMap};

use crate::error::ConsensusError;

#[derive(Debug, Clone)]
pub struct FieldResolver {
    /// canonical attribute → column index
    resolved: BTreeMap<String, usize>,
    /// lowercased header → column index (first occurrence)
    by_header: HashMap<String, usize>,
    headers: Vec<String>,
}

impl FieldResolver {
    pub fn new<S: AsRef<str>>(headers: &[S], aliases: &BTreeMap<String, Vec<String>>) -> Self {
        let headers: Vec<String> = headers.iter().map(|h| h.as_ref().trim().to_string()).collect();
        let mut by_header = HashMap::new();
        for (i, h) in headers.iter().enumerate() {
            by_header.entry(h.to_lowercase()).or_insert(i);
        }

        let resolved = aliases
            .iter()
            .filter_map(|(canonical, candidates)| {
                candidates
                    .iter()
                    .find_map(|c| by_header.get(&c.trim().to_lowercase()).copied())
                    .map(|i| (canonical.clone(), i))
            })
            .collect();

        Self {
            resolved,
            by_header,
            headers,
        }
    }

    /// Column index for a canonical attribute, falling back to a header
    /// literally named like the attribute.
    pub fn index(&self, canonical: &str) -> Option<usize> {
        self.resolved
            .get(canonical)
            .copied()
            .or_else(|| self.by_header.get(&canonical.to_lowercase()).copied())
    }

    pub fn require(&self, canonical: &str, feed: &str) -> Result<usize, ConsensusError> {
        self.index(canonical).ok_or_else(|| ConsensusError::MissingColumn {
            feed: feed.into(),
            column: canonical.into(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Trimmed cell for `canonical`; blank cells and unmapped attributes are `None`.
    pub fn get<'r>(&self, row: &'r csv::StringRecord, canonical: &str) -> Option<&'r str> {
        let value = row.get(self.index(canonical)?)?.trim();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}
