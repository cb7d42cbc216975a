use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::geo::Coordinate;

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// A typed attribute value. Absent keys mean null.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl FieldValue {
    /// Non-null and non-empty: blank text and NaN count as empty.
    pub fn is_filled(&self) -> bool {
        match self {
            Self::Number(n) => !n.is_nan(),
            Self::Date(_) => true,
            Self::Text(s) => !s.trim().is_empty(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) if !n.is_nan() => Some(*n),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Date(d) => write!(f, "{d}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Per-field coercion failures seen while loading a feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, usize>);

impl FieldErrors {
    pub fn record(&mut self, field: &str) {
        *self.0.entry(field.to_string()).or_insert(0) += 1;
    }

    pub fn get(&self, field: &str) -> usize {
        self.0.get(field).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One source's observation of one facility, already in the canonical shape.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RawFacilityRecord {
    pub source: String,
    pub source_record_id: String,
    pub company: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub campus_name_raw: Option<String>,
    pub status: Option<String>,
    /// Capacities, forecasts, costs, dates, and any other vendor columns.
    pub attributes: BTreeMap<String, FieldValue>,
    /// Line in the feed this record was read from, when loaded from CSV.
    #[serde(skip)]
    pub line: Option<usize>,
}

/// Named descriptive fields reachable through [`RawFacilityRecord::get`].
const TEXT_FIELDS: [&str; 6] = ["company", "city", "country", "region", "campus_name_raw", "status"];

impl RawFacilityRecord {
    fn text_slot(&self, name: &str) -> Option<&Option<String>> {
        match name {
            "company" => Some(&self.company),
            "city" => Some(&self.city),
            "country" => Some(&self.country),
            "region" => Some(&self.region),
            "campus_name_raw" => Some(&self.campus_name_raw),
            "status" => Some(&self.status),
            _ => None,
        }
    }

    fn text_slot_mut(&mut self, name: &str) -> Option<&mut Option<String>> {
        match name {
            "company" => Some(&mut self.company),
            "city" => Some(&mut self.city),
            "country" => Some(&mut self.country),
            "region" => Some(&mut self.region),
            "campus_name_raw" => Some(&mut self.campus_name_raw),
            "status" => Some(&mut self.status),
            _ => None,
        }
    }

    /// Look up a descriptive field or attribute by name. Empty values are `None`.
    pub fn get(&self, name: &str) -> Option<FieldValue> {
        let value = match self.text_slot(name) {
            Some(slot) => slot.clone().map(FieldValue::Text),
            None => self.attributes.get(name).cloned(),
        };
        value.filter(FieldValue::is_filled)
    }

    pub fn is_filled(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Overwrite a descriptive field or attribute.
    pub fn set(&mut self, name: &str, value: FieldValue) {
        match self.text_slot_mut(name) {
            Some(slot) => *slot = Some(value.to_string()),
            None => {
                self.attributes.insert(name.to_string(), value);
            }
        }
    }

    pub fn is_text_field(name: &str) -> bool {
        TEXT_FIELDS.contains(&name)
    }
}

/// Pre-loaded records plus the coercion errors found while loading them.
#[derive(Debug, Clone, Default)]
pub struct ConsensusInput {
    pub records: Vec<RawFacilityRecord>,
    pub field_errors: FieldErrors,
}

// ---------------------------------------------------------------------------
// Normalized records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalKey {
    pub unique_id: String,
    pub campus_id: String,
    /// Campus name after parsing rules (separator / suffix stripping).
    pub campus_name: Option<String>,
    /// Building designation split off the raw name, if any.
    pub building: Option<String>,
    pub unknown_id_fallback: bool,
}

/// A raw record with its canonical key and usable coordinate.
#[derive(Debug, Clone)]
pub struct FacilityRecord {
    pub raw: RawFacilityRecord,
    pub key: CanonicalKey,
    /// `None` when the record is unlocated.
    pub coordinate: Option<Coordinate>,
}

impl FacilityRecord {
    pub fn source(&self) -> &str {
        &self.raw.source
    }

    pub fn unique_id(&self) -> &str {
        &self.key.unique_id
    }
}

// ---------------------------------------------------------------------------
// Clusters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Cluster {
    /// Stable id, 1-based, ordered located-first then by smallest unique_id.
    pub id: usize,
    /// Indices into the normalized record list.
    pub members: Vec<usize>,
    pub located: bool,
    pub centroid: Option<Coordinate>,
    pub display_name: String,
    /// Largest pairwise member distance.
    pub span_m: Option<f64>,
    /// Span exceeds the threshold: members were joined through intermediaries.
    pub chained: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub cluster_id: usize,
    pub display_name: String,
    pub located: bool,
    pub record_count: usize,
    pub source_count: usize,
    pub sources: Vec<String>,
    pub member_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub centroid: Option<Coordinate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_m: Option<f64>,
    pub chained: bool,
}

// ---------------------------------------------------------------------------
// Consensus output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeProvenance {
    pub field: String,
    pub source: String,
    pub unique_id: String,
}

/// Building-level merged record for one cluster.
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusRecord {
    pub cluster_id: usize,
    pub unique_id: String,
    pub source: String,
    pub campus_id: String,
    pub display_name: String,
    pub campus_name: Option<String>,
    pub building: Option<String>,
    pub company: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub status: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub attributes: BTreeMap<String, FieldValue>,
    pub consensus_score: f64,
    pub source_count: usize,
    pub sources_available: Vec<String>,
    pub merged_from: Vec<MergeProvenance>,
    pub member_ids: Vec<String>,
    pub located: bool,
    pub unknown_id_fallback: bool,
}

impl ConsensusRecord {
    pub fn coordinate(&self) -> Option<Coordinate> {
        Coordinate::from_parts(self.latitude, self.longitude)
    }
}

/// Campus-level rollup of building records sharing a campus_id.
#[derive(Debug, Clone, Serialize)]
pub struct CampusRecord {
    pub campus_id: String,
    pub display_name: String,
    pub campus_name: Option<String>,
    pub company: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub status: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub attributes: BTreeMap<String, FieldValue>,
    pub building_count: usize,
    pub building_ids: Vec<String>,
    pub source_count: usize,
    pub sources_available: Vec<String>,
    /// Mean of the buildings' consensus scores.
    pub consensus_score: f64,
    pub unknown_id_fallback: bool,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ConsensusSummary {
    pub total_records: usize,
    pub located_records: usize,
    pub unlocated_records: usize,
    pub clusters: usize,
    pub multi_source_clusters: usize,
    pub chained_clusters: usize,
    pub merged_records: usize,
    pub campuses: usize,
    pub unknown_id_fallbacks: usize,
    pub field_errors: FieldErrors,
    /// Source of the primary record → number of clusters it won.
    pub winning_sources: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsensusMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub threshold_m: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsensusResult {
    pub meta: ConsensusMeta,
    pub summary: ConsensusSummary,
    pub clusters: Vec<ClusterSummary>,
    pub buildings: Vec<ConsensusRecord>,
    pub campuses: Vec<CampusRecord>,
}

// ---------------------------------------------------------------------------
// Ground truth + Accuracy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct GroundTruthFacility {
    pub building_key: String,
    /// Falls back to the building key when absent.
    pub campus_key: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub region: Option<String>,
    pub status: Option<String>,
    /// IT load in MW, when the ground truth carries it.
    pub it_load_mw: Option<f64>,
}

impl GroundTruthFacility {
    /// Valid means non-null, in range, and not (0, 0).
    pub fn coordinate(&self) -> Option<Coordinate> {
        Coordinate::from_parts(self.latitude, self.longitude)
    }

    pub fn is_valid(&self) -> bool {
        self.coordinate().is_some()
    }

    pub fn campus(&self) -> &str {
        match self.campus_key.as_deref() {
            Some(c) if !c.trim().is_empty() => c,
            _ => &self.building_key,
        }
    }
}

/// Loaded ground truth plus the cells that could not be parsed.
#[derive(Debug, Clone, Default)]
pub struct GroundTruthInput {
    pub facilities: Vec<GroundTruthFacility>,
    pub field_errors: FieldErrors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Building,
    Campus,
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Building => write!(f, "building"),
            Self::Campus => write!(f, "campus"),
        }
    }
}

/// One candidate between a ground-truth entity and a source record.
/// After dedup exactly one pair per (entity, source) is `retained`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchPair {
    pub source: String,
    pub entity_key: String,
    pub unique_id: String,
    pub distance_m: f64,
    pub retained: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBand {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl std::fmt::Display for QualityBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excellent => write!(f, "excellent"),
            Self::Good => write!(f, "good"),
            Self::Fair => write!(f, "fair"),
            Self::Poor => write!(f, "poor"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceStats {
    pub count: usize,
    pub min_m: f64,
    pub p10_m: f64,
    pub p25_m: f64,
    pub median_m: f64,
    pub p75_m: f64,
    pub p90_m: f64,
    pub max_m: f64,
    pub mean_m: f64,
    /// Sample standard deviation; undefined for a single match.
    pub std_m: Option<f64>,
    pub mad_m: f64,
    pub iqr_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdCount {
    pub within_m: f64,
    pub count: usize,
    pub pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandCount {
    pub band: QualityBand,
    pub count: usize,
    pub pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceAccuracy {
    pub source: String,
    pub detected: usize,
    pub denominator: usize,
    pub recall_pct: f64,
    pub stats: Option<DistanceStats>,
    pub thresholds: Vec<ThresholdCount>,
    pub bands: Vec<BandCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupAccuracy {
    pub group: String,
    pub denominator: usize,
    pub sources: Vec<SourceAccuracy>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorstCase {
    pub source: String,
    pub entity_key: String,
    pub unique_id: String,
    pub distance_m: f64,
    pub band: QualityBand,
}

#[derive(Debug, Clone, Serialize)]
pub struct GranularityReport {
    pub granularity: Granularity,
    pub denominator: usize,
    pub candidates: usize,
    pub retained: usize,
    pub sources: Vec<SourceAccuracy>,
    pub by_region: Vec<GroupAccuracy>,
    pub by_status: Vec<GroupAccuracy>,
    pub worst_cases: Vec<WorstCase>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccuracyMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub search_radius_m: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccuracyReport {
    pub meta: AccuracyMeta,
    pub ground_truth_total: usize,
    pub ground_truth_valid: usize,
    pub ground_truth_invalid: usize,
    pub building: GranularityReport,
    pub campus: GranularityReport,
    pub capacity: CapacityReport,
    pub attributes: AttributeCompleteness,
    /// Ground-truth cells that were unparseable and treated as null.
    pub ground_truth_field_errors: FieldErrors,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacityMetrics {
    /// Pairs where both figures are positive.
    pub n: usize,
    pub actual_mean_mw: Option<f64>,
    pub predicted_mean_mw: Option<f64>,
    pub mae_mw: Option<f64>,
    pub mape_pct: Option<f64>,
    /// Predicted minus actual.
    pub bias_mw: Option<f64>,
    pub bias_pct: Option<f64>,
    pub rmse_mw: Option<f64>,
    pub correlation: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapacityAccuracy {
    pub granularity: Granularity,
    pub source: String,
    pub field: String,
    pub pue_adjusted: bool,
    pub metrics: CapacityMetrics,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CapacityReport {
    pub pue: f64,
    pub min_samples: usize,
    pub rows: Vec<CapacityAccuracy>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldCompleteness {
    pub category: String,
    pub field: String,
    pub filled: usize,
    pub pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceCompleteness {
    pub source: String,
    pub records: usize,
    pub fields: Vec<FieldCompleteness>,
    /// Category → mean of its field percentages.
    pub categories: BTreeMap<String, f64>,
    /// Mean of the category percentages.
    pub overall_pct: f64,
}

/// The source with the highest fill rate for one field.
#[derive(Debug, Clone, Serialize)]
pub struct FieldLeader {
    pub category: String,
    pub field: String,
    pub source: String,
    pub pct: f64,
    pub sources_with_data: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AttributeCompleteness {
    pub sources: Vec<SourceCompleteness>,
    pub leaders: Vec<FieldLeader>,
}

// ---------------------------------------------------------------------------
// Cluster validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ClusterMatch {
    pub cluster_id: usize,
    pub display_name: String,
    pub source_count: usize,
    pub sources: Vec<String>,
    pub campus_key: String,
    pub campus_buildings: usize,
    pub distance_m: f64,
    pub band: QualityBand,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnmatchedCluster {
    pub cluster_id: usize,
    pub display_name: String,
    pub source_count: usize,
    pub sources: Vec<String>,
    /// Single-source clusters with no nearby ground truth.
    pub likely_false_positive: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UndetectedCampus {
    pub campus_key: String,
    pub building_count: usize,
    pub statuses: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterValidation {
    pub clusters_checked: usize,
    pub campuses_total: usize,
    pub campuses_detected: usize,
    pub matched: Vec<ClusterMatch>,
    pub unmatched: Vec<UnmatchedCluster>,
    pub undetected: Vec<UndetectedCampus>,
}
