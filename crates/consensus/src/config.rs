use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ConsensusError;
use crate::identity::slugify;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Every section is optional; an empty document yields the tuned defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsensusConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub sources: SourceConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub campus: CampusConfig,
    #[serde(default)]
    pub naming: NamingConfig,
    #[serde(default)]
    pub regions: RegionConfig,
    #[serde(default)]
    pub columns: ColumnConfig,
    #[serde(default)]
    pub accuracy: AccuracyConfig,
    #[serde(default)]
    pub input: InputConfig,
}

fn default_name() -> String {
    "consensus".into()
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            clustering: ClusteringConfig::default(),
            sources: SourceConfig::default(),
            scoring: ScoringConfig::default(),
            merge: MergeConfig::default(),
            campus: CampusConfig::default(),
            naming: NamingConfig::default(),
            regions: RegionConfig::default(),
            columns: ColumnConfig::default(),
            accuracy: AccuracyConfig::default(),
            input: InputConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Records within this many meters of each other are unioned.
    pub threshold_m: f64,
    /// Fail fast above this many located records (pairwise cost is O(n²)).
    pub max_records: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            threshold_m: 1000.0,
            max_records: 50_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Reliability weight in [0, 1], from measured spatial accuracy.
    pub weights: BTreeMap<String, f64>,
    pub default_weight: f64,
    /// Display-name tie-break order. Lower value wins.
    pub priority: BTreeMap<String, u32>,
    /// Prefix used when building unique ids. Falls back to the slugged name.
    pub tags: BTreeMap<String, String>,
}

pub const DEFAULT_PRIORITY: u32 = 99;

impl Default for SourceConfig {
    fn default() -> Self {
        let weights = [
            ("DataCenterHawk", 1.0),
            ("Semianalysis", 0.95),
            ("DataCenterMap", 0.7),
            ("NewProjectMedia", 0.5),
            ("WoodMac", 0.3),
            ("Synergy", 0.0),
        ];
        let priority = [
            ("DataCenterMap", 1),
            ("Semianalysis", 2),
            ("DataCenterHawk", 3),
            ("NewProjectMedia", 4),
            ("WoodMac", 5),
            ("Synergy", 6),
        ];
        let tags = [
            ("DataCenterMap", "dcm"),
            ("DataCenterHawk", "dch"),
            ("Semianalysis", "semi"),
            ("NewProjectMedia", "npm"),
            ("WoodMac", "woodmac"),
            ("Synergy", "synergy"),
        ];
        Self {
            weights: weights.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            default_weight: 0.1,
            priority: priority.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            tags: tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }
}

impl SourceConfig {
    pub fn weight(&self, source: &str) -> f64 {
        self.weights.get(source).copied().unwrap_or(self.default_weight)
    }

    pub fn priority(&self, source: &str) -> u32 {
        self.priority.get(source).copied().unwrap_or(DEFAULT_PRIORITY)
    }

    pub fn tag(&self, source: &str) -> String {
        match self.tags.get(source) {
            Some(tag) => tag.clone(),
            None => slugify(source).replace('-', "_"),
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub source_weight: f64,
    pub completeness_weight: f64,
    pub capacity_weight: f64,
    /// Any one of these being present earns the capacity bonus.
    pub capacity_fields: Vec<String>,
    /// Category → fields checked for completeness.
    pub completeness: BTreeMap<String, Vec<String>>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let completeness = [
            ("capacity", vec!["commissioned_power_mw", "full_capacity_mw", "mw_2032"]),
            ("facility", vec!["facility_sqft"]),
            ("timeline", vec!["actual_live_date", "construction_started", "cod"]),
            ("cost", vec!["total_cost_usd_million"]),
            ("land", vec!["total_site_acres"]),
        ];
        Self {
            source_weight: 0.5,
            completeness_weight: 0.3,
            capacity_weight: 0.2,
            capacity_fields: strings(&["commissioned_power_mw", "full_capacity_mw"]),
            completeness: completeness
                .iter()
                .map(|(k, v)| (k.to_string(), strings(v)))
                .collect(),
        }
    }
}

impl ScoringConfig {
    /// Completeness fields flattened across categories, in category order.
    pub fn completeness_fields(&self) -> Vec<&str> {
        self.completeness
            .values()
            .flat_map(|fields| fields.iter().map(String::as_str))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Merge + Campus rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub fields: Vec<String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        let mut fields = strings(&[
            "commissioned_power_mw",
            "full_capacity_mw",
            "uc_power_mw",
            "planned_power_mw",
        ]);
        fields.extend((2023..=2032).map(|y| format!("mw_{y}")));
        fields.extend(strings(&[
            "total_cost_usd_million",
            "land_cost_usd_million",
            "total_site_acres",
            "data_center_acres",
            "announced",
            "construction_started",
            "cod",
        ]));
        Self { fields }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CampusConfig {
    /// Numeric fields summed across a campus's buildings.
    pub additive_fields: Vec<String>,
    /// Additive fields whose zero total is reported as null. Other additive
    /// fields keep a zero total when any building reports the field.
    pub null_when_zero: Vec<String>,
}

impl Default for CampusConfig {
    fn default() -> Self {
        let totals = strings(&["commissioned_power_mw", "full_capacity_mw", "facility_sqft"]);
        let mut additive_fields = totals.clone();
        additive_fields.extend((2023..=2032).map(|y| format!("mw_{y}")));
        Self {
            additive_fields,
            null_when_zero: totals,
        }
    }
}

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// One campus-name parsing rule. Rules are tried in order; first match wins.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", content = "token", rename_all = "snake_case")]
pub enum NameRule {
    /// `"Altoona - Building 3"` splits into campus + building designation.
    Separator(String),
    /// `"Altoona Campus"` loses the suffix.
    Suffix(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub rules: Vec<NameRule>,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            rules: vec![
                NameRule::Separator(" - Building".into()),
                NameRule::Suffix(" Campus".into()),
                NameRule::Suffix(" Data Center".into()),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Regions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Raw region spelling → canonical region.
    pub aliases: BTreeMap<String, String>,
    /// Raw country spelling → canonical country.
    pub country_aliases: BTreeMap<String, String>,
    /// Canonical country → region, used when a record has no region.
    pub countries: BTreeMap<String, String>,
}

impl Default for RegionConfig {
    fn default() -> Self {
        let aliases = [
            ("NorthAmerica", "AMER"),
            ("North America", "AMER"),
            ("NORTHAMERICA", "AMER"),
            ("AMER", "AMER"),
            ("EMEA", "EMEA"),
            ("APAC", "APAC"),
        ];
        let country_aliases = [
            ("USA", "United States"),
            ("US", "United States"),
            ("U.S.", "United States"),
            ("U.S.A.", "United States"),
            ("United States of America", "United States"),
            ("UAE", "United Arab Emirates"),
        ];
        let amer = ["United States", "Canada", "Mexico", "Brazil", "Chile", "Colombia", "Argentina"];
        let emea = [
            "United Kingdom",
            "Ireland",
            "Germany",
            "France",
            "Netherlands",
            "Sweden",
            "Denmark",
            "Norway",
            "Finland",
            "Spain",
            "Italy",
            "Poland",
            "Serbia",
            "United Arab Emirates",
            "Saudi Arabia",
            "Israel",
            "South Africa",
        ];
        let apac = [
            "Singapore",
            "Japan",
            "Australia",
            "New Zealand",
            "India",
            "Indonesia",
            "Malaysia",
            "Taiwan",
            "South Korea",
            "Hong Kong",
            "Philippines",
            "Thailand",
            "Vietnam",
            "China",
        ];
        let mut countries = BTreeMap::new();
        for (region, list) in [("AMER", &amer[..]), ("EMEA", &emea[..]), ("APAC", &apac[..])] {
            for c in list {
                countries.insert(c.to_string(), region.to_string());
            }
        }
        Self {
            aliases: aliases.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            country_aliases: country_aliases
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            countries,
        }
    }
}

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    /// Canonical attribute → candidate header names, most preferred first.
    pub aliases: BTreeMap<String, Vec<String>>,
    /// Attribute columns parsed as numbers (malformed → null, counted).
    pub numeric_fields: Vec<String>,
    /// Attribute columns parsed as dates (malformed → null, counted).
    pub date_fields: Vec<String>,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        let aliases: [(&str, &[&str]); 13] = [
            ("source", &["source_name", "source", "vendor"]),
            ("source_record_id", &["source_record_id", "source_unique_id", "source_id", "id"]),
            ("company", &["company", "company_clean", "company_name"]),
            ("city", &["city"]),
            ("country", &["country"]),
            ("region", &["region", "region_derived"]),
            ("latitude", &["latitude", "lat", "shape_y"]),
            ("longitude", &["longitude", "lon", "lng", "shape_x"]),
            ("campus_name", &["campus_name_raw", "campus_name", "facility_name", "name"]),
            ("status", &["status", "facility_status", "new_build_status"]),
            ("building_key", &["building_key", "canonical_datacenter", "datacenter"]),
            ("campus_key", &["campus_key", "canonical_location_key", "location_key"]),
            ("it_load_mw", &["it_load_mw", "it_load_total", "capacity_mw"]),
        ];
        let mut numeric_fields = strings(&[
            "commissioned_power_mw",
            "full_capacity_mw",
            "uc_power_mw",
            "planned_power_mw",
            "facility_sqft",
            "total_cost_usd_million",
            "land_cost_usd_million",
            "total_site_acres",
            "data_center_acres",
        ]);
        numeric_fields.extend((2023..=2032).map(|y| format!("mw_{y}")));
        Self {
            aliases: aliases
                .iter()
                .map(|(k, v)| (k.to_string(), strings(v)))
                .collect(),
            numeric_fields,
            date_fields: strings(&["announced", "construction_started", "cod", "actual_live_date"]),
        }
    }
}

impl ColumnConfig {
    pub fn is_numeric(&self, field: &str) -> bool {
        self.numeric_fields.iter().any(|f| f == field)
    }

    pub fn is_date(&self, field: &str) -> bool {
        self.date_fields.iter().any(|f| f == field)
    }
}

// ---------------------------------------------------------------------------
// Accuracy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccuracyConfig {
    /// Candidate matches farther than this are ignored.
    pub search_radius_m: f64,
    /// Cumulative "within N meters" buckets, ascending.
    pub thresholds_m: Vec<f64>,
    pub bands: QualityBands,
    /// Largest-distance matches kept per source for manual QA.
    pub worst_case_k: usize,
    /// Radius for matching cluster centroids to ground-truth campuses.
    pub cluster_match_radius_m: f64,
    pub capacity: CapacityAccuracyConfig,
    pub attributes: AttributeAuditConfig,
}

impl Default for AccuracyConfig {
    fn default() -> Self {
        Self {
            search_radius_m: 5000.0,
            thresholds_m: vec![100.0, 500.0, 1000.0, 3000.0, 5000.0],
            bands: QualityBands::default(),
            worst_case_k: 25,
            cluster_match_radius_m: 5000.0,
            capacity: CapacityAccuracyConfig::default(),
            attributes: AttributeAuditConfig::default(),
        }
    }
}

/// Category → attributes whose fill rate is reported per source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AttributeAuditConfig {
    pub categories: BTreeMap<String, Vec<String>>,
}

impl Default for AttributeAuditConfig {
    fn default() -> Self {
        let forecast: Vec<String> = (2023..=2032).map(|y| format!("mw_{y}")).collect();
        let categories = [
            (
                "capacity_current",
                strings(&[
                    "commissioned_power_mw",
                    "uc_power_mw",
                    "planned_power_mw",
                    "planned_plus_uc_mw",
                    "full_capacity_mw",
                    "available_power_kw",
                ]),
            ),
            ("capacity_forecast", forecast),
            ("facility_details", strings(&["facility_sqft", "whitespace_sqft", "pue"])),
            ("cost_data", strings(&["total_cost_usd_million", "land_cost_usd_million"])),
            ("land_data", strings(&["total_site_acres", "data_center_acres"])),
            (
                "infrastructure",
                strings(&["power_provider", "power_grid", "tier_design", "feed_config", "substation_count", "onsite_substation"]),
            ),
            (
                "timeline",
                strings(&[
                    "announced",
                    "land_acquisition",
                    "permitting",
                    "construction_started",
                    "cod",
                    "actual_live_date",
                    "date_reported",
                ]),
            ),
            ("classification", strings(&["status", "owned_leased", "building_type", "type_category", "purpose"])),
        ];
        Self {
            categories: categories.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }
}

/// Vendor MW compared against ground-truth IT load on the retained matches.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CapacityAccuracyConfig {
    /// Vendor attributes compared, in report order.
    pub vendor_fields: Vec<String>,
    /// Sources that report facility power; their figures are divided by `pue`.
    pub facility_power_sources: Vec<String>,
    pub pue: f64,
    /// Error metrics need at least this many comparable pairs.
    pub min_samples: usize,
}

impl Default for CapacityAccuracyConfig {
    fn default() -> Self {
        Self {
            vendor_fields: strings(&["mw_2023", "mw_2024", "commissioned_power_mw", "full_capacity_mw"]),
            facility_power_sources: strings(&["DataCenterHawk"]),
            pue: 1.3,
            min_samples: 5,
        }
    }
}

impl CapacityAccuracyConfig {
    pub fn pue_divisor(&self, source: &str) -> Option<f64> {
        self.facility_power_sources
            .iter()
            .any(|s| s == source)
            .then_some(self.pue)
    }
}

/// Excellent `< excellent_below_m`, Good `< good_below_m`, Fair `<= fair_up_to_m`.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize)]
#[serde(default)]
pub struct QualityBands {
    pub excellent_below_m: f64,
    pub good_below_m: f64,
    pub fair_up_to_m: f64,
}

impl Default for QualityBands {
    fn default() -> Self {
        Self {
            excellent_below_m: 1000.0,
            good_below_m: 3000.0,
            fair_up_to_m: 5000.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub records: Option<String>,
    #[serde(default)]
    pub ground_truth: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ConsensusConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConsensusError> {
        let config: ConsensusConfig =
            toml::from_str(input).map_err(|e| ConsensusError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConsensusError> {
        let invalid =
            |msg: String| -> Result<(), ConsensusError> { Err(ConsensusError::ConfigValidation(msg)) };

        if !(self.clustering.threshold_m > 0.0) {
            return invalid(format!(
                "clustering.threshold_m must be positive, got {}",
                self.clustering.threshold_m
            ));
        }
        if self.clustering.max_records == 0 {
            return invalid("clustering.max_records must be at least 1".into());
        }

        if !(0.0..=1.0).contains(&self.sources.default_weight) {
            return invalid(format!(
                "sources.default_weight must be in [0, 1], got {}",
                self.sources.default_weight
            ));
        }
        for (source, w) in &self.sources.weights {
            if !(0.0..=1.0).contains(w) {
                return invalid(format!("sources.weights.{source} must be in [0, 1], got {w}"));
            }
        }

        let s = &self.scoring;
        for (name, w) in [
            ("source_weight", s.source_weight),
            ("completeness_weight", s.completeness_weight),
            ("capacity_weight", s.capacity_weight),
        ] {
            if !(w >= 0.0) {
                return invalid(format!("scoring.{name} must be non-negative, got {w}"));
            }
        }
        if !(s.source_weight + s.completeness_weight + s.capacity_weight > 0.0) {
            return invalid("scoring weights must not all be zero".into());
        }

        if self.merge.fields.iter().any(|f| f.trim().is_empty()) {
            return invalid("merge.fields must not contain empty names".into());
        }
        if self.campus.additive_fields.iter().any(|f| f.trim().is_empty()) {
            return invalid("campus.additive_fields must not contain empty names".into());
        }
        for field in &self.campus.additive_fields {
            if !self.columns.is_numeric(field) {
                return invalid(format!(
                    "campus.additive_fields entry '{field}' must also be listed in columns.numeric_fields"
                ));
            }
        }
        for field in &self.campus.null_when_zero {
            if !self.campus.additive_fields.contains(field) {
                return invalid(format!(
                    "campus.null_when_zero entry '{field}' is not an additive field"
                ));
            }
        }
        for rule in &self.naming.rules {
            let (NameRule::Separator(token) | NameRule::Suffix(token)) = rule;
            if token.is_empty() {
                return invalid("naming.rules tokens must not be empty".into());
            }
        }

        let a = &self.accuracy;
        if !(a.search_radius_m > 0.0) {
            return invalid(format!(
                "accuracy.search_radius_m must be positive, got {}",
                a.search_radius_m
            ));
        }
        if !(a.cluster_match_radius_m > 0.0) {
            return invalid(format!(
                "accuracy.cluster_match_radius_m must be positive, got {}",
                a.cluster_match_radius_m
            ));
        }
        if a.thresholds_m.iter().any(|t| !(*t > 0.0)) {
            return invalid("accuracy.thresholds_m must be positive".into());
        }
        if a.thresholds_m.windows(2).any(|w| w[0] >= w[1]) {
            return invalid("accuracy.thresholds_m must be strictly ascending".into());
        }
        let b = &a.bands;
        if !(b.excellent_below_m > 0.0
            && b.excellent_below_m < b.good_below_m
            && b.good_below_m < b.fair_up_to_m)
        {
            return invalid(format!(
                "accuracy.bands must satisfy 0 < excellent ({}) < good ({}) < fair ({})",
                b.excellent_below_m, b.good_below_m, b.fair_up_to_m
            ));
        }
        if a.worst_case_k == 0 {
            return invalid("accuracy.worst_case_k must be at least 1".into());
        }
        let c = &a.capacity;
        if !(c.pue >= 1.0) {
            return invalid(format!("accuracy.capacity.pue must be at least 1, got {}", c.pue));
        }
        if c.min_samples == 0 {
            return invalid("accuracy.capacity.min_samples must be at least 1".into());
        }
        if c.vendor_fields.iter().any(|f| f.trim().is_empty()) {
            return invalid("accuracy.capacity.vendor_fields must not contain empty names".into());
        }
        for (category, fields) in &a.attributes.categories {
            if fields.is_empty() || fields.iter().any(|f| f.trim().is_empty()) {
                return invalid(format!("accuracy.attributes category '{category}' needs non-empty field names"));
            }
        }

        Ok(())
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = ConsensusConfig::from_toml("").unwrap();
        assert_eq!(config.name, "consensus");
        assert_eq!(config.clustering.threshold_m, 1000.0);
        assert_eq!(config.sources.weight("DataCenterHawk"), 1.0);
        assert_eq!(config.sources.weight("SomeNewVendor"), 0.1);
        assert_eq!(config.scoring.source_weight, 0.5);
        assert_eq!(config.scoring.completeness_fields().len(), 9);
        assert_eq!(config.accuracy.thresholds_m, vec![100.0, 500.0, 1000.0, 3000.0, 5000.0]);
        assert_eq!(config.accuracy.worst_case_k, 25);
        assert!(config.merge.fields.contains(&"mw_2032".to_string()));
        assert!(config.input.records.is_none());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let input = r#"
name = "Meta campuses"

[clustering]
threshold_m = 2500

[sources.weights]
DataCenterHawk = 0.8
AcmeMaps = 0.4

[accuracy.bands]
excellent_below_m = 500
"#;
        let config = ConsensusConfig::from_toml(input).unwrap();
        assert_eq!(config.name, "Meta campuses");
        assert_eq!(config.clustering.threshold_m, 2500.0);
        assert_eq!(config.clustering.max_records, 50_000);
        assert_eq!(config.sources.weight("AcmeMaps"), 0.4);
        // Table replaces the default weights wholesale
        assert_eq!(config.sources.weight("Semianalysis"), 0.1);
        assert_eq!(config.accuracy.bands.excellent_below_m, 500.0);
        assert_eq!(config.accuracy.bands.good_below_m, 3000.0);
    }

    #[test]
    fn naming_rules_keep_declared_order() {
        let input = r#"
[[naming.rules]]
kind = "suffix"
token = " DC"

[[naming.rules]]
kind = "separator"
token = " / Hall"
"#;
        let config = ConsensusConfig::from_toml(input).unwrap();
        assert_eq!(
            config.naming.rules,
            vec![NameRule::Suffix(" DC".into()), NameRule::Separator(" / Hall".into())]
        );
    }

    #[test]
    fn source_tag_falls_back_to_slug() {
        let config = ConsensusConfig::default();
        assert_eq!(config.sources.tag("DataCenterMap"), "dcm");
        assert_eq!(config.sources.tag("Acme Maps"), "acme_maps");
        assert_eq!(config.sources.priority("Acme Maps"), DEFAULT_PRIORITY);
    }

    #[test]
    fn reject_non_positive_threshold() {
        let err = ConsensusConfig::from_toml("[clustering]\nthreshold_m = 0").unwrap_err();
        assert!(err.to_string().contains("threshold_m must be positive"));
    }

    #[test]
    fn reject_weight_out_of_range() {
        let err = ConsensusConfig::from_toml("[sources.weights]\nAcme = 1.5").unwrap_err();
        assert!(err.to_string().contains("sources.weights.Acme"));
    }

    #[test]
    fn reject_unsorted_thresholds() {
        let err =
            ConsensusConfig::from_toml("[accuracy]\nthresholds_m = [500, 100]").unwrap_err();
        assert!(err.to_string().contains("strictly ascending"));
    }

    #[test]
    fn reject_overlapping_bands() {
        let input = "[accuracy.bands]\nexcellent_below_m = 3000\ngood_below_m = 1000";
        let err = ConsensusConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("accuracy.bands"));
    }

    #[test]
    fn reject_unknown_rule_kind() {
        let input = "[[naming.rules]]\nkind = \"prefix\"\ntoken = \"DC \"";
        assert!(ConsensusConfig::from_toml(input).is_err());
    }

    #[test]
    fn default_merge_fields_include_capacity() {
        let config = ConsensusConfig::default();
        for field in ["commissioned_power_mw", "full_capacity_mw", "uc_power_mw", "planned_power_mw"] {
            assert!(config.merge.fields.iter().any(|f| f == field), "{field}");
        }
        config.validate().unwrap();
    }

    #[test]
    fn reject_additive_field_that_is_not_numeric() {
        let input = r#"
[campus]
additive_fields = ["full_capacity_mw", "whitespace_sqft"]
"#;
        let err = ConsensusConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("'whitespace_sqft'"));
        assert!(err.to_string().contains("columns.numeric_fields"));

        let fixed = r#"
[campus]
additive_fields = ["full_capacity_mw", "whitespace_sqft"]
null_when_zero = ["full_capacity_mw"]

[columns]
numeric_fields = ["full_capacity_mw", "whitespace_sqft"]
"#;
        assert!(ConsensusConfig::from_toml(fixed).is_ok());
    }

    #[test]
    fn reject_null_when_zero_outside_additive() {
        let input = "[campus]\nnull_when_zero = [\"total_site_acres\"]";
        let err = ConsensusConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("null_when_zero"));
    }

    #[test]
    fn capacity_section_parses() {
        let input = r#"
[accuracy.capacity]
vendor_fields = ["mw_2023"]
facility_power_sources = ["DataCenterHawk", "WoodMac"]
pue = 1.5
"#;
        let config = ConsensusConfig::from_toml(input).unwrap();
        let c = &config.accuracy.capacity;
        assert_eq!(c.vendor_fields, vec!["mw_2023"]);
        assert_eq!(c.min_samples, 5);
        assert_eq!(c.pue_divisor("WoodMac"), Some(1.5));
        assert_eq!(c.pue_divisor("Semianalysis"), None);
    }

    #[test]
    fn reject_pue_below_one() {
        let err = ConsensusConfig::from_toml("[accuracy.capacity]\npue = 0.8").unwrap_err();
        assert!(err.to_string().contains("accuracy.capacity.pue"));
    }

    #[test]
    fn reject_zero_worst_case() {
        let err = ConsensusConfig::from_toml("[accuracy]\nworst_case_k = 0").unwrap_err();
        assert!(err.to_string().contains("worst_case_k"));
    }
}
