//! Canonical keys. Everything here is a pure function of its inputs.

use serde::Serialize;

use crate::config::{NameRule, RegionConfig};

pub const UNKNOWN_SLUG: &str = "unknown";

/// Lowercase, spell out `&`, and reduce every non-`[a-z0-9]` run to one hyphen.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase().replace('&', " and ");
    let mut slug = String::with_capacity(lowered.len());
    let mut pending_hyphen = false;
    for ch in lowered.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch);
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Result of [`build_campus_id`]. `unknown_fallback` marks ids whose campus
/// segment is the literal `unknown`; such ids can collide across facilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampusId {
    pub id: String,
    pub unknown_fallback: bool,
}

/// `company|city|campus`, with the campus segment falling back to a rounded
/// coordinate slug and then to `unknown`.
pub fn build_campus_id(
    company: Option<&str>,
    city: Option<&str>,
    campus_name: Option<&str>,
    lat: Option<f64>,
    lon: Option<f64>,
) -> CampusId {
    let company = slugify(company.unwrap_or(""));
    let city = slugify(city.unwrap_or(""));
    let mut campus = slugify(campus_name.unwrap_or(""));

    if campus.is_empty() {
        if let (Some(lat), Some(lon)) = (lat, lon) {
            if lat.is_finite() && lon.is_finite() {
                campus = slugify(&format!("{lat:.4},{lon:.4}"));
            }
        }
    }

    let unknown_fallback = campus.is_empty();
    if unknown_fallback {
        campus = UNKNOWN_SLUG.to_string();
    }

    CampusId {
        id: format!("{company}|{city}|{campus}"),
        unknown_fallback,
    }
}

/// `tag_sourceid`. The source id is kept byte-for-byte so re-ingesting a
/// source reproduces the same key. Blank ids yield `None`.
pub fn build_unique_id(source_tag: &str, source_record_id: &str) -> Option<String> {
    let id = source_record_id.trim();
    if id.is_empty() {
        return None;
    }
    Some(format!("{source_tag}_{id}"))
}

// ---------------------------------------------------------------------------
// Campus name parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ParsedName {
    pub campus: Option<String>,
    pub building: Option<String>,
}

/// Apply `rules` in order; the first that matches decides the result.
pub fn parse_campus_name_with(raw_name: Option<&str>, rules: &[NameRule]) -> ParsedName {
    let name = match raw_name.map(str::trim) {
        Some(n) if !n.is_empty() => n,
        _ => return ParsedName::default(),
    };

    for rule in rules {
        match rule {
            NameRule::Separator(token) => {
                if let Some(pos) = name.find(token.as_str()) {
                    let campus = name[..pos].trim();
                    let rest = name[pos + token.len()..].trim();
                    // Keep the designation noun: " - Building 3" → "Building 3"
                    let noun = token.trim_matches(|c: char| !c.is_alphanumeric());
                    let building = match (noun.is_empty(), rest.is_empty()) {
                        (true, true) => None,
                        (true, false) => Some(rest.to_string()),
                        (false, true) => Some(noun.to_string()),
                        (false, false) => Some(format!("{noun} {rest}")),
                    };
                    return ParsedName {
                        campus: non_empty(campus),
                        building,
                    };
                }
            }
            NameRule::Suffix(token) => {
                if let Some(stripped) = name.strip_suffix(token.as_str()) {
                    return ParsedName {
                        campus: non_empty(stripped.trim()),
                        building: None,
                    };
                }
            }
        }
    }

    ParsedName {
        campus: Some(name.to_string()),
        building: None,
    }
}

/// Default rule list: `" - Building"` separator, then `" Campus"` and
/// `" Data Center"` suffixes.
pub fn parse_campus_name(raw_name: Option<&str>) -> ParsedName {
    parse_campus_name_with(raw_name, &crate::config::NamingConfig::default().rules)
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Region
// ---------------------------------------------------------------------------

/// Canonical region for a record: alias-mapped region if given, else the
/// region of its (alias-mapped) country.
pub fn normalize_region(
    region: Option<&str>,
    country: Option<&str>,
    config: &RegionConfig,
) -> Option<String> {
    if let Some(r) = region.map(str::trim).filter(|r| !r.is_empty()) {
        return Some(config.aliases.get(r).cloned().unwrap_or_else(|| r.to_string()));
    }
    let country = normalize_country(country, config)?;
    config.countries.get(&country).cloned()
}

pub fn normalize_country(country: Option<&str>, config: &RegionConfig) -> Option<String> {
    let c = country.map(str::trim).filter(|c| !c.is_empty())?;
    Some(config.country_aliases.get(c).cloned().unwrap_or_else(|| c.to_string()))
}
