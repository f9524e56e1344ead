//! Silver-tier cleaning shared across entities: string and array
//! normalization, the abbreviation dictionaries, and the quality-score
//! machinery that turns validation issues into a status column.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::EnrichmentConfig;
use crate::domain::ValidationStatus;

pub mod neighborhood;
pub mod property;
pub mod wikipedia;

pub use neighborhood::NeighborhoodSilverProcessor;
pub use property::PropertySilverProcessor;
pub use wikipedia::WikipediaSilverProcessor;

/// Quality-score thresholds below which a row is tagged low_quality.
pub const PROPERTY_QUALITY_THRESHOLD: f64 = 0.4;
pub const NEIGHBORHOOD_QUALITY_THRESHOLD: f64 = 0.3;
pub const WIKIPEDIA_QUALITY_THRESHOLD: f64 = 0.5;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Abbreviation dictionaries used for location normalization.
///
/// Lookup is case-insensitive on the abbreviation. Unknown values pass
/// through unchanged (modulo trimming), so `city_normalized` always has
/// a value when the input did.
#[derive(Debug, Clone, Default)]
pub struct LocationLookup {
    cities: HashMap<String, String>,
    states: HashMap<String, String>,
}

impl LocationLookup {
    pub fn from_config(config: &EnrichmentConfig) -> Self {
        Self {
            cities: config
                .city_abbreviations
                .iter()
                .map(|(k, v)| (k.to_uppercase(), v.clone()))
                .collect(),
            states: config
                .state_abbreviations
                .iter()
                .map(|(k, v)| (k.to_uppercase(), v.clone()))
                .collect(),
        }
    }

    pub fn normalize_city(&self, city: &str) -> String {
        let trimmed = city.trim();
        self.cities
            .get(&trimmed.to_uppercase())
            .cloned()
            .unwrap_or_else(|| trimmed.to_string())
    }

    pub fn normalize_state(&self, state: &str) -> String {
        let trimmed = state.trim();
        self.states
            .get(&trimmed.to_uppercase())
            .cloned()
            .unwrap_or_else(|| trimmed.to_string())
    }
}

/// Trim and collapse internal whitespace in a long-form text field.
pub fn clean_text(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(WHITESPACE.replace_all(trimmed, " ").into_owned())
}

/// Normalize a string array: lowercase, trim, deduplicate, sort.
pub fn normalize_array(values: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect();
    cleaned.sort();
    cleaned.dedup();
    cleaned
}

/// Weighted sum of field-presence indicators, clamped to [0, 1].
pub fn weighted_presence_score(parts: &[(bool, f64)]) -> f64 {
    let score: f64 = parts
        .iter()
        .filter(|(present, _)| *present)
        .map(|(_, weight)| weight)
        .sum();
    score.clamp(0.0, 1.0)
}

pub fn status_for(score: f64, threshold: f64) -> ValidationStatus {
    if score >= threshold {
        ValidationStatus::Validated
    } else {
        ValidationStatus::LowQuality
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup() -> LocationLookup {
        LocationLookup::from_config(&EnrichmentConfig::default())
    }

    #[test]
    fn test_normalize_array_dedupes_and_sorts() {
        let input = vec![
            "Pool".to_string(),
            "pool".to_string(),
            "Garage".to_string(),
            "  ".to_string(),
        ];
        assert_eq!(normalize_array(&input), vec!["garage", "pool"]);
    }

    #[test]
    fn test_normalize_array_is_idempotent() {
        let input = vec!["Pool".to_string(), "Garage".to_string()];
        let once = normalize_array(&input);
        assert_eq!(normalize_array(&once), once);
    }

    #[test]
    fn test_city_abbreviation_expansion() {
        let lookup = lookup();
        assert_eq!(lookup.normalize_city("SF"), "San Francisco");
        assert_eq!(lookup.normalize_city("sf"), "San Francisco");
        assert_eq!(lookup.normalize_city("Oakland"), "Oakland");
        assert_eq!(lookup.normalize_city("  Oakland  "), "Oakland");
    }

    #[test]
    fn test_state_abbreviation_expansion() {
        let lookup = lookup();
        assert_eq!(lookup.normalize_state("CA"), "California");
        assert_eq!(lookup.normalize_state("Montana"), "Montana");
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(
            clean_text(Some("  a   spacious\n\thome  ")),
            Some("a spacious home".to_string())
        );
        assert_eq!(clean_text(Some("   ")), None);
        assert_eq!(clean_text(None), None);
    }

    #[test]
    fn test_weighted_presence_score_clamps() {
        assert_eq!(weighted_presence_score(&[(true, 0.6), (true, 0.6)]), 1.0);
        assert_eq!(weighted_presence_score(&[(false, 0.6)]), 0.0);
        let score = weighted_presence_score(&[(true, 0.1), (true, 0.15), (false, 0.5)]);
        assert!((score - 0.25).abs() < 1e-9);
    }
}
