use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ValidationStatus;

/// A Wikipedia article joined with its summary row, as read from the
/// relational store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WikipediaRecord {
    pub page_id: Option<i64>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub short_summary: Option<String>,
    pub long_summary: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub key_topics: Vec<String>,
    pub best_city: Option<String>,
    pub best_state: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub relevance_score: Option<f64>,
    pub confidence_score: Option<f64>,
}

/// How precisely the article's extracted location pins it down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSpecificity {
    CityAndState,
    StateOnly,
    CityOnly,
    None,
}

/// Relevance bands derived from the composite location-relevance score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceCategory {
    HighlyRelevant,
    Relevant,
    SomewhatRelevant,
    Marginal,
}

impl RelevanceCategory {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            RelevanceCategory::HighlyRelevant
        } else if score >= 0.6 {
            RelevanceCategory::Relevant
        } else if score >= 0.4 {
            RelevanceCategory::SomewhatRelevant
        } else {
            RelevanceCategory::Marginal
        }
    }
}

/// Confidence bands over the extraction confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    VeryHigh,
    High,
    Medium,
    Low,
    VeryLow,
}

impl ConfidenceLevel {
    pub fn from_score(score: Option<f64>) -> Self {
        match score {
            Some(s) if s >= 0.9 => ConfidenceLevel::VeryHigh,
            Some(s) if s >= 0.75 => ConfidenceLevel::High,
            Some(s) if s >= 0.6 => ConfidenceLevel::Medium,
            Some(s) if s >= 0.4 => ConfidenceLevel::Low,
            _ => ConfidenceLevel::VeryLow,
        }
    }
}

/// Cleaned article row with the location-confidence gate applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikipediaSilverRow {
    pub page_id: i64,
    pub title: Option<String>,
    pub url: Option<String>,
    pub short_summary: Option<String>,
    pub long_summary: Option<String>,
    pub categories: Vec<String>,
    pub key_topics: Vec<String>,
    pub best_city: Option<String>,
    pub best_state: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub relevance_score: Option<f64>,
    pub confidence_score: Option<f64>,
    /// City/state accepted only when the extraction confidence clears
    /// the gate.
    pub city_validated: Option<String>,
    pub state_validated: Option<String>,
    pub has_valid_location: bool,
    pub location_specificity: LocationSpecificity,
    pub location_relevance_score: f64,
    pub relevance_category: RelevanceCategory,
    pub confidence_level: ConfidenceLevel,
    pub city_normalized: Option<String>,
    pub state_normalized: Option<String>,
    pub data_quality_score: f64,
    pub validation_status: ValidationStatus,
    pub processed_at: DateTime<Utc>,
}

/// Gold article row: silver columns plus linkage and embedding text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikipediaGoldRow {
    #[serde(flatten)]
    pub silver: WikipediaSilverRow,
    pub correlation_uuid: Uuid,
    pub county_resolved: Option<String>,
    pub parent_city: Option<String>,
    pub parent_county: Option<String>,
    pub parent_state: Option<String>,
    pub location_hierarchy: Option<String>,
    /// Normalized city the article is most relevant to, used by the
    /// cross-entity join.
    pub city_relevance: Option<String>,
    /// Free-form location context ("city, county, state") for substring
    /// matching in the cross-entity join.
    pub location_context: Option<String>,
    pub overall_confidence: f64,
    pub embedding_text: String,
}

impl WikipediaGoldRow {
    pub fn primary_key(&self) -> String {
        self.silver.page_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevance_categories() {
        assert_eq!(RelevanceCategory::from_score(0.85), RelevanceCategory::HighlyRelevant);
        assert_eq!(RelevanceCategory::from_score(0.65), RelevanceCategory::Relevant);
        assert_eq!(RelevanceCategory::from_score(0.45), RelevanceCategory::SomewhatRelevant);
        assert_eq!(RelevanceCategory::from_score(0.1), RelevanceCategory::Marginal);
    }

    #[test]
    fn test_confidence_levels() {
        assert_eq!(ConfidenceLevel::from_score(Some(0.95)), ConfidenceLevel::VeryHigh);
        assert_eq!(ConfidenceLevel::from_score(Some(0.8)), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(Some(0.65)), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(Some(0.5)), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(None), ConfidenceLevel::VeryLow);
    }
}
