use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::property::Coordinates;
use super::ValidationStatus;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Demographics {
    pub population: Option<i64>,
    pub households: Option<i64>,
    pub median_age: Option<f64>,
    pub median_income: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchoolRatings {
    pub elementary: Option<f64>,
    pub middle: Option<f64>,
    pub high: Option<f64>,
}

impl SchoolRatings {
    /// Mean of the ratings that are present.
    pub fn average(&self) -> Option<f64> {
        let present: Vec<f64> = [self.elementary, self.middle, self.high]
            .into_iter()
            .flatten()
            .collect();
        if present.is_empty() {
            None
        } else {
            Some(present.iter().sum::<f64>() / present.len() as f64)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NeighborhoodStatistics {
    pub walkability_score: Option<f64>,
    pub transit_score: Option<f64>,
    pub safety_rating: Option<f64>,
    pub avg_home_value: Option<f64>,
}

/// A reference to a correlated Wikipedia page, preserved verbatim from
/// the neighborhood source payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiRef {
    pub page_id: i64,
    pub title: Option<String>,
    pub url: Option<String>,
    pub confidence: Option<f64>,
    pub relationship: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParentGeography {
    pub city_wiki: Option<WikiRef>,
    pub state_wiki: Option<WikiRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WikipediaCorrelations {
    pub primary: Option<WikiRef>,
    #[serde(default)]
    pub related: Vec<WikiRef>,
    pub parent_geography: Option<ParentGeography>,
}

impl WikipediaCorrelations {
    /// Number of distinct correlated pages (primary plus related).
    pub fn page_count(&self) -> usize {
        self.related.len() + usize::from(self.primary.is_some())
    }
}

/// A neighborhood record as read from the source, after type coercion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NeighborhoodRecord {
    pub neighborhood_id: Option<String>,
    pub name: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub county: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub description: Option<String>,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub characteristics: Vec<String>,
    pub demographics: Option<Demographics>,
    pub school_ratings: Option<SchoolRatings>,
    pub statistics: Option<NeighborhoodStatistics>,
    pub wikipedia_correlations: Option<WikipediaCorrelations>,
}

/// Income bands derived from validated median income.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IncomeBracket {
    Low,
    LowerMiddle,
    Middle,
    UpperMiddle,
    High,
    Unknown,
}

impl IncomeBracket {
    pub fn from_median_income(income: Option<f64>) -> Self {
        match income {
            Some(i) if i < 30_000.0 => IncomeBracket::Low,
            Some(i) if i < 60_000.0 => IncomeBracket::LowerMiddle,
            Some(i) if i < 100_000.0 => IncomeBracket::Middle,
            Some(i) if i < 150_000.0 => IncomeBracket::UpperMiddle,
            Some(_) => IncomeBracket::High,
            None => IncomeBracket::Unknown,
        }
    }
}

/// Cleaned neighborhood row with validated demographics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborhoodSilverRow {
    pub neighborhood_id: String,
    pub name: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub county: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub description: Option<String>,
    pub amenities: Vec<String>,
    pub characteristics: Vec<String>,
    /// Demographics with out-of-range values nulled.
    pub population: Option<i64>,
    pub households: Option<i64>,
    pub median_age: Option<f64>,
    pub median_income: Option<f64>,
    pub demographic_completeness: f64,
    pub income_bracket: IncomeBracket,
    pub school_rating: Option<f64>,
    pub safety_rating: Option<f64>,
    pub walkability_score: Option<f64>,
    pub avg_home_value: Option<f64>,
    pub wikipedia_correlations: Option<WikipediaCorrelations>,
    pub city_normalized: Option<String>,
    pub state_normalized: Option<String>,
    pub data_quality_score: f64,
    pub validation_status: ValidationStatus,
    pub processed_at: DateTime<Utc>,
}

/// Gold neighborhood row: silver columns plus linkage, lifestyle scores
/// and the canonical embedding text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborhoodGoldRow {
    #[serde(flatten)]
    pub silver: NeighborhoodSilverRow,
    pub correlation_uuid: Uuid,
    pub county_resolved: Option<String>,
    pub parent_city: Option<String>,
    pub parent_county: Option<String>,
    pub parent_state: Option<String>,
    pub location_hierarchy: Option<String>,
    pub nightlife_score: f64,
    pub family_friendly_score: f64,
    pub cultural_score: f64,
    pub green_space_score: f64,
    pub knowledge_score: f64,
    pub embedding_text: String,
}

impl NeighborhoodGoldRow {
    pub fn primary_key(&self) -> &str {
        &self.silver.neighborhood_id
    }
}
