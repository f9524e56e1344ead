use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod location;
pub mod neighborhood;
pub mod property;
pub mod wikipedia;

pub use location::LocationEntry;
pub use neighborhood::{
    Demographics, NeighborhoodGoldRow, NeighborhoodRecord, NeighborhoodSilverRow,
    NeighborhoodStatistics, SchoolRatings, WikiRef, WikipediaCorrelations,
};
pub use property::{
    Address, Coordinates, PriceEvent, PropertyDetails, PropertyGoldRow, PropertyRecord,
    PropertySilverRow,
};
pub use wikipedia::{WikipediaGoldRow, WikipediaRecord, WikipediaSilverRow};

/// The three entity types that travel through the tiered pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Property,
    Neighborhood,
    Wikipedia,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Property => "property",
            EntityType::Neighborhood => "neighborhood",
            EntityType::Wikipedia => "wikipedia",
        }
    }

    /// Name of the document-id field used by downstream sinks.
    pub fn primary_key_field(&self) -> &'static str {
        match self {
            EntityType::Property => "listing_id",
            EntityType::Neighborhood => "neighborhood_id",
            EntityType::Wikipedia => "page_id",
        }
    }

    pub fn all() -> [EntityType; 3] {
        [
            EntityType::Property,
            EntityType::Neighborhood,
            EntityType::Wikipedia,
        ]
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transformation tiers in increasing order of cleanliness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row-level validation outcome carried through silver and gold tables.
/// Rows are never dropped for failing validation; they are tagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Validated,
    LowQuality,
    Pending,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValidationStatus::Validated => "validated",
            ValidationStatus::LowQuality => "low_quality",
            ValidationStatus::Pending => "pending",
        };
        f.write_str(name)
    }
}

/// A single issue found while cleaning a row. The issue list drives the
/// quality score and validation status; it never aborts the row.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub field: &'static str,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Bronze-tier wrapper: a row-for-row image of the source record plus
/// ingestion lineage. Corrupt rows keep the original payload text and
/// whatever typed fields could be salvaged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BronzeRow<T> {
    #[serde(flatten)]
    pub record: T,
    pub corrupt_record: Option<String>,
    pub ingested_at: DateTime<Utc>,
    pub source_file: String,
}

impl<T> BronzeRow<T> {
    pub fn is_corrupt(&self) -> bool {
        self.corrupt_record.is_some()
    }
}
