use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ValidationStatus;

/// Postal address as it appears in listing payloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyDetails {
    pub square_feet: Option<f64>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<f64>,
    pub property_type: Option<String>,
    pub year_built: Option<i64>,
    pub lot_size: Option<f64>,
    pub stories: Option<i64>,
    pub garage_spaces: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceEvent {
    pub date: Option<NaiveDate>,
    pub price: Option<f64>,
    pub event: Option<String>,
}

/// A property listing as read from the source, after type coercion.
/// Every field is optional so corrupt rows can flow through the tiers
/// with nulls instead of being dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub listing_id: Option<String>,
    pub neighborhood_id: Option<String>,
    pub title: Option<String>,
    pub address: Option<Address>,
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub details: PropertyDetails,
    pub listing_price: Option<f64>,
    pub price_per_sqft: Option<f64>,
    pub description: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub amenities: Vec<String>,
    pub listing_date: Option<NaiveDate>,
    pub days_on_market: Option<i64>,
    #[serde(default)]
    pub price_history: Vec<PriceEvent>,
}

/// Price bands assigned at the silver tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriceCategory {
    Budget,
    MidRange,
    HighEnd,
    Luxury,
    Unknown,
}

impl PriceCategory {
    pub fn from_price(price: Option<f64>) -> Self {
        match price {
            Some(p) if p < 200_000.0 => PriceCategory::Budget,
            Some(p) if p < 500_000.0 => PriceCategory::MidRange,
            Some(p) if p < 1_000_000.0 => PriceCategory::HighEnd,
            Some(_) => PriceCategory::Luxury,
            None => PriceCategory::Unknown,
        }
    }
}

/// Square-footage bands assigned at the silver tier. The medium band is
/// inclusive of 2000 sqft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SizeCategory {
    Small,
    Medium,
    Large,
    ExtraLarge,
    Unknown,
}

impl SizeCategory {
    pub fn from_square_feet(square_feet: Option<f64>) -> Self {
        match square_feet {
            Some(s) if s < 1000.0 => SizeCategory::Small,
            Some(s) if s <= 2000.0 => SizeCategory::Medium,
            Some(s) if s < 3500.0 => SizeCategory::Large,
            Some(_) => SizeCategory::ExtraLarge,
            None => SizeCategory::Unknown,
        }
    }
}

/// Cleaned property row. Nested address fields are flattened to
/// top-level columns and derived pricing fields are computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySilverRow {
    pub listing_id: String,
    pub neighborhood_id: Option<String>,
    pub title: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub county: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub property_type: Option<String>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<f64>,
    pub square_feet: Option<f64>,
    pub year_built: Option<i64>,
    pub lot_size: Option<f64>,
    pub stories: Option<i64>,
    pub garage_spaces: Option<i64>,
    pub listing_price: Option<f64>,
    pub price_per_sqft: Option<f64>,
    pub price_per_bedroom: Option<f64>,
    pub price_category: PriceCategory,
    pub size_category: SizeCategory,
    pub description: Option<String>,
    pub features: Vec<String>,
    pub amenities: Vec<String>,
    pub listing_date: Option<NaiveDate>,
    pub days_on_market: Option<i64>,
    pub price_history: Vec<PriceEvent>,
    pub city_normalized: Option<String>,
    pub state_normalized: Option<String>,
    pub data_quality_score: f64,
    pub validation_status: ValidationStatus,
    pub processed_at: DateTime<Utc>,
}

/// Gold property row: silver columns plus reference-data linkage and the
/// canonical embedding text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyGoldRow {
    #[serde(flatten)]
    pub silver: PropertySilverRow,
    pub correlation_uuid: Uuid,
    pub neighborhood_id_resolved: Option<String>,
    pub link_confidence: f64,
    pub county_resolved: Option<String>,
    pub parent_city: Option<String>,
    pub parent_county: Option<String>,
    pub parent_state: Option<String>,
    pub location_hierarchy: Option<String>,
    pub embedding_text: String,
}

impl PropertyGoldRow {
    pub fn primary_key(&self) -> &str {
        &self.silver.listing_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_categories() {
        assert_eq!(PriceCategory::from_price(Some(150_000.0)), PriceCategory::Budget);
        assert_eq!(PriceCategory::from_price(Some(350_000.0)), PriceCategory::MidRange);
        assert_eq!(PriceCategory::from_price(Some(800_000.0)), PriceCategory::HighEnd);
        assert_eq!(PriceCategory::from_price(Some(1_000_000.0)), PriceCategory::Luxury);
        assert_eq!(PriceCategory::from_price(None), PriceCategory::Unknown);
    }

    #[test]
    fn test_size_category_boundary_is_medium() {
        assert_eq!(SizeCategory::from_square_feet(Some(999.0)), SizeCategory::Small);
        assert_eq!(SizeCategory::from_square_feet(Some(2000.0)), SizeCategory::Medium);
        assert_eq!(SizeCategory::from_square_feet(Some(2001.0)), SizeCategory::Large);
        assert_eq!(SizeCategory::from_square_feet(Some(3500.0)), SizeCategory::ExtraLarge);
        assert_eq!(SizeCategory::from_square_feet(None), SizeCategory::Unknown);
    }

    #[test]
    fn test_coordinates_validity() {
        assert!(Coordinates { latitude: 37.77, longitude: -122.42 }.is_valid());
        assert!(!Coordinates { latitude: 91.0, longitude: 0.0 }.is_valid());
        assert!(!Coordinates { latitude: 0.0, longitude: -181.0 }.is_valid());
    }
}
