use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::property::{PriceCategory, SizeCategory};
use crate::domain::{BronzeRow, PropertyRecord, PropertySilverRow, ValidationIssue, ValidationStatus};
use crate::observability::metrics;

use super::{
    clean_text, normalize_array, status_for, weighted_presence_score, LocationLookup,
    PROPERTY_QUALITY_THRESHOLD,
};

/// Cleans property bronze rows into the silver table: flattens the
/// nested address, computes derived pricing fields, normalizes arrays
/// and locations, and scores data quality.
pub struct PropertySilverProcessor {
    lookup: Arc<LocationLookup>,
}

impl PropertySilverProcessor {
    pub fn new(lookup: Arc<LocationLookup>) -> Self {
        Self { lookup }
    }

    pub fn process(
        &self,
        bronze: &[BronzeRow<PropertyRecord>],
        processed_at: DateTime<Utc>,
    ) -> Vec<PropertySilverRow> {
        let mut rows = Vec::with_capacity(bronze.len());
        let mut dropped = 0usize;
        let mut low_quality = 0usize;
        for row in bronze {
            let Some(listing_id) = row.record.listing_id.as_deref() else {
                // The only hard drop in the pipeline: a row with no
                // primary key cannot be correlated downstream.
                dropped += 1;
                warn!("property silver: dropping row with null listing_id");
                continue;
            };
            let silver = self.process_row(listing_id, row, processed_at);
            if silver.validation_status == ValidationStatus::LowQuality {
                low_quality += 1;
            }
            metrics::tiers::quality_score("property", silver.data_quality_score);
            rows.push(silver);
        }
        metrics::tiers::records_processed("property", "silver", rows.len() as u64);
        metrics::tiers::records_low_quality("property", low_quality as u64);
        info!(
            rows = rows.len(),
            dropped, low_quality, "property silver tier materialized"
        );
        rows
    }

    fn process_row(
        &self,
        listing_id: &str,
        bronze: &BronzeRow<PropertyRecord>,
        processed_at: DateTime<Utc>,
    ) -> PropertySilverRow {
        let record = &bronze.record;
        let (clean, issues) = validate_property(record);

        let city_normalized = clean.city.as_deref().map(|c| self.lookup.normalize_city(c));
        let state_normalized = clean.state.as_deref().map(|s| self.lookup.normalize_state(s));

        let price_per_sqft = match (clean.listing_price, clean.square_feet) {
            (Some(price), Some(sqft)) if sqft > 0.0 => Some(price / sqft),
            _ => record.price_per_sqft.filter(|v| *v > 0.0),
        };
        let price_per_bedroom = match (clean.listing_price, clean.bedrooms) {
            (Some(price), Some(bedrooms)) if bedrooms > 0 => Some(price / bedrooms as f64),
            _ => None,
        };

        // A corrupt source row contributes nothing to quality.
        let data_quality_score = if bronze.is_corrupt() {
            0.0
        } else {
            property_quality_score(&clean, !record.features.is_empty())
        };
        let validation_status = if bronze.is_corrupt() {
            ValidationStatus::LowQuality
        } else {
            status_for(data_quality_score, PROPERTY_QUALITY_THRESHOLD)
        };

        if !issues.is_empty() {
            warn!(
                listing_id,
                issues = issues.len(),
                "property silver: validation issues"
            );
        }

        PropertySilverRow {
            listing_id: listing_id.to_string(),
            neighborhood_id: record.neighborhood_id.clone(),
            title: clean_text(record.title.as_deref()),
            street: clean.street,
            city: clean.city,
            state: clean.state,
            zip_code: clean.zip_code,
            county: clean.county,
            latitude: clean.latitude,
            longitude: clean.longitude,
            property_type: clean.property_type,
            bedrooms: clean.bedrooms,
            bathrooms: clean.bathrooms,
            square_feet: clean.square_feet,
            year_built: clean.year_built,
            lot_size: clean.lot_size,
            stories: clean.stories,
            garage_spaces: clean.garage_spaces,
            listing_price: clean.listing_price,
            price_per_sqft,
            price_per_bedroom,
            price_category: PriceCategory::from_price(clean.listing_price),
            size_category: SizeCategory::from_square_feet(clean.square_feet),
            description: clean.description,
            features: normalize_array(&record.features),
            amenities: normalize_array(&record.amenities),
            listing_date: record.listing_date,
            days_on_market: record.days_on_market.filter(|d| *d >= 0),
            price_history: record
                .price_history
                .iter()
                .filter(|event| event.price.map(|p| p > 0.0).unwrap_or(false))
                .cloned()
                .collect(),
            city_normalized,
            state_normalized,
            data_quality_score,
            validation_status,
            processed_at,
        }
    }
}

/// Cleaned scalar fields produced by validation. Out-of-range values
/// are nulled rather than clamped, mirroring how they score as absent.
#[derive(Debug, Default)]
struct CleanProperty {
    street: Option<String>,
    city: Option<String>,
    state: Option<String>,
    zip_code: Option<String>,
    county: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    property_type: Option<String>,
    bedrooms: Option<i64>,
    bathrooms: Option<f64>,
    square_feet: Option<f64>,
    year_built: Option<i64>,
    lot_size: Option<f64>,
    stories: Option<i64>,
    garage_spaces: Option<i64>,
    listing_price: Option<f64>,
    description: Option<String>,
}

fn validate_property(record: &PropertyRecord) -> (CleanProperty, Vec<ValidationIssue>) {
    let mut issues = Vec::new();
    let mut clean = CleanProperty::default();

    if let Some(address) = &record.address {
        clean.street = clean_text(address.street.as_deref());
        clean.city = clean_text(address.city.as_deref());
        clean.state = clean_text(address.state.as_deref());
        clean.zip_code = clean_text(address.zip.as_deref());
        clean.county = clean_text(address.county.as_deref());
    }

    if let Some(coordinates) = &record.coordinates {
        if coordinates.is_valid() {
            clean.latitude = Some(coordinates.latitude);
            clean.longitude = Some(coordinates.longitude);
        } else {
            issues.push(ValidationIssue::new(
                "coordinates",
                format!(
                    "({}, {}) outside valid ranges",
                    coordinates.latitude, coordinates.longitude
                ),
            ));
        }
    }

    let details = &record.details;
    clean.property_type = clean_text(details.property_type.as_deref()).map(|t| t.to_lowercase());

    clean.square_feet = details.square_feet.filter(|v| *v > 0.0);
    if details.square_feet.is_some() && clean.square_feet.is_none() {
        issues.push(ValidationIssue::new("square_feet", "must be positive"));
    }
    clean.bedrooms = details.bedrooms.filter(|v| *v >= 0);
    if details.bedrooms.is_some() && clean.bedrooms.is_none() {
        issues.push(ValidationIssue::new("bedrooms", "must be non-negative"));
    }
    clean.bathrooms = details.bathrooms.filter(|v| *v >= 0.0);
    if details.bathrooms.is_some() && clean.bathrooms.is_none() {
        issues.push(ValidationIssue::new("bathrooms", "must be non-negative"));
    }
    clean.year_built = details.year_built.filter(|y| (1800..=2100).contains(y));
    if details.year_built.is_some() && clean.year_built.is_none() {
        issues.push(ValidationIssue::new("year_built", "outside 1800..=2100"));
    }
    clean.lot_size = details.lot_size.filter(|v| *v >= 0.0);
    clean.stories = details.stories.filter(|v| *v >= 1);
    clean.garage_spaces = details.garage_spaces.filter(|v| *v >= 0);

    clean.listing_price = record.listing_price.filter(|p| *p > 0.0);
    if record.listing_price.is_some() && clean.listing_price.is_none() {
        issues.push(ValidationIssue::new("listing_price", "must be positive"));
    }

    clean.description = clean_text(record.description.as_deref());

    (clean, issues)
}

/// Weighted field-presence score. Essential listing fields carry half
/// the weight, location a quarter, description and metadata the rest.
fn property_quality_score(clean: &CleanProperty, has_features: bool) -> f64 {
    weighted_presence_score(&[
        (true, 0.1), // listing_id: non-null by construction here
        (clean.listing_price.is_some(), 0.15),
        (clean.bedrooms.is_some(), 0.1),
        (clean.bathrooms.is_some(), 0.05),
        (clean.square_feet.is_some(), 0.1),
        (clean.street.is_some(), 0.05),
        (clean.city.is_some(), 0.1),
        (clean.state.is_some(), 0.05),
        (clean.zip_code.is_some(), 0.05),
        (clean.description.is_some(), 0.1),
        (has_features, 0.05),
        (clean.property_type.is_some(), 0.05),
        (clean.year_built.is_some(), 0.05),
    ])
}
