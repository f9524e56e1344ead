use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::neighborhood::IncomeBracket;
use crate::domain::{
    BronzeRow, NeighborhoodRecord, NeighborhoodSilverRow, ValidationIssue, ValidationStatus,
};
use crate::observability::metrics;

use super::{
    clean_text, normalize_array, status_for, weighted_presence_score, LocationLookup,
    NEIGHBORHOOD_QUALITY_THRESHOLD,
};

/// Cleans neighborhood bronze rows: validates demographic ranges,
/// computes completeness and income brackets, normalizes locations.
pub struct NeighborhoodSilverProcessor {
    lookup: Arc<LocationLookup>,
}

impl NeighborhoodSilverProcessor {
    pub fn new(lookup: Arc<LocationLookup>) -> Self {
        Self { lookup }
    }

    pub fn process(
        &self,
        bronze: &[BronzeRow<NeighborhoodRecord>],
        processed_at: DateTime<Utc>,
    ) -> Vec<NeighborhoodSilverRow> {
        let mut rows = Vec::with_capacity(bronze.len());
        let mut dropped = 0usize;
        let mut low_quality = 0usize;
        for row in bronze {
            let Some(neighborhood_id) = row.record.neighborhood_id.as_deref() else {
                dropped += 1;
                warn!("neighborhood silver: dropping row with null neighborhood_id");
                continue;
            };
            let silver = self.process_row(neighborhood_id, row, processed_at);
            if silver.validation_status == ValidationStatus::LowQuality {
                low_quality += 1;
            }
            metrics::tiers::quality_score("neighborhood", silver.data_quality_score);
            rows.push(silver);
        }
        metrics::tiers::records_processed("neighborhood", "silver", rows.len() as u64);
        metrics::tiers::records_low_quality("neighborhood", low_quality as u64);
        info!(
            rows = rows.len(),
            dropped, low_quality, "neighborhood silver tier materialized"
        );
        rows
    }

    fn process_row(
        &self,
        neighborhood_id: &str,
        bronze: &BronzeRow<NeighborhoodRecord>,
        processed_at: DateTime<Utc>,
    ) -> NeighborhoodSilverRow {
        let record = &bronze.record;
        let (demographics, issues) = validate_demographics(record);

        let name = clean_text(record.name.as_deref());
        let city = clean_text(record.city.as_deref());
        let state = clean_text(record.state.as_deref());
        let description = clean_text(record.description.as_deref());
        let amenities = normalize_array(&record.amenities);
        let characteristics = normalize_array(&record.characteristics);

        let city_normalized = city.as_deref().map(|c| self.lookup.normalize_city(c));
        let state_normalized = state.as_deref().map(|s| self.lookup.normalize_state(s));

        let demographic_completeness = weighted_presence_score(&[
            (demographics.population.is_some(), 0.33),
            (demographics.median_income.is_some(), 0.33),
            (demographics.median_age.is_some(), 0.34),
        ]);

        let data_quality_score = if bronze.is_corrupt() {
            0.0
        } else {
            weighted_presence_score(&[
                (true, 0.1), // neighborhood_id
                (name.is_some(), 0.15),
                (city.is_some(), 0.1),
                (state.is_some(), 0.05),
                (demographics.population.is_some(), 0.08),
                (demographics.median_income.is_some(), 0.08),
                (demographics.median_age.is_some(), 0.09),
                (!amenities.is_empty(), 0.2),
                (description.is_some(), 0.15),
            ])
        };
        let validation_status = if bronze.is_corrupt() {
            ValidationStatus::LowQuality
        } else {
            status_for(data_quality_score, NEIGHBORHOOD_QUALITY_THRESHOLD)
        };

        if !issues.is_empty() {
            warn!(
                neighborhood_id,
                issues = issues.len(),
                "neighborhood silver: demographic values out of range"
            );
        }

        let (latitude, longitude) = match &record.coordinates {
            Some(c) if c.is_valid() => (Some(c.latitude), Some(c.longitude)),
            _ => (None, None),
        };
        let statistics = record.statistics.clone().unwrap_or_default();

        NeighborhoodSilverRow {
            neighborhood_id: neighborhood_id.to_string(),
            name,
            city,
            state,
            county: clean_text(record.county.as_deref()),
            latitude,
            longitude,
            description,
            amenities,
            characteristics,
            population: demographics.population,
            households: demographics.households,
            median_age: demographics.median_age,
            median_income: demographics.median_income,
            demographic_completeness,
            income_bracket: IncomeBracket::from_median_income(demographics.median_income),
            school_rating: record.school_ratings.as_ref().and_then(|r| r.average()),
            safety_rating: statistics.safety_rating,
            walkability_score: statistics.walkability_score,
            avg_home_value: statistics.avg_home_value,
            wikipedia_correlations: record.wikipedia_correlations.clone(),
            city_normalized,
            state_normalized,
            data_quality_score,
            validation_status,
            processed_at,
        }
    }
}

#[derive(Debug, Default)]
struct ValidatedDemographics {
    population: Option<i64>,
    households: Option<i64>,
    median_age: Option<f64>,
    median_income: Option<f64>,
}

/// Range-check demographics; out-of-range values become null and are
/// reported as issues so they subtract from the quality score.
fn validate_demographics(record: &NeighborhoodRecord) -> (ValidatedDemographics, Vec<ValidationIssue>) {
    let mut issues = Vec::new();
    let mut validated = ValidatedDemographics::default();
    let Some(demographics) = &record.demographics else {
        return (validated, issues);
    };

    validated.population = demographics.population.filter(|p| *p >= 0);
    if demographics.population.is_some() && validated.population.is_none() {
        issues.push(ValidationIssue::new("population", "must be non-negative"));
    }
    validated.households = demographics.households.filter(|h| *h >= 0);
    if demographics.households.is_some() && validated.households.is_none() {
        issues.push(ValidationIssue::new("households", "must be non-negative"));
    }
    validated.median_age = demographics.median_age.filter(|a| (0.0..=120.0).contains(a));
    if demographics.median_age.is_some() && validated.median_age.is_none() {
        issues.push(ValidationIssue::new("median_age", "outside 0..=120"));
    }
    validated.median_income = demographics.median_income.filter(|i| *i >= 0.0);
    if demographics.median_income.is_some() && validated.median_income.is_none() {
        issues.push(ValidationIssue::new("median_income", "must be non-negative"));
    }
    (validated, issues)
}
