use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::wikipedia::{ConfidenceLevel, LocationSpecificity, RelevanceCategory};
use crate::domain::{BronzeRow, ValidationStatus, WikipediaRecord, WikipediaSilverRow};
use crate::observability::metrics;

use super::{
    clean_text, normalize_array, status_for, weighted_presence_score, LocationLookup,
    WIKIPEDIA_QUALITY_THRESHOLD,
};

/// Minimum extraction confidence for an article's city/state to count
/// as a valid location.
pub const LOCATION_CONFIDENCE_GATE: f64 = 0.6;

/// Cleans wikipedia bronze rows: applies the location-confidence gate,
/// derives specificity and relevance categories, and scores quality.
pub struct WikipediaSilverProcessor {
    lookup: Arc<LocationLookup>,
}

impl WikipediaSilverProcessor {
    pub fn new(lookup: Arc<LocationLookup>) -> Self {
        Self { lookup }
    }

    pub fn process(
        &self,
        bronze: &[BronzeRow<WikipediaRecord>],
        processed_at: DateTime<Utc>,
    ) -> Vec<WikipediaSilverRow> {
        let mut rows = Vec::with_capacity(bronze.len());
        let mut dropped = 0usize;
        let mut low_quality = 0usize;
        for row in bronze {
            let Some(page_id) = row.record.page_id.filter(|id| *id > 0) else {
                dropped += 1;
                warn!("wikipedia silver: dropping row with invalid page_id");
                continue;
            };
            let silver = self.process_row(page_id, row, processed_at);
            if silver.validation_status == ValidationStatus::LowQuality {
                low_quality += 1;
            }
            metrics::tiers::quality_score("wikipedia", silver.data_quality_score);
            rows.push(silver);
        }
        metrics::tiers::records_processed("wikipedia", "silver", rows.len() as u64);
        metrics::tiers::records_low_quality("wikipedia", low_quality as u64);
        info!(
            rows = rows.len(),
            dropped, low_quality, "wikipedia silver tier materialized"
        );
        rows
    }

    fn process_row(
        &self,
        page_id: i64,
        bronze: &BronzeRow<WikipediaRecord>,
        processed_at: DateTime<Utc>,
    ) -> WikipediaSilverRow {
        let record = &bronze.record;
        let title = clean_text(record.title.as_deref());
        let short_summary = clean_text(record.short_summary.as_deref());
        let long_summary = clean_text(record.long_summary.as_deref());
        let best_city = clean_text(record.best_city.as_deref());
        let best_state = clean_text(record.best_state.as_deref());
        let categories = normalize_array(&record.categories);
        let key_topics = normalize_array(&record.key_topics);
        let confidence_score = record.confidence_score.map(|c| c.clamp(0.0, 1.0));

        // City/state pass the gate only with sufficient extraction
        // confidence; below the gate they stay raw but unvalidated.
        let gate_open = confidence_score.map(|c| c >= LOCATION_CONFIDENCE_GATE).unwrap_or(false);
        let city_validated = if gate_open { best_city.clone() } else { None };
        let state_validated = if gate_open { best_state.clone() } else { None };
        let has_valid_location = city_validated.is_some() || state_validated.is_some();

        let location_specificity = match (&city_validated, &state_validated) {
            (Some(_), Some(_)) => LocationSpecificity::CityAndState,
            (None, Some(_)) => LocationSpecificity::StateOnly,
            (Some(_), None) => LocationSpecificity::CityOnly,
            (None, None) => LocationSpecificity::None,
        };

        let long_summary_len = long_summary.as_deref().map(|s| s.len()).unwrap_or(0);
        let location_relevance_score = {
            let mut score = 0.0;
            if has_valid_location {
                score += 0.4;
            }
            score += confidence_score.unwrap_or(0.0) * 0.3;
            if long_summary_len > 500 {
                score += 0.15;
            }
            if !key_topics.is_empty() {
                score += 0.15;
            }
            score
        };

        let data_quality_score = if bronze.is_corrupt() {
            0.0
        } else {
            weighted_presence_score(&[
                (true, 0.1), // page_id
                (title.is_some(), 0.1),
                (record.url.is_some(), 0.05),
                (long_summary_len > 100, 0.1),
                (has_valid_location, 0.15),
                (gate_open, 0.15),
                (!key_topics.is_empty(), 0.1),
                (long_summary_len > 200, 0.1),
                (!categories.is_empty(), 0.075),
                (record.relevance_score.map(|r| r > 0.0).unwrap_or(false), 0.075),
            ])
        };
        let validation_status = if bronze.is_corrupt() {
            ValidationStatus::LowQuality
        } else {
            status_for(data_quality_score, WIKIPEDIA_QUALITY_THRESHOLD)
        };

        let city_normalized = city_validated.as_deref().map(|c| self.lookup.normalize_city(c));
        let state_normalized = state_validated.as_deref().map(|s| self.lookup.normalize_state(s));

        WikipediaSilverRow {
            page_id,
            title,
            url: record.url.clone(),
            short_summary,
            long_summary,
            categories,
            key_topics,
            best_city,
            best_state,
            latitude: record.latitude,
            longitude: record.longitude,
            relevance_score: record.relevance_score,
            confidence_score,
            city_validated,
            state_validated,
            has_valid_location,
            location_specificity,
            location_relevance_score,
            relevance_category: RelevanceCategory::from_score(location_relevance_score),
            confidence_level: ConfidenceLevel::from_score(confidence_score),
            city_normalized,
            state_normalized,
            data_quality_score,
            validation_status,
            processed_at,
        }
    }
}
