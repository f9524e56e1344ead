use tracing::info;

use crate::domain::{EntityType, WikipediaGoldRow, WikipediaSilverRow};
use crate::observability::metrics;
use crate::scores;

use super::text::wikipedia_embedding_text;
use super::{correlation_uuid, LocationDirectory};

/// Content length at which an article's summary is considered complete
/// for confidence purposes.
const FULL_CONTENT_CHARS: f64 = 2000.0;

/// Advances wikipedia silver rows to gold: correlation identity,
/// hierarchy, join keys for cross-entity matching, and the overall
/// confidence score.
pub struct WikipediaGoldProcessor<'a> {
    directory: &'a LocationDirectory,
}

impl<'a> WikipediaGoldProcessor<'a> {
    pub fn new(directory: &'a LocationDirectory) -> Self {
        Self { directory }
    }

    pub fn process(&self, silver: &[WikipediaSilverRow]) -> Vec<WikipediaGoldRow> {
        let rows: Vec<WikipediaGoldRow> = silver.iter().map(|row| self.process_row(row)).collect();
        metrics::tiers::records_processed("wikipedia", "gold", rows.len() as u64);
        info!(rows = rows.len(), "wikipedia gold tier materialized");
        rows
    }

    fn process_row(&self, silver: &WikipediaSilverRow) -> WikipediaGoldRow {
        let hierarchy = self.directory.resolve(
            silver.city_normalized.as_deref(),
            silver.state_normalized.as_deref(),
        );

        let content_ratio = silver
            .long_summary
            .as_deref()
            .map(|s| (s.len() as f64 / FULL_CONTENT_CHARS).min(1.0));

        WikipediaGoldRow {
            correlation_uuid: correlation_uuid(
                EntityType::Wikipedia,
                &silver.page_id.to_string(),
            ),
            county_resolved: hierarchy.county_resolved,
            parent_city: hierarchy.parent_city,
            parent_county: hierarchy.parent_county,
            parent_state: hierarchy.parent_state,
            city_relevance: silver.city_normalized.clone(),
            location_context: hierarchy.location_hierarchy.clone(),
            location_hierarchy: hierarchy.location_hierarchy,
            overall_confidence: scores::overall_confidence(
                silver.confidence_score,
                Some(silver.location_relevance_score),
                content_ratio,
            ),
            embedding_text: wikipedia_embedding_text(silver),
            silver: silver.clone(),
        }
    }
}
