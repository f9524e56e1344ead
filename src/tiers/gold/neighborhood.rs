use tracing::info;

use crate::domain::{EntityType, NeighborhoodGoldRow, NeighborhoodSilverRow};
use crate::observability::metrics;
use crate::scores;

use super::text::neighborhood_embedding_text;
use super::{correlation_uuid, LocationDirectory};

/// Advances neighborhood silver rows to gold: correlation identity,
/// hierarchy columns, lifestyle/knowledge scores and embedding text.
pub struct NeighborhoodGoldProcessor<'a> {
    directory: &'a LocationDirectory,
}

impl<'a> NeighborhoodGoldProcessor<'a> {
    pub fn new(directory: &'a LocationDirectory) -> Self {
        Self { directory }
    }

    pub fn process(&self, silver: &[NeighborhoodSilverRow]) -> Vec<NeighborhoodGoldRow> {
        let rows: Vec<NeighborhoodGoldRow> =
            silver.iter().map(|row| self.process_row(row)).collect();
        metrics::tiers::records_processed("neighborhood", "gold", rows.len() as u64);
        info!(rows = rows.len(), "neighborhood gold tier materialized");
        rows
    }

    fn process_row(&self, silver: &NeighborhoodSilverRow) -> NeighborhoodGoldRow {
        let hierarchy = self.directory.resolve(
            silver.city_normalized.as_deref().or(silver.city.as_deref()),
            silver.state_normalized.as_deref().or(silver.state.as_deref()),
        );

        // Topics aggregated from the embedded wikipedia correlations;
        // characteristics double as lifestyle tags.
        let aggregated_topics: Vec<String> = silver
            .wikipedia_correlations
            .as_ref()
            .map(|correlations| {
                correlations
                    .primary
                    .iter()
                    .chain(correlations.related.iter())
                    .filter_map(|r| r.title.clone())
                    .collect()
            })
            .unwrap_or_default();
        let wikipedia_count = silver
            .wikipedia_correlations
            .as_ref()
            .map(|c| c.page_count())
            .unwrap_or(0);
        let tags = &silver.characteristics;

        NeighborhoodGoldRow {
            correlation_uuid: correlation_uuid(EntityType::Neighborhood, &silver.neighborhood_id),
            county_resolved: hierarchy.county_resolved,
            parent_city: hierarchy.parent_city,
            parent_county: hierarchy.parent_county,
            parent_state: hierarchy.parent_state,
            location_hierarchy: hierarchy.location_hierarchy,
            nightlife_score: scores::nightlife_score(&silver.amenities, tags),
            family_friendly_score: scores::family_friendly_score(
                silver.school_rating,
                silver.safety_rating,
                &silver.amenities,
                tags,
            ),
            cultural_score: scores::cultural_score(&silver.amenities, &aggregated_topics),
            green_space_score: scores::green_space_score(&silver.amenities, tags),
            knowledge_score: scores::knowledge_score(
                wikipedia_count,
                aggregated_topics.len(),
                silver.amenities.len(),
            ),
            embedding_text: neighborhood_embedding_text(silver),
            silver: silver.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnrichmentConfig;
    use crate::domain::{BronzeRow, NeighborhoodRecord, WikiRef, WikipediaCorrelations};
    use crate::tiers::silver::{LocationLookup, NeighborhoodSilverProcessor};
    use chrono::Utc;
    use std::sync::Arc;

    fn silver(record: NeighborhoodRecord) -> Vec<NeighborhoodSilverRow> {
        NeighborhoodSilverProcessor::new(Arc::new(LocationLookup::from_config(
            &EnrichmentConfig::default(),
        )))
        .process(
            &[BronzeRow {
                record,
                corrupt_record: None,
                ingested_at: Utc::now(),
                source_file: "n.json".to_string(),
            }],
            Utc::now(),
        )
    }

    fn seed_record() -> NeighborhoodRecord {
        NeighborhoodRecord {
            neighborhood_id: Some("N1".to_string()),
            name: Some("Mission".to_string()),
            city: Some("SF".to_string()),
            state: Some("CA".to_string()),
            amenities: vec![
                "Dolores Park".to_string(),
                "Wine Bar".to_string(),
                "Art Gallery".to_string(),
            ],
            characteristics: vec!["nightlife".to_string()],
            wikipedia_correlations: Some(WikipediaCorrelations {
                primary: Some(WikiRef {
                    page_id: 42,
                    title: Some("Mission District".to_string()),
                    url: None,
                    confidence: Some(0.9),
                    relationship: None,
                }),
                related: Vec::new(),
                parent_geography: None,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_gold_row_scores_within_bounds() {
        let directory = LocationDirectory::default();
        let gold = NeighborhoodGoldProcessor::new(&directory).process(&silver(seed_record()));
        let row = &gold[0];
        assert!(row.nightlife_score > 0.0 && row.nightlife_score <= 10.0);
        assert!(row.green_space_score > 0.0 && row.green_space_score <= 10.0);
        assert!(row.cultural_score > 0.0 && row.cultural_score <= 10.0);
        assert!((0.0..=1.0).contains(&row.knowledge_score));
        assert!(row.knowledge_score > 0.0);
    }

    #[test]
    fn test_embedding_text_uses_normalized_city() {
        let directory = LocationDirectory::default();
        let gold = NeighborhoodGoldProcessor::new(&directory).process(&silver(seed_record()));
        assert!(gold[0]
            .embedding_text
            .starts_with("Mission | Location: San Francisco California | Amenities:"));
    }

    #[test]
    fn test_gold_preserves_silver_identity() {
        let directory = LocationDirectory::default();
        let silver_rows = silver(seed_record());
        let gold = NeighborhoodGoldProcessor::new(&directory).process(&silver_rows);
        assert_eq!(gold.len(), silver_rows.len());
        assert_eq!(gold[0].silver.neighborhood_id, "N1");
        assert_eq!(
            gold[0].correlation_uuid,
            correlation_uuid(EntityType::Neighborhood, "N1")
        );
    }

    #[test]
    fn test_scores_tolerate_empty_record() {
        let record = NeighborhoodRecord {
            neighborhood_id: Some("N-empty".to_string()),
            ..Default::default()
        };
        let directory = LocationDirectory::default();
        let gold = NeighborhoodGoldProcessor::new(&directory).process(&silver(record));
        let row = &gold[0];
        assert_eq!(row.nightlife_score, 0.0);
        assert_eq!(row.family_friendly_score, 0.0);
        assert_eq!(row.knowledge_score, 0.0);
    }
}
