//! Cross-entity enrichment projections, produced once every entity has
//! reached gold. Each projection is a flat join result written as its
//! own table; unmatched left-side rows are preserved with empty linkage
//! columns so downstream schemas stay stable.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::domain::{NeighborhoodGoldRow, PropertyGoldRow, WikipediaGoldRow};
use crate::observability::metrics;

/// Default top-N wikipedia links carried per property.
pub const PROPERTY_WIKI_TOP_N: usize = 3;
/// Default top-N wikipedia links carried per neighborhood.
pub const NEIGHBORHOOD_WIKI_TOP_N: usize = 5;

/// Property left-joined with its resolved neighborhood.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedPropertyRow {
    #[serde(flatten)]
    pub property: PropertyGoldRow,
    pub neighborhood_name: Option<String>,
    pub neighborhood_description: Option<String>,
    pub neighborhood_population: Option<i64>,
    pub neighborhood_median_income: Option<f64>,
    pub neighborhood_amenities: Vec<String>,
    pub neighborhood_walkability_score: Option<f64>,
    pub neighborhood_avg_home_value: Option<f64>,
    pub enrichment_success: bool,
}

/// One correlated wikipedia article carried on a top-N projection row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiLink {
    pub page_id: i64,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub relevance: f64,
}

/// Property with its top-N relevant wikipedia articles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyWikiRow {
    pub listing_id: String,
    pub correlation_uuid: Uuid,
    pub city_normalized: Option<String>,
    pub wikipedia_articles: Vec<WikiLink>,
}

/// Neighborhood with its top-N relevant wikipedia articles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborhoodWikiRow {
    pub neighborhood_id: String,
    pub correlation_uuid: Uuid,
    pub name: Option<String>,
    pub city_normalized: Option<String>,
    pub wikipedia_articles: Vec<WikiLink>,
}

/// Joins gold tables across entities. All methods are pure projections
/// over the already-materialized gold rows.
pub struct CrossEntityEnricher;

impl CrossEntityEnricher {
    /// Left join property gold onto neighborhood gold by the resolved
    /// neighborhood id. Unmatched properties keep their row with
    /// `enrichment_success = false`.
    pub fn property_neighborhood(
        properties: &[PropertyGoldRow],
        neighborhoods: &[NeighborhoodGoldRow],
    ) -> Vec<EnrichedPropertyRow> {
        let mut matched = 0u64;
        let rows: Vec<EnrichedPropertyRow> = properties
            .iter()
            .map(|property| {
                let neighborhood = property.neighborhood_id_resolved.as_deref().and_then(|id| {
                    neighborhoods
                        .iter()
                        .find(|n| n.silver.neighborhood_id == id)
                });
                if neighborhood.is_some() {
                    matched += 1;
                }
                match neighborhood {
                    Some(n) => EnrichedPropertyRow {
                        property: property.clone(),
                        neighborhood_name: n.silver.name.clone(),
                        neighborhood_description: n.silver.description.clone(),
                        neighborhood_population: n.silver.population,
                        neighborhood_median_income: n.silver.median_income,
                        neighborhood_amenities: n.silver.amenities.clone(),
                        neighborhood_walkability_score: n.silver.walkability_score,
                        neighborhood_avg_home_value: n.silver.avg_home_value,
                        enrichment_success: true,
                    },
                    None => EnrichedPropertyRow {
                        property: property.clone(),
                        neighborhood_name: None,
                        neighborhood_description: None,
                        neighborhood_population: None,
                        neighborhood_median_income: None,
                        neighborhood_amenities: Vec::new(),
                        neighborhood_walkability_score: None,
                        neighborhood_avg_home_value: None,
                        enrichment_success: false,
                    },
                }
            })
            .collect();

        let unmatched = rows.len() as u64 - matched;
        metrics::enrichment::records_matched("property_neighborhood", matched);
        metrics::enrichment::records_unmatched("property_neighborhood", unmatched);
        info!(
            rows = rows.len(),
            matched, unmatched, "property-neighborhood projection built"
        );
        rows
    }

    /// Top-N wikipedia articles per property, matched on the normalized
    /// city (exact join key or substring of the article's location
    /// context) and ranked by relevance score.
    pub fn property_wikipedia(
        properties: &[PropertyGoldRow],
        articles: &[WikipediaGoldRow],
    ) -> Vec<PropertyWikiRow> {
        let mut matched = 0u64;
        let rows: Vec<PropertyWikiRow> = properties
            .iter()
            .map(|property| {
                let links = top_articles_for_city(
                    articles,
                    property.silver.city_normalized.as_deref(),
                    None,
                    PROPERTY_WIKI_TOP_N,
                );
                if !links.is_empty() {
                    matched += 1;
                }
                PropertyWikiRow {
                    listing_id: property.silver.listing_id.clone(),
                    correlation_uuid: property.correlation_uuid,
                    city_normalized: property.silver.city_normalized.clone(),
                    wikipedia_articles: links,
                }
            })
            .collect();

        metrics::enrichment::records_matched("property_wikipedia", matched);
        metrics::enrichment::records_unmatched("property_wikipedia", rows.len() as u64 - matched);
        info!(rows = rows.len(), matched, "property-wikipedia projection built");
        rows
    }

    /// Top-N wikipedia articles per neighborhood: city must match and
    /// the article title must mention the neighborhood name.
    pub fn neighborhood_wikipedia(
        neighborhoods: &[NeighborhoodGoldRow],
        articles: &[WikipediaGoldRow],
    ) -> Vec<NeighborhoodWikiRow> {
        let mut matched = 0u64;
        let rows: Vec<NeighborhoodWikiRow> = neighborhoods
            .iter()
            .map(|neighborhood| {
                let links = top_articles_for_city(
                    articles,
                    neighborhood.silver.city_normalized.as_deref(),
                    neighborhood.silver.name.as_deref(),
                    NEIGHBORHOOD_WIKI_TOP_N,
                );
                if !links.is_empty() {
                    matched += 1;
                }
                NeighborhoodWikiRow {
                    neighborhood_id: neighborhood.silver.neighborhood_id.clone(),
                    correlation_uuid: neighborhood.correlation_uuid,
                    name: neighborhood.silver.name.clone(),
                    city_normalized: neighborhood.silver.city_normalized.clone(),
                    wikipedia_articles: links,
                }
            })
            .collect();

        metrics::enrichment::records_matched("neighborhood_wikipedia", matched);
        metrics::enrichment::records_unmatched(
            "neighborhood_wikipedia",
            rows.len() as u64 - matched,
        );
        info!(rows = rows.len(), matched, "neighborhood-wikipedia projection built");
        rows
    }
}

fn top_articles_for_city(
    articles: &[WikipediaGoldRow],
    city: Option<&str>,
    title_must_contain: Option<&str>,
    top_n: usize,
) -> Vec<WikiLink> {
    let Some(city) = city else {
        return Vec::new();
    };
    let city_lower = city.to_lowercase();
    let needle = title_must_contain.map(|n| n.to_lowercase());

    let mut candidates: Vec<&WikipediaGoldRow> = articles
        .iter()
        .filter(|article| {
            let city_match = article
                .city_relevance
                .as_deref()
                .map(|c| c.eq_ignore_ascii_case(city))
                .unwrap_or(false)
                || article
                    .location_context
                    .as_deref()
                    .map(|ctx| ctx.to_lowercase().contains(&city_lower))
                    .unwrap_or(false);
            let title_match = match &needle {
                Some(needle) => article
                    .silver
                    .title
                    .as_deref()
                    .map(|t| t.to_lowercase().contains(needle))
                    .unwrap_or(false),
                None => true,
            };
            city_match && title_match
        })
        .collect();

    // Rank by relevance, ties broken by page id for deterministic output.
    candidates.sort_by(|a, b| {
        let ra = a.silver.relevance_score.unwrap_or(0.0);
        let rb = b.silver.relevance_score.unwrap_or(0.0);
        rb.partial_cmp(&ra)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.silver.page_id.cmp(&b.silver.page_id))
    });

    candidates
        .into_iter()
        .take(top_n)
        .map(|article| WikiLink {
            page_id: article.silver.page_id,
            title: article.silver.title.clone(),
            summary: article.silver.short_summary.clone(),
            relevance: article.silver.relevance_score.unwrap_or(0.0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnrichmentConfig;
    use crate::domain::{
        Address, BronzeRow, NeighborhoodRecord, PropertyRecord, WikipediaRecord,
    };
    use crate::tiers::gold::{
        LocationDirectory, NeighborhoodGoldProcessor, PropertyGoldProcessor,
        WikipediaGoldProcessor,
    };
    use crate::tiers::silver::{
        LocationLookup, NeighborhoodSilverProcessor, PropertySilverProcessor,
        WikipediaSilverProcessor,
    };
    use chrono::Utc;
    use std::sync::Arc;

    fn lookup() -> Arc<LocationLookup> {
        Arc::new(LocationLookup::from_config(&EnrichmentConfig::default()))
    }

    fn bronze<T>(record: T) -> BronzeRow<T> {
        BronzeRow {
            record,
            corrupt_record: None,
            ingested_at: Utc::now(),
            source_file: "test".to_string(),
        }
    }

    fn neighborhoods() -> Vec<NeighborhoodGoldRow> {
        let record = NeighborhoodRecord {
            neighborhood_id: Some("N1".to_string()),
            name: Some("Mission".to_string()),
            city: Some("San Francisco".to_string()),
            state: Some("CA".to_string()),
            description: Some("Vibrant district".to_string()),
            ..Default::default()
        };
        let silver = NeighborhoodSilverProcessor::new(lookup()).process(&[bronze(record)], Utc::now());
        let directory = LocationDirectory::default();
        NeighborhoodGoldProcessor::new(&directory).process(&silver)
    }

    fn properties(neighborhood_id: Option<&str>) -> Vec<PropertyGoldRow> {
        let record = PropertyRecord {
            listing_id: Some("P1".to_string()),
            neighborhood_id: neighborhood_id.map(|s| s.to_string()),
            address: Some(Address {
                city: Some("SF".to_string()),
                state: Some("CA".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let silver = PropertySilverProcessor::new(lookup()).process(&[bronze(record)], Utc::now());
        let directory = LocationDirectory::default();
        let gold_neighborhoods = neighborhoods();
        PropertyGoldProcessor::new(&directory, &gold_neighborhoods).process(&silver)
    }

    fn articles() -> Vec<WikipediaGoldRow> {
        let records = vec![
            WikipediaRecord {
                page_id: Some(42),
                title: Some("Mission District, San Francisco".to_string()),
                long_summary: Some("A neighborhood in San Francisco.".to_string()),
                confidence_score: Some(0.9),
                best_city: Some("San Francisco".to_string()),
                best_state: Some("CA".to_string()),
                relevance_score: Some(0.95),
                ..Default::default()
            },
            WikipediaRecord {
                page_id: Some(43),
                title: Some("Golden Gate Bridge".to_string()),
                long_summary: Some("A bridge.".to_string()),
                confidence_score: Some(0.9),
                best_city: Some("San Francisco".to_string()),
                best_state: Some("CA".to_string()),
                relevance_score: Some(0.8),
                ..Default::default()
            },
            WikipediaRecord {
                page_id: Some(44),
                title: Some("Portland".to_string()),
                long_summary: Some("A city in Oregon.".to_string()),
                confidence_score: Some(0.9),
                best_city: Some("Portland".to_string()),
                best_state: Some("OR".to_string()),
                relevance_score: Some(0.9),
                ..Default::default()
            },
        ];
        let bronze_rows: Vec<_> = records.into_iter().map(bronze).collect();
        let silver = WikipediaSilverProcessor::new(lookup()).process(&bronze_rows, Utc::now());
        let directory = LocationDirectory::default();
        WikipediaGoldProcessor::new(&directory).process(&silver)
    }

    #[test]
    fn test_property_neighborhood_match() {
        let props = properties(Some("N1"));
        let rows = CrossEntityEnricher::property_neighborhood(&props, &neighborhoods());
        assert_eq!(rows.len(), 1);
        assert!(rows[0].enrichment_success);
        assert_eq!(rows[0].neighborhood_name.as_deref(), Some("Mission"));
    }

    #[test]
    fn test_property_neighborhood_unmatched_preserved() {
        let props = properties(Some("N-unknown"));
        let rows = CrossEntityEnricher::property_neighborhood(&props, &neighborhoods());
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].enrichment_success);
        assert_eq!(rows[0].neighborhood_name, None);
        assert_eq!(rows[0].property.silver.listing_id, "P1");
    }

    #[test]
    fn test_property_wikipedia_top_n_ranked() {
        let props = properties(None);
        let rows = CrossEntityEnricher::property_wikipedia(&props, &articles());
        assert_eq!(rows.len(), 1);
        let links = &rows[0].wikipedia_articles;
        assert_eq!(links.len(), 2);
        // Ranked by relevance, Portland excluded by city.
        assert_eq!(links[0].page_id, 42);
        assert_eq!(links[1].page_id, 43);
    }

    #[test]
    fn test_neighborhood_wikipedia_requires_title_match() {
        let rows = CrossEntityEnricher::neighborhood_wikipedia(&neighborhoods(), &articles());
        assert_eq!(rows.len(), 1);
        let links = &rows[0].wikipedia_articles;
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].page_id, 42);
    }

    #[test]
    fn test_empty_articles_produce_stable_schema() {
        let props = properties(None);
        let rows = CrossEntityEnricher::property_wikipedia(&props, &[]);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].wikipedia_articles.is_empty());
    }
}
