//! Embedding-text templates.
//!
//! Each entity's text is assembled deterministically from silver fields
//! in a fixed order, segments joined by ` | `. Missing scalars render as
//! `N/A`; missing free-text segments are dropped. The literal string
//! `None` never appears. These templates are versioned behavior: do not
//! reorder or reword segments without bumping the embedding model tag.

use crate::domain::{NeighborhoodSilverRow, PropertySilverRow, WikipediaSilverRow};

const SEPARATOR: &str = " | ";
const MISSING: &str = "N/A";

/// Wikipedia long summaries are truncated to keep the node size within
/// provider limits.
pub const MAX_WIKI_CONTENT_CHARS: usize = 8000;

pub fn property_embedding_text(row: &PropertySilverRow) -> String {
    let mut segments: Vec<String> = Vec::with_capacity(9);
    if let Some(title) = &row.title {
        segments.push(title.clone());
    }
    segments.push(format!(
        "Property Type: {}",
        row.property_type.as_deref().unwrap_or(MISSING)
    ));
    segments.push(format!("Price: {}", format_number(row.listing_price)));
    segments.push(format!("Bedrooms: {}", format_int(row.bedrooms)));
    segments.push(format!("Bathrooms: {}", format_number(row.bathrooms)));
    segments.push(format!("Square Feet: {}", format_number(row.square_feet)));
    segments.push(location_segment(
        row.city_normalized.as_deref().or(row.city.as_deref()),
        row.state_normalized.as_deref().or(row.state.as_deref()),
    ));
    segments.push(format!("Features: {}", join_or_missing(&row.features)));
    if let Some(description) = &row.description {
        segments.push(description.clone());
    }
    segments.join(SEPARATOR)
}

pub fn neighborhood_embedding_text(row: &NeighborhoodSilverRow) -> String {
    let mut segments: Vec<String> = Vec::with_capacity(4);
    if let Some(name) = &row.name {
        segments.push(name.clone());
    }
    segments.push(location_segment(
        row.city_normalized.as_deref().or(row.city.as_deref()),
        row.state_normalized.as_deref().or(row.state.as_deref()),
    ));
    segments.push(format!("Amenities: {}", join_or_missing(&row.amenities)));
    if let Some(description) = &row.description {
        segments.push(description.clone());
    }
    segments.join(SEPARATOR)
}

pub fn wikipedia_embedding_text(row: &WikipediaSilverRow) -> String {
    let mut segments: Vec<String> = Vec::with_capacity(5);
    if let Some(title) = &row.title {
        segments.push(title.clone());
    }
    segments.push(location_segment(
        row.city_normalized.as_deref().or(row.best_city.as_deref()),
        row.state_normalized.as_deref().or(row.best_state.as_deref()),
    ));
    if let Some(summary) = &row.short_summary {
        segments.push(summary.clone());
    }
    segments.push(format!("Topics: {}", join_or_missing(&row.key_topics)));
    if let Some(content) = &row.long_summary {
        segments.push(truncate_chars(content, MAX_WIKI_CONTENT_CHARS));
    }
    segments.join(SEPARATOR)
}

fn location_segment(city: Option<&str>, state: Option<&str>) -> String {
    let parts: Vec<&str> = [city, state].into_iter().flatten().collect();
    if parts.is_empty() {
        format!("Location: {MISSING}")
    } else {
        format!("Location: {}", parts.join(" "))
    }
}

fn join_or_missing(values: &[String]) -> String {
    if values.is_empty() {
        MISSING.to_string()
    } else {
        values.join(", ")
    }
}

fn format_number(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 => format!("{}", v as i64),
        Some(v) => format!("{v}"),
        None => MISSING.to_string(),
    }
}

fn format_int(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| MISSING.to_string())
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnrichmentConfig;
    use crate::domain::{BronzeRow, PropertyRecord, WikipediaRecord};
    use crate::tiers::silver::{LocationLookup, PropertySilverProcessor, WikipediaSilverProcessor};
    use chrono::Utc;
    use std::sync::Arc;

    fn lookup() -> Arc<LocationLookup> {
        Arc::new(LocationLookup::from_config(&EnrichmentConfig::default()))
    }

    fn property_silver(record: PropertyRecord) -> crate::domain::PropertySilverRow {
        let rows = PropertySilverProcessor::new(lookup()).process(
            &[BronzeRow {
                record,
                corrupt_record: None,
                ingested_at: Utc::now(),
                source_file: "f.json".to_string(),
            }],
            Utc::now(),
        );
        rows.into_iter().next().unwrap()
    }

    #[test]
    fn test_property_template_with_all_fields() {
        let record = PropertyRecord {
            listing_id: Some("P1".to_string()),
            listing_price: Some(800_000.0),
            address: Some(crate::domain::Address {
                city: Some("SF".to_string()),
                state: Some("CA".to_string()),
                ..Default::default()
            }),
            details: crate::domain::PropertyDetails {
                square_feet: Some(2000.0),
                bedrooms: Some(3),
                bathrooms: Some(2.0),
                property_type: Some("Condo".to_string()),
                ..Default::default()
            },
            features: vec!["Pool".to_string(), "Garage".to_string()],
            description: Some("Sunny corner unit".to_string()),
            ..Default::default()
        };
        let text = property_embedding_text(&property_silver(record));
        assert_eq!(
            text,
            "Property Type: condo | Price: 800000 | Bedrooms: 3 | Bathrooms: 2 \
             | Square Feet: 2000 | Location: San Francisco California \
             | Features: garage, pool | Sunny corner unit"
        );
    }

    #[test]
    fn test_property_template_missing_fields_render_na() {
        let record = PropertyRecord {
            listing_id: Some("P2".to_string()),
            ..Default::default()
        };
        let text = property_embedding_text(&property_silver(record));
        assert!(text.contains("Property Type: N/A"));
        assert!(text.contains("Price: N/A"));
        assert!(text.contains("Location: N/A"));
        assert!(text.contains("Features: N/A"));
        assert!(!text.contains("None"));
    }

    #[test]
    fn test_template_is_deterministic() {
        let record = PropertyRecord {
            listing_id: Some("P3".to_string()),
            listing_price: Some(500_000.0),
            ..Default::default()
        };
        let a = property_embedding_text(&property_silver(record.clone()));
        let b = property_embedding_text(&property_silver(record));
        assert_eq!(a, b);
    }

    #[test]
    fn test_wikipedia_template_truncates_content() {
        let record = WikipediaRecord {
            page_id: Some(42),
            title: Some("Golden Gate Bridge".to_string()),
            long_summary: Some("x".repeat(MAX_WIKI_CONTENT_CHARS + 500)),
            confidence_score: Some(0.9),
            best_city: Some("San Francisco".to_string()),
            best_state: Some("CA".to_string()),
            key_topics: vec!["bridge".to_string()],
            ..Default::default()
        };
        let rows = WikipediaSilverProcessor::new(lookup()).process(
            &[BronzeRow {
                record,
                corrupt_record: None,
                ingested_at: Utc::now(),
                source_file: "wiki.db".to_string(),
            }],
            Utc::now(),
        );
        let text = wikipedia_embedding_text(&rows[0]);
        assert!(text.starts_with("Golden Gate Bridge | Location: San Francisco California"));
        assert!(text.len() < MAX_WIKI_CONTENT_CHARS + 200);
    }
}
