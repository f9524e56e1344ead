use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use crate::domain::neighborhood::ParentGeography;
use crate::domain::{
    Demographics, NeighborhoodRecord, NeighborhoodStatistics, SchoolRatings, WikiRef,
    WikipediaCorrelations,
};
use crate::error::Result;
use crate::observability::metrics;

use super::property::coerce_coordinates;
use super::{
    coerce_f64, coerce_i64, coerce_string, coerce_string_array, field, read_json_values, ReadStats,
    RowOutcome,
};

/// Reader for neighborhood JSON records. The nested
/// `wikipedia_correlations` structure is preserved as typed data.
pub struct NeighborhoodReader;

impl NeighborhoodReader {
    pub fn read(
        path: &Path,
        limit: Option<usize>,
    ) -> Result<(Vec<RowOutcome<NeighborhoodRecord>>, ReadStats)> {
        let values = read_json_values(path, limit).inspect_err(|_| {
            metrics::sources::read_error("neighborhood");
        })?;

        let mut outcomes = Vec::with_capacity(values.len());
        let mut corrupt = 0usize;
        for value in &values {
            match coerce_neighborhood(value) {
                Ok(record) => outcomes.push(RowOutcome::Ok(record)),
                Err((record, reason)) => {
                    corrupt += 1;
                    warn!(reason = %reason, "neighborhood row failed coercion, keeping as corrupt");
                    outcomes.push(RowOutcome::Corrupt {
                        record,
                        raw: value.to_string(),
                        reason,
                    });
                }
            }
        }

        let stats = ReadStats {
            rows_read: outcomes.len(),
            rows_corrupt: corrupt,
            source_path: path.display().to_string(),
        };
        metrics::sources::rows_read("neighborhood", stats.rows_read as u64);
        metrics::sources::rows_corrupt("neighborhood", stats.rows_corrupt as u64);
        info!(
            rows = stats.rows_read,
            corrupt = stats.rows_corrupt,
            source = %stats.source_path,
            "read neighborhood source"
        );
        Ok((outcomes, stats))
    }
}

fn coerce_neighborhood(
    value: &Value,
) -> std::result::Result<NeighborhoodRecord, (NeighborhoodRecord, String)> {
    let neighborhood_id = coerce_string(field(value, &["neighborhood_id"])).unwrap_or(None);
    match coerce_neighborhood_inner(value, neighborhood_id.clone()) {
        Ok(record) => Ok(record),
        Err(reason) => Err((
            NeighborhoodRecord {
                neighborhood_id,
                ..Default::default()
            },
            reason,
        )),
    }
}

fn coerce_neighborhood_inner(
    value: &Value,
    neighborhood_id: Option<String>,
) -> std::result::Result<NeighborhoodRecord, String> {
    if !value.is_object() {
        return Err("row is not a JSON object".to_string());
    }
    if neighborhood_id.is_none() {
        return Err("missing neighborhood_id".to_string());
    }

    let demographics = match field(value, &["demographics"]) {
        Some(obj) if obj.is_object() => Some(Demographics {
            population: coerce_i64(field(obj, &["population"])).map_err(prefix("demographics.population"))?,
            households: coerce_i64(field(obj, &["households"])).map_err(prefix("demographics.households"))?,
            median_age: coerce_f64(field(obj, &["median_age"])).map_err(prefix("demographics.median_age"))?,
            median_income: coerce_f64(field(obj, &["median_income"]))
                .map_err(prefix("demographics.median_income"))?,
        }),
        Some(_) => return Err("demographics is not an object".to_string()),
        None => None,
    };

    let school_ratings = match field(value, &["school_ratings"]) {
        Some(obj) if obj.is_object() => Some(SchoolRatings {
            elementary: coerce_f64(field(obj, &["elementary"])).map_err(prefix("school_ratings.elementary"))?,
            middle: coerce_f64(field(obj, &["middle"])).map_err(prefix("school_ratings.middle"))?,
            high: coerce_f64(field(obj, &["high"])).map_err(prefix("school_ratings.high"))?,
        }),
        Some(_) => return Err("school_ratings is not an object".to_string()),
        None => None,
    };

    // Statistics arrive nested or flat depending on the feed vintage.
    let stats_obj = field(value, &["statistics", "graph_metadata"]).filter(|v| v.is_object());
    let stat = |keys: &[&str]| -> Option<&Value> {
        stats_obj.and_then(|s| field(s, keys)).or_else(|| field(value, keys))
    };
    let statistics = NeighborhoodStatistics {
        walkability_score: coerce_f64(stat(&["walkability_score"])).map_err(prefix("walkability_score"))?,
        transit_score: coerce_f64(stat(&["transit_score"])).map_err(prefix("transit_score"))?,
        safety_rating: coerce_f64(stat(&["safety_rating"])).map_err(prefix("safety_rating"))?,
        avg_home_value: coerce_f64(stat(&["avg_home_value", "median_home_price"]))
            .map_err(prefix("avg_home_value"))?,
    };

    let wikipedia_correlations = match field(value, &["wikipedia_correlations"]) {
        Some(obj) if obj.is_object() => Some(coerce_correlations(obj)?),
        Some(_) => return Err("wikipedia_correlations is not an object".to_string()),
        None => None,
    };

    Ok(NeighborhoodRecord {
        neighborhood_id,
        name: coerce_string(field(value, &["name"])).map_err(prefix("name"))?,
        city: coerce_string(field(value, &["city"])).map_err(prefix("city"))?,
        state: coerce_string(field(value, &["state"])).map_err(prefix("state"))?,
        county: coerce_string(field(value, &["county"])).map_err(prefix("county"))?,
        coordinates: coerce_coordinates(field(value, &["coordinates"]))?,
        description: coerce_string(field(value, &["description"])).map_err(prefix("description"))?,
        amenities: coerce_string_array(field(value, &["amenities"])).map_err(prefix("amenities"))?,
        characteristics: coerce_string_array(field(value, &["characteristics", "tags"]))
            .map_err(prefix("characteristics"))?,
        demographics,
        school_ratings,
        statistics: Some(statistics),
        wikipedia_correlations,
    })
}

fn coerce_correlations(obj: &Value) -> std::result::Result<WikipediaCorrelations, String> {
    let primary = match field(obj, &["primary"]) {
        Some(p) if p.is_object() => Some(coerce_wiki_ref(p)?),
        _ => None,
    };
    let related = match field(obj, &["related"]) {
        Some(Value::Array(items)) => {
            let mut refs = Vec::with_capacity(items.len());
            for item in items {
                refs.push(coerce_wiki_ref(item)?);
            }
            refs
        }
        _ => Vec::new(),
    };
    let parent_geography = match field(obj, &["parent_geography"]) {
        Some(p) if p.is_object() => Some(ParentGeography {
            city_wiki: match field(p, &["city_wiki"]) {
                Some(w) if w.is_object() => Some(coerce_wiki_ref(w)?),
                _ => None,
            },
            state_wiki: match field(p, &["state_wiki"]) {
                Some(w) if w.is_object() => Some(coerce_wiki_ref(w)?),
                _ => None,
            },
        }),
        _ => None,
    };
    Ok(WikipediaCorrelations {
        primary,
        related,
        parent_geography,
    })
}

fn coerce_wiki_ref(obj: &Value) -> std::result::Result<WikiRef, String> {
    let page_id = coerce_i64(field(obj, &["page_id", "pageid"]))
        .map_err(prefix("wikipedia_correlations.page_id"))?
        .ok_or_else(|| "wikipedia correlation missing page_id".to_string())?;
    Ok(WikiRef {
        page_id,
        title: coerce_string(field(obj, &["title"])).map_err(prefix("wikipedia_correlations.title"))?,
        url: coerce_string(field(obj, &["url"])).map_err(prefix("wikipedia_correlations.url"))?,
        confidence: coerce_f64(field(obj, &["confidence"]))
            .map_err(prefix("wikipedia_correlations.confidence"))?,
        relationship: coerce_string(field(obj, &["relationship"]))
            .map_err(prefix("wikipedia_correlations.relationship"))?,
    })
}

fn prefix(name: &'static str) -> impl Fn(String) -> String {
    move |reason| format!("{name}: {reason}")
}
