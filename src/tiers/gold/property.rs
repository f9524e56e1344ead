use tracing::info;

use crate::domain::{EntityType, NeighborhoodGoldRow, PropertyGoldRow, PropertySilverRow};
use crate::observability::metrics;

use super::text::property_embedding_text;
use super::{correlation_uuid, LocationDirectory};

/// Confidence attached to the property→neighborhood link depending on
/// how it was resolved.
const LINK_EXPLICIT: f64 = 1.0;
const LINK_CITY_STATE: f64 = 0.6;
const LINK_NONE: f64 = 0.0;

/// Advances property silver rows to gold: correlation identity,
/// hierarchy columns, neighborhood linkage and embedding text.
///
/// Runs after the neighborhood orchestrator has reached gold so the
/// best-effort (city, state) linkage can see the neighborhood table.
pub struct PropertyGoldProcessor<'a> {
    directory: &'a LocationDirectory,
    neighborhoods: &'a [NeighborhoodGoldRow],
}

impl<'a> PropertyGoldProcessor<'a> {
    pub fn new(directory: &'a LocationDirectory, neighborhoods: &'a [NeighborhoodGoldRow]) -> Self {
        Self {
            directory,
            neighborhoods,
        }
    }

    pub fn process(&self, silver: &[PropertySilverRow]) -> Vec<PropertyGoldRow> {
        let rows: Vec<PropertyGoldRow> = silver.iter().map(|row| self.process_row(row)).collect();
        metrics::tiers::records_processed("property", "gold", rows.len() as u64);
        info!(rows = rows.len(), "property gold tier materialized");
        rows
    }

    fn process_row(&self, silver: &PropertySilverRow) -> PropertyGoldRow {
        let hierarchy = self.directory.resolve(
            silver.city_normalized.as_deref().or(silver.city.as_deref()),
            silver.state_normalized.as_deref().or(silver.state.as_deref()),
        );

        let (neighborhood_id_resolved, link_confidence) = self.resolve_neighborhood(silver);

        PropertyGoldRow {
            correlation_uuid: correlation_uuid(EntityType::Property, &silver.listing_id),
            neighborhood_id_resolved,
            link_confidence,
            county_resolved: hierarchy.county_resolved,
            parent_city: hierarchy.parent_city,
            parent_county: hierarchy.parent_county,
            parent_state: hierarchy.parent_state,
            location_hierarchy: hierarchy.location_hierarchy,
            embedding_text: property_embedding_text(silver),
            silver: silver.clone(),
        }
    }

    /// Explicit neighborhood_id wins and is carried as-is; otherwise a
    /// best-effort match on the normalized (city, state) pair. Ties are
    /// broken by neighborhood id so reruns resolve identically.
    fn resolve_neighborhood(&self, silver: &PropertySilverRow) -> (Option<String>, f64) {
        if let Some(explicit) = &silver.neighborhood_id {
            return (Some(explicit.clone()), LINK_EXPLICIT);
        }
        let (Some(city), Some(state)) = (
            silver.city_normalized.as_deref(),
            silver.state_normalized.as_deref(),
        ) else {
            return (None, LINK_NONE);
        };

        let mut candidates: Vec<&NeighborhoodGoldRow> = self
            .neighborhoods
            .iter()
            .filter(|n| {
                n.silver.city_normalized.as_deref().map(|c| c.eq_ignore_ascii_case(city))
                    == Some(true)
                    && n.silver.state_normalized.as_deref().map(|s| s.eq_ignore_ascii_case(state))
                        == Some(true)
            })
            .collect();
        candidates.sort_by(|a, b| a.silver.neighborhood_id.cmp(&b.silver.neighborhood_id));

        match candidates.first() {
            Some(neighborhood) => (
                Some(neighborhood.silver.neighborhood_id.clone()),
                LINK_CITY_STATE,
            ),
            None => (None, LINK_NONE),
        }
    }
}
