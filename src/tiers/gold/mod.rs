//! Gold-tier processing: deterministic correlation identity, geographic
//! hierarchy resolution against the location reference, and assembly of
//! the canonical embedding text.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::{EntityType, LocationEntry};

pub mod neighborhood;
pub mod property;
pub mod text;
pub mod wikipedia;

pub use neighborhood::NeighborhoodGoldProcessor;
pub use property::PropertyGoldProcessor;
pub use wikipedia::WikipediaGoldProcessor;

/// Deterministic correlation UUID: the first 128 bits of
/// `sha256(entity || primary_key)` formatted as a UUID. Stable across
/// runs for the same logical entity.
pub fn correlation_uuid(entity: EntityType, primary_key: &str) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(entity.as_str().as_bytes());
    hasher.update(primary_key.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

/// Resolved geographic hierarchy columns for one row.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    pub county_resolved: Option<String>,
    pub parent_city: Option<String>,
    pub parent_county: Option<String>,
    pub parent_state: Option<String>,
    pub location_hierarchy: Option<String>,
}

#[derive(Debug, Clone)]
struct CityInfo {
    county: Option<String>,
    state: Option<String>,
}

/// In-memory index over the location reference file, keyed by
/// lowercase city name. First entry wins on duplicates.
#[derive(Debug, Clone, Default)]
pub struct LocationDirectory {
    cities: HashMap<String, CityInfo>,
}

impl LocationDirectory {
    pub fn from_entries(entries: &[LocationEntry]) -> Self {
        let mut cities = HashMap::new();
        for entry in entries {
            let Some(city) = entry.city.as_deref() else {
                continue;
            };
            cities
                .entry(city.trim().to_lowercase())
                .or_insert_with(|| CityInfo {
                    county: entry.county.clone(),
                    state: entry.state.clone(),
                });
        }
        Self { cities }
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    /// Resolve parent columns for a (normalized) city/state pair. The
    /// incoming city value is never overwritten; only parent columns
    /// and the county are filled.
    pub fn resolve(&self, city: Option<&str>, state: Option<&str>) -> Hierarchy {
        let info = city.and_then(|c| self.cities.get(&c.trim().to_lowercase()));
        let county_resolved = info.and_then(|i| i.county.clone());
        let parent_state = state
            .map(|s| s.to_string())
            .or_else(|| info.and_then(|i| i.state.clone()));

        let parts: Vec<&str> = [city, county_resolved.as_deref(), parent_state.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        let location_hierarchy = if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        };

        Hierarchy {
            parent_county: city.and(county_resolved.clone()),
            county_resolved,
            parent_city: city.map(|c| c.to_string()),
            parent_state,
            location_hierarchy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_uuid_is_deterministic() {
        let a = correlation_uuid(EntityType::Property, "P1");
        let b = correlation_uuid(EntityType::Property, "P1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_correlation_uuid_varies_by_entity_and_key() {
        let property = correlation_uuid(EntityType::Property, "X1");
        let neighborhood = correlation_uuid(EntityType::Neighborhood, "X1");
        let other = correlation_uuid(EntityType::Property, "X2");
        assert_ne!(property, neighborhood);
        assert_ne!(property, other);
    }

    #[test]
    fn test_correlation_uuid_matches_truncated_sha256() {
        let mut hasher = Sha256::new();
        hasher.update(b"property");
        hasher.update(b"P1");
        let digest = hasher.finalize();
        let uuid = correlation_uuid(EntityType::Property, "P1");
        assert_eq!(&uuid.as_bytes()[..], &digest[..16]);
    }

    fn entries() -> Vec<LocationEntry> {
        vec![
            LocationEntry {
                state: Some("California".to_string()),
                county: Some("San Francisco County".to_string()),
                city: Some("San Francisco".to_string()),
                neighborhood: None,
            },
            LocationEntry {
                state: Some("Utah".to_string()),
                county: Some("Summit County".to_string()),
                city: Some("Park City".to_string()),
                neighborhood: Some("Old Town".to_string()),
            },
        ]
    }

    #[test]
    fn test_directory_resolves_county_and_hierarchy() {
        let directory = LocationDirectory::from_entries(&entries());
        let hierarchy = directory.resolve(Some("San Francisco"), Some("California"));
        assert_eq!(hierarchy.county_resolved.as_deref(), Some("San Francisco County"));
        assert_eq!(hierarchy.parent_city.as_deref(), Some("San Francisco"));
        assert_eq!(
            hierarchy.location_hierarchy.as_deref(),
            Some("San Francisco, San Francisco County, California")
        );
    }

    #[test]
    fn test_directory_fills_state_from_reference() {
        let directory = LocationDirectory::from_entries(&entries());
        let hierarchy = directory.resolve(Some("park city"), None);
        assert_eq!(hierarchy.parent_state.as_deref(), Some("Utah"));
    }

    #[test]
    fn test_directory_unknown_city() {
        let directory = LocationDirectory::from_entries(&entries());
        let hierarchy = directory.resolve(Some("Atlantis"), Some("California"));
        assert_eq!(hierarchy.county_resolved, None);
        assert_eq!(hierarchy.location_hierarchy.as_deref(), Some("Atlantis, California"));
    }
}
