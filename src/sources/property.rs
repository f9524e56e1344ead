use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use crate::domain::{Address, Coordinates, PriceEvent, PropertyDetails, PropertyRecord};
use crate::error::Result;
use crate::observability::metrics;

use super::{
    coerce_date, coerce_f64, coerce_i64, coerce_string, coerce_string_array, field,
    read_json_values, ReadStats, RowOutcome,
};

/// Reader for property listing JSON (a file or directory of files).
pub struct PropertyReader;

impl PropertyReader {
    pub fn read(path: &Path, limit: Option<usize>) -> Result<(Vec<RowOutcome<PropertyRecord>>, ReadStats)> {
        let values = read_json_values(path, limit).inspect_err(|_| {
            metrics::sources::read_error("property");
        })?;

        let mut outcomes = Vec::with_capacity(values.len());
        let mut corrupt = 0usize;
        for value in &values {
            match coerce_property(value) {
                Ok(record) => outcomes.push(RowOutcome::Ok(record)),
                Err((record, reason)) => {
                    corrupt += 1;
                    warn!(reason = %reason, "property row failed coercion, keeping as corrupt");
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
        metrics::sources::rows_read("property", stats.rows_read as u64);
        metrics::sources::rows_corrupt("property", stats.rows_corrupt as u64);
        info!(
            rows = stats.rows_read,
            corrupt = stats.rows_corrupt,
            source = %stats.source_path,
            "read property source"
        );
        Ok((outcomes, stats))
    }
}

fn coerce_property(value: &Value) -> std::result::Result<PropertyRecord, (PropertyRecord, String)> {
    // Salvage the primary key up front so corrupt rows stay addressable.
    let listing_id = coerce_string(field(value, &["listing_id"])).unwrap_or(None);
    match coerce_property_inner(value, listing_id.clone()) {
        Ok(record) => Ok(record),
        Err(reason) => Err((
            PropertyRecord {
                listing_id,
                ..Default::default()
            },
            reason,
        )),
    }
}

fn coerce_property_inner(
    value: &Value,
    listing_id: Option<String>,
) -> std::result::Result<PropertyRecord, String> {
    if !value.is_object() {
        return Err("row is not a JSON object".to_string());
    }
    if listing_id.is_none() {
        return Err("missing listing_id".to_string());
    }

    let address = match field(value, &["address"]) {
        Some(obj) if obj.is_object() => Some(Address {
            street: coerce_string(field(obj, &["street"])).map_err(prefix("address.street"))?,
            city: coerce_string(field(obj, &["city"])).map_err(prefix("address.city"))?,
            county: coerce_string(field(obj, &["county"])).map_err(prefix("address.county"))?,
            state: coerce_string(field(obj, &["state"])).map_err(prefix("address.state"))?,
            zip: coerce_string(field(obj, &["zip", "zip_code"])).map_err(prefix("address.zip"))?,
        }),
        Some(_) => return Err("address is not an object".to_string()),
        None => None,
    };

    let coordinates = coerce_coordinates(field(value, &["coordinates"]))?;

    // Details may be nested under property_details or flat on the row.
    let details_obj = field(value, &["property_details"]).filter(|v| v.is_object());
    let lookup = |keys: &[&str]| -> Option<&Value> {
        details_obj.and_then(|d| field(d, keys)).or_else(|| field(value, keys))
    };
    let details = PropertyDetails {
        square_feet: coerce_f64(lookup(&["square_feet"])).map_err(prefix("square_feet"))?,
        bedrooms: coerce_i64(lookup(&["bedrooms"])).map_err(prefix("bedrooms"))?,
        bathrooms: coerce_f64(lookup(&["bathrooms"])).map_err(prefix("bathrooms"))?,
        property_type: coerce_string(lookup(&["property_type"])).map_err(prefix("property_type"))?,
        year_built: coerce_i64(lookup(&["year_built"])).map_err(prefix("year_built"))?,
        lot_size: coerce_f64(lookup(&["lot_size"])).map_err(prefix("lot_size"))?,
        stories: coerce_i64(lookup(&["stories"])).map_err(prefix("stories"))?,
        garage_spaces: coerce_i64(lookup(&["garage_spaces"])).map_err(prefix("garage_spaces"))?,
    };

    let price_history = match field(value, &["price_history"]) {
        Some(Value::Array(items)) => {
            let mut events = Vec::with_capacity(items.len());
            for item in items {
                events.push(PriceEvent {
                    date: coerce_date(field(item, &["date"])).map_err(prefix("price_history.date"))?,
                    price: coerce_f64(field(item, &["price"])).map_err(prefix("price_history.price"))?,
                    event: coerce_string(field(item, &["event"])).map_err(prefix("price_history.event"))?,
                });
            }
            events
        }
        Some(Value::Null) | None => Vec::new(),
        Some(_) => return Err("price_history is not an array".to_string()),
    };

    Ok(PropertyRecord {
        listing_id,
        neighborhood_id: coerce_string(field(value, &["neighborhood_id"]))
            .map_err(prefix("neighborhood_id"))?,
        title: coerce_string(field(value, &["title"])).map_err(prefix("title"))?,
        address,
        coordinates,
        details,
        listing_price: coerce_f64(field(value, &["listing_price", "price"]))
            .map_err(prefix("listing_price"))?,
        price_per_sqft: coerce_f64(field(value, &["price_per_sqft"]))
            .map_err(prefix("price_per_sqft"))?,
        description: coerce_string(field(value, &["description"])).map_err(prefix("description"))?,
        features: coerce_string_array(field(value, &["features"])).map_err(prefix("features"))?,
        amenities: coerce_string_array(field(value, &["amenities"])).map_err(prefix("amenities"))?,
        listing_date: coerce_date(field(value, &["listing_date"])).map_err(prefix("listing_date"))?,
        days_on_market: coerce_i64(field(value, &["days_on_market"]))
            .map_err(prefix("days_on_market"))?,
        price_history,
    })
}

pub(super) fn coerce_coordinates(
    value: Option<&Value>,
) -> std::result::Result<Option<Coordinates>, String> {
    match value {
        Some(obj) if obj.is_object() => {
            let latitude = coerce_f64(field(obj, &["lat", "latitude"])).map_err(prefix("coordinates.lat"))?;
            let longitude =
                coerce_f64(field(obj, &["lon", "lng", "longitude"])).map_err(prefix("coordinates.lon"))?;
            match (latitude, longitude) {
                (Some(latitude), Some(longitude)) => Ok(Some(Coordinates { latitude, longitude })),
                _ => Ok(None),
            }
        }
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err("coordinates is not an object".to_string()),
    }
}

fn prefix(name: &'static str) -> impl Fn(String) -> String {
    move |reason| format!("{name}: {reason}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_coerce_full_property() {
        let value = json!({
            "listing_id": "P1",
            "price": 800000,
            "square_feet": 2000,
            "bedrooms": 3,
            "bathrooms": 2,
            "address": {"city": "SF", "state": "CA"},
            "features": ["Pool", "pool", "Garage"]
        });
        let record = coerce_property(&value).unwrap();
        assert_eq!(record.listing_id.as_deref(), Some("P1"));
        assert_eq!(record.listing_price, Some(800000.0));
        assert_eq!(record.details.square_feet, Some(2000.0));
        assert_eq!(record.details.bedrooms, Some(3));
        assert_eq!(record.address.as_ref().unwrap().city.as_deref(), Some("SF"));
        assert_eq!(record.features.len(), 3);
    }

    #[test]
    fn test_nan_price_is_corrupt_with_salvaged_key() {
        let value = json!({"listing_id": "P2", "price": "NaN"});
        let (salvaged, reason) = coerce_property(&value).unwrap_err();
        assert_eq!(salvaged.listing_id.as_deref(), Some("P2"));
        assert!(reason.contains("listing_price"));
    }

    #[test]
    fn test_missing_listing_id_is_corrupt() {
        let value = json!({"price": 100000});
        let (salvaged, reason) = coerce_property(&value).unwrap_err();
        assert!(salvaged.listing_id.is_none());
        assert!(reason.contains("listing_id"));
    }

    #[test]
    fn test_nested_details_take_precedence() {
        let value = json!({
            "listing_id": "P3",
            "square_feet": 100,
            "property_details": {"square_feet": 1500, "property_type": "condo"}
        });
        let record = coerce_property(&value).unwrap();
        assert_eq!(record.details.square_feet, Some(1500.0));
        assert_eq!(record.details.property_type.as_deref(), Some("condo"));
    }

    #[test]
    fn test_read_counts_corrupt_rows() {
        let mut file = tempfile::NamedTempFile::with_suffix(".json").unwrap();
        write!(
            file,
            r#"[{{"listing_id": "P1", "price": 500000}}, {{"listing_id": "P2", "price": "NaN"}}]"#
        )
        .unwrap();
        let (outcomes, stats) = PropertyReader::read(file.path(), None).unwrap();
        assert_eq!(stats.rows_read, 2);
        assert_eq!(stats.rows_corrupt, 1);
        assert!(!outcomes[0].is_corrupt());
        assert!(outcomes[1].is_corrupt());
    }

    #[test]
    fn test_limit_reads_first_rows_in_order() {
        let mut file = tempfile::NamedTempFile::with_suffix(".json").unwrap();
        write!(
            file,
            r#"[{{"listing_id": "P1"}}, {{"listing_id": "P2"}}, {{"listing_id": "P3"}}]"#
        )
        .unwrap();
        let (outcomes, stats) = PropertyReader::read(file.path(), Some(2)).unwrap();
        assert_eq!(stats.rows_read, 2);
        assert_eq!(outcomes[0].record().listing_id.as_deref(), Some("P1"));
        assert_eq!(outcomes[1].record().listing_id.as_deref(), Some("P2"));
    }
}
