use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::{BronzeRow, EntityType};
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::sources::RowOutcome;
use crate::store::TableName;

/// Convert raw read outcomes into the bronze image of the source.
///
/// Corrupt rows are preserved with the original payload in the
/// `corrupt_record` column. The only hard failure is a non-empty source
/// where every single row is corrupt.
pub fn to_bronze<T: Clone>(
    entity: EntityType,
    table: &TableName,
    outcomes: Vec<RowOutcome<T>>,
    source_file: &str,
    ingested_at: DateTime<Utc>,
) -> Result<Vec<BronzeRow<T>>> {
    let total = outcomes.len();
    let mut corrupt = 0usize;
    let rows: Vec<BronzeRow<T>> = outcomes
        .into_iter()
        .map(|outcome| match outcome {
            RowOutcome::Ok(record) => BronzeRow {
                record,
                corrupt_record: None,
                ingested_at,
                source_file: source_file.to_string(),
            },
            RowOutcome::Corrupt { record, raw, reason } => {
                corrupt += 1;
                warn!(entity = %entity, reason = %reason, "bronze: corrupt row retained");
                BronzeRow {
                    record,
                    corrupt_record: Some(raw),
                    ingested_at,
                    source_file: source_file.to_string(),
                }
            }
        })
        .collect();

    if total > 0 && corrupt == total {
        return Err(PipelineError::Transform {
            table: table.as_str().to_string(),
            reason: format!("all {total} rows are corrupt"),
        });
    }

    metrics::tiers::records_processed(entity.as_str(), "bronze", rows.len() as u64);
    info!(
        entity = %entity,
        table = %table,
        rows = rows.len(),
        corrupt,
        "bronze tier materialized"
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PropertyRecord, Tier};

    fn record(id: &str) -> PropertyRecord {
        PropertyRecord {
            listing_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    fn table() -> TableName {
        TableName::tiered(EntityType::Property, Tier::Bronze, 7)
    }

    #[test]
    fn test_corrupt_rows_are_retained_with_payload() {
        let outcomes = vec![
            RowOutcome::Ok(record("P1")),
            RowOutcome::Corrupt {
                record: record("P2"),
                raw: "{\"listing_id\":\"P2\",\"price\":\"NaN\"}".to_string(),
                reason: "listing_price: 'NaN' is not a finite number".to_string(),
            },
        ];
        let rows = to_bronze(
            EntityType::Property,
            &table(),
            outcomes,
            "listings.json",
            Utc::now(),
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(!rows[0].is_corrupt());
        assert!(rows[1].is_corrupt());
        assert!(rows[1].corrupt_record.as_ref().unwrap().contains("NaN"));
        assert_eq!(rows[1].source_file, "listings.json");
    }

    #[test]
    fn test_all_corrupt_aborts() {
        let outcomes = vec![RowOutcome::Corrupt {
            record: PropertyRecord::default(),
            raw: "{}".to_string(),
            reason: "missing listing_id".to_string(),
        }];
        let err = to_bronze(
            EntityType::Property,
            &table(),
            outcomes,
            "listings.json",
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Transform { .. }));
    }

    #[test]
    fn test_empty_source_is_fine() {
        let rows = to_bronze::<PropertyRecord>(
            EntityType::Property,
            &table(),
            Vec::new(),
            "listings.json",
            Utc::now(),
        )
        .unwrap();
        assert!(rows.is_empty());
    }
}
