use std::path::Path;

use tracing::{info, warn};

use crate::domain::LocationEntry;
use crate::error::Result;

use super::{coerce_string, field, read_json_values, ReadStats};

/// Reader for the location reference file. This is a dictionary input,
/// not an entity source: malformed rows are counted and skipped rather
/// than carried as corrupt records.
pub struct LocationReader;

impl LocationReader {
    pub fn read(path: &Path) -> Result<(Vec<LocationEntry>, ReadStats)> {
        let values = read_json_values(path, None)?;
        let mut entries = Vec::with_capacity(values.len());
        let mut corrupt = 0usize;
        for value in &values {
            let coerced = (|| -> std::result::Result<LocationEntry, String> {
                Ok(LocationEntry {
                    state: coerce_string(field(value, &["state"]))?,
                    county: coerce_string(field(value, &["county"]))?,
                    city: coerce_string(field(value, &["city"]))?,
                    neighborhood: coerce_string(field(value, &["neighborhood"]))?,
                })
            })();
            match coerced {
                Ok(entry) => entries.push(entry),
                Err(reason) => {
                    corrupt += 1;
                    warn!(reason = %reason, "skipping malformed location reference row");
                }
            }
        }

        let stats = ReadStats {
            rows_read: entries.len(),
            rows_corrupt: corrupt,
            source_path: path.display().to_string(),
        };
        info!(
            rows = stats.rows_read,
            skipped = stats.rows_corrupt,
            source = %stats.source_path,
            "read location reference"
        );
        Ok((entries, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_reference_rows_with_nullable_levels() {
        let mut file = tempfile::NamedTempFile::with_suffix(".json").unwrap();
        write!(
            file,
            r#"[
                {{"state": "California", "county": "San Francisco County", "city": "San Francisco", "neighborhood": "Mission"}},
                {{"state": "California", "county": "San Francisco County", "city": "San Francisco", "neighborhood": null}},
                {{"state": "California", "county": null, "city": null, "neighborhood": null}}
            ]"#
        )
        .unwrap();
        let (entries, stats) = LocationReader::read(file.path()).unwrap();
        assert_eq!(stats.rows_read, 3);
        assert!(entries[0].is_neighborhood());
        assert!(entries[1].is_city());
        assert!(!entries[2].is_city());
    }
}
