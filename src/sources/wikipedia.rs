use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use tracing::{info, warn};

use crate::domain::WikipediaRecord;
use crate::error::{PipelineError, Result};
use crate::observability::metrics;

use super::{ReadStats, RowOutcome};

/// Reader for the Wikipedia article/summary relational store.
///
/// Joins `articles` with `page_summaries`, keeps only articles that have
/// a long summary, and returns them most-relevant first.
pub struct WikipediaReader;

const ARTICLES_QUERY: &str = "\
    SELECT a.pageid, a.title, a.url, a.relevance_score, a.latitude, a.longitude, a.categories, \
           s.short_summary, s.long_summary, s.key_topics, s.best_city, s.best_state, s.confidence_score \
    FROM articles a \
    INNER JOIN page_summaries s ON a.pageid = s.page_id \
    WHERE s.long_summary IS NOT NULL AND s.long_summary != '' \
    ORDER BY a.relevance_score DESC";

impl WikipediaReader {
    pub fn read(
        path: &Path,
        limit: Option<usize>,
    ) -> Result<(Vec<RowOutcome<WikipediaRecord>>, ReadStats)> {
        if !path.exists() {
            metrics::sources::read_error("wikipedia");
            return Err(PipelineError::SourceMissing(path.display().to_string()));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| PipelineError::SourceUnparseable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let sql = match limit {
            Some(n) => format!("{ARTICLES_QUERY} LIMIT {n}"),
            None => ARTICLES_QUERY.to_string(),
        };
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| PipelineError::SourceUnparseable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut outcomes = Vec::new();
        let mut corrupt = 0usize;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            match coerce_article(row) {
                Ok(record) => outcomes.push(RowOutcome::Ok(record)),
                Err((record, reason)) => {
                    corrupt += 1;
                    warn!(reason = %reason, "wikipedia row failed coercion, keeping as corrupt");
                    let raw = format!(
                        "pageid={} title={:?}",
                        record.page_id.map(|id| id.to_string()).unwrap_or_default(),
                        record.title
                    );
                    outcomes.push(RowOutcome::Corrupt { record, raw, reason });
                }
            }
        }

        let stats = ReadStats {
            rows_read: outcomes.len(),
            rows_corrupt: corrupt,
            source_path: path.display().to_string(),
        };
        metrics::sources::rows_read("wikipedia", stats.rows_read as u64);
        metrics::sources::rows_corrupt("wikipedia", stats.rows_corrupt as u64);
        info!(
            rows = stats.rows_read,
            corrupt = stats.rows_corrupt,
            source = %stats.source_path,
            "read wikipedia store"
        );
        Ok((outcomes, stats))
    }
}

fn coerce_article(
    row: &rusqlite::Row<'_>,
) -> std::result::Result<WikipediaRecord, (WikipediaRecord, String)> {
    let page_id: Option<i64> = row.get(0).unwrap_or(None);
    let title: Option<String> = row.get(1).unwrap_or(None);

    let salvage = |reason: String| {
        (
            WikipediaRecord {
                page_id,
                title: title.clone(),
                ..Default::default()
            },
            reason,
        )
    };

    let Some(page_id_value) = page_id else {
        return Err(salvage("missing pageid".to_string()));
    };
    if page_id_value <= 0 {
        return Err(salvage(format!("pageid {page_id_value} is not positive")));
    }

    let get_text = |idx: usize, name: &str| -> std::result::Result<Option<String>, String> {
        row.get::<_, Option<String>>(idx)
            .map(|v| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
            .map_err(|e| format!("{name}: {e}"))
    };
    let get_real = |idx: usize, name: &str| -> std::result::Result<Option<f64>, String> {
        row.get::<_, Option<f64>>(idx)
            .map(|v| v.filter(|f| f.is_finite()))
            .map_err(|e| format!("{name}: {e}"))
    };

    let build = || -> std::result::Result<WikipediaRecord, String> {
        Ok(WikipediaRecord {
            page_id: Some(page_id_value),
            title: title.clone(),
            url: get_text(2, "url")?,
            relevance_score: get_real(3, "relevance_score")?,
            latitude: get_real(4, "latitude")?,
            longitude: get_real(5, "longitude")?,
            categories: get_text(6, "categories")?
                .map(|s| parse_list_column(&s))
                .unwrap_or_default(),
            short_summary: get_text(7, "short_summary")?,
            long_summary: get_text(8, "long_summary")?,
            key_topics: get_text(9, "key_topics")?
                .map(|s| parse_list_column(&s))
                .unwrap_or_default(),
            best_city: get_text(10, "best_city")?,
            best_state: get_text(11, "best_state")?,
            confidence_score: get_real(12, "confidence_score")?,
        })
    };
    build().map_err(salvage)
}

/// List columns are stored either as JSON arrays or comma-separated
/// text depending on which crawler produced the row.
fn parse_list_column(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(trimmed) {
            return items
                .into_iter()
                .filter_map(|v| match v {
                    serde_json::Value::String(s) => {
                        let s = s.trim().to_string();
                        (!s.is_empty()).then_some(s)
                    }
                    _ => None,
                })
                .collect();
        }
    }
    trimmed
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
