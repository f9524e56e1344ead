//! Source readers.
//!
//! Each reader parses one external input into typed raw records with
//! permissive, per-row error capture: a row that fails type coercion is
//! surfaced as a `RowOutcome::Corrupt` carrying the original payload
//! text, never as a reader failure. Only a missing path or a top-level
//! parse failure aborts the read.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::error::{PipelineError, Result};

pub mod locations;
pub mod neighborhood;
pub mod property;
pub mod wikipedia;

pub use locations::LocationReader;
pub use neighborhood::NeighborhoodReader;
pub use property::PropertyReader;
pub use wikipedia::WikipediaReader;

/// Per-read accounting returned alongside the raw rows.
#[derive(Debug, Clone, Serialize)]
pub struct ReadStats {
    pub rows_read: usize,
    pub rows_corrupt: usize,
    pub source_path: String,
}

/// Outcome of coercing one source row into its typed record.
#[derive(Debug, Clone)]
pub enum RowOutcome<T> {
    Ok(T),
    Corrupt { record: T, raw: String, reason: String },
}

impl<T> RowOutcome<T> {
    pub fn is_corrupt(&self) -> bool {
        matches!(self, RowOutcome::Corrupt { .. })
    }

    pub fn record(&self) -> &T {
        match self {
            RowOutcome::Ok(record) => record,
            RowOutcome::Corrupt { record, .. } => record,
        }
    }
}

/// Read a JSON array of objects from a file, or from every `.json` file
/// in a directory concatenated in filename order. `limit` caps the rows
/// deterministically in source order.
pub fn read_json_values(path: &Path, limit: Option<usize>) -> Result<Vec<Value>> {
    if !path.exists() {
        return Err(PipelineError::SourceMissing(path.display().to_string()));
    }

    let mut values = Vec::new();
    if path.is_dir() {
        let mut files: Vec<_> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect();
        files.sort();
        for file in files {
            append_json_array(&file, &mut values)?;
            if let Some(limit) = limit {
                if values.len() >= limit {
                    break;
                }
            }
        }
    } else {
        append_json_array(path, &mut values)?;
    }

    if let Some(limit) = limit {
        values.truncate(limit);
    }
    Ok(values)
}

fn append_json_array(path: &Path, out: &mut Vec<Value>) -> Result<()> {
    let raw = std::fs::read_to_string(path)?;
    let parsed: Value =
        serde_json::from_str(&raw).map_err(|e| PipelineError::SourceUnparseable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    match parsed {
        Value::Array(items) => {
            out.extend(items);
            Ok(())
        }
        _ => Err(PipelineError::SourceUnparseable {
            path: path.display().to_string(),
            reason: "expected a top-level JSON array".to_string(),
        }),
    }
}

/// First value found under any of the given keys. Mirrors the fallback
/// chains used when source payloads disagree on field names.
pub fn field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| {
        let v = value.get(k)?;
        if v.is_null() {
            None
        } else {
            Some(v)
        }
    })
}

/// Coerce to a trimmed string; empty string is null. Numbers are
/// accepted (zip codes and ids arrive as either).
pub fn coerce_string(value: Option<&Value>) -> std::result::Result<Option<String>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(format!("expected string, got {}", type_name(other))),
    }
}

/// Coerce to a finite f64. Numeric strings are parsed with
/// locale-independent rules; non-finite values are rejected.
pub fn coerce_f64(value: Option<&Value>) -> std::result::Result<Option<f64>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f.is_finite() => Ok(Some(f)),
            _ => Err("non-finite number".to_string()),
        },
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            match trimmed.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Some(f)),
                _ => Err(format!("'{trimmed}' is not a finite number")),
            }
        }
        Some(other) => Err(format!("expected number, got {}", type_name(other))),
    }
}

/// Coerce to an i64. Accepts whole-valued floats and numeric strings.
pub fn coerce_i64(value: Option<&Value>) -> std::result::Result<Option<i64>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(i))
            } else if let Some(f) = n.as_f64() {
                if f.is_finite() && f.fract() == 0.0 {
                    Ok(Some(f as i64))
                } else {
                    Err(format!("'{f}' is not a whole number"))
                }
            } else {
                Err("number out of range".to_string())
            }
        }
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<i64>()
                .map(Some)
                .map_err(|_| format!("'{trimmed}' is not an integer"))
        }
        Some(other) => Err(format!("expected integer, got {}", type_name(other))),
    }
}

/// Coerce to a string array; a missing field is an empty array, never
/// null. Entries are trimmed and blanks dropped.
pub fn coerce_string_array(value: Option<&Value>) -> std::result::Result<Vec<String>, String> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => {
                        let trimmed = s.trim();
                        if !trimmed.is_empty() {
                            out.push(trimmed.to_string());
                        }
                    }
                    Value::Number(n) => out.push(n.to_string()),
                    Value::Null => {}
                    other => return Err(format!("array element is {}", type_name(other))),
                }
            }
            Ok(out)
        }
        Some(other) => Err(format!("expected array, got {}", type_name(other))),
    }
}

/// Coerce a date string. Accepts ISO dates and the US forms that appear
/// in listing feeds.
pub fn coerce_date(
    value: Option<&Value>,
) -> std::result::Result<Option<chrono::NaiveDate>, String> {
    let Some(text) = coerce_string(value)? else {
        return Ok(None);
    };
    let candidate = text.split('T').next().unwrap_or(&text);
    chrono::NaiveDate::parse_from_str(candidate, "%Y-%m-%d")
        .or_else(|_| chrono::NaiveDate::parse_from_str(candidate, "%m/%d/%Y"))
        .or_else(|_| chrono::NaiveDate::parse_from_str(candidate, "%m-%d-%Y"))
        .map(Some)
        .map_err(|_| format!("'{text}' is not a recognized date"))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
