use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::domain::{EntityType, Tier};
use crate::error::{PipelineError, Result};

/// Rows stored in the tiered table store. Any serializable, cloneable
/// value works; serialization is used to derive the table schema and to
/// project rows into sink documents.
pub trait TableRow: Serialize + Clone + Send + Sync + 'static {}

impl<T: Serialize + Clone + Send + Sync + 'static> TableRow for T {}

/// One column of a table schema, derived from the first stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub data_type: String,
}

/// Identifier for a table inside a run's namespace. Renders to the
/// persisted naming convention: `{entity}_{tier}_{runId}` for tier
/// tables, `{entity}_gold_embeddings_{runId}` for embeddings and
/// `enriched_{a}_{b}_{runId}` for cross-entity projections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    name: String,
    run_id: u64,
}

impl TableName {
    pub fn tiered(entity: EntityType, tier: Tier, run_id: u64) -> Self {
        Self {
            name: format!("{entity}_{tier}_{run_id}"),
            run_id,
        }
    }

    pub fn embeddings(entity: EntityType, run_id: u64) -> Self {
        Self {
            name: format!("{entity}_gold_embeddings_{run_id}"),
            run_id,
        }
    }

    pub fn enriched(a: EntityType, b: EntityType, run_id: u64) -> Self {
        Self {
            name: format!("enriched_{a}_{b}_{run_id}"),
            run_id,
        }
    }

    pub fn suffixed(entity: EntityType, tier: Tier, suffix: &str, run_id: u64) -> Self {
        Self {
            name: format!("{entity}_{tier}_{suffix}_{run_id}"),
            run_id,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

struct StoredTable {
    rows: Arc<dyn Any + Send + Sync>,
    len: usize,
    schema: Vec<Field>,
    run_id: u64,
}

/// In-process analytical table store shared by all processors of a run.
///
/// Tables are write-once: `create` with an existing name fails, and the
/// stored row vector is immutable behind an `Arc`. Subsequent tiers
/// always create new tables. The interior lock serializes same-name
/// creation while reads run concurrently.
#[derive(Default)]
pub struct TableStore {
    tables: RwLock<HashMap<String, StoredTable>>,
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an immutable table from the given rows. Fails with
    /// `TableExists` if the name is already taken in this store.
    pub fn create<R: TableRow>(&self, name: &TableName, rows: Vec<R>) -> Result<Arc<Vec<R>>> {
        let schema = rows.first().map(schema_of).unwrap_or_default();
        let len = rows.len();
        let shared = Arc::new(rows);
        let mut tables = self.tables.write().expect("table store lock poisoned");
        if tables.contains_key(name.as_str()) {
            return Err(PipelineError::TableExists(name.as_str().to_string()));
        }
        tables.insert(
            name.as_str().to_string(),
            StoredTable {
                rows: shared.clone() as Arc<dyn Any + Send + Sync>,
                len,
                schema,
                run_id: name.run_id(),
            },
        );
        Ok(shared)
    }

    /// Fetch the typed rows of a table. The row type must match the one
    /// used at creation.
    pub fn rows<R: TableRow>(&self, name: &TableName) -> Result<Arc<Vec<R>>> {
        let tables = self.tables.read().expect("table store lock poisoned");
        let table = tables
            .get(name.as_str())
            .ok_or_else(|| PipelineError::TableNotFound(name.as_str().to_string()))?;
        table
            .rows
            .clone()
            .downcast::<Vec<R>>()
            .map_err(|_| PipelineError::Transform {
                table: name.as_str().to_string(),
                reason: "row type mismatch".to_string(),
            })
    }

    pub fn count(&self, name: &TableName) -> Result<usize> {
        let tables = self.tables.read().expect("table store lock poisoned");
        tables
            .get(name.as_str())
            .map(|t| t.len)
            .ok_or_else(|| PipelineError::TableNotFound(name.as_str().to_string()))
    }

    /// Up to `k` rows from the start of the table. Ordering beyond that
    /// is whatever the creating transform produced.
    pub fn sample<R: TableRow>(&self, name: &TableName, k: usize) -> Result<Vec<R>> {
        let rows = self.rows::<R>(name)?;
        Ok(rows.iter().take(k).cloned().collect())
    }

    pub fn schema(&self, name: &TableName) -> Result<Vec<Field>> {
        let tables = self.tables.read().expect("table store lock poisoned");
        tables
            .get(name.as_str())
            .map(|t| t.schema.clone())
            .ok_or_else(|| PipelineError::TableNotFound(name.as_str().to_string()))
    }

    pub fn drop_table(&self, name: &TableName) -> bool {
        let mut tables = self.tables.write().expect("table store lock poisoned");
        tables.remove(name.as_str()).is_some()
    }

    /// Drop every table belonging to a run. Returns the dropped names.
    pub fn drop_run(&self, run_id: u64) -> Vec<String> {
        let mut tables = self.tables.write().expect("table store lock poisoned");
        let names: Vec<String> = tables
            .iter()
            .filter(|(_, t)| t.run_id == run_id)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &names {
            tables.remove(name);
        }
        names
    }

    pub fn table_names(&self, run_id: u64) -> Vec<String> {
        let tables = self.tables.read().expect("table store lock poisoned");
        let mut names: Vec<String> = tables
            .iter()
            .filter(|(_, t)| t.run_id == run_id)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &TableName) -> bool {
        let tables = self.tables.read().expect("table store lock poisoned");
        tables.contains_key(name.as_str())
    }
}

fn schema_of<R: Serialize>(row: &R) -> Vec<Field> {
    match serde_json::to_value(row) {
        Ok(serde_json::Value::Object(map)) => map
            .into_iter()
            .map(|(name, value)| Field {
                name,
                data_type: json_type_name(&value).to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "long",
        serde_json::Value::Number(_) => "double",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "struct",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Debug, Clone, Serialize, PartialEq)]
    struct TestRow {
        id: String,
        value: f64,
        tags: Vec<String>,
    }

    fn test_rows() -> Vec<TestRow> {
        vec![
            TestRow {
                id: "a".to_string(),
                value: 1.5,
                tags: vec!["x".to_string()],
            },
            TestRow {
                id: "b".to_string(),
                value: 2.5,
                tags: Vec::new(),
            },
        ]
    }

    #[test]
    fn test_table_naming_convention() {
        let name = TableName::tiered(EntityType::Property, Tier::Bronze, 1700000000);
        assert_eq!(name.as_str(), "property_bronze_1700000000");

        let name = TableName::embeddings(EntityType::Neighborhood, 42);
        assert_eq!(name.as_str(), "neighborhood_gold_embeddings_42");

        let name = TableName::enriched(EntityType::Property, EntityType::Wikipedia, 42);
        assert_eq!(name.as_str(), "enriched_property_wikipedia_42");
    }

    #[test]
    fn test_create_and_read_back() {
        let store = TableStore::new();
        let name = TableName::tiered(EntityType::Property, Tier::Bronze, 1);
        store.create(&name, test_rows()).unwrap();

        assert_eq!(store.count(&name).unwrap(), 2);
        let rows = store.rows::<TestRow>(&name).unwrap();
        assert_eq!(rows[0].id, "a");
        let sampled = store.sample::<TestRow>(&name, 1).unwrap();
        assert_eq!(sampled.len(), 1);
    }

    #[test]
    fn test_create_is_write_once() {
        let store = TableStore::new();
        let name = TableName::tiered(EntityType::Property, Tier::Bronze, 1);
        store.create(&name, test_rows()).unwrap();
        let err = store.create(&name, test_rows()).unwrap_err();
        assert!(matches!(err, PipelineError::TableExists(_)));
    }

    #[test]
    fn test_schema_derived_from_rows() {
        let store = TableStore::new();
        let name = TableName::tiered(EntityType::Property, Tier::Bronze, 1);
        store.create(&name, test_rows()).unwrap();

        let schema = store.schema(&name).unwrap();
        let id_field = schema.iter().find(|f| f.name == "id").unwrap();
        assert_eq!(id_field.data_type, "string");
        let value_field = schema.iter().find(|f| f.name == "value").unwrap();
        assert_eq!(value_field.data_type, "double");
        let tags_field = schema.iter().find(|f| f.name == "tags").unwrap();
        assert_eq!(tags_field.data_type, "array");
    }

    #[test]
    fn test_drop_run_removes_only_that_namespace() {
        let store = TableStore::new();
        let run_a = TableName::tiered(EntityType::Property, Tier::Bronze, 1);
        let run_b = TableName::tiered(EntityType::Property, Tier::Bronze, 2);
        store.create(&run_a, test_rows()).unwrap();
        store.create(&run_b, test_rows()).unwrap();

        let dropped = store.drop_run(1);
        assert_eq!(dropped, vec!["property_bronze_1".to_string()]);
        assert!(!store.contains(&run_a));
        assert!(store.contains(&run_b));
    }

    #[test]
    fn test_missing_table_errors() {
        let store = TableStore::new();
        let name = TableName::tiered(EntityType::Wikipedia, Tier::Gold, 9);
        assert!(matches!(
            store.count(&name),
            Err(PipelineError::TableNotFound(_))
        ));
    }
}
