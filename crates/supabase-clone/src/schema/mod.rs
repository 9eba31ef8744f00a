//! Schema discovery for the offline DDL path.
//!
//! An [`EntitySchema`] comes from one of three places, tried in order:
//! a hand-written column list from the configuration, the source's catalog
//! metadata, or inference over a small sample of rows. The result is turned
//! into `CREATE TABLE` text by [`emit`] and written out by [`artifacts`].

pub mod artifacts;
mod catalog;
pub mod emit;
mod infer;

pub use artifacts::SchemaArtifacts;
pub use catalog::{catalog_type_name, columns_from_catalog, CatalogColumn};
pub use emit::{emit, quote_ident};
pub use infer::{classify_value, infer_columns};

use crate::config::{ColumnDef, SchemaConfig};
use crate::error::{CloneError, Result};
use crate::remote::RemoteStore;
use crate::retry::RetryPolicy;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// Sample values kept per inferred column.
pub const MAX_SAMPLE_VALUES: usize = 5;

/// The closed set of types inference can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Uuid,
    Json,
}

impl StorageType {
    /// PostgreSQL type name used in emitted DDL.
    pub fn sql_name(&self) -> &'static str {
        match self {
            StorageType::Text => "text",
            StorageType::Integer => "int8",
            StorageType::Float => "float8",
            StorageType::Boolean => "boolean",
            StorageType::Timestamp => "timestamptz",
            StorageType::Uuid => "uuid",
            StorageType::Json => "jsonb",
        }
    }

    /// Parse one of the canonical spellings of a storage type.
    ///
    /// Other names, including `int4` or `json`, are not storage types.
    pub fn parse(name: &str) -> Option<Self> {
        let t = match name.trim().to_lowercase().as_str() {
            "text" => StorageType::Text,
            "int8" | "bigint" => StorageType::Integer,
            "float8" | "double precision" => StorageType::Float,
            "boolean" | "bool" => StorageType::Boolean,
            "timestamptz" | "timestamp with time zone" => StorageType::Timestamp,
            "uuid" => StorageType::Uuid,
            "jsonb" => StorageType::Json,
            _ => return None,
        };
        Some(t)
    }

    /// Most specific type consistent with both.
    ///
    /// Integer and float widen to float; any other disagreement is text.
    pub fn widen(self, other: StorageType) -> StorageType {
        use StorageType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Integer, Float) | (Float, Integer) => Float,
            _ => Text,
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// A column's type: inferred storage type or a name taken verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ColumnType {
    Storage(StorageType),
    /// Catalog, manual or override type outside the storage vocabulary,
    /// e.g. `numeric(10, 2)` or `text[]`.
    Native(String),
}

impl ColumnType {
    /// Type for a catalog or configuration type name; names outside the
    /// storage vocabulary are kept verbatim.
    pub fn from_type_name(name: &str) -> Self {
        match StorageType::parse(name) {
            Some(t) => ColumnType::Storage(t),
            None => ColumnType::Native(name.trim().to_string()),
        }
    }

    pub fn sql_name(&self) -> &str {
        match self {
            ColumnType::Storage(t) => t.sql_name(),
            ColumnType::Native(name) => name,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// One column of an entity schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferredColumn {
    pub name: String,
    pub column_type: ColumnType,
    /// A null was observed, or the column is nullable by policy.
    pub nullable: bool,
    /// First few non-null values seen; for audit only.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sample_values: Vec<Value>,
}

impl InferredColumn {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            sample_values: Vec::new(),
        }
    }
}

/// Where a schema came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaOrigin {
    Manual,
    Catalog,
    Inferred,
}

/// Columns of one entity, in first-observed order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySchema {
    pub entity_name: String,
    pub columns: Vec<InferredColumn>,
    pub primary_key_candidate: Option<String>,
    pub origin: SchemaOrigin,
}

impl EntitySchema {
    /// Build a schema; discovered schemas get a primary key candidate,
    /// manual ones are taken as written.
    pub fn new(entity_name: impl Into<String>, columns: Vec<InferredColumn>, origin: SchemaOrigin) -> Self {
        let entity_name = entity_name.into();
        let primary_key_candidate = match origin {
            SchemaOrigin::Manual => None,
            SchemaOrigin::Catalog | SchemaOrigin::Inferred => {
                primary_key_candidate(&entity_name, &columns)
            }
        };
        Self {
            entity_name,
            columns,
            primary_key_candidate,
            origin,
        }
    }

    pub fn column(&self, name: &str) -> Option<&InferredColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Force column types from an override table (column -> type name).
    ///
    /// Overrides for columns the schema does not have are ignored.
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, String>) {
        for column in &mut self.columns {
            if let Some(forced) = overrides.get(&column.name) {
                debug!(
                    "{}.{}: override {} -> {}",
                    self.entity_name, column.name, column.column_type, forced
                );
                column.column_type = ColumnType::from_type_name(forced);
            }
        }
    }
}

/// First column matching `id`, `uuid`, `<entity>_id`, `primary_key`.
pub fn primary_key_candidate(entity: &str, columns: &[InferredColumn]) -> Option<String> {
    let entity_id = format!("{}_id", entity);
    let found = ["id", "uuid", entity_id.as_str(), "primary_key"]
        .into_iter()
        .find(|candidate| columns.iter().any(|c| c.name == *candidate))
        .map(str::to_string);
    found
}

fn columns_from_manual(defs: &[ColumnDef]) -> Vec<InferredColumn> {
    defs.iter()
        .map(|d| InferredColumn::new(d.name.clone(), ColumnType::from_type_name(&d.r#type)))
        .collect()
}

/// Derives schemas from a source store.
pub struct SchemaExtractor<'a> {
    store: &'a dyn RemoteStore,
    retry: RetryPolicy,
    config: &'a SchemaConfig,
}

impl<'a> SchemaExtractor<'a> {
    pub fn new(store: &'a dyn RemoteStore, retry: RetryPolicy, config: &'a SchemaConfig) -> Self {
        Self { store, retry, config }
    }

    /// Schema for `entity`: manual definition, then catalog, then samples.
    ///
    /// The catalog is asked through the `get_table_definition` function
    /// first and `information_schema.columns` second. Fails with
    /// [`CloneError::Schema`] when the entity has no manual definition, no
    /// catalog entry and no rows to sample.
    pub async fn extract(&self, entity: &str) -> Result<EntitySchema> {
        if let Some(defs) = self.config.manual.get(entity) {
            info!("Using manual schema definition for {}", entity);
            return Ok(EntitySchema::new(entity, columns_from_manual(defs), SchemaOrigin::Manual));
        }

        let mut schema = match self.catalog(entity).await? {
            Some(columns) => {
                EntitySchema::new(entity, columns_from_catalog(&columns), SchemaOrigin::Catalog)
            }
            None => {
                info!("No catalog metadata for {}, inferring from data", entity);
                self.infer(entity).await?
            }
        };

        if let Some(overrides) = self.config.overrides.get(entity) {
            schema.apply_overrides(overrides);
        }
        Ok(schema)
    }

    /// Catalog columns from the first route that knows the entity.
    async fn catalog(&self, entity: &str) -> Result<Option<Vec<CatalogColumn>>> {
        match self.store.catalog_columns(entity).await {
            Ok(columns) if !columns.is_empty() => {
                info!("Read {} catalog columns for {}", columns.len(), entity);
                return Ok(Some(columns));
            }
            Ok(_) => debug!("catalog function has no columns for {}", entity),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => debug!("catalog function failed for {}: {}", entity, e),
        }

        match self.store.information_schema_columns(entity).await {
            Ok(columns) if !columns.is_empty() => {
                info!("Read {} information_schema columns for {}", columns.len(), entity);
                Ok(Some(columns))
            }
            Ok(_) => Ok(None),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                debug!("information_schema lookup failed for {}: {}", entity, e);
                Ok(None)
            }
        }
    }

    async fn infer(&self, entity: &str) -> Result<EntitySchema> {
        let limit = self.config.sample_size as u64;
        let label = format!("sampling rows from {}", entity);
        let rows = self
            .retry
            .execute(&label, || self.store.select_page(entity, 0, limit))
            .await?;

        if rows.is_empty() {
            return Err(CloneError::schema(entity, "no rows available to infer a schema from"));
        }
        Ok(EntitySchema::new(entity, infer_columns(&rows), SchemaOrigin::Inferred))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryStore, Operation};
    use serde_json::json;
    use std::time::Duration;

    fn rows(values: Value) -> Vec<crate::remote::Row> {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1), 1.5)
    }

    #[test]
    fn test_widen() {
        use StorageType::*;
        assert_eq!(Integer.widen(Float), Float);
        assert_eq!(Float.widen(Integer), Float);
        assert_eq!(Uuid.widen(Uuid), Uuid);
        assert_eq!(Uuid.widen(Timestamp), Text);
        assert_eq!(Boolean.widen(Integer), Text);
    }

    #[test]
    fn test_column_type_from_name() {
        assert_eq!(ColumnType::from_type_name("int8"), ColumnType::Storage(StorageType::Integer));
        assert_eq!(ColumnType::from_type_name("int4"), ColumnType::Native("int4".into()));
        assert_eq!(ColumnType::from_type_name("numeric(10, 2)").sql_name(), "numeric(10, 2)");
        assert_eq!(StorageType::parse("double precision"), Some(StorageType::Float));
        assert_eq!(StorageType::parse("money"), None);
    }

    #[test]
    fn test_primary_key_candidate_priority() {
        let cols = |names: &[&str]| -> Vec<InferredColumn> {
            names
                .iter()
                .map(|n| InferredColumn::new(*n, ColumnType::Storage(StorageType::Text)))
                .collect()
        };
        assert_eq!(primary_key_candidate("farm", &cols(&["uuid", "id"])), Some("id".into()));
        assert_eq!(primary_key_candidate("farm", &cols(&["name", "farm_id"])), Some("farm_id".into()));
        assert_eq!(primary_key_candidate("farm", &cols(&["block_id"])), None);

        let manual = EntitySchema::new("farm", cols(&["id"]), SchemaOrigin::Manual);
        assert_eq!(manual.primary_key_candidate, None);
    }

    #[tokio::test]
    async fn test_manual_schema_wins() {
        let mut config = SchemaConfig::default();
        config.manual.insert(
            "block_change_pending".into(),
            vec![
                ColumnDef { name: "reference".into(), r#type: "uuid".into() },
                ColumnDef { name: "status".into(), r#type: "text".into() },
            ],
        );
        let store = MemoryStore::new("source");

        let schema = SchemaExtractor::new(&store, fast_retry(), &config)
            .extract("block_change_pending")
            .await
            .unwrap();
        assert_eq!(schema.origin, SchemaOrigin::Manual);
        assert_eq!(schema.column_names().collect::<Vec<_>>(), vec!["reference", "status"]);
        assert_eq!(store.calls(Operation::Catalog, "block_change_pending"), 0);
    }

    #[tokio::test]
    async fn test_catalog_preferred_over_samples() {
        let catalog: Vec<CatalogColumn> = serde_json::from_value(json!([
            {"column_name": "id", "data_type": "bigint", "udt_name": "int8"},
            {"column_name": "price", "data_type": "numeric", "udt_name": "numeric",
             "numeric_precision": 10, "numeric_scale": 2}
        ]))
        .unwrap();
        let store = MemoryStore::new("source")
            .with_table("orders", rows(json!([{"id": 1, "price": 2.5}])))
            .with_catalog("orders", catalog);
        let config = SchemaConfig::default();

        let schema = SchemaExtractor::new(&store, fast_retry(), &config)
            .extract("orders")
            .await
            .unwrap();
        assert_eq!(schema.origin, SchemaOrigin::Catalog);
        assert_eq!(schema.column("price").unwrap().column_type.sql_name(), "numeric(10, 2)");
        assert!(schema.columns.iter().all(|c| c.nullable));
        assert_eq!(store.calls(Operation::SelectPage, "orders"), 0);
    }

    #[tokio::test]
    async fn test_information_schema_after_catalog_function() {
        let columns: Vec<CatalogColumn> = serde_json::from_value(json!([
            {"column_name": "id", "data_type": "uuid", "udt_name": "uuid"},
            {"column_name": "tags", "data_type": "ARRAY", "udt_name": "_text"},
            {"column_name": "stock", "data_type": "numeric", "udt_name": "numeric",
             "numeric_precision": 12, "numeric_scale": 3}
        ]))
        .unwrap();
        let store = MemoryStore::new("source")
            .with_table("inventory", rows(json!([{"id": "x", "tags": ["a"], "stock": 1}])))
            .with_information_schema("inventory", columns);
        let config = SchemaConfig::default();

        let schema = SchemaExtractor::new(&store, fast_retry(), &config)
            .extract("inventory")
            .await
            .unwrap();

        assert_eq!(schema.origin, SchemaOrigin::Catalog);
        assert_eq!(schema.column_names().collect::<Vec<_>>(), vec!["id", "tags", "stock"]);
        assert_eq!(schema.column("tags").unwrap().column_type.sql_name(), "text[]");
        assert_eq!(schema.column("stock").unwrap().column_type.sql_name(), "numeric(12, 3)");
        assert_eq!(store.calls(Operation::Catalog, "inventory"), 1);
        assert_eq!(store.calls(Operation::InformationSchema, "inventory"), 1);
        assert_eq!(store.calls(Operation::SelectPage, "inventory"), 0);
    }

    #[tokio::test]
    async fn test_catalog_function_skips_information_schema() {
        let store = MemoryStore::new("source")
            .with_catalog("orders", vec![CatalogColumn::new("id", "int8")])
            .with_information_schema("orders", vec![CatalogColumn::new("other", "text")]);
        let config = SchemaConfig::default();

        let schema = SchemaExtractor::new(&store, fast_retry(), &config)
            .extract("orders")
            .await
            .unwrap();

        assert_eq!(schema.column_names().collect::<Vec<_>>(), vec!["id"]);
        assert_eq!(store.calls(Operation::InformationSchema, "orders"), 0);
    }

    #[tokio::test]
    async fn test_falls_back_to_sampling_with_overrides() {
        let store = MemoryStore::new("source").with_table(
            "readings",
            rows(json!([{"id": 1, "value": 3}, {"id": 2, "value": 4}])),
        );
        let mut config = SchemaConfig::default();
        config
            .overrides
            .entry("readings".into())
            .or_default()
            .insert("value".into(), "float8".into());

        let schema = SchemaExtractor::new(&store, fast_retry(), &config)
            .extract("readings")
            .await
            .unwrap();
        assert_eq!(schema.origin, SchemaOrigin::Inferred);
        assert_eq!(store.calls(Operation::Catalog, "readings"), 1);
        assert_eq!(store.calls(Operation::InformationSchema, "readings"), 1);
        assert_eq!(schema.primary_key_candidate.as_deref(), Some("id"));
        assert_eq!(
            schema.column("value").unwrap().column_type,
            ColumnType::Storage(StorageType::Float)
        );
    }

    #[tokio::test]
    async fn test_no_rows_is_schema_error() {
        let store = MemoryStore::new("source").with_empty_table("empty_view");
        let config = SchemaConfig::default();

        let err = SchemaExtractor::new(&store, fast_retry(), &config)
            .extract("empty_view")
            .await
            .unwrap_err();
        assert!(matches!(err, CloneError::Schema { .. }));
    }
}
