//! Remote store abstraction.
//!
//! The replication engine only needs row-level access to a store: counting,
//! paging, inserting, upserting, deleting by predicate, and a cheap
//! existence check. [`PostgrestStore`] speaks that over HTTP;
//! [`MemoryStore`] keeps everything in process.

mod memory;
mod postgrest;

pub use memory::{MemoryStore, Operation};
pub use postgrest::PostgrestStore;

use crate::error::{RemoteError, Result};
use crate::schema::CatalogColumn;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// A row as returned by the store: column name to JSON value, in column order.
pub type Row = serde_json::Map<String, Value>;

/// Row filter understood by every store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `column <> value`
    NotEqual { column: String, value: Value },
    /// `column >= value`
    GreaterOrEqual { column: String, value: Value },
}

impl Predicate {
    pub fn not_equal(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::NotEqual {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn greater_or_equal(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::GreaterOrEqual {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Predicate::NotEqual { column, .. } | Predicate::GreaterOrEqual { column, .. } => column,
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            Predicate::NotEqual { value, .. } | Predicate::GreaterOrEqual { value, .. } => value,
        }
    }

    /// PostgREST operator for this predicate.
    pub fn operator(&self) -> &'static str {
        match self {
            Predicate::NotEqual { .. } => "neq",
            Predicate::GreaterOrEqual { .. } => "gte",
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Predicate::NotEqual { .. } => "<>",
            Predicate::GreaterOrEqual { .. } => ">=",
        };
        write!(f, "{} {} {}", self.column(), op, self.value())
    }
}

/// Row-level operations against one store.
///
/// Errors are returned as [`CloneError::Remote`](crate::CloneError::Remote)
/// so callers can classify them with [`RemoteError::kind`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Exact number of rows, optionally filtered.
    ///
    /// `Ok(None)` means the store could not produce an exact count.
    async fn count(&self, entity: &str, filter: Option<&Predicate>) -> Result<Option<u64>>;

    /// Up to `limit` rows starting at zero-based `offset`.
    async fn select_page(&self, entity: &str, offset: u64, limit: u64) -> Result<Vec<Row>>;

    /// Insert rows; all or nothing.
    async fn insert(&self, entity: &str, rows: &[Row]) -> Result<()>;

    /// Insert rows, updating existing ones that collide on `conflict_column`.
    async fn upsert(&self, entity: &str, rows: &[Row], conflict_column: &str) -> Result<()>;

    /// Delete every row matching `predicate`.
    async fn delete(&self, entity: &str, predicate: &Predicate) -> Result<()>;

    /// Whether the entity can be queried at all.
    async fn exists(&self, entity: &str) -> Result<bool>;

    /// Column metadata from the database catalog.
    ///
    /// Stores without catalog access keep the default, which reports the
    /// capability as missing.
    async fn catalog_columns(&self, entity: &str) -> Result<Vec<CatalogColumn>> {
        Err(RemoteError::new(format!("catalog metadata unavailable for {}", entity)).into())
    }

    /// Column metadata from `information_schema.columns`, in ordinal order.
    ///
    /// Second catalog route, for projects without the catalog function.
    async fn information_schema_columns(&self, entity: &str) -> Result<Vec<CatalogColumn>> {
        Err(RemoteError::new(format!("information_schema unavailable for {}", entity)).into())
    }

    /// Short name used in logs ("source", "destination").
    fn name(&self) -> &str;
}

/// Render a JSON scalar the way it appears in a filter or message.
pub(crate) fn value_literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_predicate_accessors() {
        let p = Predicate::not_equal("id", 0);
        assert_eq!(p.column(), "id");
        assert_eq!(p.operator(), "neq");
        assert_eq!(p.value(), &json!(0));
        assert_eq!(p.to_string(), "id <> 0");

        let p = Predicate::greater_or_equal("created_at", "1970-01-01");
        assert_eq!(p.operator(), "gte");
        assert_eq!(value_literal(p.value()), "1970-01-01");
    }
}
