//! Mapping of catalog column metadata.

use super::{ColumnType, InferredColumn};
use serde::{Deserialize, Serialize};

/// One row of catalog metadata, shaped like `information_schema.columns`.
///
/// Nullability is not read: every catalog-derived column is nullable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogColumn {
    pub column_name: String,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub udt_name: Option<String>,
    #[serde(default)]
    pub numeric_precision: Option<u32>,
    #[serde(default)]
    pub numeric_scale: Option<u32>,
}

impl CatalogColumn {
    pub fn new(column_name: impl Into<String>, udt_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            data_type: None,
            udt_name: Some(udt_name.into()),
            numeric_precision: None,
            numeric_scale: None,
        }
    }
}

/// Most specific type name for a catalog column.
///
/// Prefers `udt_name` (`int8` over `bigint`), spells array types
/// (`_text`) as `text[]` and keeps numeric precision and scale.
pub fn catalog_type_name(column: &CatalogColumn) -> String {
    let name = [column.udt_name.as_deref(), column.data_type.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|n| !n.is_empty())
        .unwrap_or("text");

    if let Some(element) = name.strip_prefix('_') {
        return format!("{}[]", element);
    }

    match (name, column.numeric_precision) {
        ("numeric", Some(precision)) if precision > 0 => {
            format!("numeric({}, {})", precision, column.numeric_scale.unwrap_or(0))
        }
        _ => name.to_string(),
    }
}

/// Columns for catalog rows, all nullable.
pub fn columns_from_catalog(columns: &[CatalogColumn]) -> Vec<InferredColumn> {
    columns
        .iter()
        .map(|c| InferredColumn::new(c.column_name.clone(), ColumnType::from_type_name(&catalog_type_name(c))))
        .collect()
}
