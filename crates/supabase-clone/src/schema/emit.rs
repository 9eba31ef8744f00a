//! `CREATE TABLE` generation.
//!
//! Identifiers are validated and double-quoted. Emitted statements are for
//! a human to review and run; nothing here executes them.

use super::EntitySchema;
use crate::error::{CloneError, Result};

/// PostgreSQL truncates identifiers longer than this (NAMEDATALEN - 1).
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validate an identifier.
///
/// Rejects empty names, names containing a null byte and names longer
/// than PostgreSQL keeps.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CloneError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(CloneError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(CloneError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Comment emitted in place of a statement when nothing is known about an entity.
pub fn no_schema_comment(entity: &str) -> String {
    format!("-- No schema information available for {}\n", entity)
}

/// Render the statement(s) creating storage for `schema`.
///
/// With `drop_existing` a `DROP TABLE IF EXISTS` precedes the create.
/// Columns are never `NOT NULL`; a primary key is declared only when the
/// schema names a candidate.
pub fn emit(schema: &EntitySchema, drop_existing: bool) -> Result<String> {
    if schema.columns.is_empty() {
        return Ok(no_schema_comment(&schema.entity_name));
    }

    let table = quote_ident(&schema.entity_name)?;
    let mut sql = String::new();
    if drop_existing {
        sql.push_str(&format!("DROP TABLE IF EXISTS {};\n\n", table));
    }

    let mut lines = Vec::with_capacity(schema.columns.len() + 1);
    for column in &schema.columns {
        lines.push(format!("  {} {}", quote_ident(&column.name)?, column.column_type));
    }
    if let Some(pk) = &schema.primary_key_candidate {
        if schema.column(pk).is_none() {
            return Err(CloneError::schema(
                &schema.entity_name,
                format!("primary key candidate {} is not a column", pk),
            ));
        }
        lines.push(format!("  PRIMARY KEY ({})", quote_ident(pk)?));
    }

    sql.push_str(&format!("CREATE TABLE IF NOT EXISTS {} (\n", table));
    sql.push_str(&lines.join(",\n"));
    sql.push_str("\n);\n");
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnType, InferredColumn, SchemaOrigin, StorageType};

    fn schema(origin: SchemaOrigin) -> EntitySchema {
        EntitySchema::new(
            "farm_block",
            vec![
                InferredColumn::new("id", ColumnType::Storage(StorageType::Uuid)),
                InferredColumn::new("area", ColumnType::Native("numeric(10, 2)".into())),
            ],
            origin,
        )
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users").unwrap(), "\"users\"");
        assert_eq!(quote_ident("odd\"name").unwrap(), "\"odd\"\"name\"");
        assert!(quote_ident("").is_err());
        assert!(quote_ident("bad\0name").is_err());
        assert!(quote_ident(&"x".repeat(64)).is_err());
    }

    #[test]
    fn test_emit_with_primary_key() {
        let sql = emit(&schema(SchemaOrigin::Inferred), false).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"farm_block\" (\n  \"id\" uuid,\n  \"area\" numeric(10, 2),\n  PRIMARY KEY (\"id\")\n);\n"
        );
        assert!(!sql.contains("NOT NULL"));
    }

    #[test]
    fn test_emit_drop_and_no_key() {
        let sql = emit(&schema(SchemaOrigin::Manual), true).unwrap();
        assert!(sql.starts_with("DROP TABLE IF EXISTS \"farm_block\";\n\nCREATE TABLE IF NOT EXISTS"));
        assert!(!sql.contains("PRIMARY KEY"));
    }

    #[test]
    fn test_emit_empty_schema() {
        let empty = EntitySchema::new("ghost", Vec::new(), SchemaOrigin::Inferred);
        assert_eq!(
            emit(&empty, true).unwrap(),
            "-- No schema information available for ghost\n"
        );
    }

    #[test]
    fn test_emit_rejects_unknown_key_candidate() {
        let mut s = schema(SchemaOrigin::Inferred);
        s.primary_key_candidate = Some("missing".into());
        assert!(emit(&s, false).is_err());
    }
}
