//! In-process store.
//!
//! Behaves like a small PostgREST-backed database: unique columns reject
//! duplicate inserts with SQLSTATE 23505, unknown entities report 42P01,
//! filters on missing columns report 42703 and type-mismatched filters
//! report 22P02. Failures can be scripted per operation and every call is
//! counted, which is what the replication tests lean on.

use super::{value_literal, Predicate, RemoteStore, Row};
use crate::error::{RemoteError, Result};
use crate::schema::CatalogColumn;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Store operations, for failure scripting and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Count,
    SelectPage,
    Insert,
    Upsert,
    Delete,
    Exists,
    Catalog,
    InformationSchema,
}

#[derive(Debug, Default, Clone)]
struct MemoryTable {
    rows: Vec<Row>,
    unique: Vec<String>,
    columns: Option<Vec<String>>,
}

impl MemoryTable {
    fn has_column(&self, column: &str) -> bool {
        match &self.columns {
            Some(columns) => columns.iter().any(|c| c == column),
            // Without declared columns, an empty table accepts anything.
            None => self.rows.is_empty() || self.rows.iter().any(|r| r.contains_key(column)),
        }
    }
}

#[derive(Debug)]
struct ScriptedFailure {
    op: Operation,
    entity: String,
    skip: u32,
    remaining: u32,
    error: RemoteError,
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, MemoryTable>,
    catalog: HashMap<String, Vec<CatalogColumn>>,
    information_schema: Option<HashMap<String, Vec<CatalogColumn>>>,
    failures: Vec<ScriptedFailure>,
    calls: HashMap<(Operation, String), usize>,
    inexact_counts: bool,
}

/// In-memory [`RemoteStore`].
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an entity holding `rows`.
    pub fn with_table(self, entity: &str, rows: Vec<Row>) -> Self {
        self.lock().tables.entry(entity.to_string()).or_default().rows = rows;
        self
    }

    /// Add an empty entity.
    pub fn with_empty_table(self, entity: &str) -> Self {
        self.with_table(entity, Vec::new())
    }

    /// Declare a unique constraint on `column`.
    pub fn with_unique(self, entity: &str, column: &str) -> Self {
        self.lock()
            .tables
            .entry(entity.to_string())
            .or_default()
            .unique
            .push(column.to_string());
        self
    }

    /// Fix the entity's column set; filters and writes naming other columns fail.
    pub fn with_columns(self, entity: &str, columns: &[&str]) -> Self {
        self.lock().tables.entry(entity.to_string()).or_default().columns =
            Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Serve catalog metadata for an entity.
    pub fn with_catalog(self, entity: &str, columns: Vec<CatalogColumn>) -> Self {
        self.lock().catalog.insert(entity.to_string(), columns);
        self
    }

    /// Expose `information_schema` with `columns` rows for an entity.
    ///
    /// Until this is called the profile is not exposed at all, like a
    /// default PostgREST setup.
    pub fn with_information_schema(self, entity: &str, columns: Vec<CatalogColumn>) -> Self {
        self.lock()
            .information_schema
            .get_or_insert_with(HashMap::new)
            .insert(entity.to_string(), columns);
        self
    }

    /// Make `count` report that no exact total is available.
    pub fn without_exact_counts(self) -> Self {
        self.lock().inexact_counts = true;
        self
    }

    /// Fail the next `times` calls of `op` against `entity` with `error`.
    pub fn fail(&self, op: Operation, entity: &str, error: RemoteError, times: u32) {
        self.fail_after(op, entity, 0, error, times);
    }

    /// Let `skip` calls of `op` against `entity` through, then fail `times` calls.
    pub fn fail_after(&self, op: Operation, entity: &str, skip: u32, error: RemoteError, times: u32) {
        self.lock().failures.push(ScriptedFailure {
            op,
            entity: entity.to_string(),
            skip,
            remaining: times,
            error,
        });
    }

    /// Number of calls made for `op` against `entity`.
    pub fn calls(&self, op: Operation, entity: &str) -> usize {
        self.lock()
            .calls
            .get(&(op, entity.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Snapshot of an entity's rows.
    pub fn rows(&self, entity: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(entity)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn row_count(&self, entity: &str) -> usize {
        self.lock().tables.get(entity).map_or(0, |t| t.rows.len())
    }

    /// Record the call and return a scripted failure if one is due.
    fn begin(&self, op: Operation, entity: &str) -> std::result::Result<MutexGuard<'_, Inner>, RemoteError> {
        let mut inner = self.lock();
        *inner.calls.entry((op, entity.to_string())).or_insert(0) += 1;

        if let Some(failure) = inner
            .failures
            .iter_mut()
            .find(|f| f.op == op && f.entity == entity && f.remaining > 0)
        {
            if failure.skip > 0 {
                failure.skip -= 1;
            } else {
                failure.remaining -= 1;
                return Err(failure.error.clone());
            }
        }
        Ok(inner)
    }
}

fn missing_relation(entity: &str) -> RemoteError {
    RemoteError::new(format!("relation \"public.{}\" does not exist", entity))
        .with_code("42P01")
        .with_status(404)
}

fn missing_column(entity: &str, column: &str) -> RemoteError {
    RemoteError::new(format!("column {}.{} does not exist", entity, column))
        .with_code("42703")
        .with_status(400)
}

fn duplicate_key(entity: &str, column: &str) -> RemoteError {
    RemoteError::new(format!(
        "duplicate key value violates unique constraint \"{}_{}_key\"",
        entity, column
    ))
    .with_code("23505")
    .with_status(409)
}

/// Compare a stored value with a filter operand the way Postgres would,
/// failing on operands that cannot be cast to the column's type.
fn compare(entity: &str, stored: &Value, operand: &Value) -> std::result::Result<Option<Ordering>, RemoteError> {
    match (stored, operand) {
        (Value::Null, _) => Ok(None),
        (Value::Number(a), Value::Number(b)) => Ok(a.as_f64().partial_cmp(&b.as_f64())),
        (Value::Number(a), Value::String(b)) => match b.parse::<f64>() {
            Ok(b) => Ok(a.as_f64().and_then(|a| a.partial_cmp(&b))),
            Err(_) => Err(invalid_input(entity, b)),
        },
        (Value::String(a), Value::Number(b)) => match a.parse::<f64>() {
            Ok(a) => Ok(b.as_f64().and_then(|b| a.partial_cmp(&b))),
            Err(_) => Err(invalid_input(entity, &b.to_string())),
        },
        (a, b) => Ok(Some(value_literal(a).cmp(&value_literal(b)))),
    }
}

fn invalid_input(entity: &str, literal: &str) -> RemoteError {
    RemoteError::new(format!(
        "invalid input syntax for column type in {}: \"{}\"",
        entity, literal
    ))
    .with_code("22P02")
    .with_status(400)
}

/// Rows matching `predicate`; `None` entries mean "unknown" and never match.
fn matches(entity: &str, row: &Row, predicate: &Predicate) -> std::result::Result<bool, RemoteError> {
    let stored = row.get(predicate.column()).unwrap_or(&Value::Null);
    let ordering = compare(entity, stored, predicate.value())?;
    Ok(match (predicate, ordering) {
        (_, None) => false,
        (Predicate::NotEqual { .. }, Some(o)) => o != Ordering::Equal,
        (Predicate::GreaterOrEqual { .. }, Some(o)) => o != Ordering::Less,
    })
}

fn check_columns(entity: &str, table: &MemoryTable, rows: &[Row]) -> std::result::Result<(), RemoteError> {
    if let Some(columns) = &table.columns {
        for row in rows {
            if let Some(unknown) = row.keys().find(|k| !columns.contains(k)) {
                return Err(RemoteError::new(format!(
                    "Could not find the '{}' column of '{}' in the schema cache",
                    unknown, entity
                ))
                .with_code("PGRST204")
                .with_status(400));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn count(&self, entity: &str, filter: Option<&Predicate>) -> Result<Option<u64>> {
        let inner = self.begin(Operation::Count, entity)?;
        let table = inner.tables.get(entity).ok_or_else(|| missing_relation(entity))?;
        if inner.inexact_counts {
            return Ok(None);
        }
        let total = match filter {
            None => table.rows.len(),
            Some(predicate) => {
                if !table.has_column(predicate.column()) {
                    return Err(missing_column(entity, predicate.column()).into());
                }
                let mut n = 0;
                for row in &table.rows {
                    if matches(entity, row, predicate)? {
                        n += 1;
                    }
                }
                n
            }
        };
        Ok(Some(total as u64))
    }

    async fn select_page(&self, entity: &str, offset: u64, limit: u64) -> Result<Vec<Row>> {
        let inner = self.begin(Operation::SelectPage, entity)?;
        let table = inner.tables.get(entity).ok_or_else(|| missing_relation(entity))?;
        Ok(table
            .rows
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn insert(&self, entity: &str, rows: &[Row]) -> Result<()> {
        let mut inner = self.begin(Operation::Insert, entity)?;
        let table = inner
            .tables
            .get_mut(entity)
            .ok_or_else(|| missing_relation(entity))?;
        check_columns(entity, table, rows)?;

        for column in &table.unique {
            let mut seen: Vec<&Value> = table
                .rows
                .iter()
                .filter_map(|r| r.get(column))
                .filter(|v| !v.is_null())
                .collect();
            for row in rows {
                if let Some(value) = row.get(column).filter(|v| !v.is_null()) {
                    if seen.contains(&value) {
                        return Err(duplicate_key(entity, column).into());
                    }
                    seen.push(value);
                }
            }
        }

        table.rows.extend(rows.iter().cloned());
        Ok(())
    }

    async fn upsert(&self, entity: &str, rows: &[Row], conflict_column: &str) -> Result<()> {
        let mut inner = self.begin(Operation::Upsert, entity)?;
        let table = inner
            .tables
            .get_mut(entity)
            .ok_or_else(|| missing_relation(entity))?;
        if !table.unique.iter().any(|c| c == conflict_column) {
            return Err(RemoteError::new(
                "there is no unique or exclusion constraint matching the ON CONFLICT specification",
            )
            .with_code("42P10")
            .with_status(400)
            .into());
        }
        check_columns(entity, table, rows)?;

        for row in rows {
            let key = row.get(conflict_column).filter(|v| !v.is_null());
            let existing = key.and_then(|key| {
                table
                    .rows
                    .iter_mut()
                    .find(|r| r.get(conflict_column) == Some(key))
            });
            match existing {
                Some(target) => {
                    for (column, value) in row {
                        target.insert(column.clone(), value.clone());
                    }
                }
                None => table.rows.push(row.clone()),
            }
        }
        Ok(())
    }

    async fn delete(&self, entity: &str, predicate: &Predicate) -> Result<()> {
        let mut inner = self.begin(Operation::Delete, entity)?;
        let table = inner
            .tables
            .get_mut(entity)
            .ok_or_else(|| missing_relation(entity))?;
        if !table.has_column(predicate.column()) {
            return Err(missing_column(entity, predicate.column()).into());
        }

        // Every row is evaluated before any is removed; a rejected filter deletes nothing.
        let doomed = table
            .rows
            .iter()
            .map(|row| matches(entity, row, predicate))
            .collect::<std::result::Result<Vec<bool>, RemoteError>>()?;
        let mut doomed = doomed.into_iter();
        table.rows.retain(|_| !doomed.next().unwrap_or(false));
        Ok(())
    }

    async fn exists(&self, entity: &str) -> Result<bool> {
        let inner = self.begin(Operation::Exists, entity)?;
        Ok(inner.tables.contains_key(entity))
    }

    async fn catalog_columns(&self, entity: &str) -> Result<Vec<CatalogColumn>> {
        let inner = self.begin(Operation::Catalog, entity)?;
        inner.catalog.get(entity).cloned().ok_or_else(|| {
            RemoteError::new("Could not find the function public.get_table_definition(table_name)")
                .with_code("PGRST202")
                .with_status(404)
                .into()
        })
    }

    async fn information_schema_columns(&self, entity: &str) -> Result<Vec<CatalogColumn>> {
        let inner = self.begin(Operation::InformationSchema, entity)?;
        match &inner.information_schema {
            Some(columns) => Ok(columns.get(entity).cloned().unwrap_or_default()),
            None => Err(RemoteError::new("The schema must be one of the following: public")
                .with_code("PGRST106")
                .with_status(406)
                .into()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
