//! Entities (tables and views) and the lists they are read from.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Whether an entity is a base table or a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Table,
    View,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Table => f.write_str("table"),
            EntityKind::View => f.write_str("view"),
        }
    }
}

/// A named source of rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
}

impl Entity {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntityKind::Table,
        }
    }

    pub fn view(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntityKind::View,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

/// Split a comma-separated list into entity names.
///
/// Whitespace around names is trimmed; empty entries and repeats of an
/// earlier name are dropped so names stay unique within a run.
pub fn parse_entity_list(content: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in content.split(',').map(str::trim) {
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Read a comma-separated list file into entities of the given kind.
pub fn load_entity_list<P: AsRef<Path>>(path: P, kind: EntityKind) -> Result<Vec<Entity>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_entity_list(&content)
        .into_iter()
        .map(|name| Entity { name, kind })
        .collect())
}

/// Load the table list followed by the view list.
///
/// Tables always precede views; within each list the file order is kept.
pub fn load_entities<P: AsRef<Path>, Q: AsRef<Path>>(
    tables_file: P,
    views_file: Q,
) -> Result<Vec<Entity>> {
    let mut entities = load_entity_list(tables_file, EntityKind::Table)?;
    entities.extend(load_entity_list(views_file, EntityKind::View)?);
    Ok(entities)
}
