//! Schema artifacts handed to an operator before replication.

use super::emit::{emit, no_schema_comment};
use super::SchemaExtractor;
use crate::entity::{Entity, EntityKind};
use crate::error::Result;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const TABLES_FILE: &str = "create_tables.sql";
pub const VIEWS_FILE: &str = "create_views_as_tables.sql";
pub const INSTRUCTIONS_FILE: &str = "setup_instructions.md";

/// Generated DDL scripts and instructions.
#[derive(Debug, Clone)]
pub struct SchemaArtifacts {
    pub tables_sql: String,
    pub views_sql: String,
    pub instructions: String,
    /// Entities emitted with a statement.
    pub generated: Vec<String>,
    /// Entities for which no schema could be derived.
    pub skipped: Vec<String>,
}

impl SchemaArtifacts {
    /// Extract and render schemas for every entity.
    ///
    /// Per-entity failures are logged and leave a placeholder comment;
    /// only cancellation stops the build.
    pub async fn build(
        extractor: &SchemaExtractor<'_>,
        entities: &[Entity],
        drop_existing: bool,
    ) -> Result<Self> {
        let generated_at = Utc::now().to_rfc3339();
        let mut tables_sql = format!(
            "-- Tables to create in the destination\n-- Generated {}\n\n",
            generated_at
        );
        let mut views_sql = format!(
            "-- Views materialized as plain tables in the destination\n-- Generated {}\n\n",
            generated_at
        );
        let mut generated = Vec::new();
        let mut skipped = Vec::new();

        for entity in entities {
            info!("Extracting schema for {}", entity);
            let body = match extractor.extract(&entity.name).await {
                Ok(schema) => match emit(&schema, drop_existing) {
                    Ok(sql) => {
                        generated.push(entity.name.clone());
                        sql
                    }
                    Err(e) => {
                        error!(error = %e, "Cannot emit schema for {}", entity.name);
                        skipped.push(entity.name.clone());
                        no_schema_comment(&entity.name)
                    }
                },
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    error!(error = %e, "Schema extraction failed for {}", entity.name);
                    skipped.push(entity.name.clone());
                    no_schema_comment(&entity.name)
                }
            };

            let section = match entity.kind {
                EntityKind::Table => &mut tables_sql,
                EntityKind::View => &mut views_sql,
            };
            let header = match entity.kind {
                EntityKind::Table => "-- Table:",
                EntityKind::View => "-- View -> Table:",
            };
            section.push_str(&format!("{} {}\n{}\n", header, entity.name, body));
        }

        Ok(Self {
            tables_sql,
            views_sql,
            instructions: instructions(drop_existing),
            generated,
            skipped,
        })
    }

    /// Write the three artifact files into `dir`, creating it if needed.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let files = [
            (TABLES_FILE, &self.tables_sql),
            (VIEWS_FILE, &self.views_sql),
            (INSTRUCTIONS_FILE, &self.instructions),
        ];

        let mut written = Vec::with_capacity(files.len());
        for (name, content) in files {
            let path = dir.join(name);
            std::fs::write(&path, content)?;
            info!("Wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

fn instructions(drop_existing: bool) -> String {
    let drop_note = if drop_existing {
        "The scripts drop existing tables first. Running them against a \
         destination that already holds data deletes that data.\n"
    } else {
        "The scripts only create missing tables; existing tables are left as they are.\n"
    };

    format!(
        "# Destination setup\n\
         \n\
         Replication copies rows only. Create the destination tables before running it.\n\
         \n\
         1. Open the SQL editor of the destination project.\n\
         2. Review and run `{tables}`.\n\
         3. Review and run `{views}`. Source views become plain tables here;\n   \
            their definitions are not copied.\n\
         4. Run `supabase-clone check` and confirm nothing is missing from the destination.\n\
         5. Run `supabase-clone run` to copy the rows.\n\
         \n\
         {drop_note}\
         \n\
         Every column is nullable. A primary key is declared only where a column named\n\
         `id`, `uuid`, `<table>_id` or `primary_key` was found. Types inferred from\n\
         sample rows are guesses; correct them with `schema.overrides` in the\n\
         configuration and generate again.\n",
        tables = TABLES_FILE,
        views = VIEWS_FILE,
        drop_note = drop_note,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use crate::remote::{MemoryStore, Row};
    use crate::retry::RetryPolicy;
    use serde_json::json;
    use std::time::Duration;

    fn row(v: serde_json::Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_build_and_write() {
        let store = MemoryStore::new("source")
            .with_table("farms", vec![row(json!({"id": 1, "name": "North"}))])
            .with_empty_table("empty_view");
        let config = SchemaConfig::default();
        let extractor =
            SchemaExtractor::new(&store, RetryPolicy::new(1, Duration::ZERO, 1.5), &config);
        let entities = vec![Entity::table("farms"), Entity::view("empty_view")];

        let artifacts = SchemaArtifacts::build(&extractor, &entities, true).await.unwrap();
        assert!(artifacts.tables_sql.contains("-- Table: farms\nDROP TABLE IF EXISTS \"farms\""));
        assert!(artifacts.tables_sql.contains("PRIMARY KEY (\"id\")"));
        assert!(artifacts
            .views_sql
            .contains("-- View -> Table: empty_view\n-- No schema information available for empty_view"));
        assert_eq!(artifacts.generated, vec!["farms"]);
        assert_eq!(artifacts.skipped, vec!["empty_view"]);

        let dir = tempfile::tempdir().unwrap();
        let written = artifacts.write_to(&dir.path().join("out")).unwrap();
        assert_eq!(written.len(), 3);
        let instructions = std::fs::read_to_string(dir.path().join("out").join(INSTRUCTIONS_FILE)).unwrap();
        assert!(instructions.contains(TABLES_FILE));
        assert!(instructions.contains("drop existing tables"));
    }
}
