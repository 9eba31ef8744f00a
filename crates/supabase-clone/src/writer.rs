//! Chunked destination writes with upsert fallback on key conflicts.
//!
//! Rows go in as plain inserts. When the destination rejects a chunk with a
//! uniqueness violation, the chunk is sent again as an upsert keyed on a
//! column picked by a [`ConflictKeyStrategy`]. The default strategy is a
//! name heuristic; it never asks the catalog for the real key.

use crate::error::{CloneError, RemoteErrorKind, Result};
use crate::remote::{RemoteStore, Row};
use crate::retry::RetryPolicy;
use crate::schema::EntitySchema;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Conflict columns tried by [`CandidateKeys`], in priority order.
pub const CANDIDATE_KEYS: [&str; 10] = [
    "id",
    "uuid",
    "uid",
    "user_id",
    "key",
    "ref_id",
    "reference_id",
    "farm_id",
    "block_id",
    "primary_key",
];

/// Chooses conflict columns for upserts.
pub trait ConflictKeyStrategy: Send + Sync {
    /// Columns to try, best first, given the columns present in a row.
    fn candidates(&self, entity: &str, columns: &[&str]) -> Vec<String>;

    /// The preferred conflict column for a known schema.
    fn resolve_conflict_column(&self, schema: &EntitySchema) -> Option<String> {
        let columns: Vec<&str> = schema.column_names().collect();
        self.candidates(&schema.entity_name, &columns).into_iter().next()
    }
}

/// Fixed candidate-name list.
#[derive(Debug, Clone)]
pub struct CandidateKeys {
    keys: Vec<String>,
}

impl Default for CandidateKeys {
    fn default() -> Self {
        Self::new(CANDIDATE_KEYS)
    }
}

impl CandidateKeys {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl ConflictKeyStrategy for CandidateKeys {
    fn candidates(&self, _entity: &str, columns: &[&str]) -> Vec<String> {
        self.keys
            .iter()
            .filter(|k| columns.contains(&k.as_str()))
            .cloned()
            .collect()
    }
}

/// Per-entity configured conflict columns, ahead of a fallback list.
#[derive(Debug, Clone, Default)]
pub struct ExplicitKeys {
    keys: BTreeMap<String, String>,
    fallback: CandidateKeys,
}

impl ExplicitKeys {
    pub fn new(keys: BTreeMap<String, String>) -> Self {
        Self {
            keys,
            fallback: CandidateKeys::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: CandidateKeys) -> Self {
        self.fallback = fallback;
        self
    }
}

impl ConflictKeyStrategy for ExplicitKeys {
    fn candidates(&self, entity: &str, columns: &[&str]) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(key) = self.keys.get(entity) {
            if columns.contains(&key.as_str()) {
                out.push(key.clone());
            }
        }
        for key in self.fallback.candidates(entity, columns) {
            if !out.contains(&key) {
                out.push(key);
            }
        }
        out
    }
}

/// Result of one [`ConflictResolvingWriter::write`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub rows_written: u64,
    pub chunks: u64,
    /// Chunks that went through the upsert fallback.
    pub upserted_chunks: u64,
}

enum ChunkWrite {
    Inserted,
    Upserted,
}

/// Writes rows into the destination in chunks.
pub struct ConflictResolvingWriter<'a> {
    store: &'a dyn RemoteStore,
    retry: &'a RetryPolicy,
    strategy: &'a dyn ConflictKeyStrategy,
    chunk_size: usize,
}

impl<'a> ConflictResolvingWriter<'a> {
    pub fn new(
        store: &'a dyn RemoteStore,
        retry: &'a RetryPolicy,
        strategy: &'a dyn ConflictKeyStrategy,
        chunk_size: usize,
    ) -> Self {
        Self {
            store,
            retry,
            strategy,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Write `rows` chunk by chunk.
    ///
    /// Each chunk (insert plus any upsert fallback) is one governed call.
    /// A duplicate-key rejection that no candidate column resolves is
    /// returned without further attempts. The first chunk that still fails
    /// stops the write; earlier chunks stay written.
    pub async fn write(&self, entity: &str, rows: &[Row]) -> Result<WriteOutcome> {
        let mut outcome = WriteOutcome::default();
        let total_chunks = rows.len().div_ceil(self.chunk_size);

        for (idx, chunk) in rows.chunks(self.chunk_size).enumerate() {
            let label = format!("inserting chunk {}/{} into {}", idx + 1, total_chunks, entity);
            let written = self
                .retry
                .execute(&label, || self.write_chunk(entity, chunk))
                .await??;

            outcome.chunks += 1;
            outcome.rows_written += chunk.len() as u64;
            if matches!(written, ChunkWrite::Upserted) {
                outcome.upserted_chunks += 1;
            }
        }

        Ok(outcome)
    }

    /// `Ok(Err(_))` is an unresolvable duplicate-key rejection; the governor
    /// hands it back instead of sending the same chunk again.
    async fn write_chunk(
        &self,
        entity: &str,
        chunk: &[Row],
    ) -> Result<std::result::Result<ChunkWrite, CloneError>> {
        let insert_err = match self.store.insert(entity, chunk).await {
            Ok(()) => return Ok(Ok(ChunkWrite::Inserted)),
            Err(e) => e,
        };
        if insert_err.remote_kind() != RemoteErrorKind::UniqueViolation {
            return Err(insert_err);
        }

        let columns: Vec<&str> = chunk
            .first()
            .map(|row| row.keys().map(String::as_str).collect())
            .unwrap_or_default();
        let candidates = self.strategy.candidates(entity, &columns);
        if candidates.is_empty() {
            warn!("Duplicate rows in {} and no conflict column to upsert on", entity);
            return Ok(Err(insert_err));
        }

        let mut transient = false;
        for column in candidates {
            match self.store.upsert(entity, chunk, &column).await {
                Ok(()) => {
                    info!("Upserted {} rows into {} on {}", chunk.len(), entity, column);
                    return Ok(Ok(ChunkWrite::Upserted));
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    debug!("Upsert into {} on {} failed: {}", entity, column, e);
                    transient |= e.remote_kind() == RemoteErrorKind::Transient;
                }
            }
        }

        // A candidate that only failed transiently may still succeed.
        if transient {
            return Err(insert_err);
        }
        warn!("Duplicate rows in {} and no conflict column accepted the upsert", entity);
        Ok(Err(insert_err))
    }
}
