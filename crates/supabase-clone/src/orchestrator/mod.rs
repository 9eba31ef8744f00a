//! Replication orchestrator - per-entity workflow coordinator.
//!
//! Entities are processed one after another in list order. Each goes
//! through `Counting -> Clearing -> Copying(1..N) -> Done`; any step can
//! end in `Failed`, which is recorded in the entity's report and never
//! stops the run.

use crate::clear::{clear, ClearOutcome};
use crate::config::{CloneConfig, Config};
use crate::entity::{Entity, EntityKind};
use crate::error::{CloneError, Result};
use crate::reader::{pages_for, PagedReader};
use crate::remote::{PostgrestStore, RemoteStore};
use crate::retry::RetryPolicy;
use crate::writer::{ConflictKeyStrategy, ConflictResolvingWriter, ExplicitKeys};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Where an entity is in its replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Counting,
    Clearing,
    Copying { page: u64 },
    Done,
    Failed,
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityState::Counting => f.write_str("counting"),
            EntityState::Clearing => f.write_str("clearing"),
            EntityState::Copying { page } => write!(f, "copying page {}", page),
            EntityState::Done => f.write_str("done"),
            EntityState::Failed => f.write_str("failed"),
        }
    }
}

impl Serialize for EntityState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// What the clearing step achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearStatus {
    /// Not attempted (nothing to copy, or the entity failed earlier).
    Skipped,
    Cleared,
    /// Destination entity does not exist.
    Missing,
    /// Clear failed; rows were copied on top of whatever was there.
    Failed,
}

/// Per-entity counters. Only ever increase during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplicationProgress {
    pub total_records: u64,
    pub pages_planned: u64,
    pub records_copied: u64,
    pub pages_copied: u64,
    pub pages_failed: u64,
}

/// Outcome of replicating one entity.
#[derive(Debug, Clone, Serialize)]
pub struct EntityReport {
    pub entity: String,
    pub kind: EntityKind,
    pub state: EntityState,
    pub clear: ClearStatus,
    pub progress: ReplicationProgress,
    /// Chunks written through the upsert fallback.
    pub upserted_chunks: u64,
    /// Error that failed the entity, or the last page error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EntityReport {
    fn new(entity: &Entity) -> Self {
        Self {
            entity: entity.name.clone(),
            kind: entity.kind,
            state: EntityState::Counting,
            clear: ClearStatus::Skipped,
            progress: ReplicationProgress::default(),
            upserted_chunks: 0,
            error: None,
        }
    }

    /// Every planned page was copied.
    pub fn is_complete(&self) -> bool {
        self.state == EntityState::Done && self.progress.pages_failed == 0
    }

    fn fail(&mut self, err: &CloneError) {
        self.state = EntityState::Failed;
        self.error = Some(err.to_string());
    }
}

/// Result of a replication run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    pub entities_total: usize,
    pub entities_done: usize,
    pub entities_failed: usize,

    /// Sum of source counts.
    pub records_found: u64,

    /// Rows written to the destination.
    pub records_copied: u64,

    pub failed_entities: Vec<String>,

    pub entities: Vec<EntityReport>,
}

impl RunSummary {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A progress line, emitted as JSON on stderr when enabled.
#[derive(Debug, Serialize)]
struct ProgressEvent<'a> {
    entity: &'a str,
    state: EntityState,
    #[serde(flatten)]
    progress: &'a ReplicationProgress,
}

/// Replication orchestrator.
pub struct Orchestrator {
    source: Arc<dyn RemoteStore>,
    destination: Arc<dyn RemoteStore>,
    retry: RetryPolicy,
    strategy: Box<dyn ConflictKeyStrategy>,
    page_size: u64,
    chunk_size: usize,
    require_clean_destination: bool,
    progress: bool,
}

impl Orchestrator {
    /// Create an orchestrator talking to the configured PostgREST endpoints.
    pub fn new(config: &Config) -> Result<Self> {
        let source = PostgrestStore::new("source", &config.source)?;
        let destination = PostgrestStore::new("destination", &config.destination)?;
        Ok(Self::with_stores(Arc::new(source), Arc::new(destination), &config.clone))
    }

    /// Create an orchestrator over arbitrary stores.
    pub fn with_stores(
        source: Arc<dyn RemoteStore>,
        destination: Arc<dyn RemoteStore>,
        config: &CloneConfig,
    ) -> Self {
        Self {
            source,
            destination,
            retry: RetryPolicy::from_config(config),
            strategy: Box::new(ExplicitKeys::new(config.conflict_keys.clone())),
            page_size: config.page_size as u64,
            chunk_size: config.chunk_size,
            require_clean_destination: config.require_clean_destination,
            progress: false,
        }
    }

    /// Emit JSON progress lines on stderr.
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    /// Replace the conflict key strategy used by the writer.
    pub fn with_strategy(mut self, strategy: Box<dyn ConflictKeyStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replicate every entity in order.
    ///
    /// Entity failures are reported in the summary; only cancellation
    /// ends the run early.
    pub async fn run(&self, entities: &[Entity]) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting replication run: {}", run_id);
        info!("Found {} entities to clone", entities.len());

        let mut reports = Vec::with_capacity(entities.len());
        for entity in entities {
            reports.push(self.clone_entity(entity).await?);
        }

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let failed_entities: Vec<String> = reports
            .iter()
            .filter(|r| r.state == EntityState::Failed)
            .map(|r| r.entity.clone())
            .collect();

        let summary = RunSummary {
            run_id,
            started_at,
            completed_at,
            duration_seconds: duration,
            entities_total: reports.len(),
            entities_done: reports.len() - failed_entities.len(),
            entities_failed: failed_entities.len(),
            records_found: reports.iter().map(|r| r.progress.total_records).sum(),
            records_copied: reports.iter().map(|r| r.progress.records_copied).sum(),
            failed_entities,
            entities: reports,
        };

        info!(
            "Replication finished: {}/{} entities, {}/{} records in {:.1}s",
            summary.entities_done,
            summary.entities_total,
            summary.records_copied,
            summary.records_found,
            summary.duration_seconds
        );

        Ok(summary)
    }

    /// Replicate one entity.
    ///
    /// Returns `Err` only for cancellation; every other failure is in the report.
    pub async fn clone_entity(&self, entity: &Entity) -> Result<EntityReport> {
        let mut report = EntityReport::new(entity);
        info!("Processing {}", entity);

        match self.replicate(entity, &mut report).await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                error!(error = %e, "Failed to clone {} {} while {}", entity.kind, entity.name, report.state);
                report.fail(&e);
                self.emit_progress(&report);
            }
        }
        Ok(report)
    }

    async fn replicate(&self, entity: &Entity, report: &mut EntityReport) -> Result<()> {
        let name = entity.name.as_str();
        let reader = PagedReader::new(self.source.as_ref(), &self.retry);

        report.state = EntityState::Counting;
        let total = reader.count(name, self.page_size).await?;
        report.progress.total_records = total;
        report.progress.pages_planned = pages_for(total, self.page_size);
        info!("Found {} records in {}", total, name);

        if total == 0 {
            info!("No records in {}, nothing to clone", name);
            report.state = EntityState::Done;
            self.emit_progress(report);
            return Ok(());
        }

        report.state = EntityState::Clearing;
        self.emit_progress(report);
        match clear(self.destination.as_ref(), &self.retry, name).await {
            Ok(ClearOutcome::Cleared(_)) => report.clear = ClearStatus::Cleared,
            Ok(ClearOutcome::Missing) => report.clear = ClearStatus::Missing,
            Err(e) if e.is_cancelled() || self.require_clean_destination => {
                report.clear = ClearStatus::Failed;
                return Err(e);
            }
            Err(e) => {
                warn!("Could not clear {}, copying anyway: {}", name, e);
                report.clear = ClearStatus::Failed;
            }
        }

        let writer = ConflictResolvingWriter::new(
            self.destination.as_ref(),
            &self.retry,
            self.strategy.as_ref(),
            self.chunk_size,
        );

        for page in 1..=report.progress.pages_planned {
            report.state = EntityState::Copying { page };
            match self.copy_page(&reader, &writer, name, page).await {
                Ok((copied, upserted)) => {
                    report.progress.records_copied += copied;
                    report.progress.pages_copied += 1;
                    report.upserted_chunks += upserted;
                    info!(
                        "Processed page {}/{} for {} ({}/{})",
                        page,
                        report.progress.pages_planned,
                        name,
                        report.progress.records_copied,
                        total
                    );
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Page {}/{} of {} failed: {}", page, report.progress.pages_planned, name, e);
                    report.progress.pages_failed += 1;
                    report.error = Some(e.to_string());
                }
            }
            self.emit_progress(report);
        }

        report.state = EntityState::Done;
        info!("Cloned {}/{} records for {}", report.progress.records_copied, total, name);
        self.emit_progress(report);
        Ok(())
    }

    async fn copy_page(
        &self,
        reader: &PagedReader<'_>,
        writer: &ConflictResolvingWriter<'_>,
        entity: &str,
        page: u64,
    ) -> Result<(u64, u64)> {
        let rows = reader.page(entity, page, self.page_size).await?;
        if rows.is_empty() {
            debug!("Page {} of {} came back empty", page, entity);
            return Ok((0, 0));
        }
        let outcome = writer.write(entity, &rows).await?;
        Ok((outcome.rows_written, outcome.upserted_chunks))
    }

    fn emit_progress(&self, report: &EntityReport) {
        if !self.progress {
            return;
        }
        let event = ProgressEvent {
            entity: &report.entity,
            state: report.state,
            progress: &report.progress,
        };
        match serde_json::to_string(&event) {
            Ok(line) => eprintln!("{}", line),
            Err(e) => debug!("progress serialization failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_entity_state_rendering() {
        assert_eq!(EntityState::Copying { page: 3 }.to_string(), "copying page 3");
        assert_eq!(
            serde_json::to_value(EntityState::Copying { page: 3 }).unwrap(),
            json!("copying page 3")
        );
        assert_eq!(serde_json::to_value(EntityState::Done).unwrap(), json!("done"));
    }

    #[tokio::test]
    async fn test_summary_json() {
        let source = Arc::new(
            MemoryStore::new("source")
                .with_table("farms", vec![json!({"id": 1}).as_object().cloned().unwrap()]),
        );
        let destination = Arc::new(MemoryStore::new("destination").with_empty_table("farms"));
        let orchestrator = Orchestrator::with_stores(source, destination, &CloneConfig::default());

        let summary = orchestrator.run(&[Entity::table("farms")]).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert_eq!(parsed["records_copied"], json!(1));
        assert_eq!(parsed["entities"][0]["kind"], json!("table"));
        assert_eq!(parsed["entities"][0]["state"], json!("done"));
        assert_eq!(parsed["entities"][0]["clear"], json!("cleared"));
        assert!(uuid::Uuid::parse_str(&summary.run_id).is_ok());
    }
}
