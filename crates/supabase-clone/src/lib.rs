//! # supabase-clone
//!
//! Table and view replication between two PostgREST (Supabase) projects
//! using nothing but the row API.
//!
//! This library provides:
//!
//! - **Paged copy** of any number of rows with bounded retry and backoff
//! - **Conflict recovery** that retries duplicate-key chunks as upserts
//! - **Best-effort clearing** of destination tables before a copy
//! - **Existence checks** of every entity in both projects
//! - **Schema extraction** from manual definitions, catalog metadata or
//!   sampled rows, emitted as reviewable `CREATE TABLE` scripts
//!
//! ## Example
//!
//! ```rust,no_run
//! use supabase_clone::{load_entities, Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> supabase_clone::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let entities = load_entities(&config.entities.tables_file, &config.entities.views_file)?;
//!     let orchestrator = Orchestrator::new(&config)?;
//!     let summary = orchestrator.run(&entities).await?;
//!     println!("Copied {}/{} records", summary.records_copied, summary.records_found);
//!     Ok(())
//! }
//! ```

pub mod clear;
pub mod config;
pub mod entity;
pub mod error;
pub mod existence;
pub mod logging;
pub mod orchestrator;
pub mod reader;
pub mod remote;
pub mod retry;
pub mod schema;
pub mod writer;

// Re-exports for convenient access
pub use clear::{clear, ClearOutcome};
pub use config::{CloneConfig, Config, SchemaConfig, StoreConfig};
pub use entity::{load_entities, parse_entity_list, Entity, EntityKind};
pub use error::{CloneError, RemoteError, RemoteErrorKind, Result};
pub use existence::{ExistenceChecker, ExistenceReport, Presence};
pub use logging::DailyErrorLog;
pub use orchestrator::{EntityReport, EntityState, Orchestrator, ReplicationProgress, RunSummary};
pub use reader::PagedReader;
pub use remote::{MemoryStore, PostgrestStore, Predicate, RemoteStore, Row};
pub use retry::RetryPolicy;
pub use schema::{EntitySchema, SchemaArtifacts, SchemaExtractor, StorageType};
pub use writer::{CandidateKeys, ConflictKeyStrategy, ConflictResolvingWriter, ExplicitKeys, WriteOutcome};
