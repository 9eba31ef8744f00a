//! Pre-flight check of which entities each store can serve.

use crate::entity::Entity;
use crate::error::Result;
use crate::remote::RemoteStore;
use crate::retry::RetryPolicy;
use serde::Serialize;
use tracing::{info, warn};

/// Whether an entity answered in a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Present,
    Missing,
    /// The existence check itself failed; the message says why.
    Unknown(String),
}

impl Presence {
    pub fn is_present(&self) -> bool {
        matches!(self, Presence::Present)
    }
}

/// Presence of one entity in both stores.
#[derive(Debug, Clone, Serialize)]
pub struct EntityPresence {
    pub entity: Entity,
    pub source: Presence,
    pub destination: Presence,
}

/// Result of [`ExistenceChecker::diff`].
#[derive(Debug, Clone, Serialize)]
pub struct ExistenceReport {
    pub entities: Vec<EntityPresence>,
    pub present_in_source: usize,
    pub present_in_destination: usize,
    /// Entities the destination cannot serve, in list order.
    pub missing_in_destination: Vec<String>,
}

impl ExistenceReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Probes source and destination for every entity.
pub struct ExistenceChecker<'a> {
    source: &'a dyn RemoteStore,
    destination: &'a dyn RemoteStore,
    retry: &'a RetryPolicy,
}

impl<'a> ExistenceChecker<'a> {
    pub fn new(source: &'a dyn RemoteStore, destination: &'a dyn RemoteStore, retry: &'a RetryPolicy) -> Self {
        Self {
            source,
            destination,
            retry,
        }
    }

    /// Whether `entity` can be queried in `store`.
    pub async fn check(&self, store: &dyn RemoteStore, entity: &str) -> Result<Presence> {
        let label = format!("checking {} in {}", entity, store.name());
        match self.retry.execute(&label, || store.exists(entity)).await {
            Ok(true) => Ok(Presence::Present),
            Ok(false) => Ok(Presence::Missing),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => Ok(Presence::Unknown(e.to_string())),
        }
    }

    /// Probe every entity in both stores. Writes nothing.
    pub async fn diff(&self, entities: &[Entity]) -> Result<ExistenceReport> {
        let mut rows = Vec::with_capacity(entities.len());
        for entity in entities {
            let source = self.check(self.source, &entity.name).await?;
            let destination = self.check(self.destination, &entity.name).await?;
            info!(
                "{}: source {}, destination {}",
                entity,
                describe(&source),
                describe(&destination)
            );
            if let Presence::Unknown(reason) = &destination {
                warn!("Could not check {} in destination: {}", entity.name, reason);
            }
            rows.push(EntityPresence {
                entity: entity.clone(),
                source,
                destination,
            });
        }

        let report = ExistenceReport {
            present_in_source: rows.iter().filter(|r| r.source.is_present()).count(),
            present_in_destination: rows.iter().filter(|r| r.destination.is_present()).count(),
            missing_in_destination: rows
                .iter()
                .filter(|r| !r.destination.is_present())
                .map(|r| r.entity.name.clone())
                .collect(),
            entities: rows,
        };

        info!(
            "{} entities checked: {} in source, {} in destination",
            report.entities.len(),
            report.present_in_source,
            report.present_in_destination
        );
        Ok(report)
    }
}

fn describe(presence: &Presence) -> &'static str {
    match presence {
        Presence::Present => "present",
        Presence::Missing => "missing",
        Presence::Unknown(_) => "unknown",
    }
}
