//! Emptying a destination entity before it is refilled.
//!
//! There is no "delete everything" call in the row API, so the clear uses a
//! predicate every row should satisfy: `id <> 0` first, then
//! `created_at >= 1970-01-01` for entities without a numeric `id`.

use crate::error::{CloneError, RemoteErrorKind, Result};
use crate::remote::{Predicate, RemoteStore};
use crate::retry::RetryPolicy;
use tracing::{debug, info};

/// How a clear ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearOutcome {
    /// Rows matching the predicate were deleted.
    Cleared(Predicate),
    /// The entity does not exist in the destination; nothing to clear.
    Missing,
}

/// Match-all predicates, tried in order.
pub fn clear_predicates() -> [Predicate; 2] {
    [
        Predicate::not_equal("id", 0),
        Predicate::greater_or_equal("created_at", "1970-01-01"),
    ]
}

/// Delete all rows of `entity` in `store`.
///
/// A predicate the store rejects (missing column, type mismatch) moves on
/// to the next one. "Entity does not exist" is success. Any other failure,
/// or every predicate being rejected, is returned to the caller.
pub async fn clear(store: &dyn RemoteStore, retry: &RetryPolicy, entity: &str) -> Result<ClearOutcome> {
    let label = format!("clearing table {}", entity);
    let mut last_err: Option<CloneError> = None;

    for predicate in clear_predicates() {
        let result = retry
            .execute(&label, || async {
                match store.delete(entity, &predicate).await {
                    Err(e) if is_final(&e) => Ok(Err(e)),
                    other => other.map(Ok),
                }
            })
            .await?;

        match result {
            Ok(()) => {
                info!("Cleared {} where {}", entity, predicate);
                return Ok(ClearOutcome::Cleared(predicate));
            }
            Err(e) if e.remote_kind() == RemoteErrorKind::NotFound => {
                info!("{} does not exist in {}, nothing to clear", entity, store.name());
                return Ok(ClearOutcome::Missing);
            }
            Err(e) => {
                debug!("Clear predicate {} rejected for {}: {}", predicate, entity, e);
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| CloneError::Config(format!("no clear predicate for {}", entity))))
}

/// Errors that answer the question instead of needing another attempt.
fn is_final(err: &CloneError) -> bool {
    matches!(
        err.remote_kind(),
        RemoteErrorKind::NotFound | RemoteErrorKind::InvalidPredicate
    )
}
