//! Paged reads from the source store.

use crate::error::{CloneError, Result};
use crate::remote::{RemoteStore, Row};
use crate::retry::RetryPolicy;
use tracing::warn;

/// Inclusive row range `[from, to]` covered by 1-based page `page`.
pub fn page_range(page: u64, page_size: u64) -> (u64, u64) {
    let from = page.saturating_sub(1) * page_size;
    (from, from + page_size.saturating_sub(1))
}

/// Number of pages needed for `total` rows.
pub fn pages_for(total: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

/// Reads an entity's rows in fixed-size pages, every call governed by retry.
pub struct PagedReader<'a> {
    store: &'a dyn RemoteStore,
    retry: &'a RetryPolicy,
}

impl<'a> PagedReader<'a> {
    pub fn new(store: &'a dyn RemoteStore, retry: &'a RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Total rows in `entity`.
    ///
    /// An exact count is asked for first. A store that cannot give one is
    /// answered with the length of the first page, which undercounts
    /// entities larger than `page_size`.
    pub async fn count(&self, entity: &str, page_size: u64) -> Result<u64> {
        let label = format!("getting count for {}", entity);
        let exact = self
            .retry
            .execute(&label, || self.store.count(entity, None))
            .await?;

        match exact {
            Some(total) => Ok(total),
            None => {
                warn!("No exact count for {}, using first page length", entity);
                Ok(self.page(entity, 1, page_size).await?.len() as u64)
            }
        }
    }

    /// Rows of 1-based page `page_number`. Past the end this is empty.
    pub async fn page(&self, entity: &str, page_number: u64, page_size: u64) -> Result<Vec<Row>> {
        if page_number == 0 {
            return Err(CloneError::Config("page numbers start at 1".to_string()));
        }
        let (from, to) = page_range(page_number, page_size);
        let label = format!("fetching page {} from {}", page_number, entity);
        self.retry
            .execute(&label, || self.store.select_page(entity, from, to - from + 1))
            .await
    }
}
