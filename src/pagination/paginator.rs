//! Keyset paginator: issues cursor-bounded page requests and tracks the
//! frontier, `has_more` and the fetch generation.
//!
//! Fetches are split in three steps so the I/O can run outside the task
//! that owns the list state:
//!
//! 1. [`KeysetPaginator::first_page`] / [`KeysetPaginator::next_page`] build a
//!    generation-tagged [`PageRequest`];
//! 2. [`PageFetcher::fetch`] runs it against the [`RowStore`];
//! 3. [`KeysetPaginator::complete`] accepts the result, or rejects it as
//!    stale when a newer first-page request superseded it.

use std::sync::Arc;
use std::time::Duration;

use super::store::RowStore;
use crate::error::{LiveListError, Result};
use crate::models::{Cursor, Filters, LiveListOptions, Page, PageRequest};

/// Runs page requests against a store, bounded by a timeout.
#[derive(Clone)]
pub struct PageFetcher {
    store: Arc<dyn RowStore>,
    timeout: Duration,
}

impl PageFetcher {
    pub fn new(store: Arc<dyn RowStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Fetch one page and derive its frontier cursor.
    ///
    /// Rows from the store are checked for tenant, order and the seek
    /// predicate; a violation is a non-retryable fetch failure.
    pub async fn fetch(&self, request: &PageRequest) -> Result<Page> {
        if request.page_size == 0 {
            return Err(LiveListError::InvalidPageSize(0));
        }

        let rows = if self.timeout.is_zero() {
            self.store.fetch_rows(request).await?
        } else {
            match tokio::time::timeout(self.timeout, self.store.fetch_rows(request)).await {
                Ok(rows) => rows?,
                Err(_) => {
                    return Err(LiveListError::fetch(format!(
                        "page fetch timed out after {:?}",
                        self.timeout
                    )))
                },
            }
        };

        validate_rows(request, &rows)?;
        Ok(Page::from_rows(rows, request.page_size))
    }
}

fn validate_rows(request: &PageRequest, rows: &[crate::models::Row]) -> Result<()> {
    let invalid = |message: String| LiveListError::FetchFailure {
        message,
        retryable: false,
    };

    if rows.len() > request.page_size {
        return Err(invalid(format!(
            "store returned {} rows for page size {}",
            rows.len(),
            request.page_size
        )));
    }
    if let Some(foreign) = rows.iter().find(|r| r.tenant_id != request.tenant_id) {
        return Err(LiveListError::TenantMismatch {
            expected: request.tenant_id.clone(),
            actual: foreign.tenant_id.clone(),
        });
    }
    if let Some(cursor) = &request.cursor {
        if let Some(row) = rows.iter().find(|r| !cursor.admits(r)) {
            return Err(invalid(format!(
                "row {} is not after cursor {}",
                row.id, cursor
            )));
        }
    }
    for pair in rows.windows(2) {
        if Cursor::of(&pair[0]) <= Cursor::of(&pair[1]) {
            return Err(invalid(format!(
                "rows {} and {} are not strictly descending",
                pair[0].id, pair[1].id
            )));
        }
    }
    Ok(())
}

/// Forward keyset paginator for one list.
pub struct KeysetPaginator {
    fetcher: PageFetcher,
    tenant_id: String,
    table: String,
    page_size: usize,
    filters: Filters,
    generation: u64,
    frontier: Option<Cursor>,
    has_more: bool,
    loaded: bool,
    in_flight: Option<u64>,
}

impl KeysetPaginator {
    pub fn new(
        store: Arc<dyn RowStore>,
        tenant_id: impl Into<String>,
        options: &LiveListOptions,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            fetcher: PageFetcher::new(store, options.fetch_timeout()),
            tenant_id: tenant_id.into(),
            table: options.table.clone(),
            page_size: options.page_size,
            filters: Filters::default(),
            generation: 0,
            frontier: None,
            has_more: false,
            loaded: false,
            in_flight: None,
        })
    }

    /// `fetch_page(tenant, filters, cursor?, page_size)` without touching the
    /// paginator's own state.
    pub async fn fetch_page(
        &self,
        tenant_id: &str,
        filters: &Filters,
        cursor: Option<&Cursor>,
        page_size: usize,
    ) -> Result<Page> {
        let request = PageRequest {
            generation: self.generation,
            tenant_id: tenant_id.to_string(),
            table: self.table.clone(),
            filters: filters.clone(),
            cursor: cursor.cloned(),
            page_size,
        };
        self.fetcher.fetch(&request).await
    }

    /// Start a fresh first-page fetch. Supersedes any request in flight.
    pub fn first_page(&mut self, filters: Filters) -> PageRequest {
        self.generation += 1;
        self.filters = filters;
        self.frontier = None;
        self.has_more = false;
        self.loaded = false;
        self.in_flight = Some(self.generation);
        self.request(None)
    }

    /// Request the page after `frontier`, or after the paginator's own
    /// frontier when `None`.
    ///
    /// Returns `None` before the first page has loaded, when the list is
    /// exhausted, or while another fetch is in flight.
    pub fn next_page(&mut self, frontier: Option<Cursor>) -> Option<PageRequest> {
        if !self.loaded || !self.has_more || self.in_flight.is_some() {
            return None;
        }
        let cursor = frontier.or_else(|| self.frontier.clone())?;
        self.in_flight = Some(self.generation);
        Some(self.request(Some(cursor)))
    }

    fn request(&self, cursor: Option<Cursor>) -> PageRequest {
        PageRequest {
            generation: self.generation,
            tenant_id: self.tenant_id.clone(),
            table: self.table.clone(),
            filters: self.filters.clone(),
            cursor,
            page_size: self.page_size,
        }
    }

    /// Accept the outcome of a fetch issued for `generation`.
    ///
    /// Stale results are rejected with [`LiveListError::StaleGeneration`].
    /// A failed fetch leaves frontier and `has_more` untouched so a retry
    /// resumes from the same position.
    pub fn complete(&mut self, generation: u64, result: Result<Page>) -> Result<Page> {
        if generation != self.generation {
            return Err(LiveListError::StaleGeneration {
                generation,
                current: self.generation,
            });
        }
        self.in_flight = None;

        let page = result?;
        self.loaded = true;
        self.has_more = page.has_more;
        if page.next_cursor.is_some() || !page.has_more {
            self.frontier = page.next_cursor.clone();
        }
        Ok(page)
    }

    /// Discard whatever is in flight; its result will be stale on arrival.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.in_flight = None;
    }

    pub fn fetcher(&self) -> PageFetcher {
        self.fetcher.clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn frontier(&self) -> Option<&Cursor> {
        self.frontier.as_ref()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}
