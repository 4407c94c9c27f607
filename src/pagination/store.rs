//! Remote row store boundary.
//!
//! The store executes keyset queries. It is expected to be backed by a
//! composite index on `(tenant_id, sort_key desc, id desc)` so the seek costs
//! the same at any page depth.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{Cursor, PageRequest, Row, RowSchema};

/// Executes keyset page queries.
///
/// Implementations return at most `request.page_size` rows of
/// `request.tenant_id` matching `request.filters`, ordered descending by
/// `(sort_key, id)`, all strictly after `request.cursor` when one is given.
/// Transport errors map to [`LiveListError::FetchFailure`](crate::LiveListError).
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn fetch_rows(&self, request: &PageRequest) -> Result<Vec<Row>>;
}

/// In-memory [`RowStore`] holding rows per table.
#[derive(Debug, Clone, Default)]
pub struct MemoryRowStore {
    tables: Arc<RwLock<HashMap<String, HashMap<String, Row>>>>,
    schema: RowSchema,
}

impl MemoryRowStore {
    pub fn new(schema: RowSchema) -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            schema,
        }
    }

    /// Insert or replace a row.
    pub fn upsert(&self, table: &str, row: Row) {
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(row.id.clone(), row);
    }

    pub fn remove(&self, table: &str, id: &str) -> Option<Row> {
        self.tables.write().get_mut(table)?.remove(id)
    }

    pub fn len(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn fetch_rows(&self, request: &PageRequest) -> Result<Vec<Row>> {
        let tables = self.tables.read();
        let Some(rows) = tables.get(&request.table) else {
            return Ok(Vec::new());
        };

        let mut matching: Vec<&Row> = rows
            .values()
            .filter(|row| row.tenant_id == request.tenant_id)
            .filter(|row| request.filters.matches(row, &self.schema))
            .filter(|row| request.cursor.as_ref().map_or(true, |c| c.admits(row)))
            .collect();
        matching.sort_by(|a, b| Cursor::of(b).cmp(&Cursor::of(a)));

        Ok(matching
            .into_iter()
            .take(request.page_size)
            .cloned()
            .collect())
    }
}
