use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};

use super::row::{Row, RowSchema};

/// Active list filters. Any change invalidates the window and cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filters {
    /// Free-text search, matched case-insensitively against the schema's
    /// search columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,

    /// Allowed status values; empty means any status.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub statuses: BTreeSet<String>,

    /// Boolean column predicates, e.g. `is_overdue = true`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub predicates: BTreeMap<String, bool>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the search text; blank text clears it.
    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.search = if text.trim().is_empty() {
            None
        } else {
            Some(text.trim().to_string())
        };
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.statuses.insert(status.into());
        self
    }

    pub fn with_predicate(mut self, column: impl Into<String>, value: bool) -> Self {
        self.predicates.insert(column.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.search.is_none() && self.statuses.is_empty() && self.predicates.is_empty()
    }

    /// Whether `row` belongs to the list described by these filters.
    pub fn matches(&self, row: &Row, schema: &RowSchema) -> bool {
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = schema.search_columns.iter().any(|column| {
                match row.field(column) {
                    Some(JsonValue::String(s)) => s.to_lowercase().contains(&needle),
                    Some(JsonValue::Number(n)) => n.to_string().contains(&needle),
                    _ => false,
                }
            });
            if !hit {
                return false;
            }
        }

        if !self.statuses.is_empty() {
            match row.field(&schema.status_column).and_then(JsonValue::as_str) {
                Some(status) if self.statuses.contains(status) => {},
                _ => return false,
            }
        }

        self.predicates.iter().all(|(column, expected)| {
            row.field(column).and_then(JsonValue::as_bool).unwrap_or(false) == *expected
        })
    }
}
