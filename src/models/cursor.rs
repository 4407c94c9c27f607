use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::row::Row;

/// Position marker in a list ordered descending by `(sort_key, id)`.
///
/// `Ord` is the natural ascending order of the pair, so a row that comes
/// *later* in the list compares *less* than an earlier one. Ids are unique,
/// which keeps the order total.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cursor {
    sort_key: DateTime<Utc>,
    tie_break_key: String,
}

impl Cursor {
    pub fn new(sort_key: DateTime<Utc>, tie_break_key: impl Into<String>) -> Self {
        Self {
            sort_key,
            tie_break_key: tie_break_key.into(),
        }
    }

    /// Position of `row` in the global order.
    pub fn of(row: &Row) -> Self {
        Self::new(row.sort_key, row.id.clone())
    }

    pub fn sort_key(&self) -> DateTime<Utc> {
        self.sort_key
    }

    pub fn tie_break_key(&self) -> &str {
        &self.tie_break_key
    }

    /// Keyset seek predicate: `true` when `row` lies strictly after this
    /// cursor, i.e. belongs to a later page.
    ///
    /// `row.sort_key < sort_key || (row.sort_key == sort_key && row.id < tie_break_key)`
    pub fn admits(&self, row: &Row) -> bool {
        row.sort_key < self.sort_key
            || (row.sort_key == self.sort_key && row.id.as_str() < self.tie_break_key.as_str())
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.sort_key.to_rfc3339(), self.tie_break_key)
    }
}
