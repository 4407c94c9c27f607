use std::collections::HashMap;

use crate::models::{Cursor, Row};

/// Rows kept strictly descending by `(sort_key, id)` with at most one row
/// per id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Window {
    rows: Vec<Row>,
    keys: HashMap<String, Cursor>,
}

impl Window {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    /// Newest row.
    pub fn head(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Oldest row.
    pub fn tail(&self) -> Option<&Row> {
        self.rows.last()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.keys.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Row> {
        self.position(id).map(|idx| &self.rows[idx])
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        let key = self.keys.get(id)?;
        self.search(key).ok()
    }

    /// Row immediately newer than `id`.
    pub fn preceding(&self, id: &str) -> Option<&Row> {
        match self.position(id)? {
            0 => None,
            idx => self.rows.get(idx - 1),
        }
    }

    fn search(&self, key: &Cursor) -> std::result::Result<usize, usize> {
        self.rows.binary_search_by(|probe| {
            (key.sort_key(), key.tie_break_key()).cmp(&(probe.sort_key, probe.id.as_str()))
        })
    }

    /// Insert `row` at its ordered position, replacing any row with the same
    /// id. Returns the replaced row.
    pub fn insert(&mut self, row: Row) -> Option<Row> {
        let previous = self.remove(&row.id);
        let key = Cursor::of(&row);
        let idx = match self.search(&key) {
            Ok(idx) | Err(idx) => idx,
        };
        self.keys.insert(row.id.clone(), key);
        self.rows.insert(idx, row);
        previous
    }

    pub fn remove(&mut self, id: &str) -> Option<Row> {
        let idx = self.position(id)?;
        self.keys.remove(id);
        Some(self.rows.remove(idx))
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.keys.clear();
    }

    pub fn to_vec(&self) -> Vec<Row> {
        self.rows.clone()
    }

    /// Strict descending order and id uniqueness hold.
    pub fn is_consistent(&self) -> bool {
        self.keys.len() == self.rows.len()
            && self
                .rows
                .windows(2)
                .all(|pair| Cursor::of(&pair[0]) > Cursor::of(&pair[1]))
    }
}
