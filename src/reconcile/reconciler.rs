//! Merges paginated pages and live change events into one window.
//!
//! The window always covers the fetched span: everything from the newest
//! row down to the frontier cursor. Live events are placed relative to that
//! span. Rows newer than the head are prepended, rows inside the span are
//! re-inserted at their ordered position and rows older than the cursor
//! are left for a later page to deliver.

use crate::error::{LiveListError, Result};
use crate::models::{Change, ChangeEvent, Cursor, EventBatch, Filters, Row, RowSchema};

use super::window::Window;

pub struct LiveListReconciler {
    tenant_id: String,
    schema: RowSchema,
    filters: Filters,
    window: Window,
    cursor: Option<Cursor>,
    has_more: bool,
    seeded: bool,
}

impl LiveListReconciler {
    pub fn new(tenant_id: impl Into<String>, schema: RowSchema) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            schema,
            filters: Filters::default(),
            window: Window::new(),
            cursor: None,
            has_more: false,
            seeded: false,
        }
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    pub fn snapshot(&self) -> Vec<Row> {
        self.window.to_vec()
    }

    /// Drop the window and cursor, e.g. after a filter change.
    pub fn reset(&mut self, filters: Filters) {
        self.filters = filters;
        self.window.clear();
        self.cursor = None;
        self.has_more = false;
        self.seeded = false;
    }

    fn check_rows(&self, rows: &[Row]) -> Result<()> {
        match rows.iter().find(|r| r.tenant_id != self.tenant_id) {
            Some(foreign) => Err(LiveListError::TenantMismatch {
                expected: self.tenant_id.clone(),
                actual: foreign.tenant_id.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Replace the window with a first page.
    pub fn seed(&mut self, rows: Vec<Row>, cursor: Option<Cursor>, has_more: bool) -> Result<()> {
        self.check_rows(&rows)?;
        self.window.clear();
        for row in rows {
            self.window.insert(row);
        }
        self.cursor = cursor;
        self.has_more = has_more;
        self.seeded = true;
        log::debug!(
            "[livelist] Seeded {} row(s) for tenant {}, has_more={}",
            self.window.len(),
            self.tenant_id,
            has_more
        );
        Ok(())
    }

    /// Append the page fetched after the current cursor.
    ///
    /// Every row must satisfy the seek predicate of the cursor the page was
    /// requested with; otherwise the page is rejected and nothing changes.
    /// Rows already in the window (a live event got there first) are skipped.
    pub fn append_page(
        &mut self,
        rows: Vec<Row>,
        next_cursor: Option<Cursor>,
        has_more: bool,
    ) -> Result<usize> {
        if !self.seeded {
            return Err(LiveListError::InvalidPage(
                "page appended before the first page".to_string(),
            ));
        }
        let Some(cursor) = &self.cursor else {
            return Err(LiveListError::InvalidPage(
                "page appended to an exhausted list".to_string(),
            ));
        };
        if let Some(row) = rows.iter().find(|r| !cursor.admits(r)) {
            return Err(LiveListError::InvalidPage(format!(
                "row {} is not after cursor {}",
                row.id, cursor
            )));
        }
        self.check_rows(&rows)?;

        let mut appended = 0;
        for row in rows {
            if self.window.contains(&row.id) {
                log::debug!("[livelist] Page row {} already live, skipped", row.id);
                continue;
            }
            self.window.insert(row);
            appended += 1;
        }
        self.cursor = next_cursor;
        self.has_more = has_more;
        Ok(appended)
    }

    /// Apply one live event. Returns whether the window changed.
    ///
    /// Events of another tenant are rejected with
    /// [`LiveListError::TenantMismatch`] and never touch the window.
    pub fn apply_event(&mut self, event: &ChangeEvent) -> Result<bool> {
        let actual = event
            .new_row()
            .map_or(event.tenant_id.as_str(), |row| row.tenant_id.as_str());
        if event.tenant_id != self.tenant_id || actual != self.tenant_id {
            log::warn!(
                "[livelist] Rejected {:?} for {} from tenant {} (active {})",
                event.kind(),
                event.row_id(),
                actual,
                self.tenant_id
            );
            return Err(LiveListError::TenantMismatch {
                expected: self.tenant_id.clone(),
                actual: if event.tenant_id != self.tenant_id {
                    event.tenant_id.clone()
                } else {
                    actual.to_string()
                },
            });
        }
        if !self.seeded {
            return Ok(false);
        }

        match &event.change {
            Change::Insert(row) | Change::Update { row, .. } => Ok(self.upsert(row)),
            Change::Delete { id, .. } => Ok(self.remove(id)),
        }
    }

    /// Apply a batch in arrival order. Returns how many events changed the
    /// window; rejected events are logged and skipped.
    pub fn apply_batch(&mut self, batch: &EventBatch) -> usize {
        let mut changed = 0;
        for event in &batch.events {
            match self.apply_event(event) {
                Ok(true) => changed += 1,
                Ok(false) => {},
                Err(e) => log::debug!("[livelist] Skipped event in {} batch: {}", batch.table, e),
            }
        }
        changed
    }

    fn upsert(&mut self, row: &Row) -> bool {
        if !self.filters.matches(row, &self.schema) {
            return self.remove(&row.id);
        }
        if let Some(cursor) = &self.cursor {
            if cursor.admits(row) {
                // Beyond the fetched span; a later page carries it.
                return self.remove(&row.id);
            }
        }
        self.window.insert(row.clone());
        true
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(row) = self.window.get(id) else {
            return false;
        };
        if self.cursor.as_ref() == Some(&Cursor::of(row)) {
            if let Some(prev) = self.window.preceding(id) {
                self.cursor = Some(Cursor::of(prev));
            }
        }
        self.window.remove(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    fn row(id: &str, hour: u32) -> Row {
        Row::new(id, "t1", at(hour))
    }

    fn ids(reconciler: &LiveListReconciler) -> Vec<String> {
        reconciler.window().iter().map(|r| r.id.clone()).collect()
    }

    fn seeded() -> LiveListReconciler {
        let mut reconciler = LiveListReconciler::new("t1", RowSchema::default());
        reconciler
            .seed(
                vec![row("C", 12), row("B", 11), row("A", 10)],
                Some(Cursor::new(at(10), "A")),
                true,
            )
            .unwrap();
        reconciler
    }

    #[test]
    fn test_events_before_seed_are_ignored() {
        let mut reconciler = LiveListReconciler::new("t1", RowSchema::default());
        let changed = reconciler
            .apply_event(&ChangeEvent::insert("invoices", row("A", 10)))
            .unwrap();
        assert!(!changed);
        assert!(reconciler.window().is_empty());
    }

    #[test]
    fn test_update_inside_span_reinserts_in_order() {
        let mut reconciler = seeded();
        let moved = row("C", 11).with_field("status", "paid");
        reconciler
            .apply_event(&ChangeEvent::update("invoices", moved))
            .unwrap();
        // (11:00, C) sorts before (11:00, B).
        assert_eq!(ids(&reconciler), vec!["C", "B", "A"]);
        assert_eq!(reconciler.window().get("C").unwrap().field("status").unwrap(), "paid");
    }

    #[test]
    fn test_row_older_than_cursor_is_left_for_next_page() {
        let mut reconciler = seeded();
        let changed = reconciler
            .apply_event(&ChangeEvent::insert("invoices", row("Z", 9)))
            .unwrap();
        assert!(!changed);
        assert_eq!(ids(&reconciler), vec!["C", "B", "A"]);
    }

    #[test]
    fn test_update_moving_row_past_cursor_removes_it() {
        let mut reconciler = seeded();
        reconciler
            .apply_event(&ChangeEvent::update("invoices", row("B", 8)))
            .unwrap();
        assert_eq!(ids(&reconciler), vec!["C", "A"]);
        assert_eq!(reconciler.cursor(), Some(&Cursor::new(at(10), "A")));
    }

    #[test]
    fn test_update_no_longer_matching_filters_is_removed() {
        let mut reconciler = seeded();
        reconciler.filters = Filters::new().with_status("open");
        let closed = row("B", 11).with_field("status", "closed");
        assert!(reconciler
            .apply_event(&ChangeEvent::update("invoices", closed))
            .unwrap());
        assert_eq!(ids(&reconciler), vec!["C", "A"]);
    }

    #[test]
    fn test_exhausted_list_accepts_events_anywhere() {
        let mut reconciler = LiveListReconciler::new("t1", RowSchema::default());
        reconciler.seed(vec![row("B", 11)], None, false).unwrap();
        reconciler
            .apply_event(&ChangeEvent::insert("invoices", row("A", 3)))
            .unwrap();
        assert_eq!(ids(&reconciler), vec!["B", "A"]);
    }

    #[test]
    fn test_append_page_rejects_rows_before_cursor() {
        let mut reconciler = seeded();
        let err = reconciler
            .append_page(vec![row("X", 9), row("B", 11)], None, false)
            .unwrap_err();
        assert!(matches!(err, LiveListError::InvalidPage(_)));
        assert_eq!(ids(&reconciler), vec!["C", "B", "A"]);
        assert!(reconciler.has_more());
    }

    #[test]
    fn test_append_page_skips_rows_already_live() {
        let mut reconciler = seeded();
        reconciler.window.insert(row("X", 9).with_field("live", true));
        let appended = reconciler
            .append_page(
                vec![row("X", 9), row("W", 8)],
                Some(Cursor::new(at(8), "W")),
                true,
            )
            .unwrap();
        assert_eq!(appended, 1);
        assert_eq!(ids(&reconciler), vec!["C", "B", "A", "X", "W"]);
        assert_eq!(reconciler.window().get("X").unwrap().field("live").unwrap(), true);
        assert_eq!(reconciler.cursor(), Some(&Cursor::new(at(8), "W")));
    }

    #[test]
    fn test_append_after_exhaustion_is_invalid() {
        let mut reconciler = LiveListReconciler::new("t1", RowSchema::default());
        reconciler.seed(vec![row("A", 10)], None, false).unwrap();
        assert!(matches!(
            reconciler.append_page(vec![row("Z", 1)], None, false),
            Err(LiveListError::InvalidPage(_))
        ));
    }

    #[test]
    fn test_seed_rejects_foreign_rows() {
        let mut reconciler = LiveListReconciler::new("t1", RowSchema::default());
        let err = reconciler
            .seed(vec![Row::new("A", "t2", at(10))], None, false)
            .unwrap_err();
        assert!(matches!(err, LiveListError::TenantMismatch { .. }));
        assert!(!reconciler.is_seeded());
    }

    #[test]
    fn test_reset_clears_window_and_cursor() {
        let mut reconciler = seeded();
        reconciler.reset(Filters::new().with_search("INV-7"));
        assert!(reconciler.window().is_empty());
        assert!(reconciler.cursor().is_none());
        assert!(!reconciler.is_seeded());
        assert_eq!(reconciler.filters().search.as_deref(), Some("INV-7"));
    }
}
