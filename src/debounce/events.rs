//! Per-subscription batching of live change events.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::clock::SharedClock;
use crate::models::{ChangeEvent, ChangeKind, EventBatch};

/// What happens to delete notifications.
///
/// Deletions are rare and usually soft in this domain, so the default
/// drops them and keeps only inserts and updates; `Forward` hands them to
/// the reconciler, which removes the row from the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletePolicy {
    #[default]
    Drop,
    Forward,
}

/// Collects events that arrive within one window and emits them as a
/// single [`EventBatch`] in arrival order.
///
/// The first buffered event opens the window; later events join it without
/// extending it. Like [`SearchDebouncer`](super::SearchDebouncer) it owns no
/// timer; the channel task sleeps until [`deadline`](Self::deadline).
pub struct EventDebouncer {
    table: String,
    window: Duration,
    delete_policy: DeletePolicy,
    clock: SharedClock,
    buffer: Vec<ChangeEvent>,
    due: Option<Instant>,
}

impl EventDebouncer {
    pub fn new(
        table: impl Into<String>,
        window: Duration,
        delete_policy: DeletePolicy,
        clock: SharedClock,
    ) -> Self {
        Self {
            table: table.into(),
            window,
            delete_policy,
            clock,
            buffer: Vec::new(),
            due: None,
        }
    }

    /// Buffer `event` received at `now`. Returns `false` when the delete
    /// policy filtered it out.
    pub fn push(&mut self, event: ChangeEvent, now: Instant) -> bool {
        if event.kind() == ChangeKind::Delete && self.delete_policy == DeletePolicy::Drop {
            log::debug!(
                "[livelist] Dropping DELETE for {}:{} (delete policy)",
                self.table,
                event.row_id()
            );
            return false;
        }
        if self.due.is_none() {
            self.due = Some(now + self.window);
        }
        self.buffer.push(event);
        true
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.due
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Emit the batch if the window has elapsed at `now`.
    pub fn poll(&mut self, now: Instant) -> Option<EventBatch> {
        match self.due {
            Some(due) if due <= now => self.flush(),
            _ => None,
        }
    }

    /// Emit whatever is buffered, regardless of the window.
    pub fn flush(&mut self) -> Option<EventBatch> {
        self.due = None;
        if self.buffer.is_empty() {
            return None;
        }
        Some(EventBatch {
            table: self.table.clone(),
            events: std::mem::take(&mut self.buffer),
            collected_at: self.clock.now(),
        })
    }

    /// Discard buffered events and stop the window. Returns how many were
    /// dropped.
    pub fn cancel(&mut self) -> usize {
        self.due = None;
        let dropped = self.buffer.len();
        self.buffer.clear();
        dropped
    }
}
