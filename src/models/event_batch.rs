use chrono::{DateTime, Utc};

use super::change_event::ChangeEvent;

/// Events collected for one subscription during a single debounce window,
/// in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    pub table: String,
    pub events: Vec<ChangeEvent>,
    pub collected_at: DateTime<Utc>,
}

impl EventBatch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
