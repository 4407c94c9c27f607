//! Search input debouncing.
//!
//! Only the most recent text of a burst is committed; intermediate values
//! are dropped. A cleared query commits immediately.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct PendingQuery {
    text: String,
    due: Instant,
}

/// Coalesces rapid query changes into one delayed commit.
///
/// The debouncer owns no timer: the task driving it sleeps until
/// [`deadline`](Self::deadline) and then calls [`poll`](Self::poll), which
/// keeps timing fully deterministic under test.
#[derive(Debug, Clone)]
pub struct SearchDebouncer {
    delay: Duration,
    pending: Option<PendingQuery>,
}

impl SearchDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Record a new query text at `now`.
    ///
    /// Returns the text to commit right away for an empty query; otherwise
    /// (re)starts the delay and returns `None`.
    pub fn on_query_change(&mut self, text: impl Into<String>, now: Instant) -> Option<String> {
        let text = text.into();
        if text.trim().is_empty() {
            self.pending = None;
            return Some(String::new());
        }
        self.pending = Some(PendingQuery {
            text,
            due: now + self.delay,
        });
        None
    }

    /// When the pending query is due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.due)
    }

    /// Take the pending query if its delay has elapsed at `now`.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        match &self.pending {
            Some(pending) if pending.due <= now => self.pending.take().map(|p| p.text),
            _ => None,
        }
    }

    /// Drop the pending query. Returns `true` if one was pending.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}
