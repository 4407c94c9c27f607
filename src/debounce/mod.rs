//! Debouncing of search input and live events.

use std::time::Duration;

pub mod events;
pub mod search;

pub use events::{DeletePolicy, EventDebouncer};
pub use search::SearchDebouncer;

/// Upper bound accepted for any debounce window; larger values are a
/// configuration error.
pub const MAX_DEBOUNCE_MS: u64 = 60 * 60 * 1000;

/// Stand-in deadline for an idle timer branch in `select!`.
pub(crate) const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);
