use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::row::RowSchema;
use crate::debounce::MAX_DEBOUNCE_MS;
use crate::error::{LiveListError, Result};

/// Options for one live list (pagination and search).
///
/// # Example
///
/// ```rust
/// use tenant_livelist::{LiveListOptions, RowSchema};
///
/// let options = LiveListOptions::new("invoices")
///     .with_page_size(50)
///     .with_schema(RowSchema::default().with_sort_column("issue_date"));
/// assert_eq!(options.search_debounce_ms, 300);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveListOptions {
    /// Table the list is backed by.
    pub table: String,

    /// Rows per keyset page.
    /// Default: 20
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Delay before a changed search text triggers a fetch.
    /// Default: 300ms
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,

    /// Upper bound for a single page fetch.
    /// Default: 10000ms
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Reload the first page when the live channel recovers from a loss,
    /// since notifications sent while disconnected are not replayed.
    /// Default: true
    #[serde(default = "default_resync_on_reconnect")]
    pub resync_on_reconnect: bool,

    #[serde(default)]
    pub schema: RowSchema,
}

fn default_page_size() -> usize {
    20
}

fn default_search_debounce_ms() -> u64 {
    300
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_resync_on_reconnect() -> bool {
    true
}

impl LiveListOptions {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            page_size: default_page_size(),
            search_debounce_ms: default_search_debounce_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            resync_on_reconnect: default_resync_on_reconnect(),
            schema: RowSchema::default(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self =
            serde_json::from_str(json).map_err(|e| LiveListError::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.table.trim().is_empty() {
            return Err(LiveListError::Config("table must not be empty".to_string()));
        }
        if self.page_size == 0 {
            return Err(LiveListError::InvalidPageSize(0));
        }
        if self.search_debounce_ms > MAX_DEBOUNCE_MS {
            return Err(LiveListError::Config(format!(
                "search_debounce_ms must be at most {}, got {}",
                MAX_DEBOUNCE_MS, self.search_debounce_ms
            )));
        }
        Ok(())
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_search_debounce_ms(mut self, ms: u64) -> Self {
        self.search_debounce_ms = ms;
        self
    }

    pub fn with_fetch_timeout_ms(mut self, ms: u64) -> Self {
        self.fetch_timeout_ms = ms;
        self
    }

    pub fn with_resync_on_reconnect(mut self, enabled: bool) -> Self {
        self.resync_on_reconnect = enabled;
        self
    }

    pub fn with_schema(mut self, schema: RowSchema) -> Self {
        self.schema = schema;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_applies_defaults() {
        let options = LiveListOptions::from_json_str(r#"{"table":"service_requests"}"#).unwrap();
        assert_eq!(options.page_size, 20);
        assert_eq!(options.search_debounce(), Duration::from_millis(300));
        assert_eq!(options.fetch_timeout(), Duration::from_secs(10));
        assert!(options.resync_on_reconnect);
    }

    #[test]
    fn test_zero_page_size_is_rejected() {
        let err = LiveListOptions::from_json_str(r#"{"table":"invoices","page_size":0}"#)
            .unwrap_err();
        assert_eq!(err, LiveListError::InvalidPageSize(0));
    }

    #[test]
    fn test_search_debounce_above_one_hour_is_rejected() {
        let err = LiveListOptions::new("invoices")
            .with_search_debounce_ms(u64::MAX)
            .validate()
            .unwrap_err();
        assert!(matches!(err, LiveListError::Config(ref msg) if msg.contains("search_debounce_ms")));
        assert!(LiveListOptions::new("invoices")
            .with_search_debounce_ms(MAX_DEBOUNCE_MS)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_missing_table_is_a_config_error() {
        assert!(matches!(
            LiveListOptions::from_json_str("{}"),
            Err(LiveListError::Config(_))
        ));
    }
}
