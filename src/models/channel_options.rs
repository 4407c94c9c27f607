use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::row::RowSchema;
use crate::channel::backoff::ReconnectPolicy;
use crate::debounce::events::DeletePolicy;
use crate::debounce::MAX_DEBOUNCE_MS;
use crate::error::{LiveListError, Result};

/// Options for the live channel manager.
///
/// # Example
///
/// ```rust
/// use tenant_livelist::{ChannelOptions, DeletePolicy};
///
/// let options = ChannelOptions::default()
///     .with_event_debounce_ms(250)
///     .with_delete_policy(DeletePolicy::Forward);
/// assert_eq!(options.reconnect.max_attempts, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelOptions {
    /// Window during which raw events are collected into one batch.
    /// Default: 300ms
    #[serde(default = "default_event_debounce_ms")]
    pub event_debounce_ms: u64,

    /// Whether delete notifications reach the reconciler.
    /// Default: `Drop`
    #[serde(default)]
    pub delete_policy: DeletePolicy,

    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    /// Number of recent notification keys remembered for duplicate
    /// suppression. `0` disables suppression.
    /// Default: 1000
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,

    /// Capacity of each subscription's batch stream.
    /// Default: 256
    #[serde(default = "default_batch_channel_capacity")]
    pub batch_channel_capacity: usize,

    /// Columns used to decode raw notifications.
    #[serde(default)]
    pub schema: RowSchema,
}

fn default_event_debounce_ms() -> u64 {
    300
}

fn default_dedup_capacity() -> usize {
    1000
}

fn default_batch_channel_capacity() -> usize {
    256
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            event_debounce_ms: default_event_debounce_ms(),
            delete_policy: DeletePolicy::default(),
            reconnect: ReconnectPolicy::default(),
            dedup_capacity: default_dedup_capacity(),
            batch_channel_capacity: default_batch_channel_capacity(),
            schema: RowSchema::default(),
        }
    }
}

impl ChannelOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self =
            serde_json::from_str(json).map_err(|e| LiveListError::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_channel_capacity == 0 {
            return Err(LiveListError::Config(
                "batch_channel_capacity must be greater than zero".to_string(),
            ));
        }
        if self.event_debounce_ms > MAX_DEBOUNCE_MS {
            return Err(LiveListError::Config(format!(
                "event_debounce_ms must be at most {}, got {}",
                MAX_DEBOUNCE_MS, self.event_debounce_ms
            )));
        }
        Ok(())
    }

    pub fn event_debounce(&self) -> Duration {
        Duration::from_millis(self.event_debounce_ms)
    }

    pub fn with_event_debounce_ms(mut self, ms: u64) -> Self {
        self.event_debounce_ms = ms;
        self
    }

    pub fn with_delete_policy(mut self, policy: DeletePolicy) -> Self {
        self.delete_policy = policy;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_dedup_capacity(mut self, capacity: usize) -> Self {
        self.dedup_capacity = capacity;
        self
    }

    pub fn with_schema(mut self, schema: RowSchema) -> Self {
        self.schema = schema;
        self
    }
}
