//! Error types for the live-list engine.
//!
//! Fetch failures are surfaced to the UI and are retryable; channel failures
//! only ever show up as connection-state transitions; tenant mismatches and
//! stale generations are logged or silently discarded by the callers.

use thiserror::Error;

/// Errors produced by pagination, reconciliation and the live channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiveListError {
    /// Network, timeout or server error while fetching a page.
    #[error("Fetch failed: {message}")]
    FetchFailure { message: String, retryable: bool },

    /// Subscription or connection error on the live channel.
    #[error("Channel error: {0}")]
    ChannelFailure(String),

    /// Data tagged with a tenant other than the active one.
    #[error("Tenant mismatch: expected {expected}, got {actual}")]
    TenantMismatch { expected: String, actual: String },

    /// A fetch result that arrived after its filters were superseded.
    #[error("Stale fetch generation {generation} (current {current})")]
    StaleGeneration { generation: u64, current: u64 },

    #[error("No active tenant")]
    NoActiveTenant,

    #[error("Invalid page size: {0}")]
    InvalidPageSize(usize),

    /// A page whose rows break the keyset ordering relative to the cursor.
    #[error("Invalid page: {0}")]
    InvalidPage(String),

    /// A raw record that could not be decoded into a typed row.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The live list or subscription has already been torn down.
    #[error("Torn down: {0}")]
    TornDown(String),
}

impl LiveListError {
    /// Build a retryable fetch failure.
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::FetchFailure {
            message: message.into(),
            retryable: true,
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::FetchFailure { retryable, .. } => *retryable,
            Self::ChannelFailure(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for LiveListError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result type for live-list operations.
pub type Result<T> = std::result::Result<T, LiveListError>;
