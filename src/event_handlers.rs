//! Connection lifecycle hooks for live subscriptions.
//!
//! - [`on_connect`](EventHandlers::on_connect): a table channel was opened
//! - [`on_disconnect`](EventHandlers::on_disconnect): a table channel closed
//! - [`on_error`](EventHandlers::on_error): a channel failed or gave up reconnecting
//! - [`on_rejected`](EventHandlers::on_rejected): a notification was dropped
//!   for carrying a foreign tenant (diagnostics only, never user-facing)
//!
//! # Example
//!
//! ```rust
//! use tenant_livelist::EventHandlers;
//!
//! let handlers = EventHandlers::new()
//!     .on_connect(|table| println!("{} live", table))
//!     .on_error(|table, err| eprintln!("{}: {} (recoverable={})", table, err, err.recoverable));
//! assert!(handlers.has_any());
//! ```

use std::fmt;
use std::sync::Arc;

/// Why a table channel closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    pub message: String,
}

impl DisconnectReason {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Error information passed to the `on_error` handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionError {
    pub message: String,
    /// Whether an automatic reconnect is still going to be attempted.
    pub recoverable: bool,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

pub type OnConnectCallback = Arc<dyn Fn(&str) + Send + Sync>;

pub type OnDisconnectCallback = Arc<dyn Fn(&str, DisconnectReason) + Send + Sync>;

pub type OnErrorCallback = Arc<dyn Fn(&str, ConnectionError) + Send + Sync>;

/// Receives `(table, expected_tenant, actual_tenant)`.
pub type OnRejectedCallback = Arc<dyn Fn(&str, &str, &str) + Send + Sync>;

/// Optional lifecycle callbacks, shared by every subscription of a
/// channel manager. Handlers run on the channel task and must not block.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_connect: Option<OnConnectCallback>,
    pub(crate) on_disconnect: Option<OnDisconnectCallback>,
    pub(crate) on_error: Option<OnErrorCallback>,
    pub(crate) on_rejected: Option<OnRejectedCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_rejected", &self.on_rejected.is_some())
            .finish()
    }
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    pub fn on_disconnect(
        mut self,
        f: impl Fn(&str, DisconnectReason) + Send + Sync + 'static,
    ) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&str, ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_rejected(mut self, f: impl Fn(&str, &str, &str) + Send + Sync + 'static) -> Self {
        self.on_rejected = Some(Arc::new(f));
        self
    }

    pub fn has_any(&self) -> bool {
        self.on_connect.is_some()
            || self.on_disconnect.is_some()
            || self.on_error.is_some()
            || self.on_rejected.is_some()
    }

    pub(crate) fn emit_connect(&self, table: &str) {
        if let Some(cb) = &self.on_connect {
            cb(table);
        }
    }

    pub(crate) fn emit_disconnect(&self, table: &str, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            cb(table, reason);
        }
    }

    pub(crate) fn emit_error(&self, table: &str, error: ConnectionError) {
        if let Some(cb) = &self.on_error {
            cb(table, error);
        }
    }

    pub(crate) fn emit_rejected(&self, table: &str, expected: &str, actual: &str) {
        if let Some(cb) = &self.on_rejected {
            cb(table, expected, actual);
        }
    }
}
