//! Live-notification transport boundary.
//!
//! The transport owns the wire protocol; this crate only sees per-table
//! channels yielding status signals and raw change payloads.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::models::RawChange;

/// Signal delivered by an open transport channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// The channel is joined and will deliver notifications.
    Opened,
    Payload(RawChange),
    Error(String),
    Closed,
}

/// Receiving side of one transport channel. Dropping it releases nothing
/// by itself; the manager also calls [`LiveTransport::close`].
#[derive(Debug)]
pub struct TransportChannel {
    signals: mpsc::Receiver<TransportSignal>,
}

impl TransportChannel {
    pub fn new(signals: mpsc::Receiver<TransportSignal>) -> Self {
        Self { signals }
    }

    /// Create a channel together with the sender a transport feeds.
    pub fn pair(capacity: usize) -> (mpsc::Sender<TransportSignal>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(rx))
    }

    /// Next signal; `None` once the transport dropped its sender.
    pub async fn recv(&mut self) -> Option<TransportSignal> {
        self.signals.recv().await
    }
}

/// Opens and closes tenant-filtered table channels.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Join the change feed of `table`, filtered server-side to `tenant_id`.
    async fn open(&self, table: &str, tenant_id: &str) -> Result<TransportChannel>;

    /// Leave the change feed. Must be safe to call for an unknown channel.
    async fn close(&self, table: &str, tenant_id: &str);
}
