//! Consumer handle for a shared table subscription.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};

use super::manager::Registry;
use crate::models::{ConnectionState, EventBatch};

/// Identity of a live subscription: one per `(table, tenant)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionKey {
    pub table: String,
    pub tenant_id: String,
}

impl SubscriptionKey {
    pub fn new(table: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            tenant_id: tenant_id.into(),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.table, self.tenant_id)
    }
}

/// Read-only snapshot of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub table: String,
    pub tenant_id: String,
    pub connection_state: ConnectionState,
    /// Number of live consumer handles.
    pub consumers: usize,
}

/// What a consumer receives from the batch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Batch(EventBatch),
    /// The consumer fell behind and `n` batches were lost; its view must be
    /// rebuilt from the store.
    Lagged(u64),
}

/// One consumer's share of a subscription.
///
/// Dropping the handle (or calling [`close`](Self::close)) releases its
/// reference; the last release tears the subscription down.
pub struct SubscriptionHandle {
    key: SubscriptionKey,
    generation: u64,
    batches: broadcast::Receiver<EventBatch>,
    state: watch::Receiver<ConnectionState>,
    revoked: Arc<AtomicBool>,
    registry: Weak<Mutex<Registry>>,
    released: bool,
}

impl SubscriptionHandle {
    pub(crate) fn new(
        key: SubscriptionKey,
        generation: u64,
        batches: broadcast::Receiver<EventBatch>,
        state: watch::Receiver<ConnectionState>,
        revoked: Arc<AtomicBool>,
        registry: Weak<Mutex<Registry>>,
    ) -> Self {
        Self {
            key,
            generation,
            batches,
            state,
            revoked,
            registry,
            released: false,
        }
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    pub fn table(&self) -> &str {
        &self.key.table
    }

    pub fn tenant_id(&self) -> &str {
        &self.key.tenant_id
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observable connection state of the subscription.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Next batch; `None` once the subscription was torn down.
    ///
    /// Cancel safe.
    pub async fn recv(&mut self) -> Option<Delivery> {
        match self.batches.recv().await {
            Ok(batch) => Some(Delivery::Batch(batch)),
            Err(broadcast::error::RecvError::Lagged(n)) => Some(Delivery::Lagged(n)),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Release this consumer's reference. Safe to call multiple times.
    pub fn close(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(registry) = self.registry.upgrade() {
            Registry::release(&registry, &self.key, self.generation);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.released
    }

    /// `true` once the tenant of this subscription stopped being active.
    /// Set before the tenant change returns.
    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::SeqCst)
    }

    pub(crate) fn revocation(&self) -> Arc<AtomicBool> {
        self.revoked.clone()
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .field("released", &self.released)
            .field("revoked", &self.is_revoked())
            .finish()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.close();
    }
}
