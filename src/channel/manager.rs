//! Tenant-scoped live channel manager.
//!
//! Owns one subscription per `(table, tenant)` regardless of how many
//! consumers asked for it. Each subscription runs a background task (see
//! [`task`](super::task)) that opens the transport channel, validates and
//! decodes notifications, debounces them into batches and reconnects with
//! bounded backoff.
//!
//! Every batch and state change a task publishes goes through the registry
//! lock and is checked against the subscription's generation. Removing an
//! entry under that lock therefore guarantees nothing from it is delivered
//! afterwards, which is what makes [`ChannelManager::set_tenant`] a hard
//! isolation boundary.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

use super::subscription::{SubscriptionHandle, SubscriptionInfo, SubscriptionKey};
use super::task::{subscription_task, SubCmd, TaskContext};
use super::transport::LiveTransport;
use crate::clock::{SharedClock, SystemClock};
use crate::error::{LiveListError, Result};
use crate::event_handlers::EventHandlers;
use crate::models::{ChannelOptions, ConnectionState, EventBatch};

struct SubEntry {
    generation: u64,
    consumers: usize,
    batch_tx: broadcast::Sender<EventBatch>,
    state_tx: watch::Sender<ConnectionState>,
    cmd_tx: mpsc::UnboundedSender<SubCmd>,
    /// Shared with every handle; set when the tenant this entry belongs to
    /// is no longer active.
    revoked: Arc<AtomicBool>,
}

impl SubEntry {
    fn handle(&self, key: SubscriptionKey, registry: &Arc<Mutex<Registry>>) -> SubscriptionHandle {
        SubscriptionHandle::new(
            key,
            self.generation,
            self.batch_tx.subscribe(),
            self.state_tx.subscribe(),
            self.revoked.clone(),
            Arc::downgrade(registry),
        )
    }

    /// Stop the task and close the batch stream (the sender drops with `self`).
    fn retire(self) {
        self.state_tx.send_replace(ConnectionState::Disconnected);
        let _ = self.cmd_tx.send(SubCmd::Shutdown);
    }

    /// Retire on tenant change. Consumers must drop everything they hold
    /// for the tenant.
    fn revoke(self) {
        self.revoked.store(true, Ordering::SeqCst);
        self.retire();
    }
}

pub(crate) struct Registry {
    tenant_id: Option<String>,
    next_generation: u64,
    entries: HashMap<SubscriptionKey, SubEntry>,
}

impl Registry {
    fn new() -> Self {
        Self {
            tenant_id: None,
            next_generation: 1,
            entries: HashMap::new(),
        }
    }

    fn current(&self, key: &SubscriptionKey, generation: u64) -> Option<&SubEntry> {
        self.entries
            .get(key)
            .filter(|entry| entry.generation == generation)
    }

    /// Publish a batch. Returns `false` when the subscription is gone.
    pub(crate) fn deliver(&self, key: &SubscriptionKey, generation: u64, batch: EventBatch) -> bool {
        match self.current(key, generation) {
            Some(entry) => {
                // No receivers is fine: consumers may be between handles.
                let _ = entry.batch_tx.send(batch);
                true
            },
            None => false,
        }
    }

    /// Publish a state change. Returns `false` when the subscription is gone.
    pub(crate) fn set_state(
        &self,
        key: &SubscriptionKey,
        generation: u64,
        state: ConnectionState,
    ) -> bool {
        match self.current(key, generation) {
            Some(entry) => {
                entry.state_tx.send_replace(state);
                true
            },
            None => false,
        }
    }

    /// Drop one consumer reference; the last one retires the subscription.
    pub(crate) fn release(registry: &Arc<Mutex<Registry>>, key: &SubscriptionKey, generation: u64) {
        let mut reg = registry.lock();
        let last = match reg.entries.get_mut(key) {
            Some(entry) if entry.generation == generation => {
                entry.consumers = entry.consumers.saturating_sub(1);
                entry.consumers == 0
            },
            _ => false,
        };
        if last {
            if let Some(entry) = reg.entries.remove(key) {
                log::debug!("[livelist] Last consumer released {}", key);
                entry.retire();
            }
        }
    }

    fn revoke_all(&mut self) -> usize {
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            entry.revoke();
        }
        count
    }
}

/// Manages live subscriptions for the active tenant.
///
/// Constructed explicitly and handed to the lists that need it; there is no
/// process-wide instance. Must be used from within a tokio runtime.
pub struct ChannelManager {
    registry: Arc<Mutex<Registry>>,
    transport: Arc<dyn LiveTransport>,
    options: ChannelOptions,
    handlers: EventHandlers,
    clock: SharedClock,
}

impl ChannelManager {
    pub fn new(transport: Arc<dyn LiveTransport>, options: ChannelOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            registry: Arc::new(Mutex::new(Registry::new())),
            transport,
            options,
            handlers: EventHandlers::default(),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_handlers(mut self, handlers: EventHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// A manager with the same transport and configuration but no tenant
    /// and no subscriptions.
    pub fn fresh(&self) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::new())),
            transport: self.transport.clone(),
            options: self.options.clone(),
            handlers: self.handlers.clone(),
            clock: self.clock.clone(),
        }
    }

    pub fn options(&self) -> &ChannelOptions {
        &self.options
    }

    pub fn tenant_id(&self) -> Option<String> {
        self.registry.lock().tenant_id.clone()
    }

    /// Switch the active tenant.
    ///
    /// Every subscription of the previous tenant is revoked before this
    /// returns: none of their batches can be delivered afterwards and every
    /// [`LiveList`](crate::LiveList) built on them refuses further commands.
    /// Setting the same tenant again is a no-op.
    pub fn set_tenant(&self, tenant_id: Option<&str>) {
        let mut reg = self.registry.lock();
        if reg.tenant_id.as_deref() == tenant_id {
            return;
        }
        let retired = reg.revoke_all();
        match (&reg.tenant_id, tenant_id) {
            (Some(old), Some(new)) => log::info!(
                "[livelist] Tenant changed {} -> {}, tore down {} subscription(s)",
                old,
                new,
                retired
            ),
            (Some(old), None) => log::info!(
                "[livelist] No tenant, unsubscribed {} subscription(s) of {}",
                retired,
                old
            ),
            _ => {},
        }
        reg.tenant_id = tenant_id.map(str::to_string);
    }

    /// Subscribe to live changes of `table` for the active tenant.
    ///
    /// Idempotent: an existing subscription is shared and its reference
    /// count incremented.
    pub fn subscribe(&self, table: &str) -> Result<SubscriptionHandle> {
        let mut reg = self.registry.lock();
        let tenant_id = reg.tenant_id.clone().ok_or(LiveListError::NoActiveTenant)?;
        let key = SubscriptionKey::new(table, tenant_id.clone());

        if let Some(entry) = reg.entries.get_mut(&key) {
            entry.consumers += 1;
            log::debug!(
                "[livelist] Reusing subscription {} ({} consumers)",
                key,
                entry.consumers
            );
            return Ok(entry.handle(key, &self.registry));
        }

        let generation = reg.next_generation;
        reg.next_generation += 1;

        let (batch_tx, _) = broadcast::channel(self.options.batch_channel_capacity);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let ctx = TaskContext {
            key: key.clone(),
            generation,
            registry: self.registry.clone(),
            transport: self.transport.clone(),
            options: self.options.clone(),
            handlers: self.handlers.clone(),
            clock: self.clock.clone(),
        };
        tokio::spawn(subscription_task(ctx, cmd_rx));

        let entry = SubEntry {
            generation,
            consumers: 1,
            batch_tx,
            state_tx,
            cmd_tx,
            revoked: Arc::new(AtomicBool::new(false)),
        };
        let handle = entry.handle(key.clone(), &self.registry);
        reg.entries.insert(key, entry);
        log::info!("[livelist] Subscribed to {} for tenant {}", table, tenant_id);

        Ok(handle)
    }

    /// Tear down the subscription for `table` regardless of how many
    /// consumers hold it: pending debounced events are discarded, the batch
    /// stream closes and the transport channel is released.
    pub fn unsubscribe(&self, table: &str) -> bool {
        let mut reg = self.registry.lock();
        let Some(tenant_id) = reg.tenant_id.clone() else {
            return false;
        };
        match reg.entries.remove(&SubscriptionKey::new(table, tenant_id)) {
            Some(entry) => {
                entry.retire();
                log::info!("[livelist] Unsubscribed from {}", table);
                true
            },
            None => false,
        }
    }

    /// Restart reconnection for every subscription, resetting the attempt
    /// budget.
    pub fn reconnect(&self) {
        let reg = self.registry.lock();
        for entry in reg.entries.values() {
            let _ = entry.cmd_tx.send(SubCmd::Reconnect);
        }
    }

    /// Restart reconnection for one table.
    pub fn reconnect_table(&self, table: &str) -> bool {
        let Some(tenant_id) = self.tenant_id() else {
            return false;
        };
        self.reconnect_key(&SubscriptionKey::new(table, tenant_id))
    }

    /// Restart reconnection for `key`. A key of a previous tenant is a
    /// no-op.
    pub fn reconnect_key(&self, key: &SubscriptionKey) -> bool {
        let reg = self.registry.lock();
        match reg.entries.get(key) {
            Some(entry) => entry.cmd_tx.send(SubCmd::Reconnect).is_ok(),
            None => false,
        }
    }

    pub fn connection_state(&self, table: &str) -> Option<ConnectionState> {
        let reg = self.registry.lock();
        let tenant_id = reg.tenant_id.clone()?;
        reg.entries
            .get(&SubscriptionKey::new(table, tenant_id))
            .map(|entry| *entry.state_tx.borrow())
    }

    /// Snapshot of every active subscription, sorted by table.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        let reg = self.registry.lock();
        let mut infos: Vec<_> = reg
            .entries
            .iter()
            .map(|(key, entry)| SubscriptionInfo {
                table: key.table.clone(),
                tenant_id: key.tenant_id.clone(),
                connection_state: *entry.state_tx.borrow(),
                consumers: entry.consumers,
            })
            .collect();
        infos.sort_by(|a, b| a.table.cmp(&b.table));
        infos
    }

    /// Tear down everything and forget the tenant.
    pub fn teardown(&self) {
        self.set_tenant(None);
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        self.registry.lock().revoke_all();
    }
}
