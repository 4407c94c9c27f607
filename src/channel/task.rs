//! Background task driving one subscription.
//!
//! Connect, pump notifications through validation, dedup, decode and the
//! event debouncer, then reconnect with bounded backoff when the channel
//! is lost.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::dedup::RecentKeys;
use super::manager::Registry;
use super::subscription::SubscriptionKey;
use super::transport::{LiveTransport, TransportChannel, TransportSignal};
use crate::clock::SharedClock;
use crate::debounce::{EventDebouncer, FAR_FUTURE};
use crate::event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
use crate::models::{ChangeEvent, ChannelOptions, ConnectionState, EventBatch, RawChange};

/// Commands from the manager to a subscription task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubCmd {
    /// Retry now with a fresh attempt budget.
    Reconnect,
    Shutdown,
}

pub(crate) struct TaskContext {
    pub(crate) key: SubscriptionKey,
    pub(crate) generation: u64,
    pub(crate) registry: Arc<Mutex<Registry>>,
    pub(crate) transport: Arc<dyn LiveTransport>,
    pub(crate) options: ChannelOptions,
    pub(crate) handlers: EventHandlers,
    pub(crate) clock: SharedClock,
}

impl TaskContext {
    fn set_state(&self, state: ConnectionState) -> bool {
        self.registry
            .lock()
            .set_state(&self.key, self.generation, state)
    }

    fn deliver(&self, batch: EventBatch) -> bool {
        log::debug!(
            "[livelist] Delivering batch of {} event(s) for {}",
            batch.len(),
            self.key
        );
        self.registry.lock().deliver(&self.key, self.generation, batch)
    }

    async fn close_transport(&self) {
        self.transport
            .close(&self.key.table, &self.key.tenant_id)
            .await;
    }

    /// Validate, dedup and decode one raw notification into the debouncer.
    fn accept(&self, raw: RawChange, recent: &mut RecentKeys, debouncer: &mut EventDebouncer) {
        let schema = &self.options.schema;
        let table = self.key.table.as_str();
        let expected = self.key.tenant_id.as_str();

        match raw.tenant_id(schema) {
            Some(actual) if actual == expected => {},
            Some(actual) => {
                log::warn!(
                    "[livelist] Dropping {:?} on {}: tenant {} does not match {}",
                    raw.event_type,
                    table,
                    actual,
                    expected
                );
                self.handlers.emit_rejected(table, expected, &actual);
                return;
            },
            None => {
                log::warn!(
                    "[livelist] Dropping {:?} on {}: no tenant in payload",
                    raw.event_type,
                    table
                );
                self.handlers.emit_rejected(table, expected, "");
                return;
            },
        }

        if let Some(dedup_key) = raw.dedup_key(schema) {
            if !recent.insert(dedup_key) {
                log::debug!(
                    "[livelist] Duplicate {:?} on {} suppressed ({} recent keys)",
                    raw.event_type,
                    table,
                    recent.len()
                );
                return;
            }
        }

        match ChangeEvent::decode(table, &raw, schema) {
            Ok(event) => {
                debouncer.push(event, Instant::now());
            },
            Err(e) => log::warn!("[livelist] Undecodable notification on {}: {}", table, e),
        }
    }
}

enum ChannelEnd {
    Lost(String),
    Shutdown,
}

pub(crate) async fn subscription_task(ctx: TaskContext, mut cmd_rx: mpsc::UnboundedReceiver<SubCmd>) {
    let table = ctx.key.table.clone();
    let mut recent = RecentKeys::new(ctx.options.dedup_capacity);
    let mut debouncer = EventDebouncer::new(
        table.clone(),
        ctx.options.event_debounce(),
        ctx.options.delete_policy,
        ctx.clock.clone(),
    );
    let policy = ctx.options.reconnect.clone();
    let mut attempt: u32 = 0;

    loop {
        if !ctx.set_state(ConnectionState::Connecting) {
            return;
        }

        // ── Open ────────────────────────────────────────────────────────
        let open = ctx.transport.open(&ctx.key.table, &ctx.key.tenant_id);
        tokio::pin!(open);
        let opened = loop {
            tokio::select! {
                biased;
                cmd = cmd_rx.recv() => match cmd {
                    Some(SubCmd::Reconnect) => continue,
                    Some(SubCmd::Shutdown) | None => {
                        ctx.close_transport().await;
                        return;
                    },
                },
                res = &mut open => break res,
            }
        };

        let reason = match opened {
            Ok(channel) => {
                match run_channel(&ctx, channel, &mut cmd_rx, &mut recent, &mut debouncer, &mut attempt)
                    .await
                {
                    ChannelEnd::Shutdown => {
                        let dropped = debouncer.cancel();
                        if dropped > 0 {
                            log::debug!(
                                "[livelist] Discarded {} pending event(s) for {}",
                                dropped,
                                ctx.key
                            );
                        }
                        ctx.close_transport().await;
                        return;
                    },
                    ChannelEnd::Lost(reason) => {
                        if let Some(batch) = debouncer.flush() {
                            ctx.deliver(batch);
                        }
                        ctx.close_transport().await;
                        if !ctx.set_state(ConnectionState::Disconnected) {
                            return;
                        }
                        log::warn!("[livelist] Channel {} lost: {}", ctx.key, reason);
                        ctx.handlers
                            .emit_disconnect(&table, DisconnectReason::new(reason.clone()));
                        reason
                    },
                }
            },
            Err(e) => {
                if !ctx.set_state(ConnectionState::Disconnected) {
                    return;
                }
                log::warn!("[livelist] Opening {} failed: {}", ctx.key, e);
                e.to_string()
            },
        };

        // ── Backoff ─────────────────────────────────────────────────────
        attempt += 1;
        match policy.delay_for(attempt) {
            Some(delay) => {
                // Observers of the error still see Disconnected.
                ctx.handlers
                    .emit_error(&table, ConnectionError::new(reason, true));
                if !ctx.set_state(ConnectionState::Reconnecting) {
                    return;
                }
                log::info!(
                    "[livelist] Reconnecting {} in {}ms (attempt {}/{})",
                    ctx.key,
                    delay.as_millis(),
                    attempt,
                    policy.max_attempts
                );

                let sleep_fut = tokio::time::sleep(delay);
                tokio::pin!(sleep_fut);
                loop {
                    tokio::select! {
                        biased;
                        cmd = cmd_rx.recv() => match cmd {
                            Some(SubCmd::Reconnect) => {
                                attempt = 0;
                                break;
                            },
                            Some(SubCmd::Shutdown) | None => return,
                        },
                        _ = &mut sleep_fut => break,
                    }
                }
            },
            None => {
                if !ctx.set_state(ConnectionState::Disconnected) {
                    return;
                }
                log::warn!(
                    "[livelist] Giving up on {} after {} reconnect attempt(s)",
                    ctx.key,
                    policy.max_attempts
                );
                ctx.handlers.emit_error(
                    &table,
                    ConnectionError::new(
                        format!("max reconnect attempts ({}) reached", policy.max_attempts),
                        false,
                    ),
                );
                match cmd_rx.recv().await {
                    Some(SubCmd::Reconnect) => attempt = 0,
                    Some(SubCmd::Shutdown) | None => return,
                }
            },
        }
    }
}

async fn run_channel(
    ctx: &TaskContext,
    mut channel: TransportChannel,
    cmd_rx: &mut mpsc::UnboundedReceiver<SubCmd>,
    recent: &mut RecentKeys,
    debouncer: &mut EventDebouncer,
    attempt: &mut u32,
) -> ChannelEnd {
    loop {
        let deadline = debouncer.deadline();
        let flush_sleep =
            tokio::time::sleep_until(deadline.unwrap_or_else(|| Instant::now() + FAR_FUTURE));
        tokio::pin!(flush_sleep);

        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => match cmd {
                Some(SubCmd::Reconnect) => {
                    log::debug!("[livelist] {} is open, reconnect ignored", ctx.key);
                },
                Some(SubCmd::Shutdown) | None => return ChannelEnd::Shutdown,
            },

            _ = &mut flush_sleep, if deadline.is_some() => {
                if let Some(batch) = debouncer.poll(Instant::now()) {
                    if !ctx.deliver(batch) {
                        return ChannelEnd::Shutdown;
                    }
                }
            },

            signal = channel.recv() => match signal {
                Some(TransportSignal::Opened) => {
                    *attempt = 0;
                    if !ctx.set_state(ConnectionState::Connected) {
                        return ChannelEnd::Shutdown;
                    }
                    log::info!("[livelist] Channel {} connected", ctx.key);
                    ctx.handlers.emit_connect(&ctx.key.table);
                },
                Some(TransportSignal::Payload(raw)) => ctx.accept(raw, recent, debouncer),
                Some(TransportSignal::Error(message)) => return ChannelEnd::Lost(message),
                Some(TransportSignal::Closed) | None => {
                    return ChannelEnd::Lost("channel closed".to_string());
                },
            },
        }
    }
}
