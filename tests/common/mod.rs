#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tenant_livelist::{
    LiveListError, LiveTransport, MemoryRowStore, PageRequest, RawChange, Result, Row, RowSchema,
    RowStore, TransportChannel, TransportSignal,
};
use tokio::sync::mpsc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap()
}

pub fn row(id: &str, tenant: &str, hour: u32, minute: u32) -> Row {
    Row::new(id, tenant, at(hour, minute))
}

pub fn ids(rows: &[Row]) -> Vec<String> {
    rows.iter().map(|r| r.id.clone()).collect()
}

pub fn invoice_schema() -> RowSchema {
    RowSchema::default().with_search_columns(["invoice_number"])
}

/// INSERT payload as the transport delivers it.
pub fn raw_insert(id: &str, tenant: &str, created_at: &str, commit: Option<&str>) -> RawChange {
    serde_json::from_value(json!({
        "eventType": "INSERT",
        "new": {"id": id, "tenant_id": tenant, "created_at": created_at},
        "commit_timestamp": commit,
    }))
    .unwrap()
}

pub fn raw_delete(id: &str, tenant: &str) -> RawChange {
    serde_json::from_value(json!({
        "eventType": "DELETE",
        "old": {"id": id, "tenant_id": tenant, "created_at": "2024-03-01T00:00:00Z"},
    }))
    .unwrap()
}

/// Poll `check` until it holds, advancing (paused) time in small steps.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..2_000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(60), future)
        .await
        .expect("timed out")
}

// ── Transport ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct MockState {
    senders: HashMap<(String, String), mpsc::Sender<TransportSignal>>,
    opens: Vec<(String, String)>,
    closes: Vec<(String, String)>,
}

/// In-process transport. Every successful open immediately signals
/// `Opened`; tests push payloads and failures through [`emit`](Self::emit).
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
    failing: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let transport = Self::default();
        transport.failing.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().opens.len()
    }

    pub fn opens_for(&self, tenant: &str) -> usize {
        self.state
            .lock()
            .opens
            .iter()
            .filter(|(_, t)| t == tenant)
            .count()
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().closes.len()
    }

    pub fn is_open(&self, table: &str, tenant: &str) -> bool {
        self.state
            .lock()
            .senders
            .contains_key(&(table.to_string(), tenant.to_string()))
    }

    /// Push a signal into the open channel for `(table, tenant)`.
    pub async fn emit(&self, table: &str, tenant: &str, signal: TransportSignal) {
        let sender = self
            .state
            .lock()
            .senders
            .get(&(table.to_string(), tenant.to_string()))
            .cloned()
            .expect("channel not open");
        sender.send(signal).await.expect("channel receiver dropped");
    }

    pub async fn emit_payload(&self, table: &str, tenant: &str, raw: RawChange) {
        self.emit(table, tenant, TransportSignal::Payload(raw)).await;
    }
}

#[async_trait]
impl LiveTransport for MockTransport {
    async fn open(&self, table: &str, tenant_id: &str) -> Result<TransportChannel> {
        let mut state = self.state.lock();
        state.opens.push((table.to_string(), tenant_id.to_string()));
        if self.failing.load(Ordering::SeqCst) {
            return Err(LiveListError::ChannelFailure("connection refused".to_string()));
        }
        let (tx, channel) = TransportChannel::pair(64);
        let _ = tx.try_send(TransportSignal::Opened);
        state
            .senders
            .insert((table.to_string(), tenant_id.to_string()), tx);
        Ok(channel)
    }

    async fn close(&self, table: &str, tenant_id: &str) {
        let mut state = self.state.lock();
        let key = (table.to_string(), tenant_id.to_string());
        state.senders.remove(&key);
        state.closes.push(key);
    }
}

// ── Store ───────────────────────────────────────────────────────────────────

/// [`MemoryRowStore`] that records requests and can be made slow or failing.
pub struct ScriptedStore {
    pub rows: MemoryRowStore,
    requests: Mutex<Vec<PageRequest>>,
    failing: AtomicBool,
    slow_search: Mutex<Option<(String, Duration)>>,
    fetches: AtomicUsize,
}

impl ScriptedStore {
    pub fn new(schema: RowSchema) -> Arc<Self> {
        Arc::new(Self {
            rows: MemoryRowStore::new(schema),
            requests: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            slow_search: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every request searching for `search` by `delay`.
    pub fn slow_down(&self, search: &str, delay: Duration) {
        *self.slow_search.lock() = Some((search.to_string(), delay));
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RowStore for ScriptedStore {
    async fn fetch_rows(&self, request: &PageRequest) -> Result<Vec<Row>> {
        self.requests.lock().push(request.clone());
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let delay = self
            .slow_search
            .lock()
            .as_ref()
            .filter(|(search, _)| request.filters.search.as_deref() == Some(search.as_str()))
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(LiveListError::fetch("store unavailable"));
        }
        self.rows.fetch_rows(request).await
    }
}
