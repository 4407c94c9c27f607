//! Channel manager lifecycle: sharing, tenant switches, validation,
//! duplicate suppression, delete policy and bounded reconnect.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tenant_livelist::{
    ChangeKind, ChannelManager, ChannelOptions, ConnectionState, DeletePolicy, Delivery,
    EventHandlers, LiveListError, SubscriptionHandle, TransportSignal,
};
use tokio::sync::watch;

mod common;
use common::{raw_delete, raw_insert, wait_until, within, MockTransport};

async fn connected(handle: &SubscriptionHandle) {
    let mut state = handle.state();
    within(state.wait_for(|s| s.is_connected())).await.unwrap();
}

async fn next_batch(handle: &mut SubscriptionHandle) -> tenant_livelist::EventBatch {
    match within(handle.recv()).await {
        Some(Delivery::Batch(batch)) => batch,
        other => panic!("expected a batch, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_without_tenant_fails() {
    let manager = ChannelManager::new(MockTransport::new(), ChannelOptions::default()).unwrap();
    let err = manager.subscribe("invoices").unwrap_err();
    assert_eq!(err, LiveListError::NoActiveTenant);
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_is_idempotent_and_reference_counted() {
    common::init_logging();
    let transport = MockTransport::new();
    let manager = ChannelManager::new(transport.clone(), ChannelOptions::default()).unwrap();
    manager.set_tenant(Some("t1"));

    let first = manager.subscribe("invoices").unwrap();
    let second = manager.subscribe("invoices").unwrap();
    connected(&first).await;
    assert_eq!(first.key(), second.key());
    assert_eq!(transport.open_count(), 1);

    let infos = manager.subscriptions();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].consumers, 2);
    assert_eq!(infos[0].connection_state, ConnectionState::Connected);

    drop(first);
    assert_eq!(manager.subscriptions()[0].consumers, 1);
    drop(second);
    assert!(manager.subscriptions().is_empty());
    wait_until(|| transport.close_count() == 1).await;
}

#[tokio::test(start_paused = true)]
async fn test_batches_are_shared_by_all_consumers() {
    let transport = MockTransport::new();
    let manager = ChannelManager::new(transport.clone(), ChannelOptions::default()).unwrap();
    manager.set_tenant(Some("t1"));
    let mut first = manager.subscribe("invoices").unwrap();
    let mut second = manager.subscribe("invoices").unwrap();
    connected(&first).await;

    transport
        .emit_payload("invoices", "t1", raw_insert("r1", "t1", "2024-03-01T10:00:00Z", None))
        .await;
    transport
        .emit_payload("invoices", "t1", raw_insert("r2", "t1", "2024-03-01T10:01:00Z", None))
        .await;

    let a = next_batch(&mut first).await;
    let b = next_batch(&mut second).await;
    assert_eq!(a, b);
    let ids: Vec<_> = a.events.iter().map(|e| e.row_id().to_string()).collect();
    assert_eq!(ids, vec!["r1", "r2"], "one batch, arrival order");
}

#[tokio::test(start_paused = true)]
async fn test_tenant_switch_tears_down_before_returning() {
    let transport = MockTransport::new();
    let manager = ChannelManager::new(transport.clone(), ChannelOptions::default()).unwrap();
    manager.set_tenant(Some("t1"));
    let mut old = manager.subscribe("invoices").unwrap();
    connected(&old).await;

    // Buffered in the debounce window when the tenant changes.
    transport
        .emit_payload("invoices", "t1", raw_insert("r1", "t1", "2024-03-01T10:00:00Z", None))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    manager.set_tenant(Some("t2"));
    assert_eq!(old.connection_state(), ConnectionState::Disconnected);
    assert!(manager.subscriptions().is_empty());
    assert_eq!(manager.tenant_id().as_deref(), Some("t2"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(within(old.recv()).await.is_none(), "no batch of t1 after the switch");
    wait_until(|| !transport.is_open("invoices", "t1")).await;

    let new = manager.subscribe("invoices").unwrap();
    connected(&new).await;
    assert_eq!(new.tenant_id(), "t2");
    assert_eq!(transport.opens_for("t2"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_foreign_tenant_payload_is_rejected() {
    let rejected = Arc::new(AtomicUsize::new(0));
    let counter = rejected.clone();
    let handlers = EventHandlers::new().on_rejected(move |table, expected, actual| {
        assert_eq!((table, expected, actual), ("invoices", "t1", "t2"));
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let transport = MockTransport::new();
    let manager = ChannelManager::new(transport.clone(), ChannelOptions::default())
        .unwrap()
        .with_handlers(handlers);
    manager.set_tenant(Some("t1"));
    let mut handle = manager.subscribe("invoices").unwrap();
    connected(&handle).await;

    transport
        .emit_payload("invoices", "t1", raw_insert("leak", "t2", "2024-03-01T10:00:00Z", None))
        .await;
    transport
        .emit_payload("invoices", "t1", raw_insert("ok", "t1", "2024-03-01T10:00:00Z", None))
        .await;

    let batch = next_batch(&mut handle).await;
    assert_eq!(batch.events.len(), 1);
    assert_eq!(batch.events[0].row_id(), "ok");
    assert_eq!(rejected.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_notifications_are_suppressed() {
    let transport = MockTransport::new();
    let manager = ChannelManager::new(transport.clone(), ChannelOptions::default()).unwrap();
    manager.set_tenant(Some("t1"));
    let mut handle = manager.subscribe("invoices").unwrap();
    connected(&handle).await;

    let raw = raw_insert("r1", "t1", "2024-03-01T10:00:00Z", Some("2024-03-01T10:00:00.123Z"));
    transport.emit_payload("invoices", "t1", raw.clone()).await;
    transport.emit_payload("invoices", "t1", raw).await;

    let batch = next_batch(&mut handle).await;
    assert_eq!(batch.events.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_delete_policy_controls_forwarding() {
    for (policy, expected) in [
        (DeletePolicy::Drop, vec![ChangeKind::Insert]),
        (DeletePolicy::Forward, vec![ChangeKind::Insert, ChangeKind::Delete]),
    ] {
        let transport = MockTransport::new();
        let options = ChannelOptions::default().with_delete_policy(policy);
        let manager = ChannelManager::new(transport.clone(), options).unwrap();
        manager.set_tenant(Some("t1"));
        let mut handle = manager.subscribe("invoices").unwrap();
        connected(&handle).await;

        transport
            .emit_payload("invoices", "t1", raw_insert("r1", "t1", "2024-03-01T10:00:00Z", None))
            .await;
        transport
            .emit_payload("invoices", "t1", raw_delete("r0", "t1"))
            .await;

        let batch = next_batch(&mut handle).await;
        let kinds: Vec<_> = batch.events.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, expected, "{:?}", policy);
    }
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_discards_pending_events_and_closes_stream() {
    let transport = MockTransport::new();
    let manager = ChannelManager::new(transport.clone(), ChannelOptions::default()).unwrap();
    manager.set_tenant(Some("t1"));
    let mut handle = manager.subscribe("invoices").unwrap();
    connected(&handle).await;

    transport
        .emit_payload("invoices", "t1", raw_insert("r1", "t1", "2024-03-01T10:00:00Z", None))
        .await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(manager.unsubscribe("invoices"));
    assert!(!manager.unsubscribe("invoices"));
    assert!(within(handle.recv()).await.is_none());
    wait_until(|| transport.close_count() == 1).await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_gives_up_after_max_attempts() {
    common::init_logging();
    let errors = Arc::new(AtomicUsize::new(0));
    let fatal = Arc::new(AtomicUsize::new(0));
    let (e, f) = (errors.clone(), fatal.clone());
    let handlers = EventHandlers::new().on_error(move |_, err| {
        e.fetch_add(1, Ordering::SeqCst);
        if !err.recoverable {
            f.fetch_add(1, Ordering::SeqCst);
        }
    });

    let transport = MockTransport::failing();
    let manager = ChannelManager::new(transport.clone(), ChannelOptions::default())
        .unwrap()
        .with_handlers(handlers);
    manager.set_tenant(Some("t1"));
    let handle = manager.subscribe("invoices").unwrap();

    // Linear 2s base: 2 + 4 + 6 + 8 + 10 seconds of backoff.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.open_count(), 6, "initial open plus 5 reconnects");
    assert_eq!(handle.connection_state(), ConnectionState::Disconnected);
    assert_eq!(errors.load(Ordering::SeqCst), 6);
    assert_eq!(fatal.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(transport.open_count(), 6, "no automatic attempt after giving up");

    transport.set_failing(false);
    assert!(manager.reconnect_table("invoices"));
    connected(&handle).await;
    assert_eq!(transport.open_count(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_failed_open_reports_disconnected_before_retrying() {
    let state: Arc<Mutex<Option<watch::Receiver<ConnectionState>>>> = Arc::new(Mutex::new(None));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (slot, log) = (state.clone(), seen.clone());
    let handlers = EventHandlers::new().on_error(move |_, err| {
        if let Some(state) = slot.lock().as_ref() {
            log.lock().push((*state.borrow(), err.recoverable));
        }
    });

    let transport = MockTransport::failing();
    let manager = ChannelManager::new(transport.clone(), ChannelOptions::default())
        .unwrap()
        .with_handlers(handlers);
    manager.set_tenant(Some("t1"));
    let handle = manager.subscribe("invoices").unwrap();
    *state.lock() = Some(handle.state());

    tokio::time::sleep(Duration::from_secs(60)).await;
    let seen = seen.lock().clone();
    assert_eq!(seen.len(), 6);
    assert!(seen
        .iter()
        .all(|(state, _)| *state == ConnectionState::Disconnected));
    assert_eq!(seen.iter().filter(|(_, recoverable)| !recoverable).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_tenant_switch_revokes_handles_of_previous_tenant() {
    let manager = ChannelManager::new(MockTransport::new(), ChannelOptions::default()).unwrap();
    manager.set_tenant(Some("t1"));
    let old = manager.subscribe("invoices").unwrap();
    let mut released = manager.subscribe("payments").unwrap();
    released.close();
    assert!(!old.is_revoked());

    manager.set_tenant(Some("t2"));
    assert!(old.is_revoked());
    assert!(!released.is_revoked(), "released before the switch");

    let new = manager.subscribe("invoices").unwrap();
    assert!(!new.is_revoked());
    assert!(manager.unsubscribe("invoices"));
    assert!(!new.is_revoked(), "unsubscribe is not a tenant change");
}

#[tokio::test(start_paused = true)]
async fn test_lost_channel_reconnects_and_resets_budget() {
    let transport = MockTransport::new();
    let manager = ChannelManager::new(transport.clone(), ChannelOptions::default()).unwrap();
    manager.set_tenant(Some("t1"));
    let handle = manager.subscribe("invoices").unwrap();

    for round in 1..=8 {
        connected(&handle).await;
        transport
            .emit("invoices", "t1", TransportSignal::Error("socket reset".to_string()))
            .await;
        let mut state = handle.state();
        within(state.wait_for(|s| *s == ConnectionState::Reconnecting))
            .await
            .unwrap();
        connected(&handle).await;
        assert_eq!(transport.open_count(), round + 1);
    }
}
