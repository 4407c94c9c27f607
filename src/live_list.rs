//! Live list controller.
//!
//! A [`LiveList`] is a handle to a single task that owns the paginator,
//! the reconciler and the search debouncer for one table. Commands, fetch
//! completions, event batches, connection-state changes and the search
//! timer are all handled by that task's `select!` loop, so list state is
//! never shared or locked. Observers read [`WindowSnapshot`]s from a
//! `watch` channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::channel::{ChannelManager, Delivery, SubscriptionHandle, SubscriptionKey};
use crate::debounce::{SearchDebouncer, FAR_FUTURE};
use crate::error::{LiveListError, Result};
use crate::models::{ConnectionState, Filters, LiveListOptions, Page, PageRequest, Row};
use crate::pagination::{KeysetPaginator, RowStore};
use crate::reconcile::LiveListReconciler;

/// What the UI renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowSnapshot {
    pub rows: Vec<Row>,
    pub has_more: bool,
    pub loading: bool,
    /// Last fetch failure; rows stay as they were.
    pub error: Option<LiveListError>,
    pub filters: Filters,
}

enum ListCmd {
    LoadFirstPage(Filters),
    LoadNextPage,
    SearchInput(String),
    Teardown,
}

struct FetchDone {
    generation: u64,
    first_page: bool,
    result: Result<Page>,
}

/// Handle to a live, paginated, tenant-scoped list.
///
/// Dropping the handle tears the list down. So does a tenant change on the
/// channel manager: from then on every command fails with
/// [`LiveListError::TornDown`] and the window is cleared.
pub struct LiveList {
    key: SubscriptionKey,
    channels: Arc<ChannelManager>,
    revoked: Arc<AtomicBool>,
    cmd_tx: mpsc::UnboundedSender<ListCmd>,
    snapshots: watch::Receiver<WindowSnapshot>,
    connection: watch::Receiver<ConnectionState>,
    task: Option<JoinHandle<()>>,
}

impl LiveList {
    /// Subscribe to `options.table` for the channel manager's active tenant
    /// and start the list task. Nothing is fetched until
    /// [`load_first_page`](Self::load_first_page).
    pub fn new(
        channels: Arc<ChannelManager>,
        store: Arc<dyn RowStore>,
        options: LiveListOptions,
    ) -> Result<Self> {
        options.validate()?;
        let subscription = channels.subscribe(&options.table)?;
        let key = subscription.key().clone();
        let paginator = KeysetPaginator::new(store, key.tenant_id.clone(), &options)?;
        let reconciler = LiveListReconciler::new(key.tenant_id.clone(), options.schema.clone());

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(WindowSnapshot::default());
        let connection = subscription.state();
        let revoked = subscription.revocation();

        let actor = ListActor {
            paginator,
            reconciler,
            search: SearchDebouncer::new(options.search_debounce()),
            subscription,
            snapshot_tx,
            error: None,
            resync_on_reconnect: options.resync_on_reconnect,
            ever_connected: false,
        };
        let task = tokio::spawn(actor.run(cmd_rx));

        log::debug!("[livelist] Live list started for {}", key);
        Ok(Self {
            key,
            channels,
            revoked,
            cmd_tx,
            snapshots,
            connection,
            task: Some(task),
        })
    }

    pub fn table(&self) -> &str {
        &self.key.table
    }

    pub fn tenant_id(&self) -> &str {
        &self.key.tenant_id
    }

    /// `true` once the tenant this list was opened for is no longer active.
    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::SeqCst)
    }

    fn send(&self, cmd: ListCmd) -> Result<()> {
        if self.is_revoked() {
            return Err(LiveListError::TornDown(format!(
                "tenant {} of live list {} is no longer active",
                self.key.tenant_id, self.key
            )));
        }
        self.cmd_tx
            .send(cmd)
            .map_err(|_| LiveListError::TornDown(format!("live list {} is torn down", self.key)))
    }

    /// Load the first page for `filters`. A filter change clears the window;
    /// any fetch still in flight is superseded.
    pub fn load_first_page(&self, filters: Filters) -> Result<()> {
        self.send(ListCmd::LoadFirstPage(filters))
    }

    /// Load the page after the current cursor. No-op while a fetch is in
    /// flight or once the list is exhausted.
    pub fn load_next_page(&self) -> Result<()> {
        self.send(ListCmd::LoadNextPage)
    }

    /// Feed raw search box input; the last value commits after the search
    /// debounce delay.
    pub fn on_search_input(&self, text: impl Into<String>) -> Result<()> {
        self.send(ListCmd::SearchInput(text.into()))
    }

    /// Retry the live channel now with a fresh attempt budget.
    pub fn reconnect(&self) -> bool {
        self.channels.reconnect_key(&self.key)
    }

    /// Cancel timers, discard in-flight fetches and release the
    /// subscription.
    pub fn teardown(&self) {
        let _ = self.cmd_tx.send(ListCmd::Teardown);
    }

    /// Tear down and wait for the list task to finish.
    pub async fn shutdown(mut self) {
        self.teardown();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn snapshots(&self) -> watch::Receiver<WindowSnapshot> {
        self.snapshots.clone()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.clone()
    }
}

impl Drop for LiveList {
    fn drop(&mut self) {
        self.teardown();
    }
}

struct ListActor {
    paginator: KeysetPaginator,
    reconciler: LiveListReconciler,
    search: SearchDebouncer,
    subscription: SubscriptionHandle,
    snapshot_tx: watch::Sender<WindowSnapshot>,
    error: Option<LiveListError>,
    resync_on_reconnect: bool,
    ever_connected: bool,
}

impl ListActor {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<ListCmd>) {
        let (fetch_tx, mut fetch_rx) = mpsc::unbounded_channel::<FetchDone>();
        let mut state_rx = self.subscription.state();
        self.ever_connected = state_rx.borrow_and_update().is_connected();
        let mut state_open = true;
        let mut batches_open = true;

        loop {
            if self.subscription.is_revoked() {
                self.revoke();
                break;
            }

            let deadline = self.search.deadline();
            let search_sleep =
                tokio::time::sleep_until(deadline.unwrap_or_else(|| Instant::now() + FAR_FUTURE));
            tokio::pin!(search_sleep);

            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => match cmd {
                    Some(ListCmd::LoadFirstPage(filters)) => {
                        self.search.cancel();
                        self.load_first_page(filters, &fetch_tx);
                    },
                    Some(ListCmd::LoadNextPage) => self.load_next_page(&fetch_tx),
                    Some(ListCmd::SearchInput(text)) => {
                        if let Some(text) = self.search.on_query_change(text, Instant::now()) {
                            self.commit_search(text, &fetch_tx);
                        }
                    },
                    Some(ListCmd::Teardown) | None => break,
                },

                Some(done) = fetch_rx.recv() => self.on_fetch_done(done),

                _ = &mut search_sleep, if deadline.is_some() => {
                    if let Some(text) = self.search.poll(Instant::now()) {
                        self.commit_search(text, &fetch_tx);
                    }
                },

                delivery = self.subscription.recv(), if batches_open => match delivery {
                    Some(Delivery::Batch(batch)) => {
                        if self.reconciler.apply_batch(&batch) > 0 {
                            self.publish();
                        }
                    },
                    Some(Delivery::Lagged(missed)) => {
                        log::warn!(
                            "[livelist] {} missed {} batch(es), resyncing",
                            self.subscription.key(),
                            missed
                        );
                        self.resync(&fetch_tx);
                    },
                    None if self.subscription.is_revoked() => continue,
                    None => {
                        log::info!("[livelist] Subscription {} ended", self.subscription.key());
                        batches_open = false;
                    },
                },

                changed = state_rx.changed(), if state_open => {
                    if changed.is_err() {
                        state_open = false;
                        continue;
                    }
                    let state = *state_rx.borrow_and_update();
                    if state == ConnectionState::Connected {
                        if self.ever_connected && self.resync_on_reconnect {
                            log::info!(
                                "[livelist] {} reconnected, resyncing",
                                self.subscription.key()
                            );
                            self.resync(&fetch_tx);
                        }
                        self.ever_connected = true;
                    }
                },
            }
        }

        self.search.cancel();
        self.paginator.invalidate();
        self.subscription.close();
        self.publish();
        log::debug!("[livelist] Live list {} torn down", self.subscription.key());
    }

    /// Drop every row of the revoked tenant; results of fetches still in
    /// flight are discarded with the fetch channel.
    fn revoke(&mut self) {
        log::info!(
            "[livelist] Tenant of {} revoked, clearing window",
            self.subscription.key()
        );
        self.reconciler.reset(Filters::new());
        self.error = Some(LiveListError::TornDown(format!(
            "tenant {} is no longer active",
            self.subscription.tenant_id()
        )));
    }

    fn spawn_fetch(&self, request: PageRequest, fetch_tx: &mpsc::UnboundedSender<FetchDone>) {
        if self.subscription.is_revoked() {
            return;
        }
        let fetcher = self.paginator.fetcher();
        let tx = fetch_tx.clone();
        tokio::spawn(async move {
            let result = fetcher.fetch(&request).await;
            let _ = tx.send(FetchDone {
                generation: request.generation,
                first_page: request.is_first_page(),
                result,
            });
        });
    }

    fn load_first_page(&mut self, filters: Filters, fetch_tx: &mpsc::UnboundedSender<FetchDone>) {
        if &filters != self.reconciler.filters() {
            self.reconciler.reset(filters.clone());
        }
        let request = self.paginator.first_page(filters);
        self.spawn_fetch(request, fetch_tx);
        self.publish();
    }

    /// Reload the first page with unchanged filters; the window stays
    /// visible until the new page seeds it.
    fn resync(&mut self, fetch_tx: &mpsc::UnboundedSender<FetchDone>) {
        if !self.reconciler.is_seeded() && !self.paginator.is_loading() {
            return;
        }
        let filters = self.reconciler.filters().clone();
        self.load_first_page(filters, fetch_tx);
    }

    fn load_next_page(&mut self, fetch_tx: &mpsc::UnboundedSender<FetchDone>) {
        if !self.reconciler.has_more() {
            return;
        }
        let frontier = self.reconciler.cursor().cloned();
        if let Some(request) = self.paginator.next_page(frontier) {
            self.spawn_fetch(request, fetch_tx);
            self.publish();
        }
    }

    fn commit_search(&mut self, text: String, fetch_tx: &mpsc::UnboundedSender<FetchDone>) {
        let filters = self.reconciler.filters().clone().with_search(text);
        if &filters == self.reconciler.filters() && self.reconciler.is_seeded() {
            log::debug!("[livelist] Search unchanged, not refetching");
            return;
        }
        self.load_first_page(filters, fetch_tx);
    }

    fn on_fetch_done(&mut self, done: FetchDone) {
        let page = match self.paginator.complete(done.generation, done.result) {
            Ok(page) => page,
            Err(LiveListError::StaleGeneration { generation, current }) => {
                log::debug!(
                    "[livelist] Discarding page of generation {} (current {})",
                    generation,
                    current
                );
                return;
            },
            Err(e) => {
                log::warn!("[livelist] Fetch for {} failed: {}", self.subscription.key(), e);
                self.error = Some(e);
                self.publish();
                return;
            },
        };

        let applied = if done.first_page {
            self.reconciler
                .seed(page.rows, page.next_cursor, page.has_more)
        } else {
            self.reconciler
                .append_page(page.rows, page.next_cursor, page.has_more)
                .map(|_| ())
        };
        self.error = applied.err();
        self.publish();
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(WindowSnapshot {
            rows: self.reconciler.snapshot(),
            has_more: self.reconciler.has_more(),
            loading: self.paginator.is_loading(),
            error: self.error.clone(),
            filters: self.reconciler.filters().clone(),
        });
    }
}
