//! # tenant-livelist
//!
//! Tenant-scoped live pagination. Keeps a filtered, sorted, paginated list
//! consistent while forward keyset pages arrive from a row store and an
//! independent stream of insert/update/delete notifications arrives for the
//! same table, without ever letting data cross a tenant boundary.
//!
//! ## Pieces
//!
//! - [`KeysetPaginator`] / [`PageFetcher`]: cursor-bounded pages over a
//!   [`RowStore`], tagged with a fetch generation
//! - [`ChannelManager`]: one live subscription per `(table, tenant)`,
//!   reference counted, with tenant validation, duplicate suppression,
//!   event debouncing and bounded reconnect
//! - [`LiveListReconciler`]: merges pages and live events into one ordered
//!   window
//! - [`SearchDebouncer`] / [`EventDebouncer`]: timer-free debounce state
//!   machines
//! - [`LiveList`]: the task that ties them together for one table
//! - [`TenantSession`]: explicit per-tenant wiring
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tenant_livelist::{
//!     ChannelOptions, Filters, LiveListOptions, LiveTransport, MemoryRowStore, RowSchema,
//!     TenantSession,
//! };
//!
//! # async fn run(transport: Arc<dyn LiveTransport>) -> tenant_livelist::Result<()> {
//! let store = Arc::new(MemoryRowStore::new(RowSchema::default()));
//! let session = TenantSession::start("tenant-1", transport, store, ChannelOptions::default())?;
//!
//! let invoices = session.live_list(LiveListOptions::new("invoices"))?;
//! invoices.load_first_page(Filters::new())?;
//! invoices.on_search_input("INV-10")?;
//!
//! let mut snapshots = invoices.snapshots();
//! snapshots.changed().await.ok();
//! println!("{} rows", snapshots.borrow().rows.len());
//!
//! // Synchronous: nothing of tenant-1 is delivered after this returns.
//! let session = session.switch_tenant("tenant-2")?;
//! # drop(session);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod clock;
pub mod debounce;
pub mod error;
pub mod event_handlers;
pub mod live_list;
pub mod models;
pub mod pagination;
pub mod reconcile;
pub mod session;

pub use channel::{
    BackoffStrategy, ChannelManager, Delivery, LiveTransport, ReconnectPolicy, SubscriptionHandle,
    SubscriptionInfo, SubscriptionKey, TransportChannel, TransportSignal,
};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use debounce::{DeletePolicy, EventDebouncer, SearchDebouncer, MAX_DEBOUNCE_MS};
pub use error::{LiveListError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use live_list::{LiveList, WindowSnapshot};
pub use models::{
    Change, ChangeEvent, ChangeKind, ChannelOptions, ConnectionState, Cursor, EventBatch, Filters,
    LiveListOptions, Page, PageRequest, RawChange, Row, RowSchema,
};
pub use pagination::{KeysetPaginator, MemoryRowStore, PageFetcher, RowStore};
pub use reconcile::{LiveListReconciler, Window};
pub use session::TenantSession;
