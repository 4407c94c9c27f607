//! Data models for the live-list engine.
//!
//! Rows, cursors and filters describe the list; change events and batches
//! carry live notifications; the option structs configure pagination and
//! the live channel.

pub mod change_event;
pub mod channel_options;
pub mod connection_state;
pub mod cursor;
pub mod event_batch;
pub mod filters;
pub mod live_list_options;
pub mod page;
pub mod row;

pub use change_event::{Change, ChangeEvent, ChangeKind, RawChange};
pub use channel_options::ChannelOptions;
pub use connection_state::ConnectionState;
pub use cursor::Cursor;
pub use event_batch::EventBatch;
pub use filters::Filters;
pub use live_list_options::LiveListOptions;
pub use page::{Page, PageRequest};
pub use row::{Row, RowSchema};
