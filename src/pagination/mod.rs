//! Keyset pagination against the remote row store.

pub mod paginator;
pub mod store;

pub use paginator::{KeysetPaginator, PageFetcher};
pub use store::{MemoryRowStore, RowStore};
