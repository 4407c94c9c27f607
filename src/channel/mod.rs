//! Live change channels: one tenant-filtered subscription per table,
//! shared by reference-counted handles.

pub mod backoff;
pub(crate) mod dedup;
pub mod manager;
pub mod subscription;
mod task;
pub mod transport;

pub use backoff::{BackoffStrategy, ReconnectPolicy};
pub use manager::ChannelManager;
pub use subscription::{Delivery, SubscriptionHandle, SubscriptionInfo, SubscriptionKey};
pub use transport::{LiveTransport, TransportChannel, TransportSignal};
