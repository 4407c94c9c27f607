//! Window reconciliation of pages and live events.

pub mod reconciler;
pub mod window;

pub use reconciler::LiveListReconciler;
pub use window::Window;
