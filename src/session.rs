//! Explicit per-tenant session.
//!
//! Binds a [`ChannelManager`] and a row store to one tenant. Switching
//! tenants destroys the session's live state and builds a fresh manager;
//! nothing is mutated in place across the boundary.

use std::sync::Arc;

use crate::channel::{ChannelManager, LiveTransport};
use crate::error::{LiveListError, Result};
use crate::live_list::LiveList;
use crate::models::{ChannelOptions, LiveListOptions};
use crate::pagination::RowStore;

pub struct TenantSession {
    tenant_id: String,
    channels: Arc<ChannelManager>,
    store: Arc<dyn RowStore>,
}

impl TenantSession {
    /// Start a session for `tenant_id` on a new channel manager.
    pub fn start(
        tenant_id: impl Into<String>,
        transport: Arc<dyn LiveTransport>,
        store: Arc<dyn RowStore>,
        options: ChannelOptions,
    ) -> Result<Self> {
        let channels = ChannelManager::new(transport, options)?;
        Self::with_channels(tenant_id, channels, store)
    }

    /// Start a session on a preconfigured manager (handlers, clock).
    pub fn with_channels(
        tenant_id: impl Into<String>,
        channels: ChannelManager,
        store: Arc<dyn RowStore>,
    ) -> Result<Self> {
        let tenant_id = tenant_id.into();
        if tenant_id.trim().is_empty() {
            return Err(LiveListError::NoActiveTenant);
        }
        channels.set_tenant(Some(&tenant_id));
        log::info!("[livelist] Session started for tenant {}", tenant_id);
        Ok(Self {
            tenant_id,
            channels: Arc::new(channels),
            store,
        })
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn channels(&self) -> &Arc<ChannelManager> {
        &self.channels
    }

    pub fn store(&self) -> Arc<dyn RowStore> {
        self.store.clone()
    }

    /// Open a live list for `options.table`.
    pub fn live_list(&self, options: LiveListOptions) -> Result<LiveList> {
        if self.channels.tenant_id().as_deref() != Some(self.tenant_id.as_str()) {
            return Err(LiveListError::TornDown(format!(
                "session for tenant {} has ended",
                self.tenant_id
            )));
        }
        LiveList::new(self.channels.clone(), self.store.clone(), options)
    }

    /// Tear down every subscription and live list of this tenant.
    /// Synchronous: no batch of this tenant is delivered after it returns
    /// and the session's lists refuse further commands.
    pub fn end(&self) {
        self.channels.teardown();
    }

    pub fn is_ended(&self) -> bool {
        self.channels.tenant_id().is_none()
    }

    /// End this session and start one for `tenant_id` on a fresh manager
    /// with the same transport, store and configuration.
    pub fn switch_tenant(self, tenant_id: impl Into<String>) -> Result<TenantSession> {
        let tenant_id = tenant_id.into();
        log::info!(
            "[livelist] Switching tenant {} -> {}",
            self.tenant_id,
            tenant_id
        );
        self.end();
        let channels = self.channels.fresh();
        Self::with_channels(tenant_id, channels, self.store.clone())
    }
}

impl Drop for TenantSession {
    fn drop(&mut self) {
        self.end();
    }
}
