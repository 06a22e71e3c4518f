//! The capability contract every mail provider implements, and the
//! provider registry the orchestrator dispatches through.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::accounts::Account;
use crate::error::{Error, Result};
use crate::pop::PopConnector;
use crate::pop::session::SessionOptions;
use crate::sync::context::SyncContext;
use crate::sync::types::Message;

#[async_trait]
pub trait Connector: Send + Sync {
    /// Provider tag this connector serves.
    fn provider(&self) -> &str;

    async fn unread_count(&self, account: &Account, ctx: &mut SyncContext) -> Result<u32>;

    /// Newest first, at most `limit` messages.
    async fn recent_messages(
        &self,
        account: &Account,
        limit: usize,
        ctx: &mut SyncContext,
    ) -> Result<Vec<Message>>;
}

#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in POP connector.
    pub fn with_defaults(options: SessionOptions) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PopConnector::new(options)));
        registry
    }

    /// Add a connector under its own provider tag, replacing any previous one.
    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        self.connectors
            .insert(connector.provider().to_lowercase(), connector);
    }

    pub fn get(&self, provider: &str) -> Result<Arc<dyn Connector>> {
        self.connectors
            .get(&provider.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::UnsupportedProvider(provider.to_string()))
    }

    pub fn providers(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.connectors.keys().cloned().collect();
        tags.sort();
        tags
    }
}
