//! POP3 engine: framer, command pipeline, session state machine, and the
//! connector that exposes it through the provider contract.

pub mod framer;
pub mod parse;
pub mod pipeline;
pub mod session;
pub mod transport;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::accounts::{Account, POP_PROVIDER};
use crate::connector::Connector;
use crate::error::Result;
use crate::sync::context::SyncContext;
use crate::sync::types::{MailboxSnapshot, Message};

use self::session::{SessionOptions, fetch_snapshot};
use self::transport::{Dialer, TcpDialer};

/// Serves both contract calls from one POP session per sync pass.
pub struct PopConnector {
    dialer: Arc<dyn Dialer>,
    options: SessionOptions,
}

impl PopConnector {
    pub fn new(options: SessionOptions) -> Self {
        Self::with_dialer(Arc::new(TcpDialer), options)
    }

    pub fn with_dialer(dialer: Arc<dyn Dialer>, options: SessionOptions) -> Self {
        Self { dialer, options }
    }

    /// The pass's snapshot, opening a session only if no earlier call did.
    async fn snapshot(
        &self,
        account: &Account,
        ctx: &mut SyncContext,
    ) -> Result<Arc<MailboxSnapshot>> {
        if let Some(snapshot) = &ctx.snapshot {
            return Ok(Arc::clone(snapshot));
        }

        let mut options = self.options.clone();
        if let Some(ms) = account.credentials.timeout_ms {
            options.idle_timeout = Duration::from_millis(ms);
        }
        let previous_seen = ctx.previous_seen();
        let snapshot = Arc::new(
            fetch_snapshot(
                self.dialer.as_ref(),
                &account.credentials,
                &options,
                &previous_seen,
            )
            .await?,
        );
        ctx.snapshot = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }
}

#[async_trait]
impl Connector for PopConnector {
    fn provider(&self) -> &str {
        POP_PROVIDER
    }

    async fn unread_count(&self, account: &Account, ctx: &mut SyncContext) -> Result<u32> {
        Ok(self.snapshot(account, ctx).await?.unread_count)
    }

    async fn recent_messages(
        &self,
        account: &Account,
        limit: usize,
        ctx: &mut SyncContext,
    ) -> Result<Vec<Message>> {
        let snapshot = self.snapshot(account, ctx).await?;
        Ok(snapshot.messages.iter().take(limit).cloned().collect())
    }
}
