//! Per-pass state shared by the two connector calls of one sync.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::accounts::Account;
use crate::error::{Error, Result};
use crate::sync::types::{MailboxSnapshot, MailboxState};

/// Supplies bearer tokens for token-based providers (refreshing them if it
/// has to).
#[async_trait]
pub trait AccessTokenResolver: Send + Sync {
    async fn access_token(&self, user_id: &str, account: &Account) -> Result<String>;
}

/// Lives for exactly one `sync_account` call.
pub struct SyncContext {
    pub user_id: String,
    pub previous_state: Option<MailboxState>,
    /// Filled by the first connector call that opens a session, reused by
    /// the second.
    pub snapshot: Option<Arc<MailboxSnapshot>>,
    token_resolver: Option<Arc<dyn AccessTokenResolver>>,
}

impl SyncContext {
    pub fn new(
        user_id: impl Into<String>,
        previous_state: Option<MailboxState>,
        token_resolver: Option<Arc<dyn AccessTokenResolver>>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            previous_state,
            snapshot: None,
            token_resolver,
        }
    }

    /// UIDs recorded by the previous sync.
    pub fn previous_seen(&self) -> HashSet<String> {
        self.previous_state
            .as_ref()
            .map(|s| s.seen_uids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Resolver first, then the account's static token.
    pub async fn access_token(&self, account: &Account) -> Result<String> {
        if let Some(resolver) = &self.token_resolver {
            return resolver.access_token(&self.user_id, account).await;
        }
        account
            .access_token
            .clone()
            .ok_or_else(|| Error::MissingAccessToken(account.label.clone()))
    }
}
