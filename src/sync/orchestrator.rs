//! Decides when to hit the network, runs connectors, and persists the
//! resulting mailbox state.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::accounts::Account;
use crate::connector::ConnectorRegistry;
use crate::error::Result;
use crate::secrets::SecretCache;
use crate::store::MailboxStore;
use crate::sync::context::{AccessTokenResolver, SyncContext};
use crate::sync::types::{AccountSyncResult, MailboxState, Message};

/// True when there is no state, no recorded sync, or the last sync is at
/// least `stale_minutes` old. A threshold too large for a [`Duration`] never
/// expires.
pub fn is_stale(state: Option<&MailboxState>, now: DateTime<Utc>, stale_minutes: i64) -> bool {
    match state.and_then(|s| s.last_sync_at) {
        None => true,
        Some(last) => match Duration::try_minutes(stale_minutes) {
            Some(threshold) => now.signed_duration_since(last) >= threshold,
            None => false,
        },
    }
}

/// Messages whose id is not among `previous`.
pub fn new_messages(previous: Option<&MailboxState>, current: &[Message]) -> Vec<Message> {
    let known: HashSet<&str> = previous
        .map(|s| s.messages.iter().map(|m| m.id.as_str()).collect())
        .unwrap_or_default();
    current
        .iter()
        .filter(|m| !known.contains(m.id.as_str()))
        .cloned()
        .collect()
}

/// Keep the newest `window` entries of `uids`.
fn retain_window(mut uids: Vec<String>, window: usize) -> Vec<String> {
    let excess = uids.len().saturating_sub(window);
    uids.drain(..excess);
    uids
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    pub stale_minutes: i64,
    pub max_cached_messages: usize,
    pub seen_uid_window: usize,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            stale_minutes: 5,
            max_cached_messages: 10,
            seen_uid_window: 500,
        }
    }
}

pub struct SyncService {
    store: Arc<dyn MailboxStore>,
    connectors: ConnectorRegistry,
    token_resolver: Option<Arc<dyn AccessTokenResolver>>,
    secrets: Arc<SecretCache>,
    policy: SyncPolicy,
}

impl SyncService {
    pub fn new(
        store: Arc<dyn MailboxStore>,
        connectors: ConnectorRegistry,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            store,
            connectors,
            token_resolver: None,
            secrets: Arc::new(SecretCache::default()),
            policy,
        }
    }

    pub fn with_token_resolver(mut self, resolver: Arc<dyn AccessTokenResolver>) -> Self {
        self.token_resolver = Some(resolver);
        self
    }

    /// Cache used to unlock account passwords.
    pub fn with_secret_cache(mut self, secrets: Arc<SecretCache>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// Last stored state, without any network I/O.
    pub async fn cached_state(
        &self,
        user_id: &str,
        account: &Account,
    ) -> Result<Option<MailboxState>> {
        self.store.mailbox_state(user_id, &account.id).await
    }

    /// Serve the stored state while it is fresh, sync otherwise.
    pub async fn sync_if_stale(
        &self,
        user_id: &str,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<AccountSyncResult> {
        let state = self.store.mailbox_state(user_id, &account.id).await?;
        match state {
            Some(state) if !is_stale(Some(&state), now, self.policy.stale_minutes) => {
                debug!("{}/{} is fresh, serving cached state", user_id, account.id);
                Ok(AccountSyncResult {
                    account_id: account.id.clone(),
                    label: account.label.clone(),
                    provider: account.provider.clone(),
                    unread_count: state.unread_count,
                    messages: state.messages,
                    new_messages: Vec::new(),
                    error: None,
                })
            }
            _ => self.sync_account(user_id, account, now).await,
        }
    }

    /// One sync pass: both connector calls share one context, then the new
    /// state replaces the stored one.
    ///
    /// The account's password is unlocked first, so a failing secret lookup
    /// fails this account only. On error nothing is written.
    pub async fn sync_account(
        &self,
        user_id: &str,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<AccountSyncResult> {
        let connector = self.connectors.get(&account.provider)?;
        let unlocked = account.unlock(&self.secrets).await?;
        let account = &unlocked;
        let previous = self.store.mailbox_state(user_id, &account.id).await?;
        let mut ctx = SyncContext::new(user_id, previous, self.token_resolver.clone());

        let unread_count = connector.unread_count(account, &mut ctx).await?;
        let mut messages = connector
            .recent_messages(account, self.policy.max_cached_messages, &mut ctx)
            .await?;
        messages.truncate(self.policy.max_cached_messages);

        let new = new_messages(ctx.previous_state.as_ref(), &messages);
        let seen_uids = match &ctx.snapshot {
            Some(snapshot) => snapshot.seen_uids.clone(),
            None => ctx
                .previous_state
                .as_ref()
                .map(|s| s.seen_uids.clone())
                .unwrap_or_default(),
        };

        let state = MailboxState {
            unread_count,
            messages: messages.clone(),
            seen_uids: retain_window(seen_uids, self.policy.seen_uid_window),
            last_sync_at: Some(now),
            provider: account.provider.clone(),
        };
        self.store
            .put_mailbox_state(user_id, &account.id, &state)
            .await?;

        info!(
            "Synced {}/{}: {} unread, {} cached, {} new",
            user_id,
            account.label,
            unread_count,
            messages.len(),
            new.len()
        );

        Ok(AccountSyncResult {
            account_id: account.id.clone(),
            label: account.label.clone(),
            provider: account.provider.clone(),
            unread_count,
            messages,
            new_messages: new,
            error: None,
        })
    }

    /// Sync every account in order. A failing account yields a result with
    /// its error and never stops the accounts after it.
    pub async fn sync_user(
        &self,
        user_id: &str,
        accounts: &[Account],
        now: DateTime<Utc>,
    ) -> Vec<AccountSyncResult> {
        let mut results = Vec::with_capacity(accounts.len());
        for account in accounts {
            let outcome = self.sync_account(user_id, account, now).await;
            results.push(isolate(user_id, account, outcome));
        }
        results
    }

    /// Like [`SyncService::sync_user`], but fresh accounts are served from
    /// the store.
    pub async fn sync_user_if_stale(
        &self,
        user_id: &str,
        accounts: &[Account],
        now: DateTime<Utc>,
    ) -> Vec<AccountSyncResult> {
        let mut results = Vec::with_capacity(accounts.len());
        for account in accounts {
            let outcome = self.sync_if_stale(user_id, account, now).await;
            results.push(isolate(user_id, account, outcome));
        }
        results
    }
}

/// Turn a failed pass into an empty result carrying the error.
fn isolate(
    user_id: &str,
    account: &Account,
    outcome: Result<AccountSyncResult>,
) -> AccountSyncResult {
    outcome.unwrap_or_else(|e| {
        warn!("Sync failed for {}/{}: {}", user_id, account.label, e);
        AccountSyncResult {
            account_id: account.id.clone(),
            label: account.label.clone(),
            provider: account.provider.clone(),
            unread_count: 0,
            messages: Vec::new(),
            new_messages: Vec::new(),
            error: Some(e.to_string()),
        }
    })
}
