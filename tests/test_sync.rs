//! Integration tests for the sync orchestrator: single-flight sessions,
//! wholesale persistence, new-message diffing, staleness and per-account
//! failure isolation.

mod common;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};

use common::{Mailbox, ScriptedDialer, fast_options, pop_account};
use mailpulse::accounts::Account;
use mailpulse::connector::{Connector, ConnectorRegistry};
use mailpulse::error::{Error, Result};
use mailpulse::pop::PopConnector;
use mailpulse::secrets::SecretSource;
use mailpulse::store::{MailboxStore, MemoryStore};
use mailpulse::sync::context::{AccessTokenResolver, SyncContext};
use mailpulse::sync::orchestrator::{SyncPolicy, SyncService};
use mailpulse::sync::types::{MailboxState, Message};
use pretty_assertions::assert_eq;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

fn message(id: &str) -> Message {
    Message {
        id: id.to_string(),
        from: "Bob <bob@example.com>".to_string(),
        subject: format!("About {}", id),
        snippet: String::new(),
        body_text: String::new(),
        received_at: now(),
        is_unread: true,
    }
}

fn account(id: &str, provider: &str) -> Account {
    Account {
        provider: provider.to_string(),
        ..pop_account(id)
    }
}

/// Returns fixed data without a snapshot, and ignores `limit`.
struct StaticConnector {
    unread: u32,
    messages: Vec<Message>,
}

#[async_trait]
impl Connector for StaticConnector {
    fn provider(&self) -> &str {
        "static"
    }

    async fn unread_count(&self, _account: &Account, _ctx: &mut SyncContext) -> Result<u32> {
        Ok(self.unread)
    }

    async fn recent_messages(
        &self,
        _account: &Account,
        _limit: usize,
        _ctx: &mut SyncContext,
    ) -> Result<Vec<Message>> {
        Ok(self.messages.clone())
    }
}

struct BrokenConnector;

#[async_trait]
impl Connector for BrokenConnector {
    fn provider(&self) -> &str {
        "broken"
    }

    async fn unread_count(&self, _account: &Account, _ctx: &mut SyncContext) -> Result<u32> {
        Err(Error::provider("broken", "upstream returned 503"))
    }

    async fn recent_messages(
        &self,
        _account: &Account,
        _limit: usize,
        _ctx: &mut SyncContext,
    ) -> Result<Vec<Message>> {
        Err(Error::provider("broken", "upstream returned 503"))
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    dialer: Arc<ScriptedDialer>,
    service: SyncService,
}

fn harness(mailbox: Mailbox, policy: SyncPolicy) -> Harness {
    harness_with(ScriptedDialer::new(mailbox), policy)
}

fn harness_with(dialer: ScriptedDialer, policy: SyncPolicy) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let dialer = Arc::new(dialer);
    let mut registry = ConnectorRegistry::new();
    registry.register(Arc::new(PopConnector::with_dialer(
        dialer.clone(),
        fast_options(),
    )));
    registry.register(Arc::new(StaticConnector {
        unread: 7,
        messages: (1..=15).map(|i| message(&format!("s{}", i))).collect(),
    }));
    registry.register(Arc::new(BrokenConnector));
    let service = SyncService::new(store.clone(), registry, policy);
    Harness {
        store,
        dialer,
        service,
    }
}

// ---------------------------------------------------------------------------
// sync_account
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sync_account_opens_one_session() {
    let h = harness(Mailbox::with_uids(&["a", "b", "c"]), SyncPolicy::default());
    let result = h
        .service
        .sync_account("alice", &pop_account("home"), now())
        .await
        .unwrap();

    assert_eq!(h.dialer.dials(), 1);
    assert_eq!(
        h.dialer
            .commands()
            .iter()
            .filter(|c| c.as_str() == "STAT")
            .count(),
        1
    );
    assert_eq!(result.unread_count, 3);
    assert_eq!(result.messages.len(), 3);
    assert_eq!(result.new_messages.len(), 3);
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_sync_account_persists_wholesale() {
    let h = harness(Mailbox::with_uids(&["a", "b"]), SyncPolicy::default());
    h.service
        .sync_account("alice", &pop_account("home"), now())
        .await
        .unwrap();

    let state = h.store.mailbox_state("alice", "home").await.unwrap().unwrap();
    assert_eq!(state.unread_count, 2);
    assert_eq!(state.seen_uids, vec!["a", "b"]);
    assert_eq!(state.last_sync_at, Some(now()));
    assert_eq!(state.provider, "pop");
    assert_eq!(
        state.messages.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
        vec!["b", "a"]
    );
}

#[tokio::test]
async fn test_second_sync_sees_nothing_new() {
    let h = harness(Mailbox::with_uids(&["a", "b"]), SyncPolicy::default());
    let account = pop_account("home");
    h.service.sync_account("alice", &account, now()).await.unwrap();

    let later = now() + Duration::minutes(10);
    let result = h.service.sync_account("alice", &account, later).await.unwrap();

    assert_eq!(h.dialer.dials(), 2);
    assert_eq!(result.unread_count, 0);
    assert!(result.new_messages.is_empty());
    assert!(result.messages.iter().all(|m| !m.is_unread));
}

#[tokio::test]
async fn test_new_messages_are_those_not_previously_cached() {
    let h = harness(Mailbox::with_uids(&["a", "b", "c"]), SyncPolicy::default());
    let previous = MailboxState {
        messages: vec![message("a"), message("b")],
        seen_uids: vec!["a".to_string(), "b".to_string()],
        last_sync_at: Some(now() - Duration::hours(1)),
        unread_count: 0,
        provider: "pop".to_string(),
    };
    h.store.put_mailbox_state("alice", "home", &previous).await.unwrap();

    let result = h
        .service
        .sync_account("alice", &pop_account("home"), now())
        .await
        .unwrap();
    assert_eq!(result.unread_count, 1);
    assert_eq!(
        result.new_messages.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
        vec!["c"]
    );
}

#[tokio::test]
async fn test_failed_sync_leaves_state_untouched() {
    let h = harness_with(ScriptedDialer::refusing(), SyncPolicy::default());
    let previous = MailboxState {
        unread_count: 4,
        messages: vec![message("kept")],
        seen_uids: vec!["kept".to_string()],
        last_sync_at: Some(now() - Duration::hours(2)),
        provider: "pop".to_string(),
    };
    h.store.put_mailbox_state("alice", "home", &previous).await.unwrap();

    let err = h
        .service
        .sync_account("alice", &pop_account("home"), now())
        .await
        .unwrap_err();
    assert!(err.is_transport());
    let state = h.store.mailbox_state("alice", "home").await.unwrap();
    assert_eq!(state, Some(previous));
}

#[tokio::test]
async fn test_messages_truncated_to_cache_bound() {
    let policy = SyncPolicy {
        max_cached_messages: 4,
        ..SyncPolicy::default()
    };
    let h = harness(Mailbox::with_uids(&[]), policy);
    let result = h
        .service
        .sync_account("alice", &account("feed", "static"), now())
        .await
        .unwrap();
    assert_eq!(result.messages.len(), 4);
    assert_eq!(result.unread_count, 7);
    let state = h.store.mailbox_state("alice", "feed").await.unwrap().unwrap();
    assert_eq!(state.messages.len(), 4);
}

#[tokio::test]
async fn test_seen_uids_carried_over_without_snapshot() {
    let h = harness(Mailbox::with_uids(&[]), SyncPolicy::default());
    let previous = MailboxState {
        seen_uids: (0..600).map(|i| format!("u{}", i)).collect(),
        last_sync_at: Some(now() - Duration::hours(1)),
        ..Default::default()
    };
    h.store.put_mailbox_state("alice", "feed", &previous).await.unwrap();

    h.service
        .sync_account("alice", &account("feed", "static"), now())
        .await
        .unwrap();
    let state = h.store.mailbox_state("alice", "feed").await.unwrap().unwrap();
    assert_eq!(state.seen_uids.len(), 500);
    assert_eq!(state.seen_uids[0], "u100");
    assert_eq!(state.provider, "static");
}

// ---------------------------------------------------------------------------
// Staleness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sync_if_stale_serves_fresh_state() {
    let h = harness(Mailbox::with_uids(&["a"]), SyncPolicy::default());
    let account = pop_account("home");
    h.service.sync_account("alice", &account, now()).await.unwrap();

    let result = h
        .service
        .sync_if_stale("alice", &account, now() + Duration::minutes(4))
        .await
        .unwrap();
    assert_eq!(h.dialer.dials(), 1);
    assert_eq!(result.unread_count, 1);
    assert_eq!(result.messages.len(), 1);
    assert!(result.new_messages.is_empty());
}

#[tokio::test]
async fn test_sync_if_stale_syncs_at_threshold() {
    let h = harness(Mailbox::with_uids(&["a"]), SyncPolicy::default());
    let account = pop_account("home");
    h.service.sync_account("alice", &account, now()).await.unwrap();

    h.service
        .sync_if_stale("alice", &account, now() + Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(h.dialer.dials(), 2);
}

#[tokio::test]
async fn test_sync_if_stale_without_state_syncs() {
    let h = harness(Mailbox::with_uids(&["a"]), SyncPolicy::default());
    let account = pop_account("home");
    assert!(h.service.cached_state("alice", &account).await.unwrap().is_none());

    h.service.sync_if_stale("alice", &account, now()).await.unwrap();
    assert_eq!(h.dialer.dials(), 1);
    assert!(h.service.cached_state("alice", &account).await.unwrap().is_some());
}

// ---------------------------------------------------------------------------
// sync_user
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sync_user_isolates_failures() {
    let h = harness(Mailbox::with_uids(&["a", "b"]), SyncPolicy::default());
    let accounts = vec![
        pop_account("home"),
        account("flaky", "broken"),
        account("feed", "static"),
    ];

    let results = h.service.sync_user("alice", &accounts, now()).await;

    assert_eq!(results.len(), 3);
    assert_eq!(
        results.iter().map(|r| r.account_id.as_str()).collect::<Vec<_>>(),
        vec!["home", "flaky", "feed"]
    );

    assert!(results[0].is_ok());
    assert_eq!(results[0].unread_count, 2);
    assert_eq!(results[0].messages.len(), 2);

    assert_eq!(
        results[1].error.as_deref(),
        Some("broken error: upstream returned 503")
    );
    assert_eq!(results[1].unread_count, 0);
    assert!(results[1].messages.is_empty());
    assert!(results[1].new_messages.is_empty());

    assert!(results[2].is_ok());
    assert!(h.store.mailbox_state("alice", "flaky").await.unwrap().is_none());
    assert!(h.store.mailbox_state("alice", "feed").await.unwrap().is_some());
}

#[tokio::test]
async fn test_sync_user_reports_unsupported_provider() {
    let h = harness(Mailbox::with_uids(&[]), SyncPolicy::default());
    let results = h
        .service
        .sync_user("alice", &[account("fax", "fax")], now())
        .await;
    assert_eq!(
        results[0].error.as_deref(),
        Some("Unsupported email provider: fax")
    );
}

#[tokio::test]
async fn test_sync_user_if_stale_mixes_cached_and_fresh() {
    let h = harness(Mailbox::with_uids(&["a"]), SyncPolicy::default());
    let home = pop_account("home");
    h.service.sync_account("alice", &home, now()).await.unwrap();

    let results = h
        .service
        .sync_user_if_stale("alice", &[home, account("flaky", "broken")], now())
        .await;
    assert_eq!(h.dialer.dials(), 1);
    assert!(results[0].is_ok());
    assert!(results[1].error.is_some());
}

#[tokio::test]
async fn test_failed_password_lookup_fails_only_that_account() {
    let h = harness(Mailbox::with_uids(&["a"]), SyncPolicy::default());
    let mut locked = pop_account("locked");
    locked.credentials.password.clear();
    locked.password_sources = vec![SecretSource::Command(
        "echo keychain locked >&2; exit 1".to_string(),
    )];

    let results = h
        .service
        .sync_user("alice", &[locked, pop_account("home")], now())
        .await;

    let error = results[0].error.as_deref().unwrap_or_default();
    assert!(error.contains("password_cmd failed: keychain locked"), "{error}");
    assert!(results[1].is_ok());
    assert_eq!(h.dialer.dials(), 1);
    assert!(h.store.mailbox_state("alice", "locked").await.unwrap().is_none());
    assert!(h.store.mailbox_state("alice", "home").await.unwrap().is_some());
}

#[tokio::test]
async fn test_password_is_unlocked_before_dialing() {
    let h = harness(Mailbox::with_uids(&["a"]), SyncPolicy::default());
    let mut account = pop_account("home");
    account.credentials.password.clear();
    account.password_sources = vec![
        SecretSource::Inline(String::new()),
        SecretSource::Command(format!("echo {}", common::PASSWORD)),
    ];

    let result = h.service.sync_account("alice", &account, now()).await.unwrap();
    assert_eq!(result.unread_count, 1);
    assert!(h.dialer.commands().contains(&format!("PASS {}", common::PASSWORD)));
}

// ---------------------------------------------------------------------------
// Access tokens
// ---------------------------------------------------------------------------

/// Reads the pass's access token and reports it back as a message subject.
#[derive(Default)]
struct TokenConnector {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl Connector for TokenConnector {
    fn provider(&self) -> &str {
        "token"
    }

    async fn unread_count(&self, account: &Account, ctx: &mut SyncContext) -> Result<u32> {
        let token = ctx.access_token(account).await?;
        self.seen.lock().unwrap().push(token);
        Ok(1)
    }

    async fn recent_messages(
        &self,
        account: &Account,
        _limit: usize,
        ctx: &mut SyncContext,
    ) -> Result<Vec<Message>> {
        let token = ctx.access_token(account).await?;
        Ok(vec![Message {
            subject: token,
            ..message("t1")
        }])
    }
}

struct RefreshingResolver;

#[async_trait]
impl AccessTokenResolver for RefreshingResolver {
    async fn access_token(&self, user_id: &str, account: &Account) -> Result<String> {
        Ok(format!("fresh-{}-{}", user_id, account.id))
    }
}

fn token_service(connector: Arc<TokenConnector>) -> SyncService {
    let mut registry = ConnectorRegistry::new();
    registry.register(connector);
    SyncService::new(Arc::new(MemoryStore::new()), registry, SyncPolicy::default())
}

#[tokio::test]
async fn test_token_resolver_reaches_connector() {
    let connector = Arc::new(TokenConnector::default());
    let service =
        token_service(Arc::clone(&connector)).with_token_resolver(Arc::new(RefreshingResolver));
    let mut work = account("work", "token");
    work.access_token = Some("stale-static".to_string());

    let result = service.sync_account("alice", &work, now()).await.unwrap();

    assert_eq!(*connector.seen.lock().unwrap(), vec!["fresh-alice-work"]);
    assert_eq!(result.messages[0].subject, "fresh-alice-work");
}

#[tokio::test]
async fn test_static_token_without_resolver() {
    let connector = Arc::new(TokenConnector::default());
    let service = token_service(Arc::clone(&connector));
    let mut work = account("work", "token");
    work.access_token = Some("static".to_string());
    service.sync_account("alice", &work, now()).await.unwrap();
    assert_eq!(*connector.seen.lock().unwrap(), vec!["static"]);

    work.access_token = None;
    let results = service.sync_user("alice", &[work], now()).await;
    assert_eq!(
        results[0].error.as_deref(),
        Some("Missing access token for account work")
    );
}
