//! Wiring: config, store, accounts and the sync service for the CLI.

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::accounts::{Account, AccountSource, ConfigAccounts};
use crate::config::{self, Config};
use crate::connector::ConnectorRegistry;
use crate::poller::{LogNotifier, PollTarget, Poller};
use crate::resolve;
use crate::secrets::SecretCache;
use crate::store::{JsonStore, MailboxStore};
use crate::sync::orchestrator::{SyncPolicy, SyncService};

pub struct App {
    pub config: Config,
    pub store: Arc<dyn MailboxStore>,
    pub accounts: Arc<dyn AccountSource>,
    pub service: Arc<SyncService>,
}

impl App {
    pub fn new(
        config: Config,
        store: Arc<dyn MailboxStore>,
        connectors: ConnectorRegistry,
    ) -> Self {
        let secrets = Arc::new(SecretCache::new(config.secret_cache_ttl()));
        let accounts: Arc<dyn AccountSource> = Arc::new(ConfigAccounts::new(config.users.clone()));
        let service = Arc::new(
            SyncService::new(Arc::clone(&store), connectors, policy(&config))
                .with_secret_cache(secrets),
        );
        Self {
            config,
            store,
            accounts,
            service,
        }
    }

    /// Load the config file, apply `MAILPULSE_*` overrides, and open the
    /// JSON store.
    ///
    /// With an explicit config path the state file sits next to it.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = config::load_config(config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());

        let state_path = state_path(config_path);
        tracing::debug!("State file: {}", state_path.display());
        let store: Arc<dyn MailboxStore> = Arc::new(JsonStore::new(state_path));
        let connectors = ConnectorRegistry::with_defaults(config.session_options());
        Ok(Self::new(config, store, connectors))
    }

    /// Active accounts of a configured user.
    pub async fn user_accounts(&self, user_id: &str) -> Result<Vec<Account>> {
        if !self.config.users.contains_key(user_id) {
            bail!(
                "Unknown user: {}\nAvailable: {}",
                user_id,
                self.config.users.keys().cloned().collect::<Vec<_>>().join(", ")
            );
        }
        Ok(self.accounts.list_accounts(user_id).await?)
    }

    pub fn poller(&self) -> Poller {
        let targets = self
            .config
            .users
            .keys()
            .map(|user_id| PollTarget {
                user_id: user_id.clone(),
                polling_minutes: self.config.polling_minutes(user_id),
            })
            .collect();
        let notifier = LogNotifier {
            enabled: self.config.notifications.enabled,
            desktop: self.config.notifications.desktop,
        };
        Poller::new(
            Arc::clone(&self.service),
            Arc::clone(&self.accounts),
            Arc::clone(&self.store),
            Arc::new(notifier),
            targets,
        )
    }
}

fn policy(config: &Config) -> SyncPolicy {
    SyncPolicy {
        stale_minutes: config.sync.stale_minutes,
        max_cached_messages: config.sync.max_cached_messages,
        seen_uid_window: config.sync.seen_uid_window,
    }
}

fn state_path(config_path: Option<&Path>) -> PathBuf {
    config_path
        .and_then(Path::parent)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join("mailbox-state.json"))
        .unwrap_or_else(resolve::state_file)
}
