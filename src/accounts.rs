//! Accounts: parse account tables with provider presets, unlock their
//! secrets at sync time, and pick one by label.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

use crate::config::UserConfig;
use crate::error::{Error, Result};
use crate::pop::transport::Endpoint;
use crate::secrets::{SecretCache, SecretSource, resolve_secret};

pub const POP_PROVIDER: &str = "pop";

/// Provider presets for well-known POP services.
pub fn provider_presets() -> HashMap<&'static str, ProviderPreset> {
    let mut m = HashMap::new();
    m.insert(
        "gmail-pop",
        ProviderPreset {
            host: "pop.gmail.com",
            port: 995,
            secure: true,
        },
    );
    m.insert(
        "outlook-pop",
        ProviderPreset {
            host: "outlook.office365.com",
            port: 995,
            secure: true,
        },
    );
    m
}

pub struct ProviderPreset {
    pub host: &'static str,
    pub port: u16,
    pub secure: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Active,
    Disconnected,
}

/// One `[users.<user>.accounts.<id>]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_secure")]
    pub secure: bool,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_env: String,
    #[serde(default)]
    pub password_cmd: String,
    /// Static bearer token for token-based providers.
    #[serde(default)]
    pub access_token: String,
    /// Per-account idle timeout override.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub status: AccountStatus,
}

fn default_provider() -> String {
    POP_PROVIDER.to_string()
}
fn default_secure() -> bool {
    true
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            label: String::new(),
            provider: POP_PROVIDER.to_string(),
            host: String::new(),
            port: None,
            secure: true,
            accept_invalid_certs: false,
            username: String::new(),
            password: String::new(),
            password_env: String::new(),
            password_cmd: String::new(),
            access_token: String::new(),
            timeout_ms: None,
            status: AccountStatus::Active,
        }
    }
}

impl AccountConfig {
    /// Password sources in lookup order.
    pub fn secret_sources(&self) -> Vec<SecretSource> {
        vec![
            SecretSource::Inline(self.password.clone()),
            SecretSource::Env(self.password_env.clone()),
            SecretSource::Command(self.password_cmd.clone()),
        ]
    }
}

/// Lowercase the provider tag and fill host/port from a preset. Account
/// values win over the preset.
pub fn apply_preset(account: &mut AccountConfig) {
    account.provider = account.provider.trim().to_lowercase();
    let presets = provider_presets();
    let Some(preset) = presets.get(account.provider.as_str()) else {
        return;
    };
    if account.host.is_empty() {
        account.host = preset.host.to_string();
    }
    if account.port.is_none() {
        account.port = Some(preset.port);
    }
    if preset.secure {
        account.secure = true;
    }
    account.provider = POP_PROVIDER.to_string();
}

/// Decrypted connection settings handed to a connector.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub accept_invalid_certs: bool,
    pub username: String,
    pub password: String,
    pub timeout_ms: Option<u64>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

impl Credentials {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            secure: self.secure,
            accept_invalid_certs: self.accept_invalid_certs,
        }
    }

    /// Host, username and password are all required.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() || self.username.is_empty() || self.password.is_empty() {
            return Err(Error::MissingSettings(
                "host, username and password are required",
            ));
        }
        Ok(())
    }
}

pub fn default_port(secure: bool) -> u16 {
    if secure { 995 } else { 110 }
}

/// A ready-to-sync account.
///
/// The password of a config-backed POP account is not looked up when the
/// account is listed. `password_sources` holds the chain, and
/// [`Account::unlock`] resolves it at sync time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub label: String,
    pub provider: String,
    pub status: AccountStatus,
    pub credentials: Credentials,
    pub access_token: Option<String>,
    pub password_sources: Vec<SecretSource>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// A copy with `credentials.password` filled from `password_sources`.
    ///
    /// Accounts without sources are returned as they are.
    pub async fn unlock(&self, cache: &SecretCache) -> Result<Account> {
        let mut account = self.clone();
        if !self.password_sources.is_empty() {
            account.credentials.password = resolve_secret(&self.password_sources, cache).await?;
        }
        Ok(account)
    }
}

/// Turn a config table into an [`Account`].
///
/// Only POP accounts carry password sources; other providers go through the
/// token path.
pub fn account_from_config(id: &str, config: &AccountConfig) -> Account {
    let mut config = config.clone();
    apply_preset(&mut config);

    let password_sources = if config.provider == POP_PROVIDER {
        config.secret_sources()
    } else {
        Vec::new()
    };

    let label = if config.label.trim().is_empty() {
        id.to_string()
    } else {
        config.label.trim().to_string()
    };

    Account {
        id: id.to_string(),
        label,
        provider: config.provider.clone(),
        status: config.status,
        credentials: Credentials {
            host: config.host.clone(),
            port: config.port.unwrap_or_else(|| default_port(config.secure)),
            secure: config.secure,
            accept_invalid_certs: config.accept_invalid_certs,
            username: config.username.clone(),
            password: String::new(),
            timeout_ms: config.timeout_ms,
        },
        access_token: Some(config.access_token.clone()).filter(|t| !t.is_empty()),
        password_sources,
    }
}

fn normalize_label(input: &str) -> String {
    input.trim().to_lowercase()
}

/// Pick an account by label: exact (case-insensitive) match first, then the
/// first label containing the request.
pub fn resolve_account<'a>(accounts: &'a [Account], requested: &str) -> Option<&'a Account> {
    let requested = normalize_label(requested);
    if requested.is_empty() {
        return None;
    }
    accounts
        .iter()
        .find(|a| normalize_label(&a.label) == requested)
        .or_else(|| {
            accounts
                .iter()
                .find(|a| normalize_label(&a.label).contains(&requested))
        })
}

/// Where the accounts of a user come from.
#[async_trait]
pub trait AccountSource: Send + Sync {
    /// Active accounts of `user_id`. Disconnected accounts are left out.
    async fn list_accounts(&self, user_id: &str) -> Result<Vec<Account>>;
}

/// Accounts declared in the configuration file.
pub struct ConfigAccounts {
    users: BTreeMap<String, UserConfig>,
}

impl ConfigAccounts {
    pub fn new(users: BTreeMap<String, UserConfig>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl AccountSource for ConfigAccounts {
    async fn list_accounts(&self, user_id: &str) -> Result<Vec<Account>> {
        let Some(user) = self.users.get(user_id) else {
            return Ok(Vec::new());
        };
        let mut accounts = Vec::new();
        for (id, config) in &user.accounts {
            if config.status == AccountStatus::Disconnected {
                debug!("Skipping disconnected account {}/{}", user_id, id);
                continue;
            }
            accounts.push(account_from_config(id, config));
        }
        Ok(accounts)
    }
}
