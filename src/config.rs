//! Configuration: parse .mailpulse.toml (sync policy, POP defaults, users
//! and their accounts) and apply environment overrides.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::accounts::AccountConfig;
use crate::pop::session::SessionOptions;
use crate::resolve;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub pop: PopConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub users: BTreeMap<String, UserConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_stale_minutes")]
    pub stale_minutes: i64,
    #[serde(default = "default_max_cached_messages")]
    pub max_cached_messages: usize,
    #[serde(default = "default_polling_minutes")]
    pub default_polling_minutes: i64,
    #[serde(default = "default_top_lines")]
    pub top_lines: u32,
    #[serde(default = "default_seen_uid_window")]
    pub seen_uid_window: usize,
    #[serde(default = "default_secret_cache_seconds")]
    pub secret_cache_seconds: u64,
}

fn default_stale_minutes() -> i64 {
    5
}
fn default_max_cached_messages() -> usize {
    10
}
fn default_polling_minutes() -> i64 {
    15
}
fn default_top_lines() -> u32 {
    40
}
fn default_seen_uid_window() -> usize {
    500
}
fn default_secret_cache_seconds() -> u64 {
    300
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            stale_minutes: default_stale_minutes(),
            max_cached_messages: default_max_cached_messages(),
            default_polling_minutes: default_polling_minutes(),
            top_lines: default_top_lines(),
            seen_uid_window: default_seen_uid_window(),
            secret_cache_seconds: default_secret_cache_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for PopConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Also raise a desktop notification.
    #[serde(default)]
    pub desktop: bool,
}

fn default_true() -> bool {
    true
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            desktop: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub polling_minutes: Option<i64>,
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
}

/// Snap a requested polling interval to 15, 30 or 60 minutes.
pub fn normalize_polling_minutes(minutes: i64) -> i64 {
    match minutes {
        m if m <= 15 => 15,
        30 | 60 => minutes,
        m if m <= 45 => 30,
        _ => 60,
    }
}

impl Config {
    /// Override values from `MAILPULSE_*` variables. `lookup` is usually
    /// `|k| std::env::var(k).ok()`. Unparseable numbers are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let int = |key: &str| lookup(key).and_then(|v| v.trim().parse::<i64>().ok());

        if let Some(v) = int("MAILPULSE_STALE_SYNC_MINUTES") {
            self.sync.stale_minutes = v;
        }
        if let Some(v) = int("MAILPULSE_MAX_CACHED_MESSAGES") {
            if let Ok(v) = usize::try_from(v) {
                self.sync.max_cached_messages = v;
            }
        }
        if let Some(v) = int("MAILPULSE_DEFAULT_POLLING_MINUTES") {
            self.sync.default_polling_minutes = v;
        }
        if let Some(v) = lookup("MAILPULSE_NOTIFICATIONS_ENABLED") {
            self.notifications.enabled = !v.trim().eq_ignore_ascii_case("false");
        }
    }

    /// POP session settings derived from `[sync]` and `[pop]`.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            idle_timeout: Duration::from_millis(self.pop.timeout_ms),
            fetch_limit: self.sync.max_cached_messages,
            top_lines: self.sync.top_lines,
            seen_window: self.sync.seen_uid_window,
            ..SessionOptions::default()
        }
    }

    /// The user's polling interval, or the default when unset. Either is
    /// normalized.
    pub fn polling_minutes(&self, user_id: &str) -> i64 {
        let minutes = self
            .users
            .get(user_id)
            .and_then(|u| u.polling_minutes)
            .unwrap_or(self.sync.default_polling_minutes);
        normalize_polling_minutes(minutes)
    }

    pub fn secret_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.sync.secret_cache_seconds)
    }
}

/// Load .mailpulse.toml (or mailpulse.toml) from a given path or resolved location.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path
        .map(PathBuf::from)
        .unwrap_or_else(resolve::config_toml);
    if !path.exists() {
        bail!(
            ".mailpulse.toml not found at {}.\nCreate it or pass --config PATH.",
            path.display()
        );
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config: Config =
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

/// Try loading config, returning None if the file doesn't exist or is invalid.
pub fn try_load_config(path: Option<&Path>) -> Option<Config> {
    let path = path
        .map(PathBuf::from)
        .unwrap_or_else(resolve::config_toml);
    if !path.exists() {
        return None;
    }
    let content = std::fs::read_to_string(&path).ok()?;
    toml::from_str(&content).ok()
}
