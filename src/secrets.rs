//! Password lookup: an ordered chain of sources plus a TTL cache for the
//! expensive ones.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};

/// Where a secret may come from. Sources are tried in order.
#[derive(Clone, PartialEq, Eq)]
pub enum SecretSource {
    Inline(String),
    /// Name of an environment variable.
    Env(String),
    /// Shell command whose trimmed stdout is the secret.
    Command(String),
}

impl std::fmt::Debug for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::Inline(_) => write!(f, "Inline(****)"),
            SecretSource::Env(name) => write!(f, "Env({})", name),
            SecretSource::Command(cmd) => write!(f, "Command({})", cmd),
        }
    }
}

/// Result of asking one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(String),
    /// The source has nothing; try the next one.
    NotConfigured,
}

/// Walk `sources` and return the first secret found.
///
/// An empty inline value or an unset/blank variable falls through. A failing
/// command is an error and stops the chain.
pub async fn resolve_secret(sources: &[SecretSource], cache: &SecretCache) -> Result<String> {
    for source in sources {
        match lookup(source, cache).await? {
            Lookup::Found(secret) => return Ok(secret),
            Lookup::NotConfigured => debug!("Secret source {:?} not configured", source),
        }
    }
    Err(Error::Secret(
        "no password, password_env or password_cmd configured".to_string(),
    ))
}

async fn lookup(source: &SecretSource, cache: &SecretCache) -> Result<Lookup> {
    match source {
        SecretSource::Inline(value) if value.is_empty() => Ok(Lookup::NotConfigured),
        SecretSource::Inline(value) => Ok(Lookup::Found(value.clone())),
        SecretSource::Env(name) => Ok(read_env(name).map_or(Lookup::NotConfigured, Lookup::Found)),
        SecretSource::Command(cmd) if cmd.trim().is_empty() => Ok(Lookup::NotConfigured),
        SecretSource::Command(cmd) => {
            let secret = cache.get_or_load(cmd, || run_command(cmd)).await?;
            Ok(Lookup::Found(secret))
        }
    }
}

fn read_env(name: &str) -> Option<String> {
    let value = std::env::var(name).ok()?;
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Run `sh -c <cmd>` and return its trimmed stdout.
async fn run_command(cmd: &str) -> Result<String> {
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .output()
        .await?;
    if !output.status.success() {
        return Err(Error::Secret(format!(
            "password_cmd failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[derive(Debug)]
struct Cached {
    value: String,
    expires_at: Instant,
}

type Slot = Arc<Mutex<Option<Cached>>>;

/// Secrets keyed by source, each kept for `ttl`.
///
/// Concurrent callers for the same key share one load: the first takes the
/// key's slot lock and loads, the rest wait on the lock and then read the
/// stored value.
#[derive(Debug)]
pub struct SecretCache {
    ttl: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl SecretCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_load<F, Fut>(&self, key: &str, load: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(key.to_string()).or_default())
        };

        let mut cached = slot.lock().await;
        if let Some(entry) = cached.as_ref() {
            if entry.expires_at > Instant::now() {
                return Ok(entry.value.clone());
            }
        }

        let value = load().await?;
        *cached = Some(Cached {
            value: value.clone(),
            expires_at: Instant::now() + self.ttl,
        });
        Ok(value)
    }

    /// Forget one key. The next lookup loads again.
    pub async fn invalidate(&self, key: &str) {
        self.slots.lock().await.remove(key);
    }

    pub async fn clear(&self) {
        self.slots.lock().await.clear();
    }
}

impl Default for SecretCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}
