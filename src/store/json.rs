//! Single JSON file store (`mailbox-state.json`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

use super::{MailboxStore, UserSchedule};
use crate::error::{Error, Result};
use crate::sync::types::MailboxState;

/// On-disk layout: `{ "mailboxes": {user: {account: state}}, "schedules": {user: schedule} }`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    mailboxes: BTreeMap<String, BTreeMap<String, MailboxState>>,
    #[serde(default)]
    schedules: BTreeMap<String, UserSchedule>,
}

#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<StateFile> {
        match tokio::fs::read(&self.path).await {
            Ok(data) if data.is_empty() => Ok(StateFile::default()),
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StateFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a sibling temp file, then rename over the original.
    async fn save(&self, file: &StateFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let data = serde_json::to_vec_pretty(file)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            Error::Store(format!("replacing {}: {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl MailboxStore for JsonStore {
    async fn mailbox_state(&self, user_id: &str, account_id: &str) -> Result<Option<MailboxState>> {
        let _guard = self.lock.lock().await;
        let file = self.load().await?;
        Ok(file
            .mailboxes
            .get(user_id)
            .and_then(|accounts| accounts.get(account_id))
            .cloned())
    }

    async fn put_mailbox_state(
        &self,
        user_id: &str,
        account_id: &str,
        state: &MailboxState,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        file.mailboxes
            .entry(user_id.to_string())
            .or_default()
            .insert(account_id.to_string(), state.clone());
        self.save(&file).await
    }

    async fn user_schedule(&self, user_id: &str) -> Result<Option<UserSchedule>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.schedules.get(user_id).cloned())
    }

    async fn put_user_schedule(&self, user_id: &str, schedule: &UserSchedule) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        file.schedules.insert(user_id.to_string(), schedule.clone());
        self.save(&file).await
    }
}
