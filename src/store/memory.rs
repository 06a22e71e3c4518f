//! In-process store, for tests and one-shot runs.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{MailboxStore, UserSchedule};
use crate::error::Result;
use crate::sync::types::MailboxState;

#[derive(Debug, Default)]
pub struct MemoryStore {
    states: RwLock<HashMap<(String, String), MailboxState>>,
    schedules: RwLock<HashMap<String, UserSchedule>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MailboxStore for MemoryStore {
    async fn mailbox_state(&self, user_id: &str, account_id: &str) -> Result<Option<MailboxState>> {
        let key = (user_id.to_string(), account_id.to_string());
        Ok(self.states.read().await.get(&key).cloned())
    }

    async fn put_mailbox_state(
        &self,
        user_id: &str,
        account_id: &str,
        state: &MailboxState,
    ) -> Result<()> {
        let key = (user_id.to_string(), account_id.to_string());
        self.states.write().await.insert(key, state.clone());
        Ok(())
    }

    async fn user_schedule(&self, user_id: &str) -> Result<Option<UserSchedule>> {
        Ok(self.schedules.read().await.get(user_id).cloned())
    }

    async fn put_user_schedule(&self, user_id: &str, schedule: &UserSchedule) -> Result<()> {
        self.schedules
            .write()
            .await
            .insert(user_id.to_string(), schedule.clone());
        Ok(())
    }
}
