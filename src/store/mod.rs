//! Persistence of mailbox states and poll schedules.
//!
//! Records are read and written whole. A sync pass overwrites its
//! `(user, account)` state in one call, so a retried pass is idempotent.

pub mod json;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sync::types::MailboxState;

pub use json::JsonStore;
pub use memory::MemoryStore;

/// When a user's accounts are next due for a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSchedule {
    pub polling_minutes: i64,
    pub next_due_at: DateTime<Utc>,
}

impl UserSchedule {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_due_at <= now
    }
}

#[async_trait]
pub trait MailboxStore: Send + Sync {
    async fn mailbox_state(&self, user_id: &str, account_id: &str) -> Result<Option<MailboxState>>;

    /// Replace the stored state wholesale.
    async fn put_mailbox_state(
        &self,
        user_id: &str,
        account_id: &str,
        state: &MailboxState,
    ) -> Result<()>;

    async fn user_schedule(&self, user_id: &str) -> Result<Option<UserSchedule>>;

    async fn put_user_schedule(&self, user_id: &str, schedule: &UserSchedule) -> Result<()>;
}
