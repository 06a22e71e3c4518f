//! Sync data types: Message, MailboxState, MailboxSnapshot, AccountSyncResult.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One cached message. Never mutated once placed in a [`MailboxState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub snippet: String,
    pub body_text: String,
    pub received_at: DateTime<Utc>,
    pub is_unread: bool,
}

/// Persisted per (user, account) record. Overwritten wholesale on every sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxState {
    #[serde(default)]
    pub unread_count: u32,
    /// Newest first.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Oldest first; only the newest window is retained.
    #[serde(default)]
    pub seen_uids: Vec<String>,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub provider: String,
}

/// Everything one protocol session learned about a mailbox.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MailboxSnapshot {
    pub unread_count: u32,
    pub messages: Vec<Message>,
    pub seen_uids: Vec<String>,
}

/// Outcome of syncing one account inside a user sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSyncResult {
    pub account_id: String,
    pub label: String,
    pub provider: String,
    pub unread_count: u32,
    pub messages: Vec<Message>,
    pub new_messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AccountSyncResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
