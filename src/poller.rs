//! Poll sweep: sync every due user, notify about new mail and reschedule.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::accounts::AccountSource;
use crate::config::normalize_polling_minutes;
use crate::error::Result;
use crate::store::{MailboxStore, UserSchedule};
use crate::sync::orchestrator::SyncService;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationOutcome {
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl NotificationOutcome {
    pub fn sent() -> Self {
        Self {
            sent: true,
            reason: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            sent: false,
            reason: Some(reason.into()),
        }
    }
}

/// Delivers "new mail" notices. Delivery is best-effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn new_mail(
        &self,
        user_id: &str,
        account_label: &str,
        count: usize,
    ) -> NotificationOutcome;
}

pub fn notification_text(count: usize, account_label: &str) -> String {
    let plural = if count > 1 { "s" } else { "" };
    format!("{} new email{} in {}", count, plural, account_label)
}

/// Logs each notice and optionally raises a desktop notification.
#[derive(Debug, Clone, Copy)]
pub struct LogNotifier {
    pub enabled: bool,
    pub desktop: bool,
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn new_mail(
        &self,
        user_id: &str,
        account_label: &str,
        count: usize,
    ) -> NotificationOutcome {
        if !self.enabled {
            return NotificationOutcome::skipped("disabled");
        }
        let text = notification_text(count, account_label);
        info!("[{}] {}", user_id, text);
        if self.desktop {
            desktop_notify("mailpulse", &text).await;
        }
        NotificationOutcome::sent()
    }
}

/// Desktop notification (best-effort).
async fn desktop_notify(title: &str, body: &str) {
    #[cfg(target_os = "macos")]
    {
        let _ = tokio::process::Command::new("osascript")
            .arg("-e")
            .arg(format!(
                "display notification \"{}\" with title \"{}\"",
                body, title
            ))
            .output()
            .await;
    }
    #[cfg(target_os = "linux")]
    {
        let _ = tokio::process::Command::new("notify-send")
            .arg(title)
            .arg(body)
            .output()
            .await;
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = (title, body);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollError {
    pub user_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSummary {
    pub scanned_users: usize,
    pub synced_users: usize,
    pub notifications_sent: usize,
    pub errors: Vec<PollError>,
}

/// A user the poller knows about, with their polling interval in minutes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTarget {
    pub user_id: String,
    pub polling_minutes: i64,
}

pub struct Poller {
    service: Arc<SyncService>,
    accounts: Arc<dyn AccountSource>,
    store: Arc<dyn MailboxStore>,
    notifier: Arc<dyn Notifier>,
    targets: Vec<PollTarget>,
}

impl Poller {
    pub fn new(
        service: Arc<SyncService>,
        accounts: Arc<dyn AccountSource>,
        store: Arc<dyn MailboxStore>,
        notifier: Arc<dyn Notifier>,
        targets: Vec<PollTarget>,
    ) -> Self {
        Self {
            service,
            accounts,
            store,
            notifier,
            targets,
        }
    }

    /// Users whose schedule is due at `now`; never-polled users are due.
    pub async fn due_targets(&self, now: DateTime<Utc>) -> Result<Vec<PollTarget>> {
        let mut due = Vec::new();
        for target in &self.targets {
            match self.store.user_schedule(&target.user_id).await? {
                Some(schedule) if !schedule.is_due(now) => {
                    debug!("{} not due until {}", target.user_id, schedule.next_due_at);
                }
                _ => due.push(target.clone()),
            }
        }
        Ok(due)
    }

    /// One sweep over every due user. A failing user is recorded in the
    /// summary and the sweep moves on.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> Result<PollSummary> {
        let due = self.due_targets(now).await?;
        let mut summary = PollSummary {
            scanned_users: due.len(),
            ..Default::default()
        };

        for target in &due {
            match self.poll_user(target, now).await {
                Ok(Some(sent)) => {
                    summary.synced_users += 1;
                    summary.notifications_sent += sent;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Poll failed for {}: {}", target.user_id, e);
                    summary.errors.push(PollError {
                        user_id: target.user_id.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Poll sweep: {} scanned, {} synced, {} notified, {} errors",
            summary.scanned_users,
            summary.synced_users,
            summary.notifications_sent,
            summary.errors.len()
        );
        Ok(summary)
    }

    /// `Ok(None)` when the user had no active accounts, else the number of
    /// notifications sent.
    async fn poll_user(&self, target: &PollTarget, now: DateTime<Utc>) -> Result<Option<usize>> {
        let accounts = self.accounts.list_accounts(&target.user_id).await?;
        if accounts.is_empty() {
            self.reschedule(target, now).await?;
            return Ok(None);
        }

        let results = self.service.sync_user(&target.user_id, &accounts, now).await;
        let mut sent = 0;
        for result in results.iter().filter(|r| !r.new_messages.is_empty()) {
            let outcome = self
                .notifier
                .new_mail(&target.user_id, &result.label, result.new_messages.len())
                .await;
            if outcome.sent {
                sent += 1;
            } else if let Some(reason) = &outcome.reason {
                debug!("Notification for {} skipped: {}", result.label, reason);
            }
        }

        self.reschedule(target, now).await?;
        Ok(Some(sent))
    }

    /// The interval is snapped to 15, 30 or 60 minutes first.
    async fn reschedule(&self, target: &PollTarget, now: DateTime<Utc>) -> Result<()> {
        let minutes = normalize_polling_minutes(target.polling_minutes);
        let schedule = UserSchedule {
            polling_minutes: minutes,
            next_due_at: now + Duration::minutes(minutes),
        };
        self.store.put_user_schedule(&target.user_id, &schedule).await
    }
}
