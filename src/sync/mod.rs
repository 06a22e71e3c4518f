//! Mailbox sync: staleness policy, per-pass context, and the `sync` and
//! `status` commands.

pub mod context;
pub mod orchestrator;
pub mod types;

use anyhow::{Result, bail};
use chrono::Utc;

use crate::accounts::{AccountStatus, resolve_account};
use crate::app::App;
use crate::sync::orchestrator::is_stale;
use crate::sync::types::AccountSyncResult;

/// mailpulse sync --user U [--account LABEL] [--force]
pub async fn run(app: &App, user_id: &str, account: Option<&str>, force: bool) -> Result<()> {
    let accounts = app.user_accounts(user_id).await?;
    let selected = match account {
        Some(label) => match resolve_account(&accounts, label) {
            Some(found) => vec![found.clone()],
            None => bail!(
                "Unknown account: {}\nAvailable: {}",
                label,
                accounts
                    .iter()
                    .map(|a| a.label.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        },
        None => accounts,
    };
    if selected.is_empty() {
        println!("No active accounts for {}.", user_id);
        return Ok(());
    }

    let now = Utc::now();
    let results = if force {
        app.service.sync_user(user_id, &selected, now).await
    } else {
        app.service.sync_user_if_stale(user_id, &selected, now).await
    };

    for result in &results {
        print_result(result);
    }

    let failed = results.iter().filter(|r| !r.is_ok()).count();
    if failed > 0 {
        bail!("{} of {} account(s) failed to sync", failed, results.len());
    }
    println!("\nSync complete.");
    Ok(())
}

fn print_result(result: &AccountSyncResult) {
    println!("\n=== Account: {} ({}) ===", result.label, result.provider);
    if let Some(error) = &result.error {
        eprintln!("  Error: {}", error);
        return;
    }
    println!(
        "  {} unread, {} new",
        result.unread_count,
        result.new_messages.len()
    );
    for message in &result.messages {
        println!(
            "  {} {} {:<30} {}",
            if message.is_unread { "*" } else { " " },
            message.received_at.format("%Y-%m-%d %H:%M"),
            message.from,
            message.subject
        );
    }
}

/// mailpulse status --user U
///
/// Reads the store only; no passwords are looked up and no sockets opened.
pub async fn status(app: &App, user_id: &str) -> Result<()> {
    let Some(user) = app.config.users.get(user_id) else {
        bail!("Unknown user: {}", user_id);
    };
    let now = Utc::now();
    let stale_minutes = app.service.policy().stale_minutes;

    for (id, account) in &user.accounts {
        let label = if account.label.trim().is_empty() {
            id.as_str()
        } else {
            account.label.trim()
        };
        if account.status == AccountStatus::Disconnected {
            println!("{}: disconnected", label);
            continue;
        }
        match app.store.mailbox_state(user_id, id).await? {
            None => println!("{}: never synced", label),
            Some(state) => {
                let last = state
                    .last_sync_at
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                println!(
                    "{}: {} unread, {} cached, last sync {}{}",
                    label,
                    state.unread_count,
                    state.messages.len(),
                    last,
                    if is_stale(Some(&state), now, stale_minutes) {
                        " (stale)"
                    } else {
                        ""
                    }
                );
            }
        }
    }
    Ok(())
}
