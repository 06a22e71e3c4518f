//! The POP session state machine.
//!
//! A session walks `Connecting → Greeted → Authenticated → Inventoried →
//! Fetching → Quitting → Closed` and never skips a state. Any failure moves
//! it straight to `Closed`. [`fetch_snapshot`] drives one full session and
//! guarantees the socket is closed on every exit path.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::parse::{Stat, parse_stat, parse_uidl};
use super::pipeline::CommandPipeline;
use super::transport::{Connection, Dialer};
use crate::accounts::Credentials;
use crate::error::{Error, Result};
use crate::mime::parse_raw_message;
use crate::sync::types::{MailboxSnapshot, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Connecting,
    Greeted,
    Authenticated,
    Inventoried,
    Fetching,
    Quitting,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Socket inactivity after which the whole session fails.
    pub idle_timeout: Duration,
    /// How many of the newest messages are fetched in full.
    pub fetch_limit: usize,
    /// Body lines requested with `TOP`.
    pub top_lines: u32,
    /// How many UIDs are kept in `seen_uids`.
    pub seen_window: usize,
    /// Prefix of synthetic UIDs used when `UIDL` has no entry for an index.
    pub uid_prefix: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_millis(10_000),
            fetch_limit: 10,
            top_lines: 40,
            seen_window: 500,
            uid_prefix: "pop".to_string(),
        }
    }
}

pub struct PopSession {
    pipeline: CommandPipeline<Connection>,
    state: SessionState,
}

impl PopSession {
    /// Open the socket. The session starts in `Connecting`.
    pub async fn connect(
        dialer: &dyn Dialer,
        credentials: &Credentials,
        idle_timeout: Duration,
    ) -> Result<Self> {
        credentials.validate()?;
        let stream = dialer.dial(&credentials.endpoint(), idle_timeout).await?;
        Ok(Self {
            pipeline: CommandPipeline::new(stream, idle_timeout),
            state: SessionState::Connecting,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Read the unsolicited greeting.
    pub async fn greet(&mut self) -> Result<()> {
        self.expect_state(SessionState::Connecting)?;
        let result = self.pipeline.read_line().await;
        let greeting = self.guard(result)?;
        if !greeting.is_ok() {
            self.state = SessionState::Closed;
            return Err(Error::Greeting(greeting.line));
        }
        debug!("S: {}", greeting.line);
        self.state = SessionState::Greeted;
        Ok(())
    }

    /// `USER` then `PASS`. A rejected command is a credentials error.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        self.expect_state(SessionState::Greeted)?;
        for command in [format!("USER {}", username), format!("PASS {}", password)] {
            let result = self.pipeline.send_command(&command, false).await;
            match self.guard(result) {
                Ok(_) => {}
                Err(Error::Command { line, .. }) => {
                    return Err(Error::Credentials {
                        username: username.to_string(),
                        line,
                    });
                }
                Err(e) => return Err(e),
            }
        }
        self.state = SessionState::Authenticated;
        Ok(())
    }

    /// `STAT` then `UIDL`.
    pub async fn inventory(&mut self) -> Result<(Stat, BTreeMap<u32, String>)> {
        self.expect_state(SessionState::Authenticated)?;
        let result = self.pipeline.send_command("STAT", false).await;
        let stat = parse_stat(&self.guard(result)?.line);
        let result = self.pipeline.send_command("UIDL", true).await;
        let uids = parse_uidl(self.guard(result)?.body());
        debug!("STAT {} messages, {} bytes; UIDL {} entries", stat.count, stat.size, uids.len());
        self.state = SessionState::Inventoried;
        Ok((stat, uids))
    }

    /// Fetch one message: `TOP <index> <lines>`, falling back to `RETR <index>`
    /// when the server rejects `TOP`.
    ///
    /// Returns the raw header and body block.
    pub async fn fetch(&mut self, index: u32, top_lines: u32) -> Result<String> {
        if self.state != SessionState::Fetching {
            self.expect_state(SessionState::Inventoried)?;
            self.state = SessionState::Fetching;
        }
        let result = self
            .pipeline
            .send_command(&format!("TOP {} {}", index, top_lines), true)
            .await;
        match self.guard(result) {
            Ok(top) => Ok(top.body.unwrap_or_default()),
            Err(Error::Command { line, .. }) => {
                debug!("TOP {} rejected ({}), falling back to RETR", index, line);
                let result = self
                    .pipeline
                    .send_command(&format!("RETR {}", index), true)
                    .await;
                Ok(self.guard(result)?.body.unwrap_or_default())
            }
            Err(e) => Err(e),
        }
    }

    /// Send `QUIT` and close the socket.
    ///
    /// `QUIT` is only sent once the mailbox was inventoried; a rejected
    /// `QUIT` is logged, not returned.
    pub async fn quit(mut self) {
        if matches!(
            self.state,
            SessionState::Inventoried | SessionState::Fetching
        ) {
            self.state = SessionState::Quitting;
            if let Err(e) = self.pipeline.send_command("QUIT", false).await {
                warn!("POP QUIT failed: {}", e);
            }
        }
        self.close().await;
    }

    /// Close the socket without saying goodbye.
    pub async fn close(&mut self) {
        self.pipeline.close().await;
        self.state = SessionState::Closed;
    }

    fn expect_state(&self, wanted: SessionState) -> Result<()> {
        if self.state == wanted {
            Ok(())
        } else {
            Err(Error::provider(
                "pop",
                format!("session is {:?}, expected {:?}", self.state, wanted),
            ))
        }
    }

    /// Transport failures leave the socket unusable.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_transport() {
                self.state = SessionState::Closed;
            }
        }
        result
    }
}

/// Indices of the newest `limit` messages, newest first.
pub fn newest_indices(count: u32, limit: usize) -> Vec<u32> {
    let limit = u32::try_from(limit).unwrap_or(u32::MAX);
    let oldest = count.saturating_sub(limit).saturating_add(1);
    (oldest..=count).rev().collect()
}

/// Run one complete POP session and summarize the mailbox.
///
/// `previous_seen` holds the UIDs stored by the last sync; anything else is
/// unread. The unread count covers the whole `UIDL` map, not just the
/// fetched messages.
pub async fn fetch_snapshot(
    dialer: &dyn Dialer,
    credentials: &Credentials,
    options: &SessionOptions,
    previous_seen: &HashSet<String>,
) -> Result<MailboxSnapshot> {
    let mut session = PopSession::connect(dialer, credentials, options.idle_timeout).await?;
    match run(&mut session, credentials, options, previous_seen).await {
        Ok(snapshot) => {
            session.quit().await;
            Ok(snapshot)
        }
        Err(e) => {
            debug!("POP session failed in {:?}: {}", session.state(), e);
            if session.state() == SessionState::Closed {
                session.close().await;
            } else {
                session.quit().await;
            }
            Err(e)
        }
    }
}

async fn run(
    session: &mut PopSession,
    credentials: &Credentials,
    options: &SessionOptions,
    previous_seen: &HashSet<String>,
) -> Result<MailboxSnapshot> {
    session.greet().await?;
    session.login(&credentials.username, &credentials.password).await?;
    let (stat, uids) = session.inventory().await?;

    let mut messages: Vec<Message> = Vec::new();
    for index in newest_indices(stat.count, options.fetch_limit) {
        let uid = uids
            .get(&index)
            .cloned()
            .unwrap_or_else(|| format!("{}-{}", options.uid_prefix, index));
        let raw = match session.fetch(index, options.top_lines).await {
            Ok(raw) => raw,
            Err(e) if e.is_transport() => return Err(e),
            Err(e) => {
                warn!("Skipping message {} ({}): {}", index, uid, e);
                continue;
            }
        };
        let mut message = parse_raw_message(&raw, &uid);
        message.is_unread = !previous_seen.contains(&uid);
        message.id = uid;
        messages.push(message);
    }

    let unread_count = uids
        .values()
        .filter(|uid| !previous_seen.contains(*uid))
        .count();
    let all: Vec<String> = uids.into_values().collect();
    let skip = all.len().saturating_sub(options.seen_window);
    let seen_uids = all.into_iter().skip(skip).collect();

    info!(
        "POP {}: {} messages, {} unread, fetched {}",
        credentials.username,
        stat.count,
        unread_count,
        messages.len()
    );

    Ok(MailboxSnapshot {
        unread_count: u32::try_from(unread_count).unwrap_or(u32::MAX),
        messages,
        seen_uids,
    })
}
