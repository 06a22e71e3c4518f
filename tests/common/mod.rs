//! Shared test fixtures and helpers: a scripted POP server over in-memory
//! pipes, a counting dialer, and account/config builders.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use mailpulse::accounts::{Account, AccountStatus, Credentials};
use mailpulse::error::{Error, Result};
use mailpulse::pop::session::SessionOptions;
use mailpulse::pop::transport::{Connection, Dialer, Endpoint};

pub const PASSWORD: &str = "s3cret";

/// A raw RFC 822 message with the given subject, LF line endings converted to CRLF.
pub fn raw_message(subject: &str, body: &str) -> String {
    format!(
        "From: Alice <alice@example.com>\nSubject: {}\nDate: Mon, 10 Feb 2025 10:00:00 +0000\n\n{}",
        subject, body
    )
    .replace('\n', "\r\n")
}

/// What the scripted server holds and how it misbehaves.
#[derive(Debug, Clone)]
pub struct Mailbox {
    pub greeting: String,
    /// `(uid, raw)` per message index, starting at 1. A `None` uid is
    /// missing from the UIDL listing.
    pub messages: Vec<(Option<String>, String)>,
    pub reject_top: bool,
    /// Indices whose RETR is rejected.
    pub reject_retr: Vec<u32>,
    /// Drop the connection instead of answering this command verb.
    pub hang_up_on: Option<String>,
    /// Never answer this command verb.
    pub stall_on: Option<String>,
}

impl Mailbox {
    pub fn with_uids(uids: &[&str]) -> Self {
        let messages = uids
            .iter()
            .enumerate()
            .map(|(i, uid)| {
                (
                    Some(uid.to_string()),
                    raw_message(&format!("Message {}", i + 1), &format!("Body of {}", uid)),
                )
            })
            .collect();
        Self {
            greeting: "+OK POP3 ready".to_string(),
            messages,
            reject_top: false,
            reject_retr: Vec::new(),
            hang_up_on: None,
            stall_on: None,
        }
    }
}

fn stuff(raw: &str) -> String {
    raw.split("\r\n")
        .map(|line| {
            if line.starts_with('.') {
                format!(".{}", line)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\r\n")
}

fn multiline(body: &str) -> String {
    if body.is_empty() {
        "+OK\r\n.\r\n".to_string()
    } else {
        format!("+OK\r\n{}\r\n.\r\n", stuff(body))
    }
}

/// Answer POP commands on `stream` until QUIT or EOF, recording each line.
pub async fn serve(stream: DuplexStream, mailbox: Mailbox, log: Arc<Mutex<Vec<String>>>) {
    let (read, mut write) = tokio::io::split(stream);
    let mut lines = BufReader::new(read).lines();
    if write
        .write_all(format!("{}\r\n", mailbox.greeting).as_bytes())
        .await
        .is_err()
    {
        return;
    }

    while let Ok(Some(line)) = lines.next_line().await {
        log.lock().unwrap().push(line.clone());
        let mut parts = line.split_whitespace();
        let verb = parts.next().unwrap_or("").to_uppercase();
        let arg = parts.next().and_then(|a| a.parse::<usize>().ok()).unwrap_or(0);

        if mailbox.hang_up_on.as_deref() == Some(verb.as_str()) {
            return;
        }
        if mailbox.stall_on.as_deref() == Some(verb.as_str()) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return;
        }

        let message = arg
            .checked_sub(1)
            .and_then(|i| mailbox.messages.get(i))
            .map(|(_, raw)| raw.clone());
        let reply = match verb.as_str() {
            "USER" => "+OK\r\n".to_string(),
            "PASS" if line.ends_with(PASSWORD) => "+OK logged in\r\n".to_string(),
            "PASS" => "-ERR invalid credentials\r\n".to_string(),
            "STAT" => {
                let size: usize = mailbox.messages.iter().map(|(_, raw)| raw.len()).sum();
                format!("+OK {} {}\r\n", mailbox.messages.len(), size)
            }
            "UIDL" => {
                let listing: Vec<String> = mailbox
                    .messages
                    .iter()
                    .enumerate()
                    .filter_map(|(i, (uid, _))| uid.as_ref().map(|u| format!("{} {}", i + 1, u)))
                    .collect();
                multiline(&listing.join("\r\n"))
            }
            "TOP" if mailbox.reject_top => "-ERR TOP not supported\r\n".to_string(),
            "TOP" | "RETR" => match message {
                Some(_) if verb == "RETR" && mailbox.reject_retr.contains(&(arg as u32)) => {
                    "-ERR message locked\r\n".to_string()
                }
                Some(raw) => multiline(&raw),
                None => "-ERR no such message\r\n".to_string(),
            },
            "QUIT" => {
                let _ = write.write_all(b"+OK bye\r\n").await;
                return;
            }
            _ => "-ERR unknown command\r\n".to_string(),
        };
        if write.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

/// Hands out in-memory connections to a scripted server and counts them.
pub struct ScriptedDialer {
    mailbox: Mailbox,
    dials: AtomicUsize,
    pub log: Arc<Mutex<Vec<String>>>,
    refuse: bool,
}

impl ScriptedDialer {
    pub fn new(mailbox: Mailbox) -> Self {
        Self {
            mailbox,
            dials: AtomicUsize::new(0),
            log: Arc::new(Mutex::new(Vec::new())),
            refuse: false,
        }
    }

    /// A dialer whose every connection attempt is refused.
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::new(Mailbox::with_uids(&[]))
        }
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dialer for ScriptedDialer {
    async fn dial(&self, endpoint: &Endpoint, _connect_timeout: Duration) -> Result<Connection> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(Error::Connect {
                host: endpoint.host.clone(),
                port: endpoint.port,
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(serve(server, self.mailbox.clone(), Arc::clone(&self.log)));
        Ok(Box::new(client))
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        host: "pop.example.com".to_string(),
        port: 995,
        secure: true,
        accept_invalid_certs: false,
        username: "alice".to_string(),
        password: PASSWORD.to_string(),
        timeout_ms: None,
    }
}

pub fn pop_account(id: &str) -> Account {
    Account {
        id: id.to_string(),
        label: id.to_string(),
        provider: "pop".to_string(),
        status: AccountStatus::Active,
        credentials: credentials(),
        access_token: None,
        password_sources: Vec::new(),
    }
}

pub fn fast_options() -> SessionOptions {
    SessionOptions {
        idle_timeout: Duration::from_secs(5),
        ..SessionOptions::default()
    }
}

/// Write a minimal .mailpulse.toml with one user and one POP account.
pub fn write_config(dir: &Path, user: &str) {
    let content = format!(
        r#"[sync]
stale_minutes = 5

[users.{user}]
polling_minutes = 30

[users.{user}.accounts.home]
label = "Home"
provider = "pop"
host = "127.0.0.1"
port = 1
secure = false
username = "{user}"
password = "{password}"
timeout_ms = 500

[users.{user}.accounts.old]
label = "Old"
status = "disconnected"
"#,
        user = user,
        password = PASSWORD,
    );
    std::fs::write(dir.join(".mailpulse.toml"), content).unwrap();
}
