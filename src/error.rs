//! Error type shared by the POP engine, the connectors and the sync orchestrator.

use std::io;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("could not connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The socket saw no traffic for the configured idle period.
    #[error("POP timeout after {0:?} of inactivity")]
    Timeout(Duration),

    #[error("POP socket closed")]
    StreamClosed,

    #[error("POP greeting failed: {0}")]
    Greeting(String),

    /// A command was answered with anything other than `+OK`.
    #[error("POP command failed ({command}): {line}")]
    Command { command: String, line: String },

    #[error("POP login rejected for {username}: {line}")]
    Credentials { username: String, line: String },

    #[error("Missing POP settings: {0}")]
    MissingSettings(&'static str),

    #[error("Unsupported email provider: {0}")]
    UnsupportedProvider(String),

    #[error("Missing access token for account {0}")]
    MissingAccessToken(String),

    /// Failure reported by an external connector (REST APIs and the like).
    #[error("{provider} error: {message}")]
    Provider { provider: String, message: String },

    #[error("store error: {0}")]
    Store(String),

    #[error("invalid stored data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("secret lookup failed: {0}")]
    Secret(String),
}

impl Error {
    /// True for failures that leave the socket unusable.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Tls(_)
                | Error::Connect { .. }
                | Error::Timeout(_)
                | Error::StreamClosed
        )
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}
