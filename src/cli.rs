use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "mailpulse",
    version,
    about = "Poll POP mailboxes and keep a fresh cache of unread counts and recent messages"
)]
pub struct Cli {
    /// Path to .mailpulse.toml (default: resolved data directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Warnings and errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sync one user's accounts
    Sync {
        /// User id from the config file
        #[arg(long)]
        user: String,

        /// Sync only the account matching this label
        #[arg(long)]
        account: Option<String>,

        /// Sync even when the cached state is still fresh
        #[arg(long)]
        force: bool,
    },

    /// Show cached mailbox state without touching the network
    Status {
        /// User id from the config file
        #[arg(long)]
        user: String,
    },

    /// Run one poll sweep over every due user
    Poll,

    /// Poll repeatedly until Ctrl-C
    Watch {
        /// Seconds between sweeps
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },
}
