//! Path resolution for mailpulse data and config.
//!
//! Resolution order for the data directory:
//!   1. MAILPULSE_DATA environment variable
//!   2. mail/ in cwd (developer workflow)
//!   3. The OS data directory (via directories::ProjectDirs)
//!   4. ~/.local/share/mailpulse

use std::path::PathBuf;

/// Return the data directory path.
pub fn data_dir() -> PathBuf {
    data_dir_from(std::env::var("MAILPULSE_DATA").ok())
}

fn data_dir_from(env: Option<String>) -> PathBuf {
    if let Some(env) = env.filter(|e| !e.is_empty()) {
        return PathBuf::from(env);
    }
    let local = PathBuf::from("mail");
    if local.is_dir() {
        return local;
    }
    if let Some(dirs) = directories::ProjectDirs::from("", "", "mailpulse") {
        return dirs.data_dir().to_path_buf();
    }
    home_dir().join(".local").join("share").join("mailpulse")
}

/// Cached mailbox states and poll schedules.
pub fn state_file() -> PathBuf {
    data_dir().join("mailbox-state.json")
}

/// Resolve the config path: .mailpulse.toml then mailpulse.toml in data_dir().
pub fn config_toml() -> PathBuf {
    let dir = data_dir();
    let dotfile = dir.join(".mailpulse.toml");
    if dotfile.exists() {
        return dotfile;
    }
    let plain = dir.join("mailpulse.toml");
    if plain.exists() {
        return plain;
    }
    dotfile
}

/// Get the user's home directory.
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Expand ~ to home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        home_dir().join(rest)
    } else if path == "~" {
        home_dir()
    } else {
        PathBuf::from(path)
    }
}
