pub mod accounts;
pub mod app;
pub mod cli;
pub mod config;
pub mod connector;
pub mod error;
pub mod logging;
pub mod mime;
pub mod poller;
pub mod pop;
pub mod resolve;
pub mod secrets;
pub mod store;
pub mod sync;
pub mod text;
pub mod watch;

pub use error::{Error, Result};
