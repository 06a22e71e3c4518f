use anyhow::Result;
use clap::Parser;

use mailpulse::app::App;
use mailpulse::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    mailpulse::logging::init(cli.verbose, cli.quiet)?;

    let config_path = cli
        .config
        .as_deref()
        .map(|p| mailpulse::resolve::expand_tilde(&p.to_string_lossy()));
    let app = App::load(config_path.as_deref())?;

    match cli.command {
        Commands::Sync {
            user,
            account,
            force,
        } => mailpulse::sync::run(&app, &user, account.as_deref(), force).await,
        Commands::Status { user } => mailpulse::sync::status(&app, &user).await,
        Commands::Poll => mailpulse::watch::poll(&app).await,
        Commands::Watch { interval } => mailpulse::watch::run(&app, interval).await,
    }
}
