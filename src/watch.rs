//! Polling daemon. Runs poll sweeps on an interval until Ctrl-C.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::info;

use crate::app::App;

/// mailpulse poll
pub async fn poll(app: &App) -> Result<()> {
    let summary = app.poller().poll_once(Utc::now()).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// mailpulse watch [--interval N]
pub async fn run(app: &App, interval: u64) -> Result<()> {
    let poller = app.poller();
    let shutdown = Arc::new(AtomicBool::new(false));
    let wake = Arc::new(Notify::new());

    {
        let shutdown = Arc::clone(&shutdown);
        let wake = Arc::clone(&wake);
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            println!("\nReceived signal, shutting down...");
            shutdown.store(true, Ordering::Relaxed);
            wake.notify_one();
        });
    }

    println!("mailpulse watch: polling every {}s (Ctrl-C to stop)", interval);

    while !shutdown.load(Ordering::Relaxed) {
        match poller.poll_once(Utc::now()).await {
            Ok(summary) if summary.notifications_sent > 0 => {
                println!("{} notification(s) sent", summary.notifications_sent)
            }
            Ok(_) => {}
            Err(e) => eprintln!("Poll failed: {}", e),
        }

        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        tokio::select! {
            _ = wake.notified() => {}
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
        }
    }

    info!("watch loop stopped");
    println!("mailpulse watch: stopped");
    Ok(())
}
