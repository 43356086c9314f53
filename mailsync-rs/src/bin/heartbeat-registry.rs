//! Heartbeat registry server
//!
//! ```bash
//! heartbeat-registry --config mailsync.toml
//! MAILSYNC__HEARTBEAT__LISTEN_ADDR=127.0.0.1:9000 heartbeat-registry
//! ```

use clap::Parser;
use mailsync_rs::config::Config;
use mailsync_rs::heartbeat::{HeartbeatServer, MemoryHeartbeatRegistry};
use mailsync_rs::logging;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "heartbeat-registry")]
#[command(about = "Serve the sync heartbeat registry", long_about = None)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (overrides heartbeat.listen_addr)
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    logging::init(&config.logging);

    let listen_addr = cli.listen.unwrap_or_else(|| config.heartbeat.listen_addr.clone());
    let registry = Arc::new(MemoryHeartbeatRegistry::new());
    let shutdown = CancellationToken::new();

    let reporter = {
        let registry = Arc::clone(&registry);
        let shutdown = shutdown.clone();
        let stale_after = config.heartbeat.stale_after();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(stale_after.max(Duration::from_secs(1)));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let stale = registry.stale_entries(chrono::Utc::now(), stale_after).await;
                        for entry in &stale {
                            warn!(key = %entry.key, last_seen = %entry.last_seen, "Stale heartbeat");
                        }
                    }
                }
            }
        })
    };

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
        }
        signal.cancel();
    });

    let server = HeartbeatServer::new(registry);
    server.start(&listen_addr, shutdown.clone()).await?;

    shutdown.cancel();
    reporter.await?;
    Ok(())
}
