//! TCP front end of the heartbeat registry

use super::protocol::{format_entry, Request};
use super::store::HeartbeatRegistry;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Connections silent for this long are dropped
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

pub struct HeartbeatServer {
    registry: Arc<dyn HeartbeatRegistry>,
    idle_timeout: Duration,
}

impl HeartbeatServer {
    pub fn new(registry: Arc<dyn HeartbeatRegistry>) -> Self {
        Self {
            registry,
            idle_timeout: IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Bind `addr` and serve until `shutdown` fires
    pub async fn start(&self, addr: &str, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        info!("Heartbeat registry listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Heartbeat registry shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        debug!("New registry connection from {}", peer_addr);
                        let registry = Arc::clone(&self.registry);
                        let shutdown = shutdown.clone();
                        let idle_timeout = self.idle_timeout;

                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, registry, idle_timeout, shutdown).await {
                                error!("Error handling registry connection: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept registry connection: {}", e);
                    }
                },
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    registry: Arc<dyn HeartbeatRegistry>,
    idle_timeout: Duration,
    shutdown: CancellationToken,
) -> Result<()> {
    let peer_addr = stream.peer_addr()?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();

        let read = tokio::select! {
            _ = shutdown.cancelled() => break,
            read = timeout(idle_timeout, reader.read_line(&mut line)) => match read {
                Ok(read) => read?,
                Err(_) => {
                    warn!("Registry connection from {} idle, disconnecting", peer_addr);
                    break;
                }
            },
        };

        if read == 0 {
            debug!("Connection closed by {}", peer_addr);
            break;
        }

        let response = match Request::parse(&line) {
            Ok(request) => match execute(registry.as_ref(), request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Registry request from {} failed: {}", peer_addr, e);
                    format!("ERR {}\r\n", e)
                }
            },
            Err(e) => {
                warn!("Bad registry request from {}: {}", peer_addr, e);
                format!("ERR {}\r\n", e)
            }
        };

        writer.write_all(response.as_bytes()).await?;
    }

    Ok(())
}

async fn execute(registry: &dyn HeartbeatRegistry, request: Request) -> Result<String> {
    match request {
        Request::Ping => Ok("PONG\r\n".to_string()),
        Request::Touch(key) => {
            registry.touch(&key).await?;
            Ok("OK\r\n".to_string())
        }
        Request::Query(selector) => {
            let entries = registry.query(&selector).await?;
            let mut response: String = entries.iter().map(format_entry).collect();
            response.push_str(&format!("END {}\r\n", entries.len()));
            Ok(response)
        }
        Request::Clear(selector) => {
            let cleared = registry.clear(&selector).await?;
            info!(selector = %selector, cleared, "Heartbeat entries cleared");
            Ok(format!("CLEARED {}\r\n", cleared))
        }
    }
}
