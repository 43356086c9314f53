use super::protocol::{parse_count, parse_entry, Request};
use super::store::HeartbeatRegistry;
use super::types::{HeartbeatEntry, HeartbeatKey, HeartbeatSelector};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Bound on connecting and on waiting for each reply line
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Registry client; one short-lived connection per call
#[derive(Debug, Clone)]
pub struct HeartbeatClient {
    addr: String,
    timeout: Duration,
}

/// One request's connection
struct Conn<'a> {
    client: &'a HeartbeatClient,
    reader: BufReader<OwnedReadHalf>,
}

impl HeartbeatClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.send(&Request::Ping).await?;
        let reply = conn.read_reply().await?;
        expect(&reply, "PONG")
    }

    async fn send(&self, request: &Request) -> Result<Conn<'_>> {
        let stream = match timeout(self.timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(SyncError::Registry(format!("cannot reach {}: {}", self.addr, e)));
            }
            Err(_) => return Err(self.timed_out("connect")),
        };

        let (reader, mut writer) = stream.into_split();
        match timeout(self.timeout, writer.write_all(request.to_line().as_bytes())).await {
            Ok(written) => written?,
            Err(_) => return Err(self.timed_out("write")),
        }

        Ok(Conn {
            client: self,
            reader: BufReader::new(reader),
        })
    }

    fn timed_out(&self, what: &str) -> SyncError {
        SyncError::Registry(format!("{} to {} timed out after {:?}", what, self.addr, self.timeout))
    }
}

impl Conn<'_> {
    async fn read_reply(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = match timeout(self.client.timeout, self.reader.read_line(&mut line)).await {
            Ok(read) => read?,
            Err(_) => return Err(self.client.timed_out("reply")),
        };

        if read == 0 {
            return Err(SyncError::Registry("connection closed before reply".to_string()));
        }
        Ok(line)
    }
}

fn expect(reply: &str, wanted: &str) -> Result<()> {
    let reply = reply.trim();
    if reply == wanted {
        return Ok(());
    }
    match reply.strip_prefix("ERR ") {
        Some(message) => Err(SyncError::Registry(message.to_string())),
        None => Err(SyncError::Parse(format!("unexpected reply {:?}", reply))),
    }
}

#[async_trait]
impl HeartbeatRegistry for HeartbeatClient {
    async fn touch(&self, key: &HeartbeatKey) -> Result<()> {
        let mut conn = self.send(&Request::Touch(*key)).await?;
        let reply = conn.read_reply().await?;
        expect(&reply, "OK")
    }

    async fn query(&self, selector: &HeartbeatSelector) -> Result<Vec<HeartbeatEntry>> {
        let mut conn = self.send(&Request::Query(*selector)).await?;
        let mut entries = Vec::new();

        loop {
            let line = conn.read_reply().await?;
            if line.starts_with("ENTRY ") {
                entries.push(parse_entry(&line)?);
                continue;
            }

            let count = parse_count(&line, "END")?;
            if count != entries.len() {
                return Err(SyncError::Parse(format!(
                    "registry announced {} entries but sent {}",
                    count,
                    entries.len()
                )));
            }
            return Ok(entries);
        }
    }

    async fn clear(&self, selector: &HeartbeatSelector) -> Result<usize> {
        let mut conn = self.send(&Request::Clear(*selector)).await?;
        let reply = conn.read_reply().await?;
        parse_count(&reply, "CLEARED")
    }
}
