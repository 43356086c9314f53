//! Line protocol spoken by the registry server
//!
//! ```text
//! PING                -> PONG
//! TOUCH 5:3:0         -> OK
//! QUERY 5:*:0         -> ENTRY 5:1:0 2024-03-01T10:00:00.000000Z
//!                        ENTRY 5:2:0 2024-03-01T10:00:02.000000Z
//!                        END 2
//! CLEAR 5             -> CLEARED 3
//! anything malformed  -> ERR <message>
//! ```

use super::types::{HeartbeatEntry, HeartbeatKey, HeartbeatSelector};
use crate::error::{Result, SyncError};
use chrono::{DateTime, SecondsFormat, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ping,
    Touch(HeartbeatKey),
    Query(HeartbeatSelector),
    Clear(HeartbeatSelector),
}

impl Request {
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let command = parts
            .next()
            .ok_or_else(|| SyncError::Parse("empty request".to_string()))?
            .to_uppercase();
        let argument = parts.next();

        if parts.next().is_some() {
            return Err(SyncError::Parse(format!("too many arguments for {}", command)));
        }

        let required = || argument.ok_or_else(|| SyncError::Parse(format!("{} needs a key", command)));

        match command.as_str() {
            "PING" => Ok(Request::Ping),
            "TOUCH" => Ok(Request::Touch(required()?.parse()?)),
            "QUERY" => Ok(Request::Query(required()?.parse()?)),
            "CLEAR" => Ok(Request::Clear(required()?.parse()?)),
            other => Err(SyncError::Parse(format!("unknown command {}", other))),
        }
    }

    pub fn to_line(&self) -> String {
        match self {
            Request::Ping => "PING\r\n".to_string(),
            Request::Touch(key) => format!("TOUCH {}\r\n", key),
            Request::Query(selector) => format!("QUERY {}\r\n", selector),
            Request::Clear(selector) => format!("CLEAR {}\r\n", selector),
        }
    }
}

pub fn format_entry(entry: &HeartbeatEntry) -> String {
    format!(
        "ENTRY {} {}\r\n",
        entry.key,
        entry.last_seen.to_rfc3339_opts(SecondsFormat::Micros, true)
    )
}

/// Parse one `ENTRY key timestamp` line
pub fn parse_entry(line: &str) -> Result<HeartbeatEntry> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("ENTRY"), Some(key), Some(timestamp), None) => {
            let last_seen = DateTime::parse_from_rfc3339(timestamp)
                .map_err(|e| SyncError::Parse(format!("invalid timestamp {:?}: {}", timestamp, e)))?
                .with_timezone(&Utc);
            Ok(HeartbeatEntry {
                key: key.parse()?,
                last_seen,
            })
        }
        _ => Err(SyncError::Parse(format!("unexpected reply {:?}", line.trim()))),
    }
}

/// Parse a reply line carrying a count (`END n`, `CLEARED n`)
pub fn parse_count(line: &str, tag: &str) -> Result<usize> {
    let line = line.trim();
    if let Some(message) = line.strip_prefix("ERR ") {
        return Err(SyncError::Registry(message.to_string()));
    }

    line.strip_prefix(tag)
        .and_then(|rest| rest.strip_prefix(' '))
        .and_then(|count| count.parse().ok())
        .ok_or_else(|| SyncError::Parse(format!("unexpected reply {:?}", line)))
}
