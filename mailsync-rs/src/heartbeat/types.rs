use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Liveness key, written as `account_id[:folder_id[:device_id]]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeartbeatKey {
    pub account_id: i64,
    pub folder_id: Option<i64>,
    /// Only set together with `folder_id`
    pub device_id: Option<i64>,
}

impl HeartbeatKey {
    pub fn account(account_id: i64) -> Self {
        Self {
            account_id,
            folder_id: None,
            device_id: None,
        }
    }

    pub fn folder(account_id: i64, folder_id: i64) -> Self {
        Self {
            account_id,
            folder_id: Some(folder_id),
            device_id: None,
        }
    }

    pub fn device(account_id: i64, folder_id: i64, device_id: i64) -> Self {
        Self {
            account_id,
            folder_id: Some(folder_id),
            device_id: Some(device_id),
        }
    }
}

impl fmt::Display for HeartbeatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.account_id)?;
        if let Some(folder_id) = self.folder_id {
            write!(f, ":{}", folder_id)?;
            if let Some(device_id) = self.device_id {
                write!(f, ":{}", device_id)?;
            }
        }
        Ok(())
    }
}

fn parse_id(part: &str, what: &str, input: &str) -> Result<i64> {
    part.parse()
        .map_err(|_| SyncError::Parse(format!("invalid {} in heartbeat key {:?}", what, input)))
}

impl FromStr for HeartbeatKey {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [a] => Ok(Self::account(parse_id(a, "account id", s)?)),
            [a, f] => Ok(Self::folder(parse_id(a, "account id", s)?, parse_id(f, "folder id", s)?)),
            [a, f, d] => Ok(Self::device(
                parse_id(a, "account id", s)?,
                parse_id(f, "folder id", s)?,
                parse_id(d, "device id", s)?,
            )),
            _ => Err(SyncError::Parse(format!("invalid heartbeat key {:?}", s))),
        }
    }
}

/// Matches keys under an account; unset parts match anything
///
/// Written `5` (whole account), `5:3`, `5:3:0` or `5:*:0` (device 0 in
/// every folder).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSelector {
    pub account_id: i64,
    pub folder_id: Option<i64>,
    pub device_id: Option<i64>,
}

impl HeartbeatSelector {
    pub fn new(account_id: i64, folder_id: Option<i64>, device_id: Option<i64>) -> Self {
        Self {
            account_id,
            folder_id,
            device_id,
        }
    }

    pub fn account(account_id: i64) -> Self {
        Self::new(account_id, None, None)
    }

    pub fn matches(&self, key: &HeartbeatKey) -> bool {
        key.account_id == self.account_id
            && self.folder_id.map_or(true, |f| key.folder_id == Some(f))
            && self.device_id.map_or(true, |d| key.device_id == Some(d))
    }
}

impl fmt::Display for HeartbeatSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.account_id)?;
        match (self.folder_id, self.device_id) {
            (None, None) => Ok(()),
            (Some(folder_id), None) => write!(f, ":{}", folder_id),
            (Some(folder_id), Some(device_id)) => write!(f, ":{}:{}", folder_id, device_id),
            (None, Some(device_id)) => write!(f, ":*:{}", device_id),
        }
    }
}

impl FromStr for HeartbeatSelector {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        let optional = |part: &str, what: &str| -> Result<Option<i64>> {
            if part == "*" {
                Ok(None)
            } else {
                parse_id(part, what, s).map(Some)
            }
        };

        let parts: Vec<&str> = s.split(':').collect();
        let (account, folder, device) = match parts.as_slice() {
            [a] => (*a, "*", "*"),
            [a, f] => (*a, *f, "*"),
            [a, f, d] => (*a, *f, *d),
            _ => return Err(SyncError::Parse(format!("invalid heartbeat selector {:?}", s))),
        };

        Ok(Self {
            account_id: parse_id(account, "account id", s)?,
            folder_id: optional(folder, "folder id")?,
            device_id: optional(device, "device id")?,
        })
    }
}

/// A key and when it was last touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatEntry {
    pub key: HeartbeatKey,
    pub last_seen: DateTime<Utc>,
}

impl HeartbeatEntry {
    /// Older than `threshold` at `now`: the owning worker looks unhealthy
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        match (now - self.last_seen).to_std() {
            Ok(age) => age > threshold,
            // last_seen is in the future
            Err(_) => false,
        }
    }
}
