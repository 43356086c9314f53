use crate::error::{Result, SyncError};
use crate::supervisor::{EscalationPolicy, RestartPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix of environment variables overriding the config file
/// (e.g. `MAILSYNC__SYNC__POLL_INTERVAL_MS=5000`)
pub const ENV_PREFIX: &str = "MAILSYNC";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub heartbeat: HeartbeatConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Name this process claims accounts under (`desired_sync_host`)
    pub hostname: String,
    /// Device id used in heartbeat keys
    pub device_id: i64,
    pub poll_interval_ms: u64,
    /// How often a monitor reconciles its folder workers with the remote folder list
    pub folder_refresh_interval_ms: u64,
    /// How often the service looks for accounts assigned to this host
    pub account_poll_interval_ms: u64,
    /// Upper bound on waiting for a worker to stop
    pub shutdown_grace_ms: u64,
    pub restart: RestartPolicy,
    pub escalation: EscalationPolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub host: String,
    pub port: u16,
    pub listen_addr: String,
    /// Entries older than this are reported as stale
    pub stale_after_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub hosts: Vec<DatabaseHost>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseHost {
    pub name: String,
    #[serde(default)]
    pub shards: Vec<ShardConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShardConfig {
    pub id: i64,
    pub url: String,
    #[serde(default)]
    pub disabled: bool,
    /// Pool size for this shard
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    crate::store::DEFAULT_MAX_CONNECTIONS
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            hostname: gethostname::gethostname().to_string_lossy().into_owned(),
            device_id: 0,
            poll_interval_ms: 30000,
            folder_refresh_interval_ms: 60000,
            account_poll_interval_ms: 10000,
            shutdown_grace_ms: 10000,
            restart: RestartPolicy::default(),
            escalation: EscalationPolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn folder_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.folder_refresh_interval_ms)
    }

    pub fn account_poll_interval(&self) -> Duration {
        Duration::from_millis(self.account_poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7480,
            listen_addr: "0.0.0.0:7480".to_string(),
            stale_after_secs: 300,
        }
    }
}

impl HeartbeatConfig {
    /// Address the registry client connects to
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then apply
    /// `MAILSYNC__*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(SyncError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(
                ::config::File::from(path).format(::config::FileFormat::Toml),
            );
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (no environment overrides)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from_str(content, ::config::FileFormat::Toml))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.sync.hostname.is_empty() {
            return Err(SyncError::Config("sync.hostname must not be empty".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for host in &self.database.hosts {
            for shard in &host.shards {
                if shard.max_connections == 0 {
                    return Err(SyncError::Config(format!(
                        "Shard {} needs at least one connection",
                        shard.id
                    )));
                }
                if !seen.insert(shard.id) {
                    return Err(SyncError::Config(format!(
                        "Shard {} configured more than once",
                        shard.id
                    )));
                }
            }
        }

        Ok(())
    }
}
