//! Client configuration.
//!
//! Layered lowest to highest: built-in defaults, TOML file, `KEEPER_*`
//! environment variables. The daemon applies CLI overrides on top.

use crate::{KeeperError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_REMOTE_ADDRESS: &str = ":5001";
const DEFAULT_LOG_LEVEL: &str = "debug";
const DEFAULT_SYNC_INTERVAL_MS: u64 = 2000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Address of the remote store, handed to the transport layer.
    pub remote_address: String,
    pub log_level: String,
    /// Period of the background push.
    pub sync_interval_ms: u64,
    /// Deadline for each individual remote call.
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            remote_address: DEFAULT_REMOTE_ADDRESS.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl ClientConfig {
    /// Parse a TOML file; keys it omits keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml_dep::from_str(&content)
            .map_err(|e| KeeperError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then `path` when it exists, then the process environment.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) if path.exists() => Self::load(path)?,
            _ => Self::default(),
        };
        config.with_env(|key| std::env::var(key).ok())
    }

    /// Apply `KEEPER_*` overrides read through `lookup`.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("KEEPER_REMOTE_ADDRESS") {
            self.remote_address = addr;
        }
        if let Some(level) = lookup("KEEPER_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(ms) = lookup("KEEPER_SYNC_INTERVAL_MS") {
            self.sync_interval_ms = parse_millis("KEEPER_SYNC_INTERVAL_MS", &ms)?;
        }
        if let Some(ms) = lookup("KEEPER_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse_millis("KEEPER_REQUEST_TIMEOUT_MS", &ms)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync_interval_ms == 0 {
            return Err(KeeperError::Config("sync_interval_ms must be positive".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(KeeperError::Config(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn parse_millis(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|e| KeeperError::Config(format!("{}={:?}: {}", key, raw, e)))
}
