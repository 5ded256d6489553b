//! Daemon Configuration
//!
//! The queue set and listen address come from a JSON document:
//!
//! ```json
//! { "addr": "127.0.0.1:8080",
//!   "queues": [{ "name": "app_events", "size": 10, "max_sub": 2 }] }
//! ```
//!
//! `FANOUT_`-prefixed environment variables override top-level keys
//! (e.g. `FANOUT_ADDR=0.0.0.0:9000`).

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use fanout_core::QueueConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
const DEFAULT_ADDR: &str = "127.0.0.1:8080";
const ENV_PREFIX: &str = "FANOUT";

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    addr: String,
    #[serde(default)]
    queues: Vec<QueueConfig>,
}

/// Validated daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub addr: SocketAddr,
    pub queues: Vec<QueueConfig>,
}

impl DaemonConfig {
    /// Load from a JSON file plus environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let raw: RawConfig = Config::builder()
            .set_default("addr", DEFAULT_ADDR)?
            .add_source(File::from(path).format(FileFormat::Json).required(true))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()
            .with_context(|| format!("failed to read config {}", path.display()))?
            .try_deserialize()
            .with_context(|| format!("invalid config {}", path.display()))?;

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self> {
        let addr: SocketAddr = raw
            .addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", raw.addr))?;

        let mut seen = HashSet::new();
        for queue in &raw.queues {
            if queue.name.trim().is_empty() {
                bail!("queue name must not be empty");
            }
            if !seen.insert(queue.name.as_str()) {
                bail!("duplicate queue name: {}", queue.name);
            }
        }

        Ok(Self {
            addr,
            queues: raw.queues,
        })
    }
}
