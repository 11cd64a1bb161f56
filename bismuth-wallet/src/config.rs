//! Configuration for the wallet client.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::discovery::{DEFAULT_DISCOVERY_URLS, DEFAULT_MIN_VERSION};
use crate::transport::split_host_port;

/// Directory under the home directory holding the client's files
pub const DATA_DIR: &str = ".bismuth-wallet";

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Wallet container file
    #[serde(default = "default_wallet_file")]
    pub wallet_file: PathBuf,

    /// Static `ip:port` server list; empty means "ask discovery"
    #[serde(default)]
    pub servers: Vec<String>,

    /// Server list APIs used for discovery
    #[serde(default = "default_discovery_urls")]
    pub discovery_urls: Vec<String>,

    /// Oldest server version to accept from discovery
    #[serde(default = "default_min_version")]
    pub min_version: String,

    /// Optional file persisting resolved aliases
    #[serde(default)]
    pub alias_cache_file: Option<PathBuf>,

    /// How long balance, status and history results are reused
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Reachability probe timeout
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Command timeout
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,
}

/// `~/.bismuth-wallet`, or the working directory when there is no home
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(DATA_DIR))
        .unwrap_or_else(|| PathBuf::from(DATA_DIR))
}

fn default_wallet_file() -> PathBuf {
    data_dir().join("wallet.json")
}

fn default_discovery_urls() -> Vec<String> {
    DEFAULT_DISCOVERY_URLS.iter().map(|s| s.to_string()).collect()
}

fn default_min_version() -> String {
    DEFAULT_MIN_VERSION.to_string()
}

fn default_cache_ttl() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    3
}

fn default_rpc_timeout() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            wallet_file: default_wallet_file(),
            servers: Vec::new(),
            discovery_urls: default_discovery_urls(),
            min_version: default_min_version(),
            alias_cache_file: None,
            cache_ttl_secs: default_cache_ttl(),
            probe_timeout_secs: default_probe_timeout(),
            rpc_timeout_secs: default_rpc_timeout(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        data_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        for server in &self.servers {
            split_host_port(server)
                .map_err(|_| anyhow::anyhow!("server {:?} is not an ip:port pair", server))?;
        }

        if self.servers.is_empty() && self.discovery_urls.is_empty() {
            anyhow::bail!("Either servers or discovery_urls must be specified");
        }

        if semver::Version::parse(&self.min_version).is_err() {
            anyhow::bail!("min_version must be a semantic version, got {}", self.min_version);
        }

        if self.probe_timeout_secs == 0 || self.rpc_timeout_secs == 0 {
            anyhow::bail!("Timeouts must be at least one second");
        }

        if self.cache_ttl_secs > 3600 {
            tracing::warn!(
                "Long cache TTL ({}s) may show stale balances",
                self.cache_ttl_secs
            );
        }

        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}
