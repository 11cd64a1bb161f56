//! Server Discovery
//!
//! Finds wallet servers in two layers:
//! 1. Public server list APIs (primary) - report load and height
//! 2. The caller's seed list (fallback) - no metadata
//!
//! Servers older than the minimum protocol version and inactive servers are
//! dropped. The result keeps the order the API reported, least loaded first.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::DiscoveryError;
use crate::transport::split_host_port;

/// Public wallet server list
pub const DEFAULT_DISCOVERY_URLS: &[&str] =
    &["https://api.bismuth.live/servers/wallet/legacy.json"];

/// Oldest server version the client talks to
pub const DEFAULT_MIN_VERSION: &str = "0.1.5";

/// Timeout for a server list request
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// A wallet server and what is known about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub ip: String,
    pub port: u16,
    /// Connected clients as a percentage of the server's slots
    pub load: Option<u32>,
    /// Last reported block height
    pub height: Option<u64>,
}

impl ServerInfo {
    /// A server known only by address
    pub fn from_host_port(host_port: &str) -> Option<Self> {
        let (ip, port) = split_host_port(host_port).ok()?;
        Some(Self {
            ip: ip.to_string(),
            port,
            load: None,
            height: None,
        })
    }

    pub fn host_port(&self) -> String {
        if self.ip.contains(':') {
            format!("[{}]:{}", self.ip, self.port)
        } else {
            format!("{}:{}", self.ip, self.port)
        }
    }

    /// Same `ip:port`
    pub fn same_endpoint(&self, other: &ServerInfo) -> bool {
        self.ip == other.ip && self.port == other.port
    }
}

/// Source of the current server population.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Servers at or above `min_version`. `seed_list` is what the caller
    /// already knows and is used when nothing better is available.
    async fn list_known_servers(
        &self,
        seed_list: &[String],
        min_version: &str,
    ) -> Result<Vec<ServerInfo>, DiscoveryError>;
}

/// Server entry as published by the list API
#[derive(Debug, Deserialize)]
struct ApiServer {
    ip: String,
    port: Value,
    #[serde(default = "default_active")]
    active: bool,
    clients: Option<u64>,
    total_slots: Option<u64>,
    version: Option<String>,
    height: Option<u64>,
}

fn default_active() -> bool {
    true
}

/// Discovery through HTTP server list APIs.
#[derive(Debug, Clone)]
pub struct HttpDiscovery {
    urls: Vec<String>,
    client: reqwest::Client,
}

impl HttpDiscovery {
    pub fn new(urls: Vec<String>) -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .timeout(DISCOVERY_TIMEOUT)
            .build()
            .map_err(|e| DiscoveryError::Request("client".to_string(), e.to_string()))?;

        Ok(Self { urls, client })
    }

    async fn fetch(&self, url: &str) -> Result<Value, DiscoveryError> {
        let request_error = |e: reqwest::Error| DiscoveryError::Request(url.to_string(), e.to_string());

        self.client
            .get(url)
            .send()
            .await
            .map_err(request_error)?
            .error_for_status()
            .map_err(request_error)?
            .json()
            .await
            .map_err(request_error)
    }
}

#[async_trait]
impl Discovery for HttpDiscovery {
    async fn list_known_servers(
        &self,
        seed_list: &[String],
        min_version: &str,
    ) -> Result<Vec<ServerInfo>, DiscoveryError> {
        let mut servers = Vec::new();

        // 1. Server list APIs
        for url in &self.urls {
            match self.fetch(url).await {
                Ok(list) => {
                    let parsed = parse_server_list(&list, min_version);
                    debug!("Server list {} returned {} servers", url, parsed.len());
                    servers.extend(parsed);
                }
                Err(e) => {
                    debug!("{}", e);
                }
            }
        }

        // 2. Fall back to the seed list
        if servers.is_empty() {
            info!("Server list unavailable, using seed list");
            servers.extend(seed_list.iter().filter_map(|s| ServerInfo::from_host_port(s)));
        }

        let servers = dedup(servers);
        if servers.is_empty() {
            return Err(DiscoveryError::Unavailable);
        }

        info!("Discovered {} wallet servers", servers.len());
        Ok(servers)
    }
}

/// Turn a server list API reply into active servers at or above
/// `min_version`, least loaded first
pub fn parse_server_list(list: &Value, min_version: &str) -> Vec<ServerInfo> {
    let Some(items) = list.as_array() else {
        return Vec::new();
    };
    let min_version = parse_version(min_version);

    let mut servers: Vec<ServerInfo> = items
        .iter()
        .filter_map(|item| serde_json::from_value::<ApiServer>(item.clone()).ok())
        .filter(|server| server.active)
        .filter(|server| match (&min_version, &server.version) {
            (Some(min), Some(version)) => parse_version(version).is_some_and(|v| v >= *min),
            _ => true,
        })
        .filter_map(|server| {
            let port = match &server.port {
                Value::Number(n) => u16::try_from(n.as_u64()?).ok()?,
                Value::String(s) => s.parse().ok()?,
                _ => return None,
            };
            let load = match (server.clients, server.total_slots) {
                (Some(clients), Some(slots)) if slots > 0 => {
                    Some(u32::try_from(clients * 100 / slots).unwrap_or(u32::MAX))
                }
                _ => None,
            };
            Some(ServerInfo {
                ip: server.ip,
                port,
                load,
                height: server.height,
            })
        })
        .collect();

    // Stable, unknown load last
    servers.sort_by_key(|server| server.load.unwrap_or(u32::MAX));
    servers
}

/// Lenient semver parse: `0.1` and `v0.1.5` are accepted
fn parse_version(version: &str) -> Option<semver::Version> {
    let version = version.trim().trim_start_matches('v');
    semver::Version::parse(version)
        .ok()
        .or_else(|| semver::Version::parse(&format!("{version}.0")).ok())
        .or_else(|| semver::Version::parse(&format!("{version}.0.0")).ok())
}

/// Drop repeated `ip:port` entries, keeping the first
fn dedup(servers: Vec<ServerInfo>) -> Vec<ServerInfo> {
    let mut seen = HashSet::new();
    servers
        .into_iter()
        .filter(|server| seen.insert((server.ip.clone(), server.port)))
        .collect()
}
