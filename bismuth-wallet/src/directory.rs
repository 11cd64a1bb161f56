//! Server Directory
//!
//! Keeps the list of known wallet servers and the current session.
//!
//! Selection is first-fit: candidates are probed in the order they were
//! received and the first reachable one wins. Discovery and probe failures
//! never escape this module. A failed discovery keeps the servers already
//! known; when none of them answers the directory is left without a server
//! and the caller decides when to try again.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::discovery::{Discovery, ServerInfo, DEFAULT_MIN_VERSION};
use crate::transport::{Connection, Transport};

/// Known servers and the active connection.
pub struct ServerDirectory {
    /// Static list given by the caller; empty means "use discovery"
    initial_servers: Vec<String>,
    /// Candidate `ip:port` list, in selection order
    servers: Vec<String>,
    /// Candidates with metadata
    full_servers: Vec<ServerInfo>,
    current_server: Option<String>,
    connection: Option<Box<dyn Connection>>,
    min_version: String,
    transport: Arc<dyn Transport>,
    discovery: Arc<dyn Discovery>,
}

impl ServerDirectory {
    pub fn new(
        initial_servers: Vec<String>,
        transport: Arc<dyn Transport>,
        discovery: Arc<dyn Discovery>,
    ) -> Self {
        Self {
            servers: initial_servers.clone(),
            full_servers: initial_servers
                .iter()
                .filter_map(|s| ServerInfo::from_host_port(s))
                .collect(),
            initial_servers,
            current_server: None,
            connection: None,
            min_version: DEFAULT_MIN_VERSION.to_string(),
            transport,
            discovery,
        }
    }

    /// Minimum server version asked from discovery
    pub fn with_min_version(mut self, min_version: impl Into<String>) -> Self {
        self.min_version = min_version.into();
        self
    }

    /// Pick the first reachable server.
    ///
    /// Uses the static list when one was configured, discovery otherwise.
    /// Returns the selected `ip:port`, or `None` when nothing answered.
    pub async fn select_server(&mut self) -> Option<String> {
        if self.initial_servers.is_empty() {
            let discovered = self.discover().await;
            if discovered.is_empty() {
                debug!("Discovery returned nothing, keeping {} known servers", self.servers.len());
            } else {
                self.set_candidates(discovered);
            }
        } else {
            self.servers = self.initial_servers.clone();
            self.full_servers = self
                .initial_servers
                .iter()
                .filter_map(|s| ServerInfo::from_host_port(s))
                .collect();
        }

        debug!("Server candidates: {:?}", self.servers);
        let candidates = self.servers.clone();
        for server in candidates {
            debug!("Probing {}", server);
            if self.transport.probe_reachable(&server).await && self.connect(&server).await {
                info!("Using server {}", server);
                return Some(server);
            }
        }

        warn!("No reachable server among {} candidates", self.servers.len());
        self.disconnect();
        None
    }

    /// Use `host_port` if it answers a probe, bypassing discovery
    pub async fn set_server(&mut self, host_port: &str) -> Option<String> {
        if !self.transport.probe_reachable(host_port).await {
            warn!("Server {} is not reachable", host_port);
            self.disconnect();
            return None;
        }
        if self.connect(host_port).await {
            info!("Using server {}", host_port);
            Some(host_port.to_string())
        } else {
            None
        }
    }

    /// Re-query discovery and merge the result with the known servers.
    ///
    /// Servers missing from the fresh list are kept.
    pub async fn refresh(&mut self) {
        let mut merged = self.discover().await;
        for known in &self.full_servers {
            if !merged.iter().any(|fresh| fresh.same_endpoint(known)) {
                merged.push(known.clone());
            }
        }
        debug!("Server list after refresh: {} entries", merged.len());
        self.set_candidates(merged);
    }

    /// Forget the current server after a failed command
    pub fn mark_failed(&mut self) {
        if let Some(server) = self.current_server.take() {
            warn!("Dropping server {} after a failure", server);
        }
        self.connection = None;
    }

    pub fn current_server(&self) -> Option<&str> {
        self.current_server.as_deref()
    }

    /// Candidate `ip:port` list
    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    /// Candidates with load and height, when known
    pub fn full_servers(&self) -> &[ServerInfo] {
        &self.full_servers
    }

    /// The live connection, if a server is selected
    pub fn connection_mut(&mut self) -> Option<&mut (dyn Connection + 'static)> {
        self.connection.as_deref_mut()
    }

    async fn discover(&self) -> Vec<ServerInfo> {
        match self
            .discovery
            .list_known_servers(&self.initial_servers, &self.min_version)
            .await
        {
            Ok(servers) => servers,
            Err(e) => {
                warn!("Server discovery failed: {}", e);
                Vec::new()
            }
        }
    }

    fn set_candidates(&mut self, servers: Vec<ServerInfo>) {
        let mut unique: Vec<ServerInfo> = Vec::with_capacity(servers.len());
        for server in servers {
            if !unique.iter().any(|known| known.same_endpoint(&server)) {
                unique.push(server);
            }
        }
        self.servers = unique.iter().map(ServerInfo::host_port).collect();
        self.full_servers = unique;
    }

    async fn connect(&mut self, host_port: &str) -> bool {
        match self.transport.open(host_port).await {
            Ok(connection) => {
                self.current_server = Some(host_port.to_string());
                self.connection = Some(connection);
                true
            }
            Err(e) => {
                warn!("Could not open a session with {}: {}", host_port, e);
                self.disconnect();
                false
            }
        }
    }

    fn disconnect(&mut self) {
        self.current_server = None;
        self.connection = None;
    }
}

impl std::fmt::Debug for ServerDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDirectory")
            .field("servers", &self.servers)
            .field("current_server", &self.current_server)
            .finish()
    }
}
