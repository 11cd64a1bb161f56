//! Server Transport
//!
//! The wallet talks to servers through [`Transport`] and [`Connection`].
//! A reply is a JSON value; for most commands it is a list whose last
//! element is either a success marker or an error string.
//!
//! [`JsonRpcTransport`] is the shipped implementation: a TCP connect probe
//! for reachability and JSON-RPC 2.0 over HTTP for commands. The positional
//! command arguments are sent as `params`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::TransportError;

/// Default timeout for the reachability probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default timeout for RPC requests
pub const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC request ID counter
static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Opens connections to servers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Cheap check that a server answers at all
    async fn probe_reachable(&self, host_port: &str) -> bool;

    /// Open a command session with a server
    async fn open(&self, host_port: &str) -> Result<Box<dyn Connection>, TransportError>;
}

/// A command session with one server.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run `command` with positional `args` and return the raw reply
    async fn submit(&mut self, command: &str, args: Vec<Value>) -> Result<Value, TransportError>;

    fn is_connected(&self) -> bool;
}

/// JSON-RPC 2.0 request
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Vec<Value>,
    id: u64,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC error
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// TCP probe + JSON-RPC over HTTP.
#[derive(Debug, Clone)]
pub struct JsonRpcTransport {
    client: reqwest::Client,
    probe_timeout: Duration,
}

impl JsonRpcTransport {
    pub fn new(probe_timeout: Duration, rpc_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(rpc_timeout).build()?;

        Ok(Self {
            client,
            probe_timeout,
        })
    }
}

#[async_trait]
impl Transport for JsonRpcTransport {
    async fn probe_reachable(&self, host_port: &str) -> bool {
        match tokio::time::timeout(self.probe_timeout, TcpStream::connect(host_port)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("Probe of {} failed: {}", host_port, e);
                false
            }
            Err(_) => {
                debug!("Probe of {} timed out", host_port);
                false
            }
        }
    }

    async fn open(&self, host_port: &str) -> Result<Box<dyn Connection>, TransportError> {
        split_host_port(host_port)?;

        Ok(Box::new(RpcConnection {
            client: self.client.clone(),
            base_url: format!("http://{}", host_port),
            connected: true,
        }))
    }
}

/// Single JSON-RPC session
#[derive(Debug)]
struct RpcConnection {
    client: reqwest::Client,
    base_url: String,
    connected: bool,
}

#[async_trait]
impl Connection for RpcConnection {
    async fn submit(&mut self, command: &str, args: Vec<Value>) -> Result<Value, TransportError> {
        let id = REQUEST_ID.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: command,
            params: args,
            id,
        };

        debug!("{} -> {}", self.base_url, command);
        let response = match self.client.post(&self.base_url).json(&request).send().await {
            Ok(response) => response,
            Err(e) => {
                self.connected = false;
                if e.is_connect() {
                    return Err(TransportError::Connect(self.base_url.clone(), e.to_string()));
                }
                return Err(e.into());
            }
        };

        if !response.status().is_success() {
            return Err(TransportError::Http(response.status().to_string()));
        }

        let json_response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| TransportError::MalformedReply(e.to_string()))?;

        if let Some(error) = json_response.error {
            return Err(TransportError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(json_response.result.unwrap_or(Value::Null))
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Split `host:port`, accepting bracketed IPv6 hosts
pub fn split_host_port(host_port: &str) -> Result<(&str, u16), TransportError> {
    let invalid = || TransportError::InvalidAddress(host_port.to_string());

    let (host, port) = host_port.rsplit_once(':').ok_or_else(invalid)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok((host, port))
}
