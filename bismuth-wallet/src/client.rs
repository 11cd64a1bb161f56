//! Wallet Client
//!
//! [`WalletClient`] ties the wallet store, the server directory, the caches
//! and the transaction pipeline together behind one API for front ends.
//!
//! The client keeps the selected address, and every address change clears
//! the session cache since cached balances and histories belong to the
//! previous address. Servers are selected lazily on the first command.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cache::{AliasCache, SessionCache};
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::crypto::{CryptoProvider, StandardCrypto};
use crate::directory::ServerDirectory;
use crate::discovery::{Discovery, HttpDiscovery, ServerInfo};
use crate::error::{Result, TransportError, WalletError};
use crate::keys::AddressRecord;
use crate::transaction::{
    format_amount, parse_amount, SendOutcome, TransactionEntry, TransactionPipeline,
    SUBMIT_COMMAND,
};
use crate::transport::{JsonRpcTransport, Transport};
use crate::wallet::{AddressBook, WalletInfo, WalletStore};

/// Label of the address created in a new wallet
pub const DEFAULT_LABEL: &str = "default";

/// The external services the client runs on.
#[derive(Clone)]
pub struct Collaborators {
    pub crypto: Arc<dyn CryptoProvider>,
    pub transport: Arc<dyn Transport>,
    pub discovery: Arc<dyn Discovery>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Shipped implementations, configured from `config`
    pub fn standard(config: &ClientConfig) -> Result<Self> {
        let discovery = HttpDiscovery::new(config.discovery_urls.clone())?;

        Ok(Self {
            crypto: Arc::new(StandardCrypto::new()),
            transport: Arc::new(JsonRpcTransport::new(
                config.probe_timeout(),
                config.rpc_timeout(),
            )?),
            discovery: Arc::new(discovery),
            clock: Arc::new(SystemClock),
        })
    }
}

/// Balance of an address, or why there is none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Balance {
    /// Smallest units
    Amount(u64),
    /// The server could not be asked
    Unavailable,
}

impl std::fmt::Display for Balance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Balance::Amount(units) => write!(f, "{}", format_amount(*units)),
            Balance::Unavailable => write!(f, "N/A"),
        }
    }
}

/// Server status with a few derived fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerStatus {
    /// Fields as reported by the server
    pub fields: Map<String, Value>,
    /// Uptime as `[D day(s), ]H:MM:SS`, or `N/A`
    pub uptime_human: String,
    /// Wallet server status, when available
    pub extended: Option<Value>,
    /// Local time minus server time, seconds
    pub time_drift: f64,
}

/// Connection snapshot for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientInfo {
    pub wallet: PathBuf,
    pub address: Option<String>,
    pub server: Option<String>,
    pub servers: Vec<String>,
    pub full_servers: Vec<ServerInfo>,
    pub connected: bool,
}

/// Cached query results
#[derive(Debug, Clone)]
enum CachedValue {
    Balance(u64),
    History(Vec<TransactionEntry>),
    Status(ServerStatus),
}

/// Wallet client façade.
pub struct WalletClient {
    wallet: WalletStore,
    directory: ServerDirectory,
    pipeline: TransactionPipeline,
    cache: SessionCache<CachedValue>,
    aliases: AliasCache,
    crypto: Arc<dyn CryptoProvider>,
    clock: Arc<dyn Clock>,
    address: Option<String>,
    time_drift: f64,
    cache_ttl: Duration,
}

impl WalletClient {
    /// Load the wallet and prepare the server directory.
    ///
    /// An empty, unlocked wallet gets a first address labelled `default`.
    pub fn open(config: &ClientConfig, collaborators: Collaborators) -> Result<Self> {
        let Collaborators {
            crypto,
            transport,
            discovery,
            clock,
        } = collaborators;

        let mut wallet =
            WalletStore::load(&config.wallet_file, None, crypto.clone(), clock.clone())?;
        if !wallet.is_locked() && wallet.info().count == 0 {
            info!("Empty wallet, creating a first address");
            wallet.new_address(DEFAULT_LABEL, "", "")?;
        }

        let aliases = match &config.alias_cache_file {
            Some(path) => AliasCache::load(path)?,
            None => AliasCache::new(),
        };

        let mut client = Self {
            wallet,
            directory: ServerDirectory::new(config.servers.clone(), transport, discovery)
                .with_min_version(config.min_version.clone()),
            pipeline: TransactionPipeline::new(crypto.clone(), clock.clone()),
            cache: SessionCache::new(clock.clone()),
            aliases,
            crypto,
            clock,
            address: None,
            time_drift: 0.0,
            cache_ttl: config.cache_ttl(),
        };
        client.sync_address();
        Ok(client)
    }

    // ------------------------------------------------------------------
    // Addresses
    // ------------------------------------------------------------------

    /// Decrypted addresses, selected first
    pub fn addresses(&self) -> &AddressBook {
        self.wallet.addresses()
    }

    pub fn current_address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn set_address(&mut self, address: &str) -> Result<()> {
        let result = self.wallet.set_address(address);
        self.sync_address();
        result
    }

    pub fn new_address(&mut self, label: &str, password: &str, salt: &str) -> Result<String> {
        let result = self.wallet.new_address(label, password, salt);
        self.sync_address();
        result
    }

    pub fn set_label(&mut self, address: &str, label: &str) -> Result<()> {
        self.wallet.set_label(address, label)
    }

    pub fn import_key_file(
        &mut self,
        path: impl AsRef<Path>,
        label: &str,
        source_password: &str,
    ) -> Result<String> {
        let result = self.wallet.import_key_file(path, label, source_password);
        self.sync_address();
        result
    }

    pub fn set_spend(&mut self, kind: Option<&str>, value: &str, password: &str) -> Result<()> {
        self.wallet.set_spend(kind, value, password)
    }

    pub fn wallet_info(&self) -> WalletInfo {
        self.wallet.info()
    }

    /// Direct access to the wallet store
    pub fn wallet(&self) -> &WalletStore {
        &self.wallet
    }

    // ------------------------------------------------------------------
    // Lock lifecycle
    // ------------------------------------------------------------------

    pub fn encrypt_wallet(&mut self, password: &str) -> Result<()> {
        self.wallet.encrypt(password)
    }

    pub fn lock(&mut self) -> Result<()> {
        let result = self.wallet.lock();
        self.sync_address();
        result
    }

    pub fn unlock(&mut self, password: &str) -> Result<()> {
        let result = self.wallet.unlock(password);
        self.sync_address();
        result
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Balance of the selected address
    pub async fn balance(&mut self) -> Result<Balance> {
        let address = self.require_address()?;

        if let Some(CachedValue::Balance(units)) = self.cache.get("balance", self.cache_ttl) {
            return Ok(Balance::Amount(units));
        }

        match self.command("balanceget", vec![Value::from(address)]).await {
            Ok(reply) => match first_amount(&reply) {
                Some(units) => {
                    self.cache.set("balance", CachedValue::Balance(units));
                    Ok(Balance::Amount(units))
                }
                None => {
                    warn!("Unexpected balance reply: {}", reply);
                    Ok(Balance::Unavailable)
                }
            },
            Err(e) => {
                error!("Balance unavailable: {}", e);
                Ok(Balance::Unavailable)
            }
        }
    }

    /// Combined balance of every unlocked address
    pub async fn global_balance(&mut self) -> Result<Balance> {
        self.require_address()?;
        let addresses: Vec<Value> = self
            .wallet
            .addresses()
            .iter()
            .map(|record| Value::from(record.address.clone()))
            .collect();

        match self
            .command("globalbalanceget", vec![Value::Array(addresses)])
            .await
        {
            Ok(reply) => Ok(first_amount(&reply)
                .map(Balance::Amount)
                .unwrap_or(Balance::Unavailable)),
            Err(e) => {
                error!("Global balance unavailable: {}", e);
                Ok(Balance::Unavailable)
            }
        }
    }

    /// The latest `num` transactions of the selected address, skipping
    /// `offset`. Failures are logged and give an empty list.
    pub async fn latest_transactions(
        &mut self,
        num: usize,
        offset: usize,
    ) -> Result<Vec<TransactionEntry>> {
        let address = self.require_address()?;

        let key = format!("tx{}-{}", num, offset);
        if let Some(CachedValue::History(entries)) = self.cache.get(&key, self.cache_ttl) {
            return Ok(entries);
        }

        let reply = if offset == 0 {
            self.command("addlistlim", vec![Value::from(address), Value::from(num)])
                .await
        } else {
            self.command(
                "addlistlimfrom",
                vec![Value::from(address), Value::from(num), Value::from(offset)],
            )
            .await
        };

        let rows = match reply {
            Ok(Value::Array(rows)) => rows,
            Ok(other) => {
                error!("Unexpected history reply: {}", other);
                return Ok(Vec::new());
            }
            Err(e) => {
                error!("History unavailable: {}", e);
                return Ok(Vec::new());
            }
        };

        let entries = match rows
            .iter()
            .map(TransactionEntry::from_row)
            .collect::<std::result::Result<Vec<_>, _>>()
        {
            Ok(entries) => entries,
            Err(e) => {
                error!("History unavailable: {}", e);
                return Ok(Vec::new());
            }
        };

        self.cache.set(key, CachedValue::History(entries.clone()));
        Ok(entries)
    }

    /// Server status. Also measures the clock drift used to stamp
    /// transactions.
    pub async fn status(&mut self) -> Result<ServerStatus> {
        if let Some(CachedValue::Status(status)) = self.cache.get("status", self.cache_ttl) {
            return Ok(status);
        }

        let fields = match self.command("statusjson", Vec::new()).await? {
            Value::Object(fields) => fields,
            other => {
                return Err(TransportError::MalformedReply(format!(
                    "status is not an object: {other}"
                ))
                .into())
            }
        };

        let uptime_human = fields
            .get("uptime")
            .and_then(as_f64)
            .map(|secs| format_uptime(secs.max(0.0) as u64))
            .unwrap_or_else(|| "N/A".to_string());

        let extended = match self.command("wstatusget", Vec::new()).await {
            Ok(extended) => Some(extended),
            Err(e) => {
                warn!("Extended status unavailable: {}", e);
                None
            }
        };

        self.time_drift = match fields.get("server_timestamp").and_then(as_f64) {
            Some(server_time) => self.clock.now() - server_time,
            None => 0.0,
        };
        debug!("Clock drift {:.2}s", self.time_drift);

        let status = ServerStatus {
            fields,
            uptime_human,
            extended,
            time_drift: self.time_drift,
        };
        self.cache.set("status", CachedValue::Status(status.clone()));
        Ok(status)
    }

    pub fn info(&mut self) -> ClientInfo {
        let connected = self
            .directory
            .connection_mut()
            .map(|connection| connection.is_connected())
            .unwrap_or(false);

        ClientInfo {
            wallet: self.wallet.path().to_path_buf(),
            address: self.address.clone(),
            server: self.directory.current_server().map(str::to_string),
            servers: self.directory.servers().to_vec(),
            full_servers: self.directory.full_servers().to_vec(),
            connected,
        }
    }

    // ------------------------------------------------------------------
    // Send
    // ------------------------------------------------------------------

    /// Sign and submit a transaction from the selected address.
    ///
    /// Rejections and timeouts come back as [`SendOutcome::Failed`];
    /// errors are reserved for precondition failures.
    pub async fn send(
        &mut self,
        recipient: &str,
        amount: u64,
        operation: &str,
        memo: &str,
    ) -> Result<SendOutcome> {
        TransactionPipeline::check_policy(recipient, memo)?;

        let sender = self.current_key()?.clone();
        let tx = self.pipeline.build_and_sign(
            &sender,
            recipient,
            amount,
            operation,
            memo,
            self.time_drift,
        )?;

        info!(
            "Sending {} from {} to {}",
            tx.payload.amount, tx.payload.sender, tx.payload.recipient
        );
        match self.command(SUBMIT_COMMAND, tx.submission_args()).await {
            Ok(reply) => Ok(TransactionPipeline::evaluate_reply(&reply, &tx.txid)),
            Err(WalletError::Transport(e)) => Ok(TransactionPipeline::transport_failure(&e)),
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Sign a message with the selected address
    pub fn sign_message(&self, message: &str) -> Result<String> {
        let key = self.current_key()?;
        Ok(self.crypto.sign_message(message, &key.private_key)?)
    }

    /// Encrypt a message for `recipient`, fetching its public key
    pub async fn encrypt_message(&mut self, message: &str, recipient: &str) -> Result<String> {
        let reply = self
            .command("pubkeyget", vec![Value::from(recipient)])
            .await?;
        let public_key = public_key_from_reply(&reply).ok_or_else(|| {
            TransportError::MalformedReply(format!("no public key for {recipient}"))
        })?;

        Ok(self.crypto.encrypt_for_recipient(message, &public_key)?)
    }

    /// Decrypt a message sent to the selected address
    pub fn decrypt_message(&self, ciphertext: &str) -> Result<String> {
        let key = self.current_key()?;
        Ok(self.crypto.decrypt(ciphertext, &key.private_key)?)
    }

    // ------------------------------------------------------------------
    // Servers
    // ------------------------------------------------------------------

    pub fn servers(&self) -> &[String] {
        self.directory.servers()
    }

    pub fn current_server(&self) -> Option<&str> {
        self.directory.current_server()
    }

    pub async fn select_server(&mut self) -> Option<String> {
        self.directory.select_server().await
    }

    pub async fn set_server(&mut self, host_port: &str) -> Option<String> {
        self.directory.set_server(host_port).await
    }

    pub async fn refresh_servers(&mut self) {
        self.directory.refresh().await
    }

    // ------------------------------------------------------------------
    // Aliases
    // ------------------------------------------------------------------

    /// Back the alias cache with a file, loading what it holds
    pub fn set_alias_cache_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.aliases = AliasCache::load(path)?;
        Ok(())
    }

    /// Alias of each address (the address itself when it has none).
    ///
    /// Addresses missing from the cache are resolved with a single command.
    pub async fn resolve_aliases(
        &mut self,
        addresses: &[String],
    ) -> Result<BTreeMap<String, String>> {
        let now = self.clock.now();
        let (mut resolved, misses) = self.aliases.partition(addresses, now);
        if misses.is_empty() {
            return Ok(resolved);
        }

        let args = vec![Value::Array(misses.iter().cloned().map(Value::from).collect())];
        let reply = self.command("aliasesget", args).await?;
        let aliases = reply
            .as_array()
            .filter(|aliases| aliases.len() == misses.len())
            .ok_or_else(|| TransportError::MalformedReply(format!("aliasesget: {reply}")))?;

        for (address, alias) in misses.iter().zip(aliases) {
            let alias = alias.as_str().unwrap_or(address.as_str());
            self.aliases.record(address, alias, now);
            resolved.insert(address.clone(), alias.to_string());
        }

        if let Err(e) = self.aliases.save() {
            warn!("Could not save alias cache: {}", e);
        }
        Ok(resolved)
    }

    /// Does `address` have an alias
    pub async fn has_alias(&mut self, address: &str) -> Result<bool> {
        let resolved = self.resolve_aliases(&[address.to_string()]).await?;
        Ok(resolved
            .get(address)
            .is_some_and(|alias| alias.as_str() != address))
    }

    /// Is `alias` registered. Cached aliases answer directly; otherwise the
    /// server is asked and the answer is not cached.
    pub async fn alias_exists(&mut self, alias: &str) -> Result<bool> {
        if self.aliases.find_alias(alias).is_some() {
            return Ok(true);
        }

        let reply = self.command("aliascheck", vec![Value::from(alias)]).await?;
        match reply {
            Value::Bool(registered) => Ok(registered),
            Value::String(text) if text == "Alias free" => Ok(false),
            Value::String(text) if text == "Alias registered" => Ok(true),
            other => Err(TransportError::MalformedReply(format!("aliascheck: {other}")).into()),
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Run a server command, selecting a server first if needed.
    ///
    /// A transport failure drops the current server so the next command
    /// selects again.
    pub async fn command(&mut self, command: &str, args: Vec<Value>) -> Result<Value> {
        if self.directory.current_server().is_none() {
            self.directory.select_server().await;
        }

        let connection = self
            .directory
            .connection_mut()
            .ok_or(WalletError::NoServerAvailable)?;

        debug!("command {} {:?}", command, args);
        let result = connection.submit(command, args).await;
        match result {
            Ok(reply) => Ok(reply),
            Err(e) => {
                if e.is_connection_failure() {
                    self.directory.mark_failed();
                }
                Err(e.into())
            }
        }
    }

    fn require_address(&self) -> Result<String> {
        if self.wallet.is_locked() {
            return Err(WalletError::MustUnlock);
        }
        self.address.clone().ok_or(WalletError::NoAddressSelected)
    }

    fn current_key(&self) -> Result<&AddressRecord> {
        let address = self.require_address()?;
        self.wallet.get_key(&address)
    }

    /// Follow the wallet's selection, clearing the cache on change
    fn sync_address(&mut self) {
        let selected = self.wallet.selected_address().map(str::to_string);
        if selected != self.address {
            self.cache.invalidate_all();
            self.address = selected;
        }
    }
}

impl std::fmt::Debug for WalletClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletClient")
            .field("wallet", &self.wallet)
            .field("directory", &self.directory)
            .field("address", &self.address)
            .field("time_drift", &self.time_drift)
            .finish()
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// First element of a balance reply as smallest units
fn first_amount(reply: &Value) -> Option<u64> {
    let first = match reply {
        Value::Array(items) => items.first()?,
        other => other,
    };
    let text = match first {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    parse_amount(&text).ok()
}

/// Public key out of a `pubkeyget` reply. Servers hand keys out base64
/// encoded; a key that does not decode is used as is.
fn public_key_from_reply(reply: &Value) -> Option<String> {
    let raw = match reply {
        Value::Array(items) => items.first()?.as_str()?,
        Value::String(s) => s.as_str(),
        _ => return None,
    }
    .trim();
    if raw.is_empty() {
        return None;
    }

    let decoded = STANDARD
        .decode(raw)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .filter(|key| hex::decode(key.trim()).is_ok_and(|bytes| bytes.len() == 32));
    Some(decoded.unwrap_or_else(|| raw.to_string()))
}

/// `timedelta`-style uptime: `H:MM:SS`, with a day count when needed
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    match days {
        0 => format!("{}:{:02}:{:02}", hours, minutes, seconds),
        1 => format!("1 day, {}:{:02}:{:02}", hours, minutes, seconds),
        n => format!("{} days, {}:{:02}:{:02}", n, hours, minutes, seconds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(0), "0:00:00");
        assert_eq!(format_uptime(3725), "1:02:05");
        assert_eq!(format_uptime(86_400), "1 day, 0:00:00");
        assert_eq!(format_uptime(2 * 86_400 + 61), "2 days, 0:01:01");
    }

    #[test]
    fn test_first_amount() {
        assert_eq!(first_amount(&json!(["1.5", "0", "0"])), Some(150_000_000));
        assert_eq!(first_amount(&json!(["0E-8"])), Some(0));
        assert_eq!(first_amount(&json!([2])), Some(200_000_000));
        assert_eq!(first_amount(&json!([])), None);
        assert_eq!(first_amount(&json!([{"x": 1}])), None);
    }

    #[test]
    fn test_public_key_from_reply() {
        let hex_key = "ab".repeat(32);
        let encoded = STANDARD.encode(hex_key.as_bytes());

        assert_eq!(public_key_from_reply(&json!(encoded)), Some(hex_key.clone()));
        assert_eq!(public_key_from_reply(&json!([encoded])), Some(hex_key.clone()));
        assert_eq!(public_key_from_reply(&json!(hex_key)), Some(hex_key));
        assert_eq!(public_key_from_reply(&json!("")), None);
        assert_eq!(public_key_from_reply(&json!(null)), None);
    }

    #[test]
    fn test_balance_display() {
        assert_eq!(Balance::Amount(150_000_000).to_string(), "1.50000000");
        assert_eq!(Balance::Unavailable.to_string(), "N/A");
    }
}
