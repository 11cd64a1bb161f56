//! Wallet Container Storage
//!
//! The wallet file is a JSON document:
//!
//! ```json
//! { "salt": "...", "spend": {"type": null, "value": null}, "version": "0.2.0",
//!   "coin": "bis", "encrypted": false, "addresses": [ ... ] }
//! ```
//!
//! In a plaintext wallet `spend` is an object and every `addresses` item is
//! an [`AddressRecord`]. Once encrypted, both become sealed strings produced
//! by the crypto collaborator. Only the wallet store knows how to open them;
//! this module just moves the container to and from disk.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::Result;
use crate::keys::AddressRecord;

/// Coin tag written into new containers
pub const COIN: &str = "bis";

/// Characters a fresh container salt is drawn from
const SALT_CHARSET: &[u8] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ&~#{([|-\\_@)]=}+-*/<>!,;:.?%";

/// Spend protection policy, `{"type": ..., "value": ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendPolicy {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub value: Option<String>,
}

/// An `addresses` item as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AddressEntry {
    Plain(AddressRecord),
    Sealed(String),
}

/// The `spend` field as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpendEntry {
    Plain(SpendPolicy),
    Sealed(String),
}

impl Default for SpendEntry {
    fn default() -> Self {
        SpendEntry::Plain(SpendPolicy::default())
    }
}

/// On-disk wallet container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletFile {
    /// Per-wallet salt, handed to key generation
    pub salt: String,

    #[serde(default)]
    pub spend: SpendEntry,

    /// Version of the client that created the file
    #[serde(default)]
    pub version: String,

    #[serde(default = "default_coin")]
    pub coin: String,

    #[serde(default)]
    pub encrypted: bool,

    #[serde(default)]
    pub addresses: Vec<AddressEntry>,
}

fn default_coin() -> String {
    COIN.to_string()
}

impl WalletFile {
    /// A fresh, empty, plaintext container with a random salt
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let len = rng.gen_range(10..=20);
        let salt = (0..len)
            .map(|_| SALT_CHARSET[rng.gen_range(0..SALT_CHARSET.len())] as char)
            .collect();

        Self {
            salt,
            spend: SpendEntry::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            coin: COIN.to_string(),
            encrypted: false,
            addresses: Vec::new(),
        }
    }

    /// Load the container at `path`, creating and saving a new one if the
    /// file does not exist yet
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if Self::exists(path) {
            return Self::load(path);
        }

        debug!("Creating new wallet container at {}", path.display());
        let wallet = Self::new();
        wallet.save(path)?;
        Ok(wallet)
    }

    /// Load a container from a file
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Save the container to a file.
    ///
    /// The document is written to a temporary file next to `path` and
    /// renamed over it, so a failed write leaves the previous container in
    /// place.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, |file| file.write_all(json.as_bytes()))
    }

    /// Check if a wallet file exists
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }
}

impl Default for WalletFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace `path` with what `write` produces, or leave it untouched
fn write_atomic(path: &Path, write: impl FnOnce(&mut File) -> io::Result<()>) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    write(temp.as_file_mut())?;
    temp.as_file().sync_all()?;

    // Restricted permissions
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o600))?;
    }

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
