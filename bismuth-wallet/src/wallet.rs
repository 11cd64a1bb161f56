//! Wallet Store
//!
//! Owns the wallet container and its lock/encryption state machine:
//!
//! ```text
//! PLAINTEXT_UNLOCKED --encrypt--> ENCRYPTED_UNLOCKED <--unlock/lock--> ENCRYPTED_LOCKED
//! ```
//!
//! There is no way back to plaintext. While locked the store holds no
//! decrypted records, no password and no selected address.
//!
//! Every mutation is written through to disk before it returns.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::clock::Clock;
use crate::crypto::{CryptoProvider, SealLevel};
use crate::error::{Result, WalletError};
use crate::keys::{AddressRecord, PrivateKey};
use crate::storage::{AddressEntry, SpendEntry, SpendPolicy, WalletFile};

/// A decrypted record and the index of its entry in the container.
#[derive(Debug, Clone)]
struct Slot {
    record: AddressRecord,
    slot: usize,
}

/// In-memory ordered address list. Index 0 is the default address.
#[derive(Debug, Clone, Default)]
pub struct AddressBook {
    entries: Vec<Slot>,
}

impl AddressBook {
    fn push(&mut self, record: AddressRecord, slot: usize) {
        self.entries.push(Slot { record, slot });
    }

    fn position(&self, address: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.record.address == address)
    }

    fn slot_mut(&mut self, address: &str) -> Option<&mut Slot> {
        self.entries
            .iter_mut()
            .find(|entry| entry.record.address == address)
    }

    /// Look up a record by address
    pub fn get(&self, address: &str) -> Option<&AddressRecord> {
        self.entries
            .iter()
            .find(|entry| entry.record.address == address)
            .map(|entry| &entry.record)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.position(address).is_some()
    }

    /// Move an address to index 0, keeping the relative order of the rest.
    /// Returns false when the address is unknown.
    pub fn move_to_front(&mut self, address: &str) -> bool {
        match self.position(address) {
            Some(index) => {
                let entry = self.entries.remove(index);
                self.entries.insert(0, entry);
                true
            }
            None => false,
        }
    }

    pub fn first(&self) -> Option<&AddressRecord> {
        self.entries.first().map(|entry| &entry.record)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AddressRecord> {
        self.entries.iter().map(|entry| &entry.record)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    /// Renumber slots to match the in-memory order
    fn renumber(&mut self) {
        for (index, entry) in self.entries.iter_mut().enumerate() {
            entry.slot = index;
        }
    }
}

/// Snapshot of the wallet state for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletInfo {
    /// Selected address
    pub address: Option<String>,
    pub file: PathBuf,
    pub encrypted: bool,
    pub locked: bool,
    /// Spend policy, unknown while locked
    pub spend: Option<SpendPolicy>,
    /// Number of addresses in the container
    pub count: usize,
}

/// Legacy single-key file, as exported by older wallets.
#[derive(Deserialize)]
struct KeyFile {
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "Public Key")]
    public_key: String,
    #[serde(rename = "Private Key")]
    private_key: String,
}

/// The multi-address wallet.
pub struct WalletStore {
    path: PathBuf,
    file: WalletFile,
    book: AddressBook,
    selected: Option<String>,
    locked: bool,
    master_password: Zeroizing<String>,
    spend: Option<SpendPolicy>,
    crypto: Arc<dyn CryptoProvider>,
    clock: Arc<dyn Clock>,
}

impl WalletStore {
    /// Open the wallet at `path`, creating an empty one if it does not exist.
    ///
    /// Plaintext wallets open unlocked with their first address selected.
    /// Encrypted wallets open locked, and are unlocked right away when a
    /// password is given.
    pub fn load(
        path: impl AsRef<Path>,
        password: Option<&str>,
        crypto: Arc<dyn CryptoProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = WalletFile::load_or_create(&path)?;

        let mut store = Self {
            path,
            locked: file.encrypted,
            file,
            book: AddressBook::default(),
            selected: None,
            master_password: Zeroizing::new(String::new()),
            spend: None,
            crypto,
            clock,
        };

        if store.file.encrypted {
            debug!("Wallet {} is encrypted, starting locked", store.path.display());
            if let Some(password) = password {
                store.unlock(password)?;
            }
        } else {
            for (slot, entry) in store.file.addresses.iter().enumerate() {
                match entry {
                    AddressEntry::Plain(record) => store.book.push(record.clone(), slot),
                    AddressEntry::Sealed(_) => {
                        return Err(WalletError::InvalidState(
                            "sealed address in a plaintext wallet".to_string(),
                        ))
                    }
                }
            }
            store.spend = match &store.file.spend {
                SpendEntry::Plain(policy) => Some(policy.clone()),
                SpendEntry::Sealed(_) => None,
            };
            store.selected = store.book.first().map(|record| record.address.clone());
        }

        Ok(store)
    }

    /// Encrypt every address and the spend policy with `password`.
    ///
    /// Each record is sealed on its own. Only allowed once, on an unlocked
    /// plaintext wallet that holds at least one address.
    pub fn encrypt(&mut self, password: &str) -> Result<()> {
        if self.file.encrypted {
            return Err(WalletError::InvalidState(
                "wallet is already encrypted".to_string(),
            ));
        }
        if self.locked {
            return Err(WalletError::InvalidState("wallet is locked".to_string()));
        }
        if self.book.is_empty() {
            return Err(WalletError::InvalidState(
                "can't encrypt an empty wallet".to_string(),
            ));
        }
        if password.is_empty() {
            return Err(WalletError::InvalidState(
                "encryption password must not be empty".to_string(),
            ));
        }

        let mut next = self.file.clone();
        next.addresses = self
            .book
            .iter()
            .map(|record| self.seal_record(password, record).map(AddressEntry::Sealed))
            .collect::<Result<Vec<_>>>()?;
        let spend = self.spend.clone().unwrap_or_default();
        next.spend = SpendEntry::Sealed(self.seal_spend(password, &spend)?);
        next.encrypted = true;
        next.save(&self.path)?;

        self.file = next;
        self.book.renumber();
        self.master_password = Zeroizing::new(password.to_string());
        self.locked = false;
        info!("Wallet encrypted ({} addresses)", self.book.len());
        Ok(())
    }

    /// Forget the password, the decrypted addresses and the selection
    pub fn lock(&mut self) -> Result<()> {
        if !self.file.encrypted {
            return Err(WalletError::InvalidState(
                "encrypt the wallet first to use this feature".to_string(),
            ));
        }
        if self.file.addresses.is_empty() {
            return Err(WalletError::InvalidState(
                "can't lock an empty wallet".to_string(),
            ));
        }
        if self.locked {
            return Ok(());
        }

        self.master_password = Zeroizing::new(String::new());
        self.book.clear();
        self.selected = None;
        self.spend = None;
        self.locked = true;
        info!("Wallet locked");
        Ok(())
    }

    /// Decrypt the wallet with `password`.
    ///
    /// Nothing changes unless every record and the spend policy decrypt.
    pub fn unlock(&mut self, password: &str) -> Result<()> {
        if !self.file.encrypted || !self.locked {
            return Ok(());
        }

        let mut book = AddressBook::default();
        for (slot, entry) in self.file.addresses.iter().enumerate() {
            let record = match entry {
                AddressEntry::Sealed(sealed) => self.open_record(password, sealed)?,
                AddressEntry::Plain(record) => record.clone(),
            };
            book.push(record, slot);
        }
        let spend = match &self.file.spend {
            SpendEntry::Sealed(sealed) => self.open_spend(password, sealed)?,
            SpendEntry::Plain(policy) => policy.clone(),
        };

        self.selected = book.first().map(|record| record.address.clone());
        self.book = book;
        self.spend = Some(spend);
        self.master_password = Zeroizing::new(password.to_string());
        self.locked = false;
        info!("Wallet unlocked ({} addresses)", self.book.len());
        Ok(())
    }

    /// Generate a new address and add it to the wallet.
    ///
    /// A non-empty `password` derives the key-pair from `password` and
    /// `salt`. The new address becomes selected when nothing was.
    pub fn new_address(&mut self, label: &str, password: &str, salt: &str) -> Result<String> {
        self.require_unlocked()?;

        let keys = self.crypto.generate_keypair(password, salt)?;
        if self.book.contains(&keys.address) {
            return Err(WalletError::DuplicateOrUnknownAddress(keys.address));
        }

        let record = keys.into_record(label, self.now_secs());
        let address = record.address.clone();
        self.append(record)?;
        info!("New address {}", address);
        Ok(address)
    }

    /// Select an address, moving it to the front of the list.
    ///
    /// The container order is only rewritten for plaintext wallets.
    pub fn set_address(&mut self, address: &str) -> Result<()> {
        self.require_unlocked()?;
        if !self.book.move_to_front(address) {
            return Err(WalletError::DuplicateOrUnknownAddress(address.to_string()));
        }
        self.selected = Some(address.to_string());

        if !self.file.encrypted {
            self.persist_plain()?;
        }
        debug!("Selected address {}", address);
        Ok(())
    }

    /// Change the label of an address
    pub fn set_label(&mut self, address: &str, label: &str) -> Result<()> {
        self.require_unlocked()?;

        let encrypted = self.file.encrypted;
        let (record, slot) = {
            let entry = self
                .book
                .slot_mut(address)
                .ok_or_else(|| WalletError::DuplicateOrUnknownAddress(address.to_string()))?;
            let mut record = entry.record.clone();
            record.label = label.to_string();
            (record, entry.slot)
        };

        if encrypted {
            let sealed = self.seal_record(&self.master_password, &record)?;
            let mut next = self.file.clone();
            match next.addresses.get_mut(slot) {
                Some(entry) => *entry = AddressEntry::Sealed(sealed),
                None => {
                    return Err(WalletError::InvalidState(format!(
                        "no container entry for {address}"
                    )))
                }
            }
            next.save(&self.path)?;
            self.file = next;
            if let Some(entry) = self.book.slot_mut(address) {
                entry.record = record;
            }
        } else {
            if let Some(entry) = self.book.slot_mut(address) {
                entry.record = record;
            }
            self.persist_plain()?;
        }
        Ok(())
    }

    /// Add an existing key-pair to the wallet.
    ///
    /// The declared address must be the one the public key hashes to, and
    /// the public key the one the private key yields.
    pub fn import_external_key(&mut self, mut record: AddressRecord, label: &str) -> Result<()> {
        self.require_unlocked()?;
        if self.book.contains(&record.address) {
            return Err(WalletError::DuplicateOrUnknownAddress(record.address));
        }

        let derived = self
            .crypto
            .address_for(&record.public_key)
            .map_err(|e| WalletError::InvalidKeyFile(e.to_string()))?;
        if derived != record.address {
            return Err(WalletError::InvalidKeyFile(format!(
                "address {} does not match its public key",
                record.address
            )));
        }

        let public_key = record
            .private_key
            .public_key()
            .map_err(|e| WalletError::InvalidKeyFile(e.to_string()))?;
        if !public_key.eq_ignore_ascii_case(record.public_key.trim()) {
            return Err(WalletError::InvalidKeyFile(format!(
                "private key does not belong to address {}",
                record.address
            )));
        }

        record.label = label.to_string();
        let address = record.address.clone();
        self.append(record)?;
        info!("Imported address {}", address);
        Ok(())
    }

    /// Import a legacy single-key file.
    ///
    /// The file holds `Address`, `Public Key` and `Private Key`; the private
    /// key is sealed when `source_password` is not empty.
    pub fn import_key_file(
        &mut self,
        path: impl AsRef<Path>,
        label: &str,
        source_password: &str,
    ) -> Result<String> {
        self.require_unlocked()?;

        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let key: KeyFile = serde_json::from_str(&content)
            .map_err(|e| WalletError::InvalidKeyFile(format!("{}: {}", path.display(), e)))?;

        let private_key = if source_password.is_empty() {
            key.private_key
        } else {
            let plain = self
                .crypto
                .symmetric_decrypt(source_password, &key.private_key)
                .map_err(|_| WalletError::WrongPassword)?;
            String::from_utf8(plain)
                .map_err(|_| WalletError::InvalidKeyFile("private key is not text".to_string()))?
        };

        let record = AddressRecord {
            address: key.address.clone(),
            public_key: key.public_key,
            private_key: PrivateKey::new(private_key),
            label: String::new(),
            timestamp: self.now_secs(),
        };
        self.import_external_key(record, label)?;
        Ok(key.address)
    }

    /// Set the spend protection. `password` must be the master password
    /// (empty for plaintext wallets). A kind of `"None"` clears it.
    pub fn set_spend(&mut self, kind: Option<&str>, value: &str, password: &str) -> Result<()> {
        self.require_unlocked()?;
        if !self.password_ok(password) {
            return Err(WalletError::WrongPassword);
        }

        let policy = SpendPolicy {
            kind: kind.filter(|k| *k != "None").map(str::to_string),
            value: Some(value.to_string()),
        };

        let mut next = self.file.clone();
        next.spend = if self.file.encrypted {
            SpendEntry::Sealed(self.seal_spend(&self.master_password, &policy)?)
        } else {
            SpendEntry::Plain(policy.clone())
        };
        next.save(&self.path)?;

        self.file = next;
        self.spend = Some(policy);
        Ok(())
    }

    /// Snapshot of the wallet state
    pub fn info(&self) -> WalletInfo {
        WalletInfo {
            address: self.selected.clone(),
            file: self.path.clone(),
            encrypted: self.file.encrypted,
            locked: self.locked,
            spend: self.spend.clone(),
            count: self.file.addresses.len(),
        }
    }

    /// Decrypted addresses, selected first. Empty while locked.
    pub fn addresses(&self) -> &AddressBook {
        &self.book
    }

    pub fn selected_address(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// The full record of an address, including its private key
    pub fn get_key(&self, address: &str) -> Result<&AddressRecord> {
        self.require_unlocked()?;
        self.book
            .get(address)
            .ok_or_else(|| WalletError::DuplicateOrUnknownAddress(address.to_string()))
    }

    pub fn contains(&self, address: &str) -> Result<bool> {
        self.require_unlocked()?;
        Ok(self.book.contains(address))
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_encrypted(&self) -> bool {
        self.file.encrypted
    }

    /// Check a password against the master password
    pub fn password_ok(&self, password: &str) -> bool {
        password == self.master_password.as_str()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn require_unlocked(&self) -> Result<()> {
        if self.locked {
            Err(WalletError::MustUnlock)
        } else {
            Ok(())
        }
    }

    fn now_secs(&self) -> u64 {
        self.clock.now().max(0.0) as u64
    }

    /// Append a record to the container and the book, then persist
    fn append(&mut self, record: AddressRecord) -> Result<()> {
        let mut next = self.file.clone();
        let entry = if self.file.encrypted {
            AddressEntry::Sealed(self.seal_record(&self.master_password, &record)?)
        } else {
            AddressEntry::Plain(record.clone())
        };
        next.addresses.push(entry);
        next.save(&self.path)?;

        let slot = next.addresses.len() - 1;
        self.file = next;
        if self.selected.is_none() {
            self.selected = Some(record.address.clone());
        }
        self.book.push(record, slot);
        Ok(())
    }

    /// Rewrite a plaintext container from the in-memory order
    fn persist_plain(&mut self) -> Result<()> {
        let mut next = self.file.clone();
        next.addresses = self
            .book
            .iter()
            .cloned()
            .map(AddressEntry::Plain)
            .collect();
        next.save(&self.path)?;

        self.file = next;
        self.book.renumber();
        Ok(())
    }

    fn seal_record(&self, password: &str, record: &AddressRecord) -> Result<String> {
        let json = Zeroizing::new(serde_json::to_vec(record)?);
        Ok(self
            .crypto
            .symmetric_encrypt(password, &json, SealLevel::Record)?)
    }

    fn seal_spend(&self, password: &str, policy: &SpendPolicy) -> Result<String> {
        let json = serde_json::to_vec(policy)?;
        Ok(self
            .crypto
            .symmetric_encrypt(password, &json, SealLevel::Policy)?)
    }

    fn open_record(&self, password: &str, sealed: &str) -> Result<AddressRecord> {
        let plain = Zeroizing::new(self.crypto.symmetric_decrypt(password, sealed).map_err(
            |e| {
                debug!("Address record did not decrypt: {}", e);
                WalletError::WrongPassword
            },
        )?);
        serde_json::from_slice(&plain).map_err(|_| WalletError::WrongPassword)
    }

    fn open_spend(&self, password: &str, sealed: &str) -> Result<SpendPolicy> {
        let plain = self.crypto.symmetric_decrypt(password, sealed).map_err(|e| {
            debug!("Spend policy did not decrypt: {}", e);
            WalletError::WrongPassword
        })?;
        serde_json::from_slice(&plain).map_err(|_| WalletError::WrongPassword)
    }
}

impl std::fmt::Debug for WalletStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletStore")
            .field("path", &self.path)
            .field("encrypted", &self.file.encrypted)
            .field("locked", &self.locked)
            .field("selected", &self.selected)
            .field("addresses", &self.book.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::crypto::{KdfParams, StandardCrypto};
    use crate::keys::KeyPair;
    use tempfile::TempDir;

    const PASSWORD: &str = "hunter22";

    fn crypto() -> Arc<dyn CryptoProvider> {
        Arc::new(StandardCrypto::with_kdf_params(KdfParams {
            memory_kb: 64,
            iterations: 1,
            parallelism: 1,
        }))
    }

    fn open(dir: &TempDir, password: Option<&str>) -> Result<WalletStore> {
        WalletStore::load(
            dir.path().join("wallet.json"),
            password,
            crypto(),
            Arc::new(ManualClock::new(1_700_000_000.0)),
        )
    }

    fn store_with(dir: &TempDir, labels: &[&str]) -> WalletStore {
        let mut store = open(dir, None).unwrap();
        for label in labels {
            store.new_address(label, "", "").unwrap();
        }
        store
    }

    #[test]
    fn test_new_wallet_is_plaintext_and_empty() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, None).unwrap();

        assert!(!store.is_encrypted());
        assert!(!store.is_locked());
        assert!(store.addresses().is_empty());
        assert_eq!(store.selected_address(), None);
        assert!(dir.path().join("wallet.json").exists());
    }

    #[test]
    fn test_new_address_selects_first() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir, None).unwrap();

        let first = store.new_address("main", "", "").unwrap();
        let second = store.new_address("spare", "", "").unwrap();

        assert_eq!(store.selected_address(), Some(first.as_str()));
        assert_eq!(store.addresses().len(), 2);
        assert_eq!(store.get_key(&second).unwrap().label, "spare");
        assert_eq!(store.get_key(&first).unwrap().timestamp, 1_700_000_000);
    }

    #[test]
    fn test_password_derived_address_rejects_duplicate() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir, None).unwrap();

        store.new_address("a", "brain", "salt").unwrap();
        let err = store.new_address("b", "brain", "salt").unwrap_err();
        assert!(matches!(err, WalletError::DuplicateOrUnknownAddress(_)));
    }

    #[test]
    fn test_plaintext_reload_keeps_selection_order() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &["a", "b", "c"]);
        let third = store.addresses().iter().nth(2).unwrap().address.clone();

        store.set_address(&third).unwrap();
        assert_eq!(store.addresses().first().unwrap().address, third);

        let reloaded = open(&dir, None).unwrap();
        assert_eq!(reloaded.selected_address(), Some(third.as_str()));
    }

    #[test]
    fn test_set_unknown_address_keeps_selection() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &["a"]);
        let before = store.selected_address().map(str::to_string);

        let err = store.set_address(&"0".repeat(56)).unwrap_err();
        assert!(matches!(err, WalletError::DuplicateOrUnknownAddress(_)));
        assert_eq!(store.selected_address().map(str::to_string), before);
    }

    #[test]
    fn test_encrypt_rejections() {
        let dir = TempDir::new().unwrap();
        let mut empty = open(&dir, None).unwrap();
        assert!(matches!(
            empty.encrypt(PASSWORD),
            Err(WalletError::InvalidState(_))
        ));

        empty.new_address("a", "", "").unwrap();
        assert!(matches!(empty.encrypt(""), Err(WalletError::InvalidState(_))));

        empty.encrypt(PASSWORD).unwrap();
        assert!(matches!(
            empty.encrypt(PASSWORD),
            Err(WalletError::InvalidState(_))
        ));
    }

    #[test]
    fn test_lock_rejections() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &["a"]);
        assert!(matches!(store.lock(), Err(WalletError::InvalidState(_))));

        store.encrypt(PASSWORD).unwrap();
        store.lock().unwrap();
        // Locking twice is a no-op
        store.lock().unwrap();
        assert!(store.is_locked());
    }

    #[test]
    fn test_lock_forgets_everything() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &["a", "b"]);
        store.encrypt(PASSWORD).unwrap();
        store.lock().unwrap();

        assert!(store.addresses().is_empty());
        assert_eq!(store.selected_address(), None);
        assert!(!store.password_ok(PASSWORD));
        assert_eq!(store.info().spend, None);
        assert_eq!(store.info().count, 2);
        assert!(matches!(
            store.new_address("c", "", ""),
            Err(WalletError::MustUnlock)
        ));
        assert!(matches!(store.contains("x"), Err(WalletError::MustUnlock)));
    }

    #[test]
    fn test_encrypted_container_has_only_sealed_entries() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &["a", "b"]);
        store.encrypt(PASSWORD).unwrap();

        let file = WalletFile::load(store.path()).unwrap();
        assert!(file.encrypted);
        assert!(matches!(file.spend, SpendEntry::Sealed(_)));
        assert_eq!(file.addresses.len(), 2);
        assert!(file
            .addresses
            .iter()
            .all(|entry| matches!(entry, AddressEntry::Sealed(_))));
    }

    #[test]
    fn test_wrong_password_leaves_store_locked() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &["a"]);
        store.encrypt(PASSWORD).unwrap();
        store.lock().unwrap();

        for _ in 0..3 {
            assert!(matches!(
                store.unlock("nope"),
                Err(WalletError::WrongPassword)
            ));
            assert!(store.is_locked());
            assert!(store.addresses().is_empty());
        }

        store.unlock(PASSWORD).unwrap();
        assert!(!store.is_locked());
    }

    #[test]
    fn test_load_with_password() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &["a"]);
        let address = store.selected_address().unwrap().to_string();
        store.encrypt(PASSWORD).unwrap();
        drop(store);

        let locked = open(&dir, None).unwrap();
        assert!(locked.is_locked());

        assert!(matches!(
            open(&dir, Some("bad")),
            Err(WalletError::WrongPassword)
        ));

        let unlocked = open(&dir, Some(PASSWORD)).unwrap();
        assert_eq!(unlocked.selected_address(), Some(address.as_str()));
    }

    #[test]
    fn test_set_label_on_encrypted_store_after_reorder() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &["a", "b", "c"]);
        store.encrypt(PASSWORD).unwrap();

        let last = store.addresses().iter().nth(2).unwrap().address.clone();
        // Memory order changes, container order does not
        store.set_address(&last).unwrap();
        store.set_label(&last, "renamed").unwrap();
        drop(store);

        let reopened = open(&dir, Some(PASSWORD)).unwrap();
        let labels: Vec<_> = reopened
            .addresses()
            .iter()
            .map(|record| record.label.clone())
            .collect();
        assert_eq!(labels, vec!["a", "b", "renamed"]);
    }

    #[test]
    fn test_new_address_in_encrypted_store_is_sealed() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &["a"]);
        store.encrypt(PASSWORD).unwrap();
        let added = store.new_address("b", "", "").unwrap();

        let file = WalletFile::load(store.path()).unwrap();
        assert!(matches!(file.addresses[1], AddressEntry::Sealed(_)));

        store.lock().unwrap();
        store.unlock(PASSWORD).unwrap();
        assert!(store.contains(&added).unwrap());
    }

    #[test]
    fn test_import_external_key() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &["a"]);

        let record = KeyPair::generate().into_record("", 1);
        store.import_external_key(record.clone(), "imported").unwrap();
        assert_eq!(store.get_key(&record.address).unwrap().label, "imported");

        assert!(matches!(
            store.import_external_key(record, "again"),
            Err(WalletError::DuplicateOrUnknownAddress(_))
        ));

        let mut mismatched = KeyPair::generate().into_record("", 1);
        mismatched.address = KeyPair::generate().address;
        assert!(matches!(
            store.import_external_key(mismatched, "bad"),
            Err(WalletError::InvalidKeyFile(_))
        ));
    }

    #[test]
    fn test_import_rejects_foreign_private_key() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &["a"]);

        let mut record = KeyPair::generate().into_record("", 1);
        record.private_key = KeyPair::generate().private_key;
        let address = record.address.clone();

        assert!(matches!(
            store.import_external_key(record, "foreign"),
            Err(WalletError::InvalidKeyFile(_))
        ));
        assert!(!store.contains(&address).unwrap());
        assert_eq!(store.addresses().len(), 1);
    }

    #[test]
    fn test_import_key_file() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &[]);
        let keys = KeyPair::generate();

        let key_file = dir.path().join("wallet.der");
        let json = serde_json::json!({
            "Address": keys.address,
            "Public Key": keys.public_key,
            "Private Key": keys.private_key.expose(),
        });
        fs::write(&key_file, json.to_string()).unwrap();

        let address = store.import_key_file(&key_file, "legacy", "").unwrap();
        assert_eq!(address, keys.address);
        assert_eq!(store.selected_address(), Some(address.as_str()));
        assert_eq!(store.get_key(&address).unwrap().private_key, keys.private_key);
    }

    #[test]
    fn test_import_sealed_key_file() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &[]);
        let keys = KeyPair::generate();
        let sealed = crypto()
            .symmetric_encrypt("source", keys.private_key.expose().as_bytes(), SealLevel::Record)
            .unwrap();

        let key_file = dir.path().join("wallet.der");
        let json = serde_json::json!({
            "Address": keys.address,
            "Public Key": keys.public_key,
            "Private Key": sealed,
        });
        fs::write(&key_file, json.to_string()).unwrap();

        assert!(matches!(
            store.import_key_file(&key_file, "legacy", "wrong"),
            Err(WalletError::WrongPassword)
        ));
        store.import_key_file(&key_file, "legacy", "source").unwrap();
        assert!(store.contains(&keys.address).unwrap());
    }

    #[test]
    fn test_import_malformed_key_file() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &[]);
        let key_file = dir.path().join("wallet.der");
        fs::write(&key_file, "{\"Address\": 1}").unwrap();

        assert!(matches!(
            store.import_key_file(&key_file, "", ""),
            Err(WalletError::InvalidKeyFile(_))
        ));
    }

    #[test]
    fn test_set_spend() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &["a"]);

        store.set_spend(Some("pin"), "1234", "").unwrap();
        assert_eq!(
            store.info().spend.unwrap().kind.as_deref(),
            Some("pin")
        );

        store.encrypt(PASSWORD).unwrap();
        assert!(matches!(
            store.set_spend(Some("None"), "", "not-it"),
            Err(WalletError::WrongPassword)
        ));
        store.set_spend(Some("None"), "", PASSWORD).unwrap();
        store.lock().unwrap();
        store.unlock(PASSWORD).unwrap();

        assert_eq!(store.info().spend.unwrap().kind, None);
    }

    #[test]
    fn test_address_book_move_to_front() {
        let mut book = AddressBook::default();
        let records: Vec<_> = (0..3)
            .map(|i| KeyPair::generate().into_record(&i.to_string(), 0))
            .collect();
        for (slot, record) in records.iter().enumerate() {
            book.push(record.clone(), slot);
        }

        assert!(book.move_to_front(&records[1].address));
        let order: Vec<_> = book.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(order, vec!["1", "0", "2"]);
        assert!(!book.move_to_front("missing"));
    }
}
