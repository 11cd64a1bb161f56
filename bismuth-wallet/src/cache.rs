//! Session and alias caches.
//!
//! [`SessionCache`] keeps recent query results (balance, status, history
//! pages) for a few seconds. Keys are query shapes, not addresses, so the
//! owner must call [`SessionCache::invalidate_all`] whenever the active
//! address changes.
//!
//! [`AliasCache`] remembers address to alias resolutions. An address without
//! an alias resolves to itself and is kept for an hour since it may register
//! one; a real alias is kept for a day.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::clock::Clock;
use crate::error::Result;

/// How long an address without alias is cached (seconds)
pub const NO_ALIAS_TTL: f64 = 3600.0;

/// How long a resolved alias is cached (seconds)
pub const ALIAS_TTL: f64 = 86400.0;

/// Time-limited key/value cache with lazy expiry.
pub struct SessionCache<V> {
    entries: HashMap<String, (f64, V)>,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> SessionCache<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            clock,
        }
    }

    /// The value stored under `key`, if it is younger than `ttl`
    pub fn get(&self, key: &str, ttl: Duration) -> Option<V> {
        let (stored_at, value) = self.entries.get(key)?;
        if self.clock.now() - stored_at < ttl.as_secs_f64() {
            Some(value.clone())
        } else {
            None
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), (self.clock.now(), value));
    }

    /// Drop every entry
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Address to alias cache, optionally backed by a JSON file
/// `{"<address>": ["<alias or address>", <expires_at>]}`.
#[derive(Debug, Default)]
pub struct AliasCache {
    entries: BTreeMap<String, (String, f64)>,
    file: Option<PathBuf>,
}

impl AliasCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back the cache with `path`, loading it if it exists
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let entries = if path.exists() {
            let json = fs::read_to_string(path)?;
            serde_json::from_str(&json)?
        } else {
            BTreeMap::new()
        };
        debug!("Loaded {} cached aliases from {}", entries.len(), path.display());

        Ok(Self {
            entries,
            file: Some(path.to_path_buf()),
        })
    }

    /// Write the cache to its backing file, if any
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.file else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string(&self.entries)?)?;
        Ok(())
    }

    /// Split `addresses` into fresh cache hits and addresses that need a
    /// lookup. Duplicates are dropped, first occurrence order is kept.
    pub fn partition(
        &self,
        addresses: &[String],
        now: f64,
    ) -> (BTreeMap<String, String>, Vec<String>) {
        let mut seen = HashSet::new();
        let mut hits = BTreeMap::new();
        let mut misses = Vec::new();

        for address in addresses {
            if !seen.insert(address.as_str()) {
                continue;
            }
            match self.entries.get(address) {
                Some((alias, expires_at)) if *expires_at > now => {
                    hits.insert(address.clone(), alias.clone());
                }
                _ => misses.push(address.clone()),
            }
        }

        (hits, misses)
    }

    /// Store a lookup result
    pub fn record(&mut self, address: &str, alias: &str, now: f64) {
        let ttl = if alias == address {
            NO_ALIAS_TTL
        } else {
            ALIAS_TTL
        };
        self.entries
            .insert(address.to_string(), (alias.to_string(), now + ttl));
    }

    /// Address holding `alias`, if a cached entry says so
    pub fn find_alias(&self, alias: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(address, (cached, _))| cached == alias && cached != *address)
            .map(|(address, _)| address.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(30);

    #[test]
    fn test_session_cache_ttl() {
        let clock = ManualClock::new(1000.0);
        let mut cache = SessionCache::new(Arc::new(clock.clone()));
        cache.set("balance", 42u64);

        clock.advance(29.0);
        assert_eq!(cache.get("balance", TTL), Some(42));

        clock.advance(2.0);
        assert_eq!(cache.get("balance", TTL), None);
    }

    #[test]
    fn test_session_cache_boundary_is_expired() {
        let clock = ManualClock::new(0.0);
        let mut cache = SessionCache::new(Arc::new(clock.clone()));
        cache.set("status", "ok".to_string());

        clock.set(30.0);
        assert_eq!(cache.get("status", TTL), None);
    }

    #[test]
    fn test_session_cache_invalidate_all() {
        let clock = ManualClock::new(0.0);
        let mut cache = SessionCache::new(Arc::new(clock));
        cache.set("balance", 1u64);
        cache.set("tx10-0", 2u64);
        assert_eq!(cache.len(), 2);

        cache.invalidate_all();
        assert!(cache.is_empty());
        assert_eq!(cache.get("balance", TTL), None);
    }

    #[test]
    fn test_alias_ttls() {
        let mut cache = AliasCache::new();
        let plain = "a".repeat(56);
        let named = "b".repeat(56);
        cache.record(&plain, &plain, 0.0);
        cache.record(&named, "satoshi", 0.0);

        let both = vec![plain.clone(), named.clone()];

        let (hits, misses) = cache.partition(&both, 3599.0);
        assert_eq!(hits.len(), 2);
        assert!(misses.is_empty());

        let (hits, misses) = cache.partition(&both, 3600.0);
        assert_eq!(hits.get(&named).map(String::as_str), Some("satoshi"));
        assert_eq!(misses, vec![plain.clone()]);

        let (_, misses) = cache.partition(&both, 86400.0);
        assert_eq!(misses, both);
    }

    #[test]
    fn test_partition_deduplicates() {
        let cache = AliasCache::new();
        let input = vec!["x".to_string(), "y".to_string(), "x".to_string()];
        let (hits, misses) = cache.partition(&input, 0.0);

        assert!(hits.is_empty());
        assert_eq!(misses, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_find_alias() {
        let mut cache = AliasCache::new();
        cache.record("addr1", "alice", 0.0);
        cache.record("addr2", "addr2", 0.0);

        assert_eq!(cache.find_alias("alice"), Some("addr1"));
        assert_eq!(cache.find_alias("bob"), None);
    }

    #[test]
    fn test_alias_cache_file_layout() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("alias_cache.json");

        let mut cache = AliasCache::load(&path).unwrap();
        assert!(cache.is_empty());
        cache.record("addr1", "alice", 100.0);
        cache.save().unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["addr1"][0], "alice");
        assert_eq!(raw["addr1"][1], 86500.0);

        let reloaded = AliasCache::load(&path).unwrap();
        assert_eq!(reloaded.find_alias("alice"), Some("addr1"));
    }

    #[test]
    fn test_unbacked_cache_save_is_noop() {
        let mut cache = AliasCache::new();
        cache.record("addr1", "alice", 0.0);
        assert!(cache.save().is_ok());
    }
}
