//! Cache storage trait with SQLite and in-memory implementations.

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use super::{codec, keys};
use crate::config::CacheConfig;
use crate::error::{Error, Result};

/// Kind-specific expiry, resolved from the key prefix: repository
/// metadata churns daily, paginated history barely changes.
#[derive(Debug, Clone)]
pub struct TtlConfig {
  pub repository: Duration,
  pub resource: Duration,
}

impl Default for TtlConfig {
  fn default() -> Self {
    Self {
      repository: Duration::from_secs(24 * 3600),
      resource: Duration::from_secs(7 * 24 * 3600),
    }
  }
}

impl TtlConfig {
  pub fn from_config(config: &CacheConfig) -> Self {
    let days = |d: f64| Duration::from_secs_f64(d.max(0.0) * 24.0 * 3600.0);
    Self {
      repository: days(config.repository_ttl_days),
      resource: days(config.resource_ttl_days),
    }
  }

  fn ttl_for(&self, key: &str) -> Duration {
    if keys::is_repository_key(key) {
      self.repository
    } else {
      self.resource
    }
  }
}

/// Trait for cache storage backends.
///
/// `get` never hard-fails on bad content: malformed, undecodable or
/// expired entries come back as `Ok(None)`. `Err` is reserved for the
/// backend itself misbehaving, and callers absorb that too.
pub trait CacheStore: Send + Sync + 'static {
  fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>>;

  fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()>;

  fn remove(&self, key: &str) -> Result<()>;

  /// Drop every entry in this namespace.
  fn clear(&self) -> Result<()>;
}

/// SQLite-backed store, one database file per repository namespace.
pub struct SqliteStore {
  conn: Mutex<Connection>,
  ttl: TtlConfig,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL
);
"#;

impl SqliteStore {
  /// Open (or create) the store for a repository namespace under the
  /// configured cache directory.
  pub fn open(namespace: &str, config: &CacheConfig) -> Result<Self> {
    let dir = match &config.dir {
      Some(dir) => dir.clone(),
      None => Self::default_dir()?,
    };
    Self::open_at(&dir.join(format!("{namespace}.db")), TtlConfig::from_config(config))
  }

  /// Open a store at an explicit path.
  pub fn open_at(path: &Path, ttl: TtlConfig) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;

    Ok(Self {
      conn: Mutex::new(conn),
      ttl,
    })
  }

  fn default_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| Error::Config("could not determine data directory".into()))?;

    Ok(data_dir.join("stargaze"))
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
    self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn put_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
    self.lock().execute(
      "INSERT OR REPLACE INTO cache_entries (key, value) VALUES (?, ?)",
      params![key, bytes],
    )?;
    Ok(())
  }
}

impl CacheStore for SqliteStore {
  fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    let bytes: Option<Vec<u8>> = self
      .lock()
      .query_row(
        "SELECT value FROM cache_entries WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()?;

    Ok(bytes.and_then(|b| codec::decode(&b, self.ttl.ttl_for(key))))
  }

  fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
    self.put_bytes(key, &codec::encode(value)?)
  }

  fn remove(&self, key: &str) -> Result<()> {
    self
      .lock()
      .execute("DELETE FROM cache_entries WHERE key = ?", params![key])?;
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    self.lock().execute("DELETE FROM cache_entries", [])?;
    Ok(())
  }
}

/// In-memory store with the same envelope and expiry semantics. Used in
/// tests and when persistent caching is disabled.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, Vec<u8>>>,
  ttl: TtlConfig,
}

impl MemoryStore {
  pub fn new(ttl: TtlConfig) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      ttl,
    }
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
    self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  #[cfg(test)]
  pub(crate) fn put_bytes(&self, key: &str, bytes: Vec<u8>) {
    self.lock().insert(key.to_string(), bytes);
  }
}

/// Store selected from configuration: persistent when caching is
/// enabled, process-local otherwise. Both sides share the envelope and
/// expiry semantics, so flipping `enabled` only changes durability.
pub enum ConfiguredStore {
  Sqlite(SqliteStore),
  Memory(MemoryStore),
}

impl ConfiguredStore {
  pub fn open(namespace: &str, config: &CacheConfig) -> Result<Self> {
    if config.enabled {
      Ok(Self::Sqlite(SqliteStore::open(namespace, config)?))
    } else {
      Ok(Self::Memory(MemoryStore::new(TtlConfig::from_config(config))))
    }
  }
}

impl CacheStore for ConfiguredStore {
  fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    match self {
      Self::Sqlite(store) => store.get(key),
      Self::Memory(store) => store.get(key),
    }
  }

  fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
    match self {
      Self::Sqlite(store) => store.set(key, value),
      Self::Memory(store) => store.set(key, value),
    }
  }

  fn remove(&self, key: &str) -> Result<()> {
    match self {
      Self::Sqlite(store) => store.remove(key),
      Self::Memory(store) => store.remove(key),
    }
  }

  fn clear(&self) -> Result<()> {
    match self {
      Self::Sqlite(store) => store.clear(),
      Self::Memory(store) => store.clear(),
    }
  }
}

impl CacheStore for MemoryStore {
  fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    let bytes = self.lock().get(key).cloned();
    Ok(bytes.and_then(|b| codec::decode(&b, self.ttl.ttl_for(key))))
  }

  fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
    let bytes = codec::encode(value)?;
    self.lock().insert(key.to_string(), bytes);
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    self.lock().remove(key);
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    self.lock().clear();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use serde::{Deserialize, Serialize};
  use tempfile::TempDir;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Payload {
    name: String,
    count: u64,
  }

  fn sample() -> Payload {
    Payload {
      name: "octocat".to_string(),
      count: 42,
    }
  }

  fn open_temp(ttl: TtlConfig) -> (TempDir, SqliteStore) {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open_at(&dir.path().join("ns.db"), ttl).unwrap();
    (dir, store)
  }

  #[test]
  fn set_get_remove_clear() {
    let (_dir, store) = open_temp(TtlConfig::default());

    assert_eq!(store.get::<Payload>("releases:a").unwrap(), None);

    store.set("releases:a", &sample()).unwrap();
    store.set("releases:b", &sample()).unwrap();
    assert_eq!(store.get::<Payload>("releases:a").unwrap(), Some(sample()));

    store.remove("releases:a").unwrap();
    assert_eq!(store.get::<Payload>("releases:a").unwrap(), None);
    assert_eq!(store.get::<Payload>("releases:b").unwrap(), Some(sample()));

    store.clear().unwrap();
    assert_eq!(store.get::<Payload>("releases:b").unwrap(), None);
  }

  #[test]
  fn overwrite_restamps_the_entry() {
    let (_dir, store) = open_temp(TtlConfig::default());

    // Back-dated write, then a refresh through the normal path
    let old = codec::encode_at(&sample(), Utc::now() - chrono::Duration::days(30)).unwrap();
    store.put_bytes("releases:a", &old).unwrap();
    assert_eq!(store.get::<Payload>("releases:a").unwrap(), None);

    store.set("releases:a", &sample()).unwrap();
    assert_eq!(store.get::<Payload>("releases:a").unwrap(), Some(sample()));
  }

  #[test]
  fn entries_past_their_kind_ttl_are_misses() {
    let (_dir, store) = open_temp(TtlConfig::default());

    let two_days_ago = Utc::now() - chrono::Duration::days(2);
    let bytes = codec::encode_at(&sample(), two_days_ago).unwrap();

    // Two days is past the 1-day repository TTL but inside the 7-day
    // collection TTL
    store.put_bytes("repository:o/n", &bytes).unwrap();
    store.put_bytes("stargazers:abc", &bytes).unwrap();

    assert_eq!(store.get::<Payload>("repository:o/n").unwrap(), None);
    assert_eq!(store.get::<Payload>("stargazers:abc").unwrap(), Some(sample()));
  }

  #[test]
  fn malformed_entries_are_misses_not_errors() {
    let (_dir, store) = open_temp(TtlConfig::default());

    store.put_bytes("stargazers:abc", b"garbage").unwrap();
    assert_eq!(store.get::<Payload>("stargazers:abc").unwrap(), None);

    // Well-formed envelope, wrong payload shape
    store.set("stargazers:def", &vec![1u64, 2, 3]).unwrap();
    assert_eq!(store.get::<Payload>("stargazers:def").unwrap(), None);
  }

  #[test]
  fn persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ns.db");

    let store = SqliteStore::open_at(&path, TtlConfig::default()).unwrap();
    store.set("releases:a", &sample()).unwrap();
    drop(store);

    let reopened = SqliteStore::open_at(&path, TtlConfig::default()).unwrap();
    assert_eq!(reopened.get::<Payload>("releases:a").unwrap(), Some(sample()));
  }

  #[test]
  fn disabled_cache_stays_off_disk() {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig {
      dir: Some(dir.path().to_path_buf()),
      enabled: false,
      ..CacheConfig::default()
    };

    let store = ConfiguredStore::open("ns", &config).unwrap();
    assert!(matches!(store, ConfiguredStore::Memory(_)));

    store.set("releases:a", &sample()).unwrap();
    assert_eq!(store.get::<Payload>("releases:a").unwrap(), Some(sample()));
    // Nothing was written under the configured cache directory
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
  }

  #[test]
  fn enabled_cache_opens_the_namespace_database() {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig {
      dir: Some(dir.path().to_path_buf()),
      ..CacheConfig::default()
    };

    let store = ConfiguredStore::open("ns", &config).unwrap();
    assert!(matches!(store, ConfiguredStore::Sqlite(_)));

    store.set("releases:a", &sample()).unwrap();
    assert!(dir.path().join("ns.db").exists());
  }

  #[test]
  fn memory_store_honors_ttl() {
    let store = MemoryStore::default();
    let stale = codec::encode_at(&sample(), Utc::now() - chrono::Duration::days(8)).unwrap();
    store.put_bytes("stargazers:abc", stale);
    assert_eq!(store.get::<Payload>("stargazers:abc").unwrap(), None);

    store.set("stargazers:abc", &sample()).unwrap();
    assert_eq!(store.get::<Payload>("stargazers:abc").unwrap(), Some(sample()));
  }
}
