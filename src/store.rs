//! String-keyed, string-valued durable storage.
//!
//! The gateway only sees [`KeyValueStore`]. [`FileStore`] keeps every key in a
//! single JSON object on disk; [`MemoryStore`] backs tests and `--ephemeral` runs.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Asynchronous get/set/remove by string key. No transactions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
  async fn get(&self, key: &str) -> Result<Option<String>>;
  async fn set(&self, key: &str, value: &str) -> Result<()>;
  async fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: StdMutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> T) -> Result<T> {
    let mut entries = self.entries.lock().map_err(|_| Error::storage("memory store lock poisoned"))?;
    Ok(f(&mut entries))
  }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
  async fn get(&self, key: &str) -> Result<Option<String>> {
    self.with_entries(|e| e.get(key).cloned())
  }

  async fn set(&self, key: &str, value: &str) -> Result<()> {
    self.with_entries(|e| {
      e.insert(key.to_string(), value.to_string());
    })
  }

  async fn remove(&self, key: &str) -> Result<()> {
    self.with_entries(|e| {
      e.remove(key);
    })
  }
}

/// JSON-file backed store.
///
/// The whole map is cached in memory and rewritten on every mutation through a
/// temp file + rename, so a crash mid-write leaves the previous file intact.
#[derive(Debug)]
pub struct FileStore {
  path: PathBuf,
  entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
  /// Open (or lazily create) the store at `path`. A missing file is an empty store.
  pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
    let path = path.into();
    let entries = match tokio::fs::read_to_string(&path).await {
      Ok(content) if content.trim().is_empty() => BTreeMap::new(),
      Ok(content) => serde_json::from_str(&content)
        .map_err(|e| Error::storage(format!("corrupt store file {}: {}", path.display(), e)))?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
      Err(e) => return Err(Error::storage(format!("failed to read {}: {}", path.display(), e))),
    };
    info!(path = %path.display(), keys = entries.len(), "store: opened");
    Ok(Self { path, entries: Mutex::new(entries) })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
    let content = serde_json::to_string_pretty(entries).map_err(|e| Error::storage(e.to_string()))?;
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| Error::storage(format!("failed to create {}: {}", parent.display(), e)))?;
    }
    let tmp = self.path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content)
      .await
      .map_err(|e| Error::storage(format!("failed to write {}: {}", tmp.display(), e)))?;
    tokio::fs::rename(&tmp, &self.path)
      .await
      .map_err(|e| Error::storage(format!("failed to replace {}: {}", self.path.display(), e)))?;
    debug!(path = %self.path.display(), "store: persisted");
    Ok(())
  }
}

#[async_trait]
impl KeyValueStore for FileStore {
  async fn get(&self, key: &str) -> Result<Option<String>> {
    Ok(self.entries.lock().await.get(key).cloned())
  }

  async fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut entries = self.entries.lock().await;
    let previous = entries.insert(key.to_string(), value.to_string());
    if let Err(e) = self.persist(&entries).await {
      // Keep the cache in step with what is actually on disk.
      match previous {
        Some(v) => entries.insert(key.to_string(), v),
        None => entries.remove(key),
      };
      return Err(e);
    }
    Ok(())
  }

  async fn remove(&self, key: &str) -> Result<()> {
    let mut entries = self.entries.lock().await;
    let Some(previous) = entries.remove(key) else {
      return Ok(());
    };
    if let Err(e) = self.persist(&entries).await {
      entries.insert(key.to_string(), previous);
      return Err(e);
    }
    Ok(())
  }
}
