//! Result cache backends for the client executor

use async_trait::async_trait;
use aui_core::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

/// A cached tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub value: Value,
    /// Microseconds since the Unix epoch, strictly increasing per executor
    pub stored_at: i64,
}

/// Storage behind a [`ClientExecutor`](crate::ClientExecutor) cache.
///
/// Expiry and eviction are decided by the executor; stores only hold
/// entries.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()>;

    /// Returns whether an entry was removed
    async fn remove(&self, key: &str) -> Result<bool>;

    async fn clear(&self) -> Result<()>;

    /// Every key with its `stored_at` stamp
    async fn stamps(&self) -> Result<Vec<(String, i64)>>;

    async fn len(&self) -> Result<usize> {
        Ok(self.stamps().await?.len())
    }
}

/// In-process cache; entries live as long as the store
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(key).map(|entry| entry.clone()))
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }

    async fn stamps(&self) -> Result<Vec<(String, i64)>> {
        Ok(self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stored_at))
            .collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.len())
    }
}

/// Persistent cache stored as one JSON object in a file.
///
/// The file is read on first use and rewritten after every change, so
/// entries survive restarts. A missing file is an empty cache; an unreadable
/// one is discarded with a warning.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    entries: Mutex<Option<HashMap<String, CacheEntry>>>,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> HashMap<String, CacheEntry> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(_) => return HashMap::new(),
        };

        match serde_json::from_str(&text) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Discarding unreadable cache file");
                HashMap::new()
            }
        }
    }

    async fn persist(&self, entries: &HashMap<String, CacheEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec(entries)?;
        fs::write(&self.path, json).await?;
        Ok(())
    }

    /// Runs `f` over the loaded entries, persisting when it reports a change
    async fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, CacheEntry>) -> (T, bool),
    ) -> Result<T> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await);
        }
        let entries = guard.get_or_insert_with(HashMap::new);

        let (out, changed) = f(entries);
        if changed {
            self.persist(entries).await?;
        }
        Ok(out)
    }
}

#[async_trait]
impl CacheStore for FileCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.with_entries(|entries| (entries.get(key).cloned(), false))
            .await
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.with_entries(|entries| {
            entries.insert(key.to_string(), entry);
            ((), true)
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.with_entries(|entries| {
            let removed = entries.remove(key).is_some();
            (removed, removed)
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.with_entries(|entries| {
            entries.clear();
            ((), true)
        })
        .await
    }

    async fn stamps(&self) -> Result<Vec<(String, i64)>> {
        self.with_entries(|entries| {
            let stamps = entries
                .iter()
                .map(|(key, entry)| (key.clone(), entry.stored_at))
                .collect();
            (stamps, false)
        })
        .await
    }
}

/// Storage shared by every [`SessionCache`] created over it
pub type SessionSpace = Arc<DashMap<String, CacheEntry>>;

/// Session-scoped cache. Entries from several sessions share one
/// [`SessionSpace`] under per-session key prefixes; `clear` drops only this
/// session's entries.
#[derive(Debug, Clone)]
pub struct SessionCache {
    space: SessionSpace,
    prefix: String,
    session_id: String,
}

impl SessionCache {
    /// Session cache over a private space
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::shared(SessionSpace::default(), session_id)
    }

    pub fn shared(space: SessionSpace, session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        Self {
            space,
            prefix: format!("session:{}:", session_id),
            session_id,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl CacheStore for SessionCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.space.get(&self.scoped(key)).map(|entry| entry.clone()))
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.space.insert(self.scoped(key), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.space.remove(&self.scoped(key)).is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.space.retain(|key, _| !key.starts_with(&self.prefix));
        Ok(())
    }

    async fn stamps(&self) -> Result<Vec<(String, i64)>> {
        Ok(self
            .space
            .iter()
            .filter_map(|entry| {
                entry
                    .key()
                    .strip_prefix(&self.prefix)
                    .map(|key| (key.to_string(), entry.value().stored_at))
            })
            .collect())
    }
}
