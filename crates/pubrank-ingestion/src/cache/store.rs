//! Cache storage backends.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pubrank_common::{PubrankError, Result};
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use super::CacheEntry;

/// Keyed storage for cache entries. Keys are canonical identifiers.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<CacheEntry>>;

    /// Insert or fully replace the entry for `entry.canonical_id`.
    async fn save(&self, entry: &CacheEntry) -> Result<()>;

    /// Set `last_accessed` without touching anything else.
    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Returns the number of entries removed (0 or 1).
    async fn remove(&self, id: &str) -> Result<usize>;

    /// Remove entries cached before `cutoff`.
    async fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    async fn len(&self) -> Result<usize>;
}

// ── In-memory ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn load(&self, id: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn save(&self, entry: &CacheEntry) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(entry.canonical_id.clone(), entry.clone());
        Ok(())
    }

    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(entry) = self.entries.write().await.get_mut(id) {
            entry.last_accessed = at;
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<usize> {
        Ok(usize::from(self.entries.write().await.remove(id).is_some()))
    }

    async fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.cached_at >= cutoff);
        Ok(before - entries.len())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}

// ── JSON files ──────────────────────────────────────────────────────────────

/// One pretty-printed JSON document per identifier under a directory.
///
/// Writes go to a uniquely named temporary file first and are renamed into
/// place, so a reader never sees a half-written entry. Every mutation runs
/// under one write lock shared by clones of the store; `touch` reads and
/// rewrites an entry, and must not interleave with a `save` of the same key.
#[derive(Debug, Clone)]
pub struct JsonFileCacheStore {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

static NEXT_TMP: AtomicU64 = AtomicU64::new(0);

impl JsonFileCacheStore {
    /// Open (and create if needed) a cache directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir, write_lock: Arc::new(Mutex::new(())) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(id)))
    }

    async fn read_entry(path: &Path) -> Result<Option<CacheEntry>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_entry(&self, entry: &CacheEntry) -> Result<()> {
        let path = self.path_for(&entry.canonical_id);
        let seq = NEXT_TMP.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{}.{seq}.tmp", std::process::id()));
        let bytes = serde_json::to_vec_pretty(entry)?;
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn entry_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

/// File-name-safe form of an identifier. Alphanumerics, `-` and `_` pass
/// through; every other byte becomes `%XX`.
fn encode_key(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for b in id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[async_trait]
impl CacheStore for JsonFileCacheStore {
    async fn load(&self, id: &str) -> Result<Option<CacheEntry>> {
        Self::read_entry(&self.path_for(id)).await
    }

    async fn save(&self, entry: &CacheEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_entry(entry)
            .await
            .map_err(|e| PubrankError::Cache(format!("write {}: {e}", entry.canonical_id)))
    }

    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(mut entry) = self.load(id).await? {
            entry.last_accessed = at;
            self.write_entry(&entry).await?;
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(1),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut removed = 0;
        for path in self.entry_paths().await? {
            match Self::read_entry(&path).await {
                Ok(Some(entry)) if entry.cached_at < cutoff => {
                    tokio::fs::remove_file(&path).await?;
                    removed += 1;
                }
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Unreadable cache file left in place"),
            }
        }
        Ok(removed)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entry_paths().await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_key() {
        assert_eq!(encode_key("12345678901"), "12345678901");
        assert_eq!(encode_key("acct-42"), "acct-42");
        assert_eq!(encode_key("../etc"), "%2E%2E%2Fetc");
    }

    #[tokio::test]
    async fn test_in_memory_remove_older_than() {
        let store = InMemoryCacheStore::new();
        let now = Utc::now();
        store.save(&CacheEntry::new("old", vec![], None, now - chrono::Duration::hours(2))).await.unwrap();
        store.save(&CacheEntry::new("new", vec![], None, now)).await.unwrap();

        assert_eq!(store.remove_older_than(now - chrono::Duration::hours(1)).await.unwrap(), 1);
        assert_eq!(store.len().await.unwrap(), 1);
        assert!(store.load("new").await.unwrap().is_some());
    }
}
