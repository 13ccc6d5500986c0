//! Cache of enriched publications per canonical identifier.
//!
//! Entries are replaced whole on refresh, never merged. Two concurrent
//! refreshes of the same identifier race on `put` and the last write wins.
//! Freshness is measured from `cached_at`; reads only move `last_accessed`.

mod store;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pubrank_common::{Publication, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use store::{CacheStore, InMemoryCacheStore, JsonFileCacheStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub canonical_id: String,
    pub publications: Vec<Publication>,
    pub cached_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    /// Account reference that last populated this entry, if any.
    #[serde(default)]
    pub populated_by: Option<String>,
}

impl CacheEntry {
    pub fn new(
        canonical_id: impl Into<String>,
        publications: Vec<Publication>,
        populated_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            canonical_id: canonical_id.into(),
            publications,
            cached_at: now,
            last_accessed: now,
            populated_by,
        }
    }

    /// Fresh iff `now - cached_at <= max_age` (the boundary itself is fresh).
    pub fn is_fresh_at(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.cached_at) <= to_chrono(max_age)
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    // Out-of-range ages are effectively "forever"
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::weeks(52 * 1000))
}

/// Oldest `cached_at` kept under `retention`. `None` when the cutoff falls
/// before the earliest representable timestamp, so nothing can be expired.
fn retention_cutoff(now: DateTime<Utc>, retention: Duration) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(to_chrono(retention))
}

#[derive(Clone)]
pub struct PublicationCache {
    store: Arc<dyn CacheStore>,
    /// Entries older than this are purged whenever something is written.
    retention: Option<Duration>,
}

impl PublicationCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store, retention: None }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCacheStore::new()))
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Entry for `id`, if any. Records the read in `last_accessed`.
    pub async fn get(&self, id: &str) -> Result<Option<CacheEntry>> {
        let Some(mut entry) = self.store.load(id).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if let Err(e) = self.store.touch(id, now).await {
            // The data is still good; a lost access timestamp is not worth failing the read
            warn!(identifier = id, error = %e, "Failed to record cache access");
        }
        entry.last_accessed = now;
        Ok(Some(entry))
    }

    /// Replace the entry for `id`. Returns the number of publications written.
    pub async fn put(&self, id: &str, publications: Vec<Publication>, populated_by: Option<&str>) -> Result<usize> {
        let now = Utc::now();
        let count = publications.len();
        let entry = CacheEntry::new(id, publications, populated_by.map(String::from), now);
        self.store.save(&entry).await?;
        debug!(identifier = id, n = count, "Cache entry written");

        if let Some(cutoff) = self.retention.and_then(|r| retention_cutoff(now, r)) {
            match self.store.remove_older_than(cutoff).await {
                Ok(0) => {}
                Ok(n) => info!(purged = n, "Purged expired cache entries"),
                Err(e) => warn!(error = %e, "Cache purge failed"),
            }
        }
        Ok(count)
    }

    /// Whether an entry for `id` exists and is no older than `max_age`.
    pub async fn is_fresh(&self, id: &str, max_age: Duration) -> Result<bool> {
        Ok(self
            .store
            .load(id)
            .await?
            .is_some_and(|entry| entry.is_fresh_at(max_age, Utc::now())))
    }

    /// Drop the entry for `id`. Returns how many entries were removed (0 or 1).
    pub async fn invalidate(&self, id: &str) -> Result<usize> {
        let removed = self.store.remove(id).await?;
        debug!(identifier = id, removed, "Cache entry invalidated");
        Ok(removed)
    }

    /// Remove every entry older than the configured retention.
    pub async fn purge_expired(&self) -> Result<usize> {
        match self.retention.and_then(|r| retention_cutoff(Utc::now(), r)) {
            Some(cutoff) => self.store.remove_older_than(cutoff).await,
            None => Ok(0),
        }
    }

    pub async fn len(&self) -> Result<usize> {
        self.store.len().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubrank_common::RawPublication;

    fn publication(id: &str) -> Publication {
        Publication::from(RawPublication {
            id: id.to_string(),
            title: format!("Paper {id}"),
            year: Some(2022),
            ..Default::default()
        })
    }

    #[test]
    fn test_freshness_boundary_is_inclusive() {
        let cached_at = Utc::now();
        let entry = CacheEntry::new("12345678901", vec![], None, cached_at);
        let max_age = Duration::from_secs(3600);

        assert!(entry.is_fresh_at(max_age, cached_at));
        assert!(entry.is_fresh_at(max_age, cached_at + chrono::Duration::seconds(3599)));
        assert!(entry.is_fresh_at(max_age, cached_at + chrono::Duration::seconds(3600)));
        assert!(!entry.is_fresh_at(max_age, cached_at + chrono::Duration::milliseconds(3_600_001)));
    }

    #[test]
    fn test_zero_max_age_only_fresh_at_instant() {
        let cached_at = Utc::now();
        let entry = CacheEntry::new("12345678901", vec![], None, cached_at);
        assert!(entry.is_fresh_at(Duration::ZERO, cached_at));
        assert!(!entry.is_fresh_at(Duration::ZERO, cached_at + chrono::Duration::milliseconds(1)));
    }

    #[tokio::test]
    async fn test_absent_entry_is_never_fresh() {
        let cache = PublicationCache::in_memory();
        assert!(!cache.is_fresh("12345678901", Duration::from_secs(u64::MAX)).await.unwrap());
        assert!(cache.get("12345678901").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_whole_entry() {
        let cache = PublicationCache::in_memory();
        let written = cache
            .put("12345678901", vec![publication("1"), publication("2")], Some("acct-1"))
            .await
            .unwrap();
        assert_eq!(written, 2);

        cache.put("12345678901", vec![publication("3")], None).await.unwrap();
        let entry = cache.get("12345678901").await.unwrap().unwrap();
        let ids: Vec<&str> = entry.publications.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["3"]);
        assert_eq!(entry.populated_by, None);
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_touches_access_not_age() {
        let cache = PublicationCache::in_memory();
        cache.put("12345678901", vec![publication("1")], None).await.unwrap();
        let first = cache.get("12345678901").await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = cache.get("12345678901").await.unwrap().unwrap();

        assert_eq!(first.cached_at, second.cached_at);
        assert!(second.last_accessed > first.last_accessed);
        assert!(cache.is_fresh("12345678901", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_invalidate_reports_removed_count() {
        let cache = PublicationCache::in_memory();
        cache.put("12345678901", vec![], None).await.unwrap();
        assert_eq!(cache.invalidate("12345678901").await.unwrap(), 1);
        assert_eq!(cache.invalidate("12345678901").await.unwrap(), 0);
        assert!(!cache.is_fresh("12345678901", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_purges_expired_entries() {
        let store = Arc::new(InMemoryCacheStore::new());
        let old = CacheEntry::new("11111111111", vec![], None, Utc::now() - chrono::Duration::days(40));
        store.save(&old).await.unwrap();

        let cache = PublicationCache::new(store.clone()).with_retention(Duration::from_secs(30 * 24 * 3600));
        cache.put("22222222222", vec![publication("1")], None).await.unwrap();

        assert!(store.load("11111111111").await.unwrap().is_none());
        assert!(store.load("22222222222").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_without_retention_is_noop() {
        let cache = PublicationCache::in_memory();
        cache.put("12345678901", vec![], None).await.unwrap();
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unrepresentable_retention_keeps_everything() {
        let store = Arc::new(InMemoryCacheStore::new());
        let old = CacheEntry::new("11111111111", vec![], None, Utc::now() - chrono::Duration::days(40_000));
        store.save(&old).await.unwrap();

        // Far past the calendar range chrono can represent
        let forever = Duration::from_secs(200_000_000 * 365 * 24 * 3600);
        let cache = PublicationCache::new(store.clone()).with_retention(forever);
        assert_eq!(cache.put("22222222222", vec![publication("1")], None).await.unwrap(), 1);
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
        assert_eq!(cache.len().await.unwrap(), 2);

        let cache = PublicationCache::new(store.clone()).with_retention(Duration::from_secs(u64::MAX));
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
    }

    #[test]
    fn test_retention_cutoff_bounds() {
        let now = Utc::now();
        assert_eq!(retention_cutoff(now, Duration::from_secs(3600)), Some(now - chrono::Duration::hours(1)));
        assert_eq!(retention_cutoff(now, Duration::from_secs(200_000_000 * 365 * 24 * 3600)), None);
    }
}
