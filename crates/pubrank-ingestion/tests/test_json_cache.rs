//! File-backed cache store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pretty_assertions::assert_eq;
use pubrank_common::Publication;
use pubrank_ingestion::{CacheEntry, CacheStore, JsonFileCacheStore, PublicationCache};
use pubrank_test_utils::raw_publication;

fn publication(id: &str) -> Publication {
    Publication::from(raw_publication(id, "Title", 2022, "Journal A"))
}

#[tokio::test]
async fn test_entries_persist_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = JsonFileCacheStore::open(dir.path()).await.unwrap();
        let cache = PublicationCache::new(Arc::new(store));
        cache.put("12345678901", vec![publication("1")], Some("acct-42")).await.unwrap();
    }

    let store = JsonFileCacheStore::open(dir.path()).await.unwrap();
    let entry = store.load("12345678901").await.unwrap().unwrap();
    assert_eq!(entry.publications, vec![publication("1")]);
    assert_eq!(entry.populated_by.as_deref(), Some("acct-42"));
    assert_eq!(store.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_touch_keeps_cached_at() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileCacheStore::open(dir.path()).await.unwrap());
    let cache = PublicationCache::new(store.clone());
    cache.put("12345678901", vec![], None).await.unwrap();

    let before = store.load("12345678901").await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    cache.get("12345678901").await.unwrap();
    let after = store.load("12345678901").await.unwrap().unwrap();

    assert_eq!(before.cached_at, after.cached_at);
    assert!(after.last_accessed > before.last_accessed);
}

#[tokio::test]
async fn test_retention_purges_on_write() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileCacheStore::open(dir.path()).await.unwrap());
    let stale = CacheEntry::new("11111111111", vec![], None, Utc::now() - chrono::Duration::days(10));
    store.save(&stale).await.unwrap();

    let cache = PublicationCache::new(store.clone()).with_retention(Duration::from_secs(7 * 24 * 3600));
    cache.put("22222222222", vec![publication("2")], None).await.unwrap();

    assert!(store.load("11111111111").await.unwrap().is_none());
    assert_eq!(store.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_odd_identifiers_stay_inside_directory() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileCacheStore::open(dir.path().join("cache")).await.unwrap();
    store.save(&CacheEntry::new("../escape", vec![], None, Utc::now())).await.unwrap();

    assert!(store.load("../escape").await.unwrap().is_some());
    assert!(!dir.path().join("escape.json").exists());
    assert_eq!(store.remove("../escape").await.unwrap(), 1);
    assert_eq!(store.remove("../escape").await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_puts_on_one_identifier_last_write_wins() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileCacheStore::open(dir.path()).await.unwrap());
    let cache = PublicationCache::new(store.clone());

    for round in 0..20 {
        let mut tasks = tokio::task::JoinSet::new();
        for writer in 0..8 {
            let cache = cache.clone();
            tasks.spawn(async move {
                cache
                    .put("12345678901", vec![publication(&format!("{round}-{writer}"))], None)
                    .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            assert_eq!(result.unwrap().unwrap(), 1);
        }

        let entry = store.load("12345678901").await.unwrap().unwrap();
        assert_eq!(entry.publications.len(), 1);
        assert!(entry.publications[0].id.starts_with(&format!("{round}-")));
    }

    // no temporary files left behind
    let leftovers = std::fs::read_dir(dir.path())
        .unwrap()
        .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|ext| ext == "tmp"))
        .count();
    assert_eq!(leftovers, 0);
    assert_eq!(store.len().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_read_overlapping_refresh_keeps_new_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileCacheStore::open(dir.path()).await.unwrap());
    let cache = PublicationCache::new(store.clone());

    for _ in 0..50 {
        cache.put("12345678901", vec![publication("old")], None).await.unwrap();

        let reader = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get("12345678901").await })
        };
        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.put("12345678901", vec![publication("new")], None).await })
        };
        writer.await.unwrap().unwrap();
        reader.await.unwrap().unwrap();

        let entry = store.load("12345678901").await.unwrap().unwrap();
        assert_eq!(entry.publications, vec![publication("new")]);
    }
}
