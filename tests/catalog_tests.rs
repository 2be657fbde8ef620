/// Catalog page cache freshness and failure handling
mod common;

use common::{learner, new_course, FlakyStore, RecordingEmailSender, ScriptedAuthProvider};
use learnhub::{
    catalog::{CatalogCache, CatalogError},
    config::SessionConfig,
    session::SessionResolver,
    store::DataStore,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(600);

fn cache_over(store: &Arc<FlakyStore>) -> CatalogCache {
    CatalogCache::with_settings(store.clone(), TTL, 2)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test(start_paused = true)]
async fn test_fresh_pages_are_served_from_cache() {
    let store = Arc::new(FlakyStore::new());
    store.insert_course(new_course("Rust", 100)).await.unwrap();
    let cache = cache_over(&store);

    let first = cache.page(None, 0).await.unwrap();
    let second = cache.page(None, 0).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.course_reads.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pages_report_has_more() {
    let store = Arc::new(FlakyStore::new());
    for title in ["Rust", "Go", "Zig"] {
        store.insert_course(new_course(title, 10)).await.unwrap();
    }
    let cache = cache_over(&store);

    let first = cache.page(None, 0).await.unwrap();
    assert_eq!(first.courses.len(), 2);
    assert_eq!(first.total, 3);
    assert!(first.has_more);

    let last = cache.page(None, 2).await.unwrap();
    assert_eq!(last.courses.len(), 1);
    assert!(!last.has_more);
}

#[tokio::test(start_paused = true)]
async fn test_stale_page_served_while_refreshing() {
    let store = Arc::new(FlakyStore::new());
    store.insert_course(new_course("Rust", 100)).await.unwrap();
    let cache = cache_over(&store);
    cache.page(None, 0).await.unwrap();

    store.insert_course(new_course("Go", 50)).await.unwrap();
    tokio::time::advance(TTL + Duration::from_secs(1)).await;

    let stale = cache.page(None, 0).await.unwrap();
    assert_eq!(stale.total, 1);

    settle().await;
    assert_eq!(store.course_reads.load(Ordering::SeqCst), 2);

    let refreshed = cache.page(None, 0).await.unwrap();
    assert_eq!(refreshed.total, 2);
    assert_eq!(store.course_reads.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_keeps_stale_page() {
    let store = Arc::new(FlakyStore::new());
    store.insert_course(new_course("Rust", 100)).await.unwrap();
    let cache = cache_over(&store);
    let original = cache.page(None, 0).await.unwrap();

    store.set(&store.fail_course_reads, true);
    tokio::time::advance(TTL + Duration::from_secs(1)).await;

    assert_eq!(cache.page(None, 0).await.unwrap(), original);
    settle().await;
    assert_eq!(cache.page(None, 0).await.unwrap(), original);
}

#[tokio::test(start_paused = true)]
async fn test_cold_miss_with_backend_down_is_an_error() {
    let store = Arc::new(FlakyStore::new());
    store.set(&store.fail_course_reads, true);
    let cache = cache_over(&store);

    let err = cache.page(Some("Programming"), 0).await.unwrap_err();
    assert!(matches!(err, CatalogError::Unavailable(_)));
    assert_eq!(err.user_message(), "Failed to load courses. Please try again.");
}

#[tokio::test(start_paused = true)]
async fn test_logout_invalidates_catalog() {
    let store = Arc::new(FlakyStore::new());
    store.insert_course(new_course("Rust", 100)).await.unwrap();
    let cache = cache_over(&store);

    let provider = Arc::new(ScriptedAuthProvider::new());
    let ada = learner("ada@example.com", "Ada");
    provider.register(&ada, "hunter22");
    store.inner.put_profile(ada).await;

    let resolver = SessionResolver::new(
        provider,
        store.clone(),
        Arc::new(RecordingEmailSender::new()),
        SessionConfig::default(),
        "http://localhost:3000/admin",
    )
    .with_catalog(cache.clone());

    resolver.login("ada@example.com", "hunter22").await.unwrap();
    cache.page(None, 0).await.unwrap();
    assert_eq!(store.course_reads.load(Ordering::SeqCst), 1);

    resolver.logout().await;
    cache.page(None, 0).await.unwrap();
    assert_eq!(store.course_reads.load(Ordering::SeqCst), 2);
}
