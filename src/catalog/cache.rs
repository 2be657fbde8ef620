/// Read-through TTL cache for catalog pages
///
/// Fresh entries are served directly. Stale entries are served immediately
/// while a background task refetches them; if that refetch fails the stale
/// page stays in place. A miss with a failing backend surfaces
/// `CatalogError::Unavailable` so the caller can offer a retry.
use crate::{catalog::Course, metrics, store::DataStore};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Page request against the course list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CourseQuery {
    /// Category name filter
    pub category: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

/// One page of courses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursePage {
    pub courses: Vec<Course>,
    pub has_more: bool,
    pub total: u64,
}

impl CoursePage {
    pub fn new(courses: Vec<Course>, offset: u32, total: u64) -> Self {
        let has_more = offset as u64 + (courses.len() as u64) < total;
        Self {
            courses,
            has_more,
            total,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Courses are temporarily unavailable: {0}")]
    Unavailable(String),
}

impl CatalogError {
    pub fn user_message(&self) -> &'static str {
        "Failed to load courses. Please try again."
    }
}

struct CacheEntry {
    page: CoursePage,
    fetched_at: Instant,
}

struct CacheInner {
    store: Arc<dyn DataStore>,
    ttl: Duration,
    page_size: u32,
    entries: RwLock<HashMap<CourseQuery, CacheEntry>>,
    refreshing: Mutex<HashSet<CourseQuery>>,
}

/// Catalog page cache
#[derive(Clone)]
pub struct CatalogCache {
    inner: Arc<CacheInner>,
}

impl CatalogCache {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self::with_settings(store, Duration::from_secs(600), 6)
    }

    pub fn with_settings(store: Arc<dyn DataStore>, ttl: Duration, page_size: u32) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store,
                ttl,
                page_size: page_size.max(1),
                entries: RwLock::new(HashMap::new()),
                refreshing: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.inner.page_size
    }

    /// Page at `offset` using the configured page size
    pub async fn page(&self, category: Option<&str>, offset: u32) -> Result<CoursePage, CatalogError> {
        let query = CourseQuery {
            category: category.map(str::to_string),
            limit: self.inner.page_size,
            offset,
        };
        self.get(query).await
    }

    pub async fn get(&self, query: CourseQuery) -> Result<CoursePage, CatalogError> {
        let cached = {
            let entries = self.inner.entries.read().await;
            entries
                .get(&query)
                .map(|entry| (entry.page.clone(), entry.fetched_at.elapsed() < self.inner.ttl))
        };

        match cached {
            Some((page, true)) => {
                metrics::record_cache_access("catalog", true);
                Ok(page)
            }
            Some((page, false)) => {
                metrics::record_cache_access("catalog", true);
                self.spawn_refresh(query).await;
                Ok(page)
            }
            None => {
                metrics::record_cache_access("catalog", false);
                let page = self.inner.fetch(&query).await?;
                self.inner.insert(query, page.clone()).await;
                Ok(page)
            }
        }
    }

    /// Drop every cached page (logout, course edits)
    pub async fn invalidate(&self) {
        self.inner.entries.write().await.clear();
        debug!("Catalog cache invalidated");
    }

    async fn spawn_refresh(&self, query: CourseQuery) {
        {
            let mut refreshing = self.inner.refreshing.lock().await;
            if !refreshing.insert(query.clone()) {
                return;
            }
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            match inner.fetch(&query).await {
                Ok(page) => inner.insert(query.clone(), page).await,
                Err(e) => warn!("Background catalog refresh failed, keeping stale page: {}", e),
            }
            inner.refreshing.lock().await.remove(&query);
        });
    }
}

impl CacheInner {
    async fn fetch(&self, query: &CourseQuery) -> Result<CoursePage, CatalogError> {
        let (courses, total) = self
            .store
            .list_courses(query)
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;
        Ok(CoursePage::new(courses, query.offset, total))
    }

    async fn insert(&self, query: CourseQuery, page: CoursePage) {
        self.entries.write().await.insert(
            query,
            CacheEntry {
                page,
                fetched_at: Instant::now(),
            },
        );
    }
}
