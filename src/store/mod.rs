/// Data access against the hosted relational backend
///
/// `DataStore` is the seam between business logic and persistence. The
/// PostgREST implementation talks to the hosted project; the in-memory one
/// backs local development and tests.

mod memory;
mod postgrest;

pub use memory::MemoryStore;
pub use postgrest::{BearerSource, PostgrestStore};

use crate::{
    account::{Account, ProfileFlags},
    catalog::{Category, Course, CoursePatch, CourseQuery, NewCourse},
    ledger::{NewTransaction, Transaction},
    retry::RetryableError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Store errors, classified for retry decisions
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No matching row (PostgREST PGRST116)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violation (Postgres 23505)
    #[error("Duplicate key: {0}")]
    Conflict(String),

    /// Rejected by the access-policy layer
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Timeouts, connection failures, 5xx
    #[error("Backend unavailable: {0}")]
    Transient(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl RetryableError for StoreError {
    fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Access grant row (`user_purchased_courses`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLink {
    pub user_id: Uuid,
    pub course_id: Uuid,
    #[serde(default)]
    pub transaction_id: Option<Uuid>,
}

pub type NewPurchaseLink = PurchaseLink;

/// Row-level operations used by the service and client core
#[async_trait]
pub trait DataStore: Send + Sync {
    // Profiles
    async fn get_profile(&self, id: Uuid) -> StoreResult<Account>;
    /// One request for all ids; unknown ids are simply absent
    async fn get_profiles(&self, ids: &[Uuid]) -> StoreResult<Vec<Account>>;
    async fn list_learners(&self) -> StoreResult<Vec<Account>>;
    async fn update_profile_flags(&self, id: Uuid, flags: ProfileFlags) -> StoreResult<Account>;

    // Catalog
    /// Newest first; returns the page and the total row count
    async fn list_courses(&self, query: &CourseQuery) -> StoreResult<(Vec<Course>, u64)>;
    async fn get_course(&self, id: Uuid) -> StoreResult<Course>;
    async fn insert_course(&self, course: NewCourse) -> StoreResult<Course>;
    async fn update_course(&self, id: Uuid, patch: &CoursePatch) -> StoreResult<Course>;
    /// Sorted by name
    async fn list_categories(&self) -> StoreResult<Vec<Category>>;
    async fn find_category_by_name(&self, name: &str) -> StoreResult<Option<Category>>;
    async fn insert_category(&self, name: &str) -> StoreResult<Category>;

    // Ledger
    async fn insert_transaction(&self, tx: NewTransaction) -> StoreResult<Transaction>;
    /// Newest first; `None` lists every account's transactions
    async fn list_transactions(&self, user_id: Option<Uuid>) -> StoreResult<Vec<Transaction>>;
    async fn get_transaction(&self, id: Uuid) -> StoreResult<Transaction>;
    async fn mark_disputed(&self, id: Uuid, reason: &str) -> StoreResult<Transaction>;

    // Access grants; repeat purchases insert repeat rows
    async fn insert_purchase_link(&self, link: NewPurchaseLink) -> StoreResult<PurchaseLink>;
    async fn list_purchase_links(&self, user_id: Uuid) -> StoreResult<Vec<PurchaseLink>>;
    async fn list_purchase_links_for(&self, user_ids: &[Uuid]) -> StoreResult<Vec<PurchaseLink>>;
}
