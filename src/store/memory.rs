/// In-memory store for local development and tests
use super::{DataStore, NewPurchaseLink, PurchaseLink, StoreError, StoreResult};
use crate::{
    account::{Account, ProfileFlags, Role},
    catalog::{Category, Course, CoursePatch, CourseQuery, NewCourse},
    ledger::{NewTransaction, Transaction, TransactionStatus},
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    profiles: HashMap<Uuid, Account>,
    courses: Vec<Course>,
    categories: Vec<Category>,
    transactions: Vec<Transaction>,
    links: Vec<PurchaseLink>,
}

impl Tables {
    fn with_category_name(&self, mut course: Course) -> Course {
        course.category = course.category_id.and_then(|id| {
            self.categories
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.name.clone())
        });
        course
    }
}

/// Store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a profile row, as the signup trigger would
    pub async fn put_profile(&self, account: Account) {
        self.tables.write().await.profiles.insert(account.id, account);
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn get_profile(&self, id: Uuid) -> StoreResult<Account> {
        self.tables
            .read()
            .await
            .profiles
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", id)))
    }

    async fn get_profiles(&self, ids: &[Uuid]) -> StoreResult<Vec<Account>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.profiles.get(id).cloned())
            .collect())
    }

    async fn list_learners(&self) -> StoreResult<Vec<Account>> {
        let tables = self.tables.read().await;
        let mut learners: Vec<Account> = tables
            .profiles
            .values()
            .filter(|a| a.role == Role::Learner)
            .cloned()
            .collect();
        learners.sort_by(|a, b| a.display_name().cmp(b.display_name()));
        Ok(learners)
    }

    async fn update_profile_flags(&self, id: Uuid, flags: ProfileFlags) -> StoreResult<Account> {
        let mut tables = self.tables.write().await;
        let account = tables
            .profiles
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", id)))?;
        if let Some(approved) = flags.is_approved {
            account.is_approved = approved;
        }
        if let Some(blocked) = flags.is_blocked {
            account.is_blocked = blocked;
        }
        Ok(account.clone())
    }

    async fn list_courses(&self, query: &CourseQuery) -> StoreResult<(Vec<Course>, u64)> {
        let tables = self.tables.read().await;

        let category_id = match &query.category {
            Some(name) => match tables.categories.iter().find(|c| &c.name == name) {
                Some(category) => Some(category.id),
                None => return Ok((Vec::new(), 0)),
            },
            None => None,
        };

        let mut matching: Vec<&Course> = tables
            .courses
            .iter()
            .rev()
            .filter(|c| category_id.is_none() || c.category_id == category_id)
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .map(|c| tables.with_category_name(c.clone()))
            .collect();

        Ok((page, total))
    }

    async fn get_course(&self, id: Uuid) -> StoreResult<Course> {
        let tables = self.tables.read().await;
        tables
            .courses
            .iter()
            .find(|c| c.id == id)
            .map(|c| tables.with_category_name(c.clone()))
            .ok_or_else(|| StoreError::NotFound(format!("course {}", id)))
    }

    async fn insert_course(&self, course: NewCourse) -> StoreResult<Course> {
        let mut tables = self.tables.write().await;
        let id = course.id.unwrap_or_else(Uuid::new_v4);
        if tables.courses.iter().any(|c| c.id == id) {
            return Err(StoreError::Conflict(format!("course {}", id)));
        }

        let row = Course {
            id,
            title: course.title,
            description: course.description,
            instructor: course.instructor,
            price: course.price,
            image_url: course.image_url,
            duration: course.duration,
            level: course.level,
            students: course.students,
            rating: course.rating,
            category_id: course.category_id,
            category: None,
            created_at: Some(Utc::now()),
        };
        tables.courses.push(row.clone());
        Ok(tables.with_category_name(row))
    }

    async fn update_course(&self, id: Uuid, patch: &CoursePatch) -> StoreResult<Course> {
        let mut tables = self.tables.write().await;
        let course = tables
            .courses
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("course {}", id)))?;
        patch.apply_to(course);
        let updated = course.clone();
        Ok(tables.with_category_name(updated))
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let mut categories = self.tables.read().await.categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn find_category_by_name(&self, name: &str) -> StoreResult<Option<Category>> {
        Ok(self
            .tables
            .read()
            .await
            .categories
            .iter()
            .find(|c| c.name == name)
            .cloned())
    }

    async fn insert_category(&self, name: &str) -> StoreResult<Category> {
        let mut tables = self.tables.write().await;
        if tables.categories.iter().any(|c| c.name == name) {
            return Err(StoreError::Conflict(format!("category {}", name)));
        }
        let category = Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        tables.categories.push(category.clone());
        Ok(category)
    }

    async fn insert_transaction(&self, tx: NewTransaction) -> StoreResult<Transaction> {
        let row = Transaction {
            id: Uuid::new_v4(),
            user_id: tx.user_id,
            course_id: tx.course_id,
            course_title: tx.course_title,
            course_price: tx.course_price,
            service_tax: tx.service_tax,
            total_amount: tx.total_amount,
            status: tx.status,
            dispute_reason: None,
            created_at: Utc::now(),
        };
        self.tables.write().await.transactions.push(row.clone());
        Ok(row)
    }

    async fn list_transactions(&self, user_id: Option<Uuid>) -> StoreResult<Vec<Transaction>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Transaction> = tables
            .transactions
            .iter()
            .rev()
            .filter(|t| user_id.map_or(true, |id| t.user_id == id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Transaction> {
        self.tables
            .read()
            .await
            .transactions
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", id)))
    }

    async fn mark_disputed(&self, id: Uuid, reason: &str) -> StoreResult<Transaction> {
        let mut tables = self.tables.write().await;
        let tx = tables
            .transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", id)))?;
        tx.status = TransactionStatus::Disputed;
        tx.dispute_reason = Some(reason.to_string());
        Ok(tx.clone())
    }

    async fn insert_purchase_link(&self, link: NewPurchaseLink) -> StoreResult<PurchaseLink> {
        self.tables.write().await.links.push(link.clone());
        Ok(link)
    }

    async fn list_purchase_links(&self, user_id: Uuid) -> StoreResult<Vec<PurchaseLink>> {
        Ok(self
            .tables
            .read()
            .await
            .links
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_purchase_links_for(&self, user_ids: &[Uuid]) -> StoreResult<Vec<PurchaseLink>> {
        Ok(self
            .tables
            .read()
            .await
            .links
            .iter()
            .filter(|l| user_ids.contains(&l.user_id))
            .cloned()
            .collect())
    }
}
