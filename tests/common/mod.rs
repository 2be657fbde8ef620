//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use learnhub::{
    account::{Account, ProfileFlags, Role},
    catalog::{Category, Course, CoursePatch, CourseQuery, Level, NewCourse},
    ledger::{Money, NewTransaction, Transaction},
    mailer::{EmailError, EmailMessage, EmailSender},
    provider::{AuthEvent, AuthProvider, AuthSession, AuthUser, ProviderError, ProviderResult, SignUpResult},
    store::{DataStore, MemoryStore, NewPurchaseLink, PurchaseLink, StoreError, StoreResult},
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

pub fn learner(email: &str, name: &str) -> Account {
    Account {
        id: Uuid::new_v4(),
        email: email.to_string(),
        name: Some(name.to_string()),
        role: Role::Learner,
        is_approved: true,
        is_blocked: false,
        created_at: None,
    }
}

pub fn admin(email: &str) -> Account {
    Account {
        role: Role::Admin,
        ..learner(email, "Admin")
    }
}

pub fn new_course(title: &str, price_major: i64) -> NewCourse {
    NewCourse {
        id: None,
        title: title.to_string(),
        description: format!("{} description", title),
        instructor: "Ferris".to_string(),
        price: Money::from_major(price_major),
        image_url: None,
        duration: "8 weeks".to_string(),
        level: Level::Beginner,
        students: 0,
        rating: 4.5,
        category_id: None,
    }
}

pub fn auth_session(user: &Account) -> AuthSession {
    AuthSession {
        access_token: format!("token-{}", user.id),
        refresh_token: format!("refresh-{}", user.id),
        expires_at: None,
        user: AuthUser {
            id: user.id,
            email: user.email.clone(),
            user_metadata: serde_json::json!({}),
        },
    }
}

/// MemoryStore with switchable failures
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    /// Number of upcoming `get_profile` calls that report not-found
    pub missing_profile_reads: AtomicU32,
    pub profile_reads: AtomicU32,
    pub fail_transaction_insert: AtomicBool,
    pub fail_link_insert: AtomicBool,
    pub fail_link_reads: AtomicBool,
    pub fail_transaction_reads: AtomicBool,
    pub fail_course_reads: AtomicBool,
    pub course_reads: AtomicU32,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hide_profile_for(&self, reads: u32) {
        self.missing_profile_reads.store(reads, Ordering::SeqCst);
    }

    pub fn set(&self, flag: &AtomicBool, on: bool) {
        flag.store(on, Ordering::SeqCst);
    }

    fn unavailable<T>(what: &str) -> StoreResult<T> {
        Err(StoreError::Backend(format!("{} write rejected", what)))
    }
}

#[async_trait]
impl DataStore for FlakyStore {
    async fn get_profile(&self, id: Uuid) -> StoreResult<Account> {
        self.profile_reads.fetch_add(1, Ordering::SeqCst);
        let hidden = self
            .missing_profile_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hidden {
            return Err(StoreError::NotFound(format!("profile {}", id)));
        }
        self.inner.get_profile(id).await
    }

    async fn get_profiles(&self, ids: &[Uuid]) -> StoreResult<Vec<Account>> {
        self.inner.get_profiles(ids).await
    }

    async fn list_learners(&self) -> StoreResult<Vec<Account>> {
        self.inner.list_learners().await
    }

    async fn update_profile_flags(&self, id: Uuid, flags: ProfileFlags) -> StoreResult<Account> {
        self.inner.update_profile_flags(id, flags).await
    }

    async fn list_courses(&self, query: &CourseQuery) -> StoreResult<(Vec<Course>, u64)> {
        self.course_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_course_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Transient("courses timed out".to_string()));
        }
        self.inner.list_courses(query).await
    }

    async fn get_course(&self, id: Uuid) -> StoreResult<Course> {
        self.inner.get_course(id).await
    }

    async fn insert_course(&self, course: NewCourse) -> StoreResult<Course> {
        self.inner.insert_course(course).await
    }

    async fn update_course(&self, id: Uuid, patch: &CoursePatch) -> StoreResult<Course> {
        self.inner.update_course(id, patch).await
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        self.inner.list_categories().await
    }

    async fn find_category_by_name(&self, name: &str) -> StoreResult<Option<Category>> {
        self.inner.find_category_by_name(name).await
    }

    async fn insert_category(&self, name: &str) -> StoreResult<Category> {
        self.inner.insert_category(name).await
    }

    async fn insert_transaction(&self, tx: NewTransaction) -> StoreResult<Transaction> {
        if self.fail_transaction_insert.load(Ordering::SeqCst) {
            return Self::unavailable("transaction");
        }
        self.inner.insert_transaction(tx).await
    }

    async fn list_transactions(&self, user_id: Option<Uuid>) -> StoreResult<Vec<Transaction>> {
        if self.fail_transaction_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Transient("transactions timed out".to_string()));
        }
        self.inner.list_transactions(user_id).await
    }

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Transaction> {
        self.inner.get_transaction(id).await
    }

    async fn mark_disputed(&self, id: Uuid, reason: &str) -> StoreResult<Transaction> {
        self.inner.mark_disputed(id, reason).await
    }

    async fn insert_purchase_link(&self, link: NewPurchaseLink) -> StoreResult<PurchaseLink> {
        if self.fail_link_insert.load(Ordering::SeqCst) {
            return Self::unavailable("purchase link");
        }
        self.inner.insert_purchase_link(link).await
    }

    async fn list_purchase_links(&self, user_id: Uuid) -> StoreResult<Vec<PurchaseLink>> {
        if self.fail_link_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Transient("links timed out".to_string()));
        }
        self.inner.list_purchase_links(user_id).await
    }

    async fn list_purchase_links_for(&self, user_ids: &[Uuid]) -> StoreResult<Vec<PurchaseLink>> {
        self.inner.list_purchase_links_for(user_ids).await
    }
}

/// Auth provider driven entirely by the test
pub struct ScriptedAuthProvider {
    credentials: Mutex<HashMap<String, (String, Account)>>,
    current: Mutex<Option<AuthSession>>,
    events: broadcast::Sender<AuthEvent>,
    /// Session appears on `current_session` only after this many probes
    pub session_after_probes: AtomicU32,
    pub signup_issues_session: AtomicBool,
    pub fail_sign_out: AtomicBool,
    pub sign_out_calls: AtomicU32,
}

impl ScriptedAuthProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            credentials: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            events,
            session_after_probes: AtomicU32::new(0),
            signup_issues_session: AtomicBool::new(true),
            fail_sign_out: AtomicBool::new(false),
            sign_out_calls: AtomicU32::new(0),
        }
    }

    pub fn register(&self, account: &Account, password: &str) {
        self.credentials
            .lock()
            .unwrap()
            .insert(account.email.clone(), (password.to_string(), account.clone()));
    }

    pub fn set_current(&self, session: Option<AuthSession>) {
        *self.current.lock().unwrap() = session;
    }

    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl AuthProvider for ScriptedAuthProvider {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> ProviderResult<AuthSession> {
        let found = self.credentials.lock().unwrap().get(email).cloned();
        match found {
            Some((expected, account)) if expected == password => {
                let session = auth_session(&account);
                self.set_current(Some(session.clone()));
                Ok(session)
            }
            _ => Err(ProviderError::InvalidCredentials),
        }
    }

    async fn sign_up(&self, email: &str, password: &str, name: &str) -> ProviderResult<SignUpResult> {
        if self.credentials.lock().unwrap().contains_key(email) {
            return Err(ProviderError::Rejected("User already registered".to_string()));
        }
        let account = Account {
            is_approved: false,
            ..learner(email, name)
        };
        self.register(&account, password);

        let session = self
            .signup_issues_session
            .load(Ordering::SeqCst)
            .then(|| auth_session(&account));
        if let Some(ref session) = session {
            self.set_current(Some(session.clone()));
        }
        Ok(SignUpResult {
            user: auth_session(&account).user,
            session,
        })
    }

    async fn sign_out(&self) -> ProviderResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.set_current(None);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(ProviderError::Transient("network down".to_string()));
        }
        Ok(())
    }

    async fn exchange_code_for_session(&self, _code: &str) -> ProviderResult<AuthSession> {
        Err(ProviderError::InvalidGrant("code already used".to_string()))
    }

    async fn current_session(&self) -> ProviderResult<Option<AuthSession>> {
        let pending = self
            .session_after_probes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if pending {
            return Ok(None);
        }
        Ok(self.current.lock().unwrap().clone())
    }

    async fn refresh_session(&self) -> ProviderResult<AuthSession> {
        self.current
            .lock()
            .unwrap()
            .clone()
            .ok_or(ProviderError::InvalidGrant("no session".to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

/// Email sender that records instead of delivering
#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    pub fail: AtomicBool,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sender = Self::default();
        sender.fail.store(true, Ordering::SeqCst);
        sender
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait for spawned sends to land
    pub async fn wait_for(&self, count: usize) -> Vec<EmailMessage> {
        for _ in 0..100 {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.sent()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        self.sent.lock().unwrap().push(message.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmailError::Send("smtp rejected".to_string()));
        }
        Ok(())
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
