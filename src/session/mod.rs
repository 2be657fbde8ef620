/// Profile/session resolution
///
/// Turns credentials, OAuth redirects and auth-service events into one
/// consistent `SessionSnapshot`. Every path that changes who is signed in
/// goes through `SessionResolver`, and every change replaces the snapshot
/// whole.

mod store;

pub use store::{SessionSnapshot, SessionStore};

use crate::{
    account::{Account, AccountStatus, Role},
    catalog::CatalogCache,
    config::SessionConfig,
    ledger::TransactionStatus,
    mailer::{AdminSignupData, EmailMessage, EmailSender},
    metrics,
    provider::{AuthEvent, AuthProvider, AuthSession, ProviderError},
    purchase::CorporatePackage,
    retry::{poll_until, with_retry, RetryableError},
    store::{DataStore, StoreError},
};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const BLOCKED_MESSAGE: &str = "Your account has been blocked. Please contact support.";
pub const PENDING_MESSAGE: &str = "Your account is pending admin approval";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoginError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account blocked")]
    Blocked,

    /// Credential accepted but no profile row ever appeared
    #[error("Profile unavailable")]
    ProfileUnavailable,

    /// The OAuth redirect never produced a session
    #[error("OAuth sign-in failed: {0}")]
    OAuthFailed(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl LoginError {
    pub fn user_message(&self) -> String {
        match self {
            LoginError::InvalidCredentials => "Invalid email or password".to_string(),
            LoginError::Blocked => BLOCKED_MESSAGE.to_string(),
            LoginError::ProfileUnavailable => {
                "We couldn't load your profile. Please try again in a moment.".to_string()
            }
            LoginError::OAuthFailed(_) => "Sign-in could not be completed. Please try again.".to_string(),
            LoginError::Unavailable(_) => "Service temporarily unavailable, please retry".to_string(),
        }
    }
}

impl From<ProviderError> for LoginError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Transient(msg) => LoginError::Unavailable(msg),
            _ => LoginError::InvalidCredentials,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignupError {
    /// e.g. the email is already registered
    #[error("{0}")]
    Rejected(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl SignupError {
    pub fn user_message(&self) -> String {
        match self {
            SignupError::Rejected(msg) => msg.clone(),
            SignupError::Unavailable(_) => "Service temporarily unavailable, please retry".to_string(),
        }
    }
}

impl From<ProviderError> for SignupError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Transient(msg) => SignupError::Unavailable(msg),
            other => SignupError::Rejected(other.to_string()),
        }
    }
}

/// Result of a successful sign-in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginOutcome {
    pub role: Role,
    pub status: AccountStatus,
}

impl LoginOutcome {
    /// Informational message to show after sign-in, if any
    pub fn message(&self) -> Option<&'static str> {
        match self.status {
            AccountStatus::PendingApproval => Some(PENDING_MESSAGE),
            _ => None,
        }
    }
}

/// Background task feeding auth events into the resolver.
/// Dropping it stops the task.
pub struct EventSubscription {
    handle: JoinHandle<()>,
}

impl EventSubscription {
    pub fn cancel(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct SessionResolver {
    provider: Arc<dyn AuthProvider>,
    store: Arc<dyn DataStore>,
    email: Arc<dyn EmailSender>,
    session: SessionStore,
    catalog: Option<CatalogCache>,
    config: SessionConfig,
    dashboard_url: String,
}

impl SessionResolver {
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        store: Arc<dyn DataStore>,
        email: Arc<dyn EmailSender>,
        config: SessionConfig,
        dashboard_url: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            store,
            email,
            session: SessionStore::new(),
            catalog: None,
            config,
            dashboard_url: dashboard_url.into(),
        }
    }

    /// Clear this catalog cache whenever the session ends
    pub fn with_catalog(mut self, catalog: CatalogCache) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn current(&self) -> Arc<SessionSnapshot> {
        self.session.current()
    }

    /// Rehydrate from an existing credential on startup
    pub async fn resolve_current_session(&self) -> Result<Arc<SessionSnapshot>, LoginError> {
        let session = match self.provider.current_session().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                self.clear_local().await;
                return Ok(self.current());
            }
            Err(ProviderError::Transient(msg)) => return Err(LoginError::Unavailable(msg)),
            Err(e) => {
                debug!("Stored credential rejected: {}", e);
                self.clear_local().await;
                return Ok(self.current());
            }
        };

        match self.fetch_profile_with_retry(session.user.id).await {
            Ok(Some(account)) if account.is_blocked => {
                self.reject_blocked(account.id).await;
                Err(LoginError::Blocked)
            }
            Ok(Some(account)) => {
                self.adopt(&session, account, false).await;
                Ok(self.current())
            }
            Ok(None) => {
                warn!("No profile for signed-in user {}", session.user.id);
                self.clear_local().await;
                Ok(self.current())
            }
            Err(e) => Err(LoginError::Unavailable(e.to_string())),
        }
    }

    /// Password sign-in. Blocked accounts fail closed; pending accounts
    /// sign in and learn their status from the outcome.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, LoginError> {
        let session = self.provider.sign_in_with_password(email, password).await?;
        self.complete_sign_in(session).await
    }

    pub async fn signup(&self, email: &str, password: &str, name: &str) -> Result<Account, SignupError> {
        let result = self.provider.sign_up(email, password, name).await?;
        let user_id = result.user.id;

        let (account, provisional) = match self.fetch_profile_with_retry(user_id).await {
            Ok(Some(account)) => (account, false),
            Ok(None) => {
                info!("Profile for {} not provisioned yet, using placeholder", user_id);
                (Account::synthesized(user_id, email, name), true)
            }
            Err(e) => {
                warn!("Profile lookup failed after signup for {}: {}", user_id, e);
                (Account::synthesized(user_id, email, name), true)
            }
        };

        if let Some(ref session) = result.session {
            self.adopt(session, account.clone(), provisional).await;
        }

        let notification = EmailMessage::AdminSignupNotification(AdminSignupData {
            name: name.to_string(),
            email: email.to_string(),
            signup_date: Utc::now(),
            dashboard_url: self.dashboard_url.clone(),
        });
        if let Err(e) = self.email.send(&notification).await {
            warn!("Admin signup notification for {} failed: {}", user_id, e);
        }

        Ok(account)
    }

    /// Finish an OAuth redirect. The code may already have been consumed by
    /// the auth client, so fall back to polling for a session.
    pub async fn handle_oauth_completion(&self, code: Option<&str>) -> Result<LoginOutcome, LoginError> {
        let exchanged = match code {
            Some(code) => match self.provider.exchange_code_for_session(code).await {
                Ok(session) => Some(session),
                Err(e) => {
                    debug!("Code exchange failed, polling for session: {}", e);
                    None
                }
            },
            None => None,
        };

        let session = match exchanged {
            Some(session) => session,
            None => {
                let provider = &self.provider;
                poll_until(
                    self.config.oauth_poll_window(),
                    self.config.oauth_poll_interval(),
                    || async move { provider.current_session().await.ok().flatten() },
                )
                .await
                .ok_or_else(|| LoginError::OAuthFailed("no session after redirect".to_string()))?
            }
        };

        self.complete_sign_in(session).await
    }

    /// The one place auth-service events change local state
    pub async fn on_session_event(&self, event: AuthEvent) {
        debug!("Session event {}", event.name());
        match event {
            AuthEvent::SignedOut | AuthEvent::TokenRefreshFailed | AuthEvent::TokenRefreshed(None) => {
                self.clear_local().await;
            }
            AuthEvent::TokenRefreshed(Some(session)) => {
                self.observe_session(session, false).await;
            }
            AuthEvent::SignedIn(session) => {
                self.observe_session(session, false).await;
            }
            AuthEvent::UserUpdated(session) => {
                self.observe_session(session, true).await;
            }
        }
    }

    /// Sign out. Local state is cleared even when the remote call fails.
    pub async fn logout(&self) {
        if let Err(e) = self.provider.sign_out().await {
            warn!("Sign-out request failed, clearing local session anyway: {}", e);
        }
        self.clear_local().await;
    }

    /// Re-read what the signed-in account can access and publish it.
    /// Access is the union of grant links and completed transactions, so a
    /// purchase whose link write failed still unlocks the course.
    pub async fn refresh_access(&self) -> Result<Vec<Uuid>, StoreError> {
        let user_id = match self.current().user_id() {
            Some(id) => id,
            None => return Ok(Vec::new()),
        };

        let ids = self.load_access(user_id).await?;
        self.session.update(|current| {
            if current.user_id() != Some(user_id) {
                return current.clone();
            }
            SessionSnapshot {
                purchased_course_ids: ids.clone(),
                ..current.clone()
            }
        });
        Ok(ids)
    }

    /// Feed provider events into `on_session_event` until cancelled
    pub fn subscribe_to_auth_events(self: &Arc<Self>) -> EventSubscription {
        let mut events = self.provider.subscribe();
        let resolver = Arc::clone(self);

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => resolver.on_session_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Missed {} auth events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        EventSubscription { handle }
    }

    async fn complete_sign_in(&self, session: AuthSession) -> Result<LoginOutcome, LoginError> {
        let user_id = session.user.id;
        let account = match self.fetch_profile_with_retry(user_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                if let Err(e) = self.provider.sign_out().await {
                    debug!("Sign-out after missing profile failed: {}", e);
                }
                self.clear_local().await;
                return Err(LoginError::ProfileUnavailable);
            }
            Err(e) => return Err(LoginError::Unavailable(e.to_string())),
        };

        if account.is_blocked {
            self.reject_blocked(user_id).await;
            return Err(LoginError::Blocked);
        }

        let outcome = LoginOutcome {
            role: account.role,
            status: account.status(),
        };
        self.adopt(&session, account, false).await;
        info!("Signed in {} as {}", user_id, outcome.role.as_str());
        Ok(outcome)
    }

    async fn observe_session(&self, session: AuthSession, reload_profile: bool) {
        let current = self.current();
        let same_user = current.user_id() == Some(session.user.id);

        if same_user && !current.provisional && !reload_profile {
            let token = session.access_token.clone();
            self.session.update(|snapshot| SessionSnapshot {
                access_token: Some(token),
                ..snapshot.clone()
            });
            return;
        }

        match self.fetch_profile_with_retry(session.user.id).await {
            Ok(Some(account)) if account.is_blocked => self.reject_blocked(account.id).await,
            Ok(Some(account)) => self.adopt(&session, account, false).await,
            Ok(None) | Err(_) if same_user => {
                debug!("Profile for {} still unavailable, keeping current state", session.user.id);
            }
            Ok(None) => {
                warn!("Session for {} has no profile", session.user.id);
                self.clear_local().await;
            }
            Err(e) => {
                warn!("Profile lookup for {} failed: {}", session.user.id, e);
                self.clear_local().await;
            }
        }
    }

    /// Bounded retry over not-found and transient errors. `Ok(None)` means
    /// the row never appeared.
    async fn fetch_profile_with_retry(&self, user_id: Uuid) -> Result<Option<Account>, StoreError> {
        let store = &self.store;
        let result = with_retry(
            self.config.profile_retry(),
            |e: &StoreError| e.is_retryable(),
            || async move { store.get_profile(user_id).await },
        )
        .await;

        match result {
            Ok(account) => Ok(Some(account)),
            Err(e) if e.is_not_found() => {
                metrics::record_profile_retry_exhausted();
                warn!(
                    "Profile {} not found after {} attempts",
                    user_id, self.config.profile_retry_attempts
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn load_access(&self, user_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let links = self.store.list_purchase_links(user_id).await;
        let transactions = self.store.list_transactions(Some(user_id)).await;

        let mut ids = BTreeSet::new();
        match (links, transactions) {
            (Err(e), Err(_)) => return Err(e),
            (links, transactions) => {
                match links {
                    Ok(links) => ids.extend(links.into_iter().map(|l| l.course_id)),
                    Err(e) => warn!("Purchase links unavailable for {}: {}", user_id, e),
                }
                match transactions {
                    Ok(txs) => ids.extend(
                        txs.into_iter()
                            .filter(|t| t.status == TransactionStatus::Completed)
                            .map(|t| t.course_id)
                            .filter(|id| !CorporatePackage::is_placeholder_course(*id)),
                    ),
                    Err(e) => warn!("Transactions unavailable for {}: {}", user_id, e),
                }
            }
        }

        Ok(ids.into_iter().collect())
    }

    async fn adopt(&self, session: &AuthSession, account: Account, provisional: bool) {
        let purchased_course_ids = match self.load_access(account.id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Could not load purchased courses for {}: {}", account.id, e);
                Vec::new()
            }
        };

        self.session.replace(SessionSnapshot {
            account: Some(account),
            access_token: Some(session.access_token.clone()),
            purchased_course_ids,
            provisional,
        });
    }

    async fn reject_blocked(&self, user_id: Uuid) {
        info!("Rejecting blocked account {}", user_id);
        if let Err(e) = self.provider.sign_out().await {
            debug!("Sign-out of blocked account failed: {}", e);
        }
        self.clear_local().await;
    }

    async fn clear_local(&self) {
        self.session.clear();
        if let Some(ref catalog) = self.catalog {
            catalog.invalidate().await;
        }
    }
}
