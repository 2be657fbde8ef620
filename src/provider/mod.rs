/// Hosted authentication collaborator
///
/// The auth service owns credentials and sessions. This crate only drives
/// sign-in, sign-up, sign-out and code exchange, and observes the resulting
/// session events.

mod gotrue;
mod pkce;

pub use gotrue::GoTrueProvider;
pub use pkce::PkceChallenge;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Authenticated user as reported by the auth service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

/// Bearer credential bound to a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Unix seconds
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl AuthSession {
    pub fn is_expired(&self, now_unix: i64) -> bool {
        self.expires_at.map_or(false, |exp| exp <= now_unix)
    }
}

/// Result of registering a credential. The session is absent when the
/// project requires email confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct SignUpResult {
    pub user: AuthUser,
    pub session: Option<AuthSession>,
}

/// Session state transitions pushed by the auth service
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(AuthSession),
    SignedOut,
    TokenRefreshed(Option<AuthSession>),
    TokenRefreshFailed,
    UserUpdated(AuthSession),
}

impl AuthEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn(_) => "SIGNED_IN",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::TokenRefreshed(_) => "TOKEN_REFRESHED",
            AuthEvent::TokenRefreshFailed => "TOKEN_REFRESH_FAILED",
            AuthEvent::UserUpdated(_) => "USER_UPDATED",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    /// Authorization code already used or expired
    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    /// Business rejection from the auth service (e.g. already registered)
    #[error("{0}")]
    Rejected(String),

    #[error("Auth service unavailable: {0}")]
    Transient(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> ProviderResult<AuthSession>;

    async fn sign_up(&self, email: &str, password: &str, name: &str) -> ProviderResult<SignUpResult>;

    /// Invalidate the current credential. Local session state is dropped
    /// even when the remote call fails.
    async fn sign_out(&self) -> ProviderResult<()>;

    async fn exchange_code_for_session(&self, code: &str) -> ProviderResult<AuthSession>;

    async fn current_session(&self) -> ProviderResult<Option<AuthSession>>;

    async fn refresh_session(&self) -> ProviderResult<AuthSession>;

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}
