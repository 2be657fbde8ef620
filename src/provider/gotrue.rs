/// GoTrue (hosted auth) client
use super::{
    AuthEvent, AuthProvider, AuthSession, AuthUser, PkceChallenge, ProviderError, ProviderResult,
    SignUpResult,
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    Password,
    Pkce,
    Refresh,
    Other,
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: AuthUser,
}

impl From<TokenResponse> for AuthSession {
    fn from(token: TokenResponse) -> Self {
        let expires_at = token
            .expires_at
            .or_else(|| token.expires_in.map(|secs| Utc::now().timestamp() + secs));
        AuthSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            user: token.user,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorBody {
    fn text(&self) -> String {
        self.error_description
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "Authentication request failed".to_string())
    }

    fn is_invalid_grant(&self) -> bool {
        self.error.as_deref() == Some("invalid_grant")
            || matches!(
                self.error_code.as_deref(),
                Some("invalid_credentials") | Some("bad_code_verifier") | Some("flow_state_not_found")
            )
    }
}

/// Auth provider backed by the hosted GoTrue API
pub struct GoTrueProvider {
    client: Client,
    auth_url: String,
    anon_key: String,
    session: RwLock<Option<AuthSession>>,
    pkce_verifier: Mutex<Option<String>>,
    events: broadcast::Sender<AuthEvent>,
}

impl GoTrueProvider {
    /// `project_url` is the project root, e.g. `https://abc.supabase.co`
    pub fn new(project_url: &str, anon_key: &str, timeout: Duration) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transient(format!("HTTP client setup failed: {}", e)))?;
        let (events, _) = broadcast::channel(32);

        Ok(Self {
            client,
            auth_url: format!("{}/auth/v1", project_url.trim_end_matches('/')),
            anon_key: anon_key.to_string(),
            session: RwLock::new(None),
            pkce_verifier: Mutex::new(None),
            events,
        })
    }

    /// Start an OAuth sign-in. Returns the URL to redirect the browser to;
    /// the PKCE verifier is kept for the later code exchange.
    pub async fn authorize_url(&self, provider: &str, redirect_to: &str) -> String {
        let pkce = PkceChallenge::generate();
        *self.pkce_verifier.lock().await = Some(pkce.verifier);

        format!(
            "{}/authorize?provider={}&redirect_to={}&code_challenge={}&code_challenge_method=s256",
            self.auth_url,
            urlencoding::encode(provider),
            urlencoding::encode(redirect_to),
            pkce.challenge
        )
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .header("Content-Type", "application/json")
    }

    fn emit(&self, event: AuthEvent) {
        debug!("Auth event {}", event.name());
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn set_session(&self, session: AuthSession) {
        *self.session.write().await = Some(session);
    }

    async fn token_grant(&self, grant: &str, body: serde_json::Value, kind: Grant) -> ProviderResult<AuthSession> {
        let url = format!("{}/token?grant_type={}", self.auth_url, grant);
        let response = self
            .request(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let token: TokenResponse = parse_response(response, kind).await?;
        Ok(token.into())
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    ProviderError::Transient(err.to_string())
}

async fn parse_response<T: DeserializeOwned>(response: Response, kind: Grant) -> ProviderResult<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Transient(format!("Malformed auth response: {}", e)));
    }

    let body: ErrorBody = response.json().await.unwrap_or_default();
    Err(map_error(status, &body, kind))
}

fn map_error(status: StatusCode, body: &ErrorBody, kind: Grant) -> ProviderError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return ProviderError::Transient(format!("{}: {}", status, body.text()));
    }

    if body.is_invalid_grant() || status == StatusCode::UNAUTHORIZED {
        return match kind {
            Grant::Password => ProviderError::InvalidCredentials,
            Grant::Pkce | Grant::Refresh => ProviderError::InvalidGrant(body.text()),
            Grant::Other => ProviderError::Rejected(body.text()),
        };
    }

    ProviderError::Rejected(body.text())
}

#[async_trait]
impl AuthProvider for GoTrueProvider {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> ProviderResult<AuthSession> {
        let session = self
            .token_grant(
                "password",
                json!({ "email": email, "password": password }),
                Grant::Password,
            )
            .await?;

        self.set_session(session.clone()).await;
        info!("Signed in {}", session.user.id);
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, name: &str) -> ProviderResult<SignUpResult> {
        let response = self
            .request(self.client.post(format!("{}/signup", self.auth_url)))
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "name": name },
            }))
            .send()
            .await
            .map_err(transport_error)?;

        // Autoconfirm projects answer with a session, others with the bare user
        let body: serde_json::Value = parse_response(response, Grant::Other).await?;
        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body)
                .map_err(|e| ProviderError::Transient(format!("Malformed signup response: {}", e)))?;
            let session: AuthSession = token.into();
            self.set_session(session.clone()).await;
            self.emit(AuthEvent::SignedIn(session.clone()));
            return Ok(SignUpResult {
                user: session.user.clone(),
                session: Some(session),
            });
        }

        let user: AuthUser = serde_json::from_value(body)
            .map_err(|e| ProviderError::Transient(format!("Malformed signup response: {}", e)))?;
        Ok(SignUpResult { user, session: None })
    }

    async fn sign_out(&self) -> ProviderResult<()> {
        let token = self.session.write().await.take().map(|s| s.access_token);

        let result = match token {
            Some(token) => self
                .request(self.client.post(format!("{}/logout", self.auth_url)))
                .bearer_auth(token)
                .send()
                .await
                .map_err(transport_error)
                .and_then(|r| {
                    if r.status().is_success() || r.status() == StatusCode::UNAUTHORIZED {
                        Ok(())
                    } else {
                        Err(ProviderError::Transient(format!("Logout failed: {}", r.status())))
                    }
                }),
            None => Ok(()),
        };

        self.emit(AuthEvent::SignedOut);
        result
    }

    async fn exchange_code_for_session(&self, code: &str) -> ProviderResult<AuthSession> {
        let verifier = self
            .pkce_verifier
            .lock()
            .await
            .take()
            .ok_or_else(|| ProviderError::InvalidGrant("No PKCE verifier for this code".to_string()))?;

        let session = self
            .token_grant(
                "pkce",
                json!({ "auth_code": code, "code_verifier": verifier }),
                Grant::Pkce,
            )
            .await?;

        self.set_session(session.clone()).await;
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn current_session(&self) -> ProviderResult<Option<AuthSession>> {
        let current = self.session.read().await.clone();
        match current {
            Some(session) if session.is_expired(Utc::now().timestamp()) => {
                self.refresh_session().await.map(Some)
            }
            other => Ok(other),
        }
    }

    async fn refresh_session(&self) -> ProviderResult<AuthSession> {
        let refresh_token = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::InvalidGrant("No session to refresh".to_string()))?;

        match self
            .token_grant(
                "refresh_token",
                json!({ "refresh_token": refresh_token }),
                Grant::Refresh,
            )
            .await
        {
            Ok(session) => {
                self.set_session(session.clone()).await;
                self.emit(AuthEvent::TokenRefreshed(Some(session.clone())));
                Ok(session)
            }
            Err(ProviderError::Transient(msg)) => Err(ProviderError::Transient(msg)),
            Err(e) => {
                warn!("Token refresh rejected, dropping session: {}", e);
                *self.session.write().await = None;
                self.emit(AuthEvent::TokenRefreshFailed);
                Err(e)
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
