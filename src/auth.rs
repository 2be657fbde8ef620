/// Authentication extractors and utilities
use crate::{
    account::Account,
    api::middleware::extract_bearer_token,
    context::AppContext,
    error::{HubError, HubResult},
    store::StoreError,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access-token claims issued by the hosted auth service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub email: Option<String>,
    /// Database role of the token (`authenticated`, `service_role`), not the account role
    #[serde(default)]
    pub role: Option<String>,
}

/// Authenticated context - any signed-in account
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub claims: Claims,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = HubError;

    async fn from_request_parts(parts: &mut Parts, state: &AppContext) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| HubError::Authentication("Missing authorization header".to_string()))?;

        let token_data = verify_jwt_token(&token, &state.config.backend.jwt_secret)?;
        let user_id = Uuid::parse_str(&token_data.claims.sub)
            .map_err(|_| HubError::Authentication("Invalid token subject".to_string()))?;

        Ok(AuthContext {
            user_id,
            claims: token_data.claims,
        })
    }
}

/// Admin authentication context - the profile must carry the admin role
#[derive(Debug, Clone)]
pub struct AdminAuthContext {
    pub user_id: Uuid,
    pub account: Account,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuthContext {
    type Rejection = HubError;

    async fn from_request_parts(parts: &mut Parts, state: &AppContext) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;

        let account = match state.store.get_profile(auth.user_id).await {
            Ok(account) => account,
            Err(StoreError::NotFound(_)) => {
                tracing::warn!("AdminAuthContext: no profile for {}", auth.user_id);
                return Err(HubError::Authorization("Admin role required".to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if !account.is_admin() || account.is_blocked {
            tracing::warn!("AdminAuthContext: {} is not an admin", auth.user_id);
            return Err(HubError::Authorization("Admin role required".to_string()));
        }

        tracing::debug!("AdminAuthContext: admin {} authorized", auth.user_id);
        Ok(AdminAuthContext {
            user_id: auth.user_id,
            account,
        })
    }
}

/// Verify an HS256 access token: signature and expiry, with 5 minutes of
/// clock skew. Audience is not checked.
pub fn verify_jwt_token(token: &str, jwt_secret: &str) -> HubResult<TokenData<Claims>> {
    let decoding_key = DecodingKey::from_secret(jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 300;
    validation.validate_aud = false;

    decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::warn!("JWT verification failed: {}", e);
        HubError::Authentication(format!("Invalid token: {}", e))
    })
}
