/// API routes and handlers
pub mod admin;
pub mod corporate;
pub mod email;
pub mod health;
pub mod ledger;
pub mod middleware;

use crate::{context::AppContext, error::HubError};
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json, Router,
};

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(admin::routes())
        .merge(corporate::routes())
        .merge(email::routes())
        .merge(ledger::routes())
}

/// JSON body whose rejections render as `HubError` bodies
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = HubError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => {
                tracing::debug!("Rejected request body: {}", rejection.body_text());
                Err(HubError::Validation("Invalid request data".to_string()))
            }
        }
    }
}
