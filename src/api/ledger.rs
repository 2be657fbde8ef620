/// Purchase history and disputes for the signed-in account
use crate::{
    api::ApiJson,
    auth::AuthContext,
    context::AppContext,
    error::{HubError, HubResult},
    ledger::{LedgerReader, Transaction, TransactionView},
    store::StoreError,
};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/transactions", get(list_transactions))
        .route("/api/transactions/:id/dispute", post(file_dispute))
}

async fn caller_profile(ctx: &AppContext, auth: &AuthContext) -> HubResult<crate::account::Account> {
    match ctx.store.get_profile(auth.user_id).await {
        Ok(account) if account.is_blocked => {
            Err(HubError::Authorization("Account blocked".to_string()))
        }
        Ok(account) => Ok(account),
        Err(StoreError::NotFound(_)) => Err(HubError::Authentication("No profile for token".to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Admins get every transaction with purchaser names; learners their own
async fn list_transactions(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> HubResult<Json<Vec<TransactionView>>> {
    let caller = caller_profile(&ctx, &auth).await?;
    let reader = LedgerReader::new(ctx.store.clone());
    Ok(Json(reader.list_transactions(Some(&caller)).await?))
}

#[derive(Debug, Deserialize)]
struct DisputeRequest {
    #[serde(default)]
    reason: String,
}

async fn file_dispute(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<DisputeRequest>,
) -> HubResult<Json<Transaction>> {
    let caller = caller_profile(&ctx, &auth).await?;
    let reader = LedgerReader::new(ctx.store.clone());
    Ok(Json(reader.file_dispute(Some(&caller), id, &req.reason).await?))
}
