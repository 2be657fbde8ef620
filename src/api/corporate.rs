/// Corporate training package sales
use crate::{
    api::ApiJson,
    auth::AuthContext,
    context::AppContext,
    error::{HubError, HubResult},
    ledger::{Money, PriceBreakdown, Transaction},
    purchase::{create_corporate_transaction, CorporatePackage},
    store::StoreError,
};
use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/create-corporate-transaction", post(create_transaction))
}

/// Amounts are in major units on the wire
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CorporateTransactionRequest {
    user_id: Option<Uuid>,
    package_duration: Option<String>,
    package_price: Option<Money>,
    service_tax: Option<Money>,
    total_amount: Option<Money>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CorporateTransactionResponse {
    success: bool,
    transaction_id: Uuid,
    transaction: Transaction,
}

async fn create_transaction(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CorporateTransactionRequest>,
) -> HubResult<Json<CorporateTransactionResponse>> {
    let (user_id, label, price) = match (req.user_id, req.package_duration, req.package_price) {
        (Some(user_id), Some(label), Some(price)) if !label.trim().is_empty() && price != Money::ZERO => {
            (user_id, label, price)
        }
        _ => return Err(HubError::Validation("Missing required fields".to_string())),
    };

    if user_id != auth.user_id {
        let is_admin = match ctx.store.get_profile(auth.user_id).await {
            Ok(account) => account.is_admin(),
            Err(StoreError::NotFound(_)) => false,
            Err(e) => return Err(e.into()),
        };
        if !is_admin {
            return Err(HubError::Authorization(
                "Cannot create transactions for another account".to_string(),
            ));
        }
    }

    let out_of_range = || HubError::Validation("Amount out of range".to_string());
    let tax = match req.service_tax {
        Some(tax) => tax,
        None => ctx.tax_rate.tax_on(price).ok_or_else(out_of_range)?,
    };
    let total = match req.total_amount {
        Some(total) => total,
        None => price.checked_add(tax).ok_or_else(out_of_range)?,
    };
    let breakdown = PriceBreakdown::from_parts(price, tax, total).ok_or_else(|| {
        HubError::Validation("Total amount must equal package price plus service tax".to_string())
    })?;

    let package = CorporatePackage::from_label_or_default(&label);
    let transaction = create_corporate_transaction(ctx.store.as_ref(), user_id, package, breakdown)
        .await
        .map_err(|e| {
            tracing::error!("Error creating corporate training transaction: {}", e);
            HubError::from(e)
        })?;

    Ok(Json(CorporateTransactionResponse {
        success: true,
        transaction_id: transaction.id,
        transaction,
    }))
}
