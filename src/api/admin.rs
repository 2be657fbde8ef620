/// Admin endpoints: account approval, blocking and course edits
use crate::{
    account::LearnerSummary,
    api::ApiJson,
    auth::AdminAuthContext,
    catalog::{Course, CourseUpdate},
    context::AppContext,
    error::{HubError, HubResult},
    ledger::{LedgerReader, LedgerSummary},
};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Build admin API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/approve-user", post(approve_user))
        .route("/api/block-user", post(block_user))
        .route("/api/update-course", post(update_course))
        .route("/api/admin/learners", get(list_learners))
        .route("/api/admin/ledger-summary", get(ledger_summary))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApproveUserRequest {
    user_id: Option<Uuid>,
    is_approved: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockUserRequest {
    user_id: Option<Uuid>,
    is_blocked: Option<bool>,
}

fn invalid_request() -> HubError {
    HubError::Validation("Invalid request data".to_string())
}

async fn approve_user(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    ApiJson(req): ApiJson<ApproveUserRequest>,
) -> HubResult<Json<serde_json::Value>> {
    let (user_id, approved) = match (req.user_id, req.is_approved) {
        (Some(id), Some(flag)) => (id, flag),
        _ => return Err(invalid_request()),
    };

    ctx.account_manager.set_approval(user_id, approved).await?;
    tracing::info!("Admin {} set approval of {} to {}", auth.user_id, user_id, approved);

    Ok(Json(json!({ "success": true })))
}

async fn block_user(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    ApiJson(req): ApiJson<BlockUserRequest>,
) -> HubResult<Json<serde_json::Value>> {
    let (user_id, blocked) = match (req.user_id, req.is_blocked) {
        (Some(id), Some(flag)) => (id, flag),
        _ => return Err(invalid_request()),
    };

    if user_id == auth.user_id && blocked {
        return Err(HubError::Validation("Admins cannot block themselves".to_string()));
    }

    ctx.account_manager.set_blocked(user_id, blocked).await?;
    tracing::info!("Admin {} set blocked of {} to {}", auth.user_id, user_id, blocked);

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateCourseRequest {
    course_id: Option<Uuid>,
    updates: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct UpdateCourseResponse {
    success: bool,
    course: Course,
}

async fn update_course(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    ApiJson(req): ApiJson<UpdateCourseRequest>,
) -> HubResult<Json<UpdateCourseResponse>> {
    let course_id = req
        .course_id
        .ok_or_else(|| HubError::Validation("Course ID is required".to_string()))?;

    let updates = match req.updates {
        Some(value @ serde_json::Value::Object(_)) => value,
        _ => return Err(HubError::Validation("Invalid updates data".to_string())),
    };
    let update: CourseUpdate = serde_json::from_value(updates)
        .map_err(|_| HubError::Validation("Invalid updates data".to_string()))?;

    let patch = update.into_patch().map_err(|fields| {
        let message = fields
            .first()
            .map(|f| f.message.clone())
            .unwrap_or_else(|| "Invalid updates data".to_string());
        HubError::FieldValidation { message, fields }
    })?;

    let course = if patch.is_empty() {
        ctx.store.get_course(course_id).await?
    } else {
        ctx.store.update_course(course_id, &patch).await?
    };

    tracing::info!("Admin {} updated course {}", auth.user_id, course_id);
    Ok(Json(UpdateCourseResponse {
        success: true,
        course,
    }))
}

async fn list_learners(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
) -> HubResult<Json<Vec<LearnerSummary>>> {
    Ok(Json(ctx.account_manager.list_learners_with_purchases().await?))
}

async fn ledger_summary(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
) -> HubResult<Json<LedgerSummary>> {
    let reader = LedgerReader::new(ctx.store.clone());
    Ok(Json(reader.summary(Some(&auth.account)).await?))
}
