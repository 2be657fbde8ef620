/// Templated email endpoint
use crate::{
    api::ApiJson,
    auth::AuthContext,
    context::AppContext,
    error::{HubError, HubResult},
    mailer::{EmailMessage, EmailRequest},
};
use axum::{extract::State, routing::post, Json, Router};
use serde_json::json;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/send-email", post(send_email))
}

/// Purchase confirmations need a signed-in caller. Signup notifications
/// only ever go to the admin address and may come from a learner whose
/// email is not confirmed yet.
async fn send_email(
    State(ctx): State<AppContext>,
    auth: Option<AuthContext>,
    ApiJson(req): ApiJson<EmailRequest>,
) -> HubResult<Json<serde_json::Value>> {
    let message = req.into_message()?;

    if matches!(message, EmailMessage::CoursePurchase { .. }) && auth.is_none() {
        return Err(HubError::Authentication("Missing authorization header".to_string()));
    }

    ctx.mailer.send(&message).await?;
    Ok(Json(json!({ "success": true })))
}
