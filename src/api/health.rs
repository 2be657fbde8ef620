/// Health endpoints
///
/// `/health/live` only proves the process answers. `/health/ready` and
/// `/health/detailed` probe the data backend; a missing SMTP setup only
/// degrades the service since purchases still succeed without email.
use crate::context::AppContext;
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: &'static str,
    pub status: HealthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub version: &'static str,
    pub checks: Vec<ComponentHealth>,
}

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
        .route("/health/detailed", get(health_detailed))
}

pub async fn health_basic() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn liveness_probe() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 503 until the data backend answers
pub async fn readiness_probe(
    State(ctx): State<AppContext>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let backend = check_backend(&ctx).await;
    if backend.status == HealthState::Unhealthy {
        tracing::warn!(error = ?backend.error, "readiness_probe_failed: backend check failed");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(serde_json::json!({
        "status": "ready",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

pub async fn health_detailed(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthReport>) {
    let checks = vec![check_backend(&ctx).await, check_email(&ctx)];
    let status = overall(&checks);

    let code = match status {
        HealthState::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    (
        code,
        Json(HealthReport {
            status,
            version: env!("CARGO_PKG_VERSION"),
            checks,
        }),
    )
}

async fn check_backend(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();
    let result = ctx.store.list_categories().await;
    let elapsed = Some(start.elapsed().as_millis() as u64);

    match result {
        Ok(_) => ComponentHealth {
            name: "backend",
            status: HealthState::Healthy,
            response_time_ms: elapsed,
            error: None,
        },
        Err(e) => ComponentHealth {
            name: "backend",
            status: HealthState::Unhealthy,
            response_time_ms: elapsed,
            error: Some(e.to_string()),
        },
    }
}

fn check_email(ctx: &AppContext) -> ComponentHealth {
    let configured = ctx.config.email.is_some();
    ComponentHealth {
        name: "email",
        status: if configured {
            HealthState::Healthy
        } else {
            HealthState::Degraded
        },
        response_time_ms: None,
        error: (!configured).then(|| "SMTP not configured".to_string()),
    }
}

/// Worst component wins
fn overall(checks: &[ComponentHealth]) -> HealthState {
    checks
        .iter()
        .map(|c| c.status)
        .max()
        .unwrap_or(HealthState::Healthy)
}
