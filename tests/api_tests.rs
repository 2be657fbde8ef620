/// HTTP surface tests against an in-memory backend
mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use common::{admin, learner, new_course, RecordingEmailSender};
use jsonwebtoken::{encode, EncodingKey, Header};
use learnhub::{
    account::Account,
    auth::Claims,
    config::ServerConfig,
    context::AppContext,
    ledger::{Money, NewTransaction, PriceBreakdown, TaxRate, TransactionStatus},
    mailer::{EmailMessage, Mailer},
    purchase::CorporatePackage,
    server::build_router,
    store::{DataStore, MemoryStore},
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

struct Api {
    server: TestServer,
    store: Arc<MemoryStore>,
    email: Arc<RecordingEmailSender>,
    secret: String,
}

fn config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.rate_limit.enabled = false;
    config
}

fn api_with(config: ServerConfig) -> Api {
    let store = Arc::new(MemoryStore::new());
    let email = Arc::new(RecordingEmailSender::new());
    let secret = config.backend.jwt_secret.clone();
    let ctx = AppContext::with_services(config, store.clone(), email.clone()).unwrap();
    Api {
        server: TestServer::new(build_router(ctx)).unwrap(),
        store,
        email,
        secret,
    }
}

fn api() -> Api {
    api_with(config())
}

impl Api {
    fn token_for(&self, user_id: Uuid) -> String {
        let claims = Claims {
            sub: user_id.to_string(),
            exp: chrono::Utc::now().timestamp() + 3600,
            email: None,
            role: Some("authenticated".to_string()),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .unwrap()
    }

    async fn with_profile(&self, account: Account) -> (Account, String) {
        self.store.put_profile(account.clone()).await;
        let token = self.token_for(account.id);
        (account, token)
    }
}

#[tokio::test]
async fn test_health_endpoints() {
    let api = api();

    let response = api.server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "ok");

    api.server.get("/health/ready").await.assert_status_ok();

    let detailed = api.server.get("/health/detailed").await;
    detailed.assert_status_ok();
    let body = detailed.json::<Value>();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"][1]["name"], "email");
}

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let api = api();
    let response = api.server.get("/api/nope").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["message"], "Endpoint not found");
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_counters() {
    let api = api();
    api.server.get("/health").await.assert_status_ok();

    let response = api.server.get("/metrics").await;
    response.assert_status_ok();
    assert!(response.text().contains("http_requests_total"));
}

#[tokio::test]
async fn test_approve_user_requires_admin() {
    let api = api();
    let (target, _) = api
        .with_profile(Account {
            is_approved: false,
            ..learner("new@example.com", "New")
        })
        .await;
    let (_, learner_token) = api.with_profile(learner("ada@example.com", "Ada")).await;

    api.server
        .post("/api/approve-user")
        .json(&json!({ "userId": target.id, "isApproved": true }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    api.server
        .post("/api/approve-user")
        .authorization_bearer(learner_token)
        .json(&json!({ "userId": target.id, "isApproved": true }))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    api.server
        .post("/api/approve-user")
        .authorization_bearer("not-a-jwt")
        .json(&json!({ "userId": target.id, "isApproved": true }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_approves_and_blocks() {
    let api = api();
    let (target, _) = api
        .with_profile(Account {
            is_approved: false,
            ..learner("new@example.com", "New")
        })
        .await;
    let (_, token) = api.with_profile(admin("root@example.com")).await;

    let response = api
        .server
        .post("/api/approve-user")
        .authorization_bearer(token.clone())
        .json(&json!({ "userId": target.id, "isApproved": true }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>(), json!({ "success": true }));
    assert!(api.store.get_profile(target.id).await.unwrap().is_approved);

    api.server
        .post("/api/block-user")
        .authorization_bearer(token)
        .json(&json!({ "userId": target.id, "isBlocked": true }))
        .await
        .assert_status_ok();
    assert!(api.store.get_profile(target.id).await.unwrap().is_blocked);
}

#[tokio::test]
async fn test_admin_request_validation() {
    let api = api();
    let (root, token) = api.with_profile(admin("root@example.com")).await;

    let response = api
        .server
        .post("/api/approve-user")
        .authorization_bearer(token.clone())
        .json(&json!({ "userId": Uuid::new_v4() }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "Invalid request data");

    let response = api
        .server
        .post("/api/block-user")
        .authorization_bearer(token.clone())
        .json(&json!({ "userId": root.id, "isBlocked": true }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    api.server
        .post("/api/approve-user")
        .authorization_bearer(token)
        .json(&json!({ "userId": Uuid::new_v4(), "isApproved": true }))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_course() {
    let api = api();
    let (_, token) = api.with_profile(admin("root@example.com")).await;
    let course = api.store.insert_course(new_course("Rust", 100)).await.unwrap();

    let response = api
        .server
        .post("/api/update-course")
        .authorization_bearer(token.clone())
        .json(&json!({
            "courseId": course.id,
            "updates": { "title": "Rust in Depth", "price": 150.5, "level": "Advanced" }
        }))
        .await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["success"], true);
    assert_eq!(body["course"]["title"], "Rust in Depth");
    assert_eq!(body["course"]["price"], 150.5);

    let stored = api.store.get_course(course.id).await.unwrap();
    assert_eq!(stored.price, Money::from_cents(15_050));

    let response = api
        .server
        .post("/api/update-course")
        .authorization_bearer(token.clone())
        .json(&json!({ "courseId": course.id, "updates": { "rating": 7.0 } }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert_eq!(body["message"], "Rating must be between 0 and 5");
    assert_eq!(body["fields"][0]["field"], "rating");

    let response = api
        .server
        .post("/api/update-course")
        .authorization_bearer(token.clone())
        .json(&json!({ "updates": { "title": "x" } }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "Course ID is required");

    let response = api
        .server
        .post("/api/update-course")
        .authorization_bearer(token)
        .json(&json!({ "courseId": course.id, "updates": "title" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "Invalid updates data");
}

#[tokio::test]
async fn test_corporate_transaction_defaults_tax() {
    let api = api();
    let (ada, token) = api.with_profile(learner("ada@example.com", "Ada")).await;

    let response = api
        .server
        .post("/api/create-corporate-transaction")
        .authorization_bearer(token)
        .json(&json!({
            "userId": ada.id,
            "packageDuration": "3 Months",
            "packagePrice": 50000
        }))
        .await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["success"], true);
    assert_eq!(body["transaction"]["service_tax"], 9000.0);
    assert_eq!(body["transaction"]["total_amount"], 59000.0);

    let stored = api.store.list_transactions(Some(ada.id)).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].course_id, CorporatePackage::ThreeMonths.course_id());
    assert_eq!(body["transactionId"], stored[0].id.to_string());
}

#[tokio::test]
async fn test_corporate_transaction_validation() {
    let api = api();
    let (ada, token) = api.with_profile(learner("ada@example.com", "Ada")).await;

    let response = api
        .server
        .post("/api/create-corporate-transaction")
        .authorization_bearer(token.clone())
        .json(&json!({ "userId": ada.id, "packageDuration": "15 Days" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "Missing required fields");

    api.server
        .post("/api/create-corporate-transaction")
        .authorization_bearer(token.clone())
        .json(&json!({
            "userId": ada.id,
            "packageDuration": "15 Days",
            "packagePrice": 100,
            "serviceTax": 18,
            "totalAmount": 200
        }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    api.server
        .post("/api/create-corporate-transaction")
        .authorization_bearer(token)
        .json(&json!({
            "userId": Uuid::new_v4(),
            "packageDuration": "15 Days",
            "packagePrice": 100
        }))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    assert!(api.store.list_transactions(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_corporate_transaction_rejects_oversized_amounts() {
    let api = api();
    let (ada, token) = api.with_profile(learner("ada@example.com", "Ada")).await;

    let response = api
        .server
        .post("/api/create-corporate-transaction")
        .authorization_bearer(token.clone())
        .json(&json!({
            "userId": ada.id,
            "packageDuration": "15 Days",
            "packagePrice": 1e14
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "Invalid request data");

    api.server
        .post("/api/create-corporate-transaction")
        .authorization_bearer(token.clone())
        .json(&json!({
            "userId": ada.id,
            "packageDuration": "15 Days",
            "packagePrice": 1_000_000_000_000i64,
            "serviceTax": 1_000_000_000_000i64
        }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    // Largest accepted price still computes its tax
    let response = api
        .server
        .post("/api/create-corporate-transaction")
        .authorization_bearer(token)
        .json(&json!({
            "userId": ada.id,
            "packageDuration": "15 Days",
            "packagePrice": 1_000_000_000_000i64
        }))
        .await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["transaction"]["service_tax"], 180_000_000_000.0);

    assert_eq!(api.store.list_transactions(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_send_email_dispatches_typed_message() {
    let api = api();
    let (_, token) = api.with_profile(learner("ada@example.com", "Ada")).await;

    let response = api
        .server
        .post("/api/send-email")
        .authorization_bearer(token)
        .json(&json!({
            "type": "course_purchase",
            "to": "ada@example.com",
            "data": {
                "userName": "Ada",
                "courseTitle": "Rust",
                "instructor": "Ferris",
                "totalAmount": 108.0,
                "transactionId": "tx-1"
            }
        }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>(), json!({ "success": true }));

    let sent = api.email.sent();
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        &sent[0],
        EmailMessage::CoursePurchase { to, data }
            if to == "ada@example.com" && data.total_amount == Money::from_major(108)
    ));
}

#[tokio::test]
async fn test_send_email_rules() {
    let api = api();

    let response = api
        .server
        .post("/api/send-email")
        .json(&json!({ "type": "newsletter", "data": {} }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "Invalid email type");

    api.server
        .post("/api/send-email")
        .json(&json!({
            "type": "course_purchase",
            "to": "ada@example.com",
            "data": {
                "userName": "Ada",
                "courseTitle": "Rust",
                "instructor": "Ferris",
                "totalAmount": 108.0,
                "transactionId": "tx-1"
            }
        }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    api.server
        .post("/api/send-email")
        .json(&json!({
            "type": "admin_signup_notification",
            "data": {
                "name": "Grace",
                "email": "grace@example.com",
                "signupDate": "2026-01-05T10:00:00Z",
                "dashboardUrl": "http://localhost:3000/admin"
            }
        }))
        .await
        .assert_status_ok();
    assert_eq!(api.email.sent().len(), 1);
}

#[tokio::test]
async fn test_send_email_without_smtp_reports_not_configured() {
    let store = Arc::new(MemoryStore::new());
    let ctx = AppContext::with_services(config(), store, Arc::new(Mailer::disabled())).unwrap();
    let server = TestServer::new(build_router(ctx)).unwrap();

    let response = server
        .post("/api/send-email")
        .json(&json!({
            "type": "admin_signup_notification",
            "data": {
                "name": "Grace",
                "email": "grace@example.com",
                "signupDate": "2026-01-05T10:00:00Z",
                "dashboardUrl": "http://localhost:3000/admin"
            }
        }))
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json::<Value>()["message"], "Email service not configured");
}

#[tokio::test]
async fn test_transactions_and_disputes_over_http() {
    let api = api();
    let (ada, ada_token) = api.with_profile(learner("ada@example.com", "Ada")).await;
    let (_, bob_token) = api.with_profile(learner("bob@example.com", "Bob")).await;
    let tx = api
        .store
        .insert_transaction(NewTransaction::completed(
            ada.id,
            Uuid::new_v4(),
            "Rust",
            PriceBreakdown::compute(Money::from_major(100), TaxRate::from_basis_points(1800)).unwrap(),
        ))
        .await
        .unwrap();

    let response = api
        .server
        .get("/api/transactions")
        .authorization_bearer(ada_token.clone())
        .await;
    response.assert_status_ok();
    let list = response.json::<Value>();
    assert_eq!(list.as_array().map(Vec::len), Some(1));
    assert_eq!(list[0]["total_amount"], 118.0);

    let bob_list = api
        .server
        .get("/api/transactions")
        .authorization_bearer(bob_token.clone())
        .await
        .json::<Value>();
    assert_eq!(bob_list, json!([]));

    api.server
        .post(&format!("/api/transactions/{}/dispute", tx.id))
        .authorization_bearer(bob_token)
        .json(&json!({ "reason": "not mine" }))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    api.server
        .post(&format!("/api/transactions/{}/dispute", tx.id))
        .authorization_bearer(ada_token.clone())
        .json(&json!({ "reason": "" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    api.server
        .post(&format!("/api/transactions/{}/dispute", tx.id))
        .authorization_bearer(ada_token.clone())
        .json(&json!({ "reason": "charged twice" }))
        .await
        .assert_status_ok();
    assert_eq!(
        api.store.get_transaction(tx.id).await.unwrap().status,
        TransactionStatus::Disputed
    );

    api.server
        .post(&format!("/api/transactions/{}/dispute", tx.id))
        .authorization_bearer(ada_token)
        .json(&json!({ "reason": "again" }))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_admin_views() {
    let api = api();
    let (_, token) = api.with_profile(admin("root@example.com")).await;
    let (ada, _) = api.with_profile(learner("ada@example.com", "Ada")).await;
    api.store
        .insert_transaction(NewTransaction::completed(
            ada.id,
            Uuid::new_v4(),
            "Rust",
            PriceBreakdown::compute(Money::from_major(100), TaxRate::from_basis_points(800)).unwrap(),
        ))
        .await
        .unwrap();

    let learners = api
        .server
        .get("/api/admin/learners")
        .authorization_bearer(token.clone())
        .await;
    learners.assert_status_ok();
    let learners = learners.json::<Value>();
    assert_eq!(learners.as_array().map(Vec::len), Some(1));
    assert_eq!(learners[0]["email"], "ada@example.com");

    let summary = api
        .server
        .get("/api/admin/ledger-summary")
        .authorization_bearer(token)
        .await
        .json::<Value>();
    assert_eq!(summary["transaction_count"], 1);
    assert_eq!(summary["total_revenue"], 108.0);
}

#[tokio::test]
async fn test_anonymous_burst_is_rate_limited() {
    let mut config = ServerConfig::default();
    config.rate_limit.unauthenticated_rps = 1;
    config.rate_limit.burst_size = 5;
    let api = api_with(config);

    let mut statuses = Vec::new();
    for _ in 0..5 {
        statuses.push(api.server.get("/health/live").await.status_code());
    }

    assert_eq!(statuses[0], StatusCode::OK);
    assert!(statuses.contains(&StatusCode::TOO_MANY_REQUESTS));
}
