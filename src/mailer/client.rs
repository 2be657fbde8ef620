/// Client for the service's own `/api/send-email` endpoint
use super::{EmailError, EmailMessage, EmailSender};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::RwLock;

/// Sends email through a running LearnHub server instead of SMTP directly
pub struct HttpEmailClient {
    client: Client,
    endpoint: String,
    access_token: RwLock<Option<String>>,
}

impl HttpEmailClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EmailError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmailError::Send(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/send-email", base_url.trim_end_matches('/')),
            access_token: RwLock::new(None),
        })
    }

    /// Bearer token attached to subsequent requests
    pub async fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().await = token;
    }
}

#[async_trait]
impl EmailSender for HttpEmailClient {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let mut request = self.client.post(&self.endpoint).json(&message.to_request());
        if let Some(token) = self.access_token.read().await.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EmailError::Send(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let text = body
            .get("message")
            .or_else(|| body.get("error"))
            .and_then(|v| v.as_str())
            .unwrap_or("email endpoint failed")
            .to_string();

        Err(match status.as_u16() {
            400 if text == "Invalid email type" => EmailError::InvalidType,
            400 => EmailError::InvalidPayload(text),
            500 if text.contains("not configured") => EmailError::NotConfigured,
            _ => EmailError::Send(format!("{}: {}", status, text)),
        })
    }
}
