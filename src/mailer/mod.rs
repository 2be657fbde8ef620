/// Transactional email: admin signup notifications and purchase confirmations
use crate::{
    config::EmailConfig,
    error::{HubError, HubResult},
    ledger::Money,
    metrics,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    message::{header::ContentType, Mailbox, Message},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod client;
pub mod templates;

pub use client::HttpEmailClient;
pub use templates::{render, RenderedEmail};

/// Email template kinds, as they appear on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailKind {
    AdminSignupNotification,
    CoursePurchase,
}

impl EmailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailKind::AdminSignupNotification => "admin_signup_notification",
            EmailKind::CoursePurchase => "course_purchase",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin_signup_notification" => Some(EmailKind::AdminSignupNotification),
            "course_purchase" => Some(EmailKind::CoursePurchase),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSignupData {
    pub name: String,
    pub email: String,
    pub signup_date: DateTime<Utc>,
    pub dashboard_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursePurchaseData {
    pub user_name: String,
    pub course_title: String,
    pub instructor: String,
    pub total_amount: Money,
    pub transaction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom_link: Option<String>,
}

/// A fully typed email ready to render
#[derive(Debug, Clone, PartialEq)]
pub enum EmailMessage {
    /// Goes to the configured admin address
    AdminSignupNotification(AdminSignupData),
    CoursePurchase { to: String, data: CoursePurchaseData },
}

impl EmailMessage {
    pub fn kind(&self) -> EmailKind {
        match self {
            EmailMessage::AdminSignupNotification(_) => EmailKind::AdminSignupNotification,
            EmailMessage::CoursePurchase { .. } => EmailKind::CoursePurchase,
        }
    }

    /// Wire form for the `/api/send-email` endpoint
    pub fn to_request(&self) -> EmailRequest {
        match self {
            EmailMessage::AdminSignupNotification(data) => EmailRequest {
                kind: self.kind().as_str().to_string(),
                to: None,
                data: serde_json::to_value(data).unwrap_or_default(),
            },
            EmailMessage::CoursePurchase { to, data } => EmailRequest {
                kind: self.kind().as_str().to_string(),
                to: Some(to.clone()),
                data: serde_json::to_value(data).unwrap_or_default(),
            },
        }
    }
}

/// Untyped `{type, to, data}` request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl EmailRequest {
    pub fn into_message(self) -> Result<EmailMessage, EmailError> {
        let kind = EmailKind::parse(&self.kind).ok_or(EmailError::InvalidType)?;
        match kind {
            EmailKind::AdminSignupNotification => {
                let data = serde_json::from_value(self.data)
                    .map_err(|e| EmailError::InvalidPayload(e.to_string()))?;
                Ok(EmailMessage::AdminSignupNotification(data))
            }
            EmailKind::CoursePurchase => {
                let to = self
                    .to
                    .filter(|t| !t.trim().is_empty())
                    .ok_or(EmailError::MissingRecipient)?;
                let data = serde_json::from_value(self.data)
                    .map_err(|e| EmailError::InvalidPayload(e.to_string()))?;
                Ok(EmailMessage::CoursePurchase { to, data })
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("Invalid email type")]
    InvalidType,

    #[error("Invalid email data: {0}")]
    InvalidPayload(String),

    #[error("Recipient address is required")]
    MissingRecipient,

    #[error("Email service not configured")]
    NotConfigured,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Failed to send email: {0}")]
    Send(String),
}

impl From<EmailError> for HubError {
    fn from(err: EmailError) -> Self {
        match err {
            EmailError::InvalidType
            | EmailError::InvalidPayload(_)
            | EmailError::MissingRecipient
            | EmailError::InvalidAddress(_) => HubError::Validation(err.to_string()),
            other => HubError::Email(other.to_string()),
        }
    }
}

/// Anything that can deliver a transactional email
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

/// SMTP mailer
#[derive(Clone)]
pub struct Mailer {
    config: Option<EmailConfig>,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl Mailer {
    pub fn new(config: Option<EmailConfig>) -> HubResult<Self> {
        let transport = match config {
            Some(ref email) => {
                let creds = Credentials::new(email.smtp_user.clone(), email.smtp_password.clone());
                let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&email.smtp_host)
                    .map_err(|e| HubError::Internal(format!("SMTP setup failed: {}", e)))?
                    .port(email.smtp_port)
                    .credentials(creds)
                    .build();
                Some(transport)
            }
            None => None,
        };

        Ok(Self { config, transport })
    }

    /// Mailer with no transport; every send fails with `NotConfigured`
    pub fn disabled() -> Self {
        Self {
            config: None,
            transport: None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }

    fn recipient<'a>(config: &'a EmailConfig, message: &'a EmailMessage) -> &'a str {
        match message {
            EmailMessage::AdminSignupNotification(_) => &config.admin_email,
            EmailMessage::CoursePurchase { to, .. } => to,
        }
    }

    async fn deliver(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let (config, transport) = match (&self.config, &self.transport) {
            (Some(config), Some(transport)) => (config, transport),
            _ => {
                tracing::warn!("Email not configured, cannot send {}", message.kind().as_str());
                return Err(EmailError::NotConfigured);
            }
        };

        let from: Mailbox = format!("\"{}\" <{}>", config.from_name, config.smtp_user)
            .parse()
            .map_err(|e| EmailError::InvalidAddress(format!("from: {}", e)))?;
        let to_addr = Self::recipient(config, message);
        let to: Mailbox = to_addr
            .parse()
            .map_err(|e| EmailError::InvalidAddress(format!("{}: {}", to_addr, e)))?;

        let rendered = render(message);
        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(rendered.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(rendered.html)
            .map_err(|e| EmailError::Build(e.to_string()))?;

        transport
            .send(email)
            .await
            .map_err(|e| EmailError::Send(e.to_string()))?;

        tracing::info!("Sent email to {}: {}", to_addr, rendered.subject);
        Ok(())
    }
}

#[async_trait]
impl EmailSender for Mailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let result = self.deliver(message).await;
        metrics::record_email(message.kind().as_str(), result.is_ok());
        if let Err(ref e) = result {
            tracing::error!("Email {} failed: {}", message.kind().as_str(), e);
        }
        result
    }
}
