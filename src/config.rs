/// Configuration management for the LearnHub service
use crate::{
    error::{HubError, HubResult},
    ledger::TaxRate,
    retry::RetryConfig,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub backend: BackendConfig,
    pub email: Option<EmailConfig>,
    pub pricing: PricingConfig,
    pub session: SessionConfig,
    pub catalog: CatalogConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Public URL of the web app, used for dashboard links in emails
    pub public_url: String,
    pub version: String,
}

/// Hosted backend (PostgREST + GoTrue) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Project URL; empty selects the in-memory development backend
    pub url: String,
    pub anon_key: String,
    pub service_role_key: String,
    /// HS256 secret used to verify access tokens
    pub jwt_secret: String,
    pub request_timeout_secs: u64,
}

/// SMTP relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: String,
    pub from_name: String,
    /// Recipient of signup approval notifications
    pub admin_email: String,
}

/// Pricing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Fraction of the course price charged as service tax (0.18 = 18%)
    pub service_tax_rate: f64,
    pub class_zoom_link: Option<String>,
}

/// Session bootstrap configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub profile_retry_attempts: u32,
    pub profile_retry_delay_ms: u64,
    pub oauth_poll_window_ms: u64,
    pub oauth_poll_interval_ms: u64,
}

/// Catalog cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub cache_ttl_secs: u64,
    pub page_size: u32,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub unauthenticated_rps: u32,
    pub burst_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                hostname: "0.0.0.0".to_string(),
                port: 3000,
                public_url: "http://localhost:3000".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            backend: BackendConfig {
                url: String::new(),
                anon_key: String::new(),
                service_role_key: String::new(),
                jwt_secret: "local-development-secret-change-me-now".to_string(),
                request_timeout_secs: 15,
            },
            email: None,
            pricing: PricingConfig {
                service_tax_rate: 0.18,
                class_zoom_link: None,
            },
            session: SessionConfig::default(),
            catalog: CatalogConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            profile_retry_attempts: 5,
            profile_retry_delay_ms: 200,
            oauth_poll_window_ms: 2000,
            oauth_poll_interval_ms: 100,
        }
    }
}

impl SessionConfig {
    /// Retry policy for profile rows that may not exist yet
    pub fn profile_retry(&self) -> RetryConfig {
        RetryConfig::fixed(
            self.profile_retry_attempts,
            Duration::from_millis(self.profile_retry_delay_ms),
        )
    }

    pub fn oauth_poll_window(&self) -> Duration {
        Duration::from_millis(self.oauth_poll_window_ms)
    }

    pub fn oauth_poll_interval(&self) -> Duration {
        Duration::from_millis(self.oauth_poll_interval_ms)
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 600,
            page_size: 6,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            authenticated_rps: 100,
            unauthenticated_rps: 10,
            burst_size: 50,
        }
    }
}

impl PricingConfig {
    pub fn tax_rate(&self) -> HubResult<TaxRate> {
        TaxRate::from_fraction(self.service_tax_rate).ok_or_else(|| {
            HubError::Validation(format!(
                "Service tax rate must be in [0, 1), got {}",
                self.service_tax_rate
            ))
        })
    }
}

impl BackendConfig {
    /// Whether a hosted backend is configured
    pub fn is_hosted(&self) -> bool {
        !self.url.is_empty()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> HubResult<Self> {
        dotenv::dotenv().ok();

        let defaults = ServerConfig::default();

        let hostname = env::var("HOST").unwrap_or_else(|_| defaults.service.hostname.clone());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| HubError::Validation("Invalid port number".to_string()))?;
        let public_url = env::var("PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        let backend = BackendConfig {
            url: env::var("SUPABASE_URL")
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string(),
            anon_key: env::var("SUPABASE_ANON_KEY").unwrap_or_default(),
            service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY").unwrap_or_default(),
            jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| defaults.backend.jwt_secret.clone()),
            request_timeout_secs: env::var("BACKEND_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .unwrap_or(15),
        };

        // SMTP is optional; both user and password must be present
        let email = match (env::var("SMTP_USER"), env::var("SMTP_PASSWORD")) {
            (Ok(smtp_user), Ok(smtp_password)) if !smtp_user.is_empty() => Some(EmailConfig {
                smtp_host: env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
                smtp_port: env::var("SMTP_PORT")
                    .unwrap_or_else(|_| "587".to_string())
                    .parse()
                    .unwrap_or(587),
                admin_email: env::var("ADMIN_EMAIL").unwrap_or_else(|_| smtp_user.clone()),
                from_name: env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "LearnHub".to_string()),
                smtp_user,
                smtp_password,
            }),
            _ => None,
        };

        let pricing = PricingConfig {
            service_tax_rate: env::var("SERVICE_TAX_RATE")
                .unwrap_or_else(|_| "0.18".to_string())
                .parse()
                .map_err(|_| HubError::Validation("Invalid SERVICE_TAX_RATE".to_string()))?,
            class_zoom_link: env::var("CLASS_ZOOM_LINK").ok().filter(|s| !s.is_empty()),
        };

        let session = SessionConfig {
            profile_retry_attempts: env::var("PROFILE_RETRY_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            profile_retry_delay_ms: env::var("PROFILE_RETRY_DELAY_MS")
                .unwrap_or_else(|_| "200".to_string())
                .parse()
                .unwrap_or(200),
            oauth_poll_window_ms: env::var("OAUTH_POLL_WINDOW_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .unwrap_or(2000),
            oauth_poll_interval_ms: env::var("OAUTH_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
        };

        let catalog = CatalogConfig {
            cache_ttl_secs: env::var("CATALOG_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .unwrap_or(600),
            page_size: env::var("CATALOG_PAGE_SIZE")
                .unwrap_or_else(|_| "6".to_string())
                .parse()
                .unwrap_or(6),
        };

        let rate_limit = RateLimitConfig {
            enabled: env::var("RATE_LIMIT_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            authenticated_rps: env::var("RATE_LIMIT_RPS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
            unauthenticated_rps: env::var("RATE_LIMIT_ANON_RPS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            burst_size: env::var("RATE_LIMIT_BURST")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),
        };

        let logging = LoggingConfig {
            level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        };

        let config = ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                public_url,
                version: defaults.service.version,
            },
            backend,
            email,
            pricing,
            session,
            catalog,
            rate_limit,
            logging,
        };
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> HubResult<()> {
        if self.service.hostname.is_empty() {
            return Err(HubError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.backend.jwt_secret.len() < 32 {
            return Err(HubError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.backend.is_hosted() && self.backend.service_role_key.is_empty() {
            return Err(HubError::Validation(
                "SUPABASE_SERVICE_ROLE_KEY is required when SUPABASE_URL is set".to_string(),
            ));
        }

        self.pricing.tax_rate()?;

        if self.session.profile_retry_attempts == 0 {
            return Err(HubError::Validation(
                "PROFILE_RETRY_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        if self.catalog.page_size == 0 {
            return Err(HubError::Validation(
                "CATALOG_PAGE_SIZE must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Dashboard link included in admin notifications
    pub fn dashboard_url(&self) -> String {
        format!("{}/dashboard", self.service.public_url)
    }
}
