/// Application context and dependency injection
use crate::{
    account::AccountManager,
    config::ServerConfig,
    error::{HubError, HubResult},
    ledger::TaxRate,
    mailer::{EmailSender, Mailer},
    rate_limit::RateLimiter,
    store::{BearerSource, DataStore, MemoryStore, PostgrestStore},
};
use std::sync::Arc;
use std::time::Duration;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    /// Service-role access to the hosted backend (or in-memory in dev mode)
    pub store: Arc<dyn DataStore>,
    pub account_manager: Arc<AccountManager>,
    pub mailer: Arc<dyn EmailSender>,
    pub rate_limiter: Arc<RateLimiter>,
    pub tax_rate: TaxRate,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> HubResult<Self> {
        config.validate()?;

        let store: Arc<dyn DataStore> = if config.backend.is_hosted() {
            tracing::info!("Using hosted backend at {}", config.backend.url);
            let store = PostgrestStore::new(
                &config.backend.url,
                BearerSource::ServiceRole(config.backend.service_role_key.clone()),
                Duration::from_secs(config.backend.request_timeout_secs),
            )
            .map_err(|e| HubError::Internal(format!("Backend client setup failed: {}", e)))?;
            Arc::new(store)
        } else {
            tracing::warn!("SUPABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        };

        let mailer = Mailer::new(config.email.clone())?;
        if !mailer.is_configured() {
            tracing::warn!("SMTP not configured, email endpoints will fail");
        }

        Self::with_services(config, store, Arc::new(mailer))
    }

    /// Assemble a context around existing services
    pub fn with_services(
        config: ServerConfig,
        store: Arc<dyn DataStore>,
        mailer: Arc<dyn EmailSender>,
    ) -> HubResult<Self> {
        let tax_rate = config.pricing.tax_rate()?;
        let account_manager = Arc::new(AccountManager::new(Arc::clone(&store)));
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Ok(Self {
            config: Arc::new(config),
            store,
            account_manager,
            mailer,
            rate_limiter,
            tax_rate,
        })
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
