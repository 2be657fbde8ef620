/// Request rate limiting
use crate::{
    config::RateLimitConfig,
    context::AppContext,
    error::{HubError, HubResult},
};
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    authenticated_rps: u32,
    unauthenticated_rps: u32,
    authenticated: Arc<DirectLimiter>,
    unauthenticated: Arc<DirectLimiter>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let auth_quota = Quota::per_second(non_zero(config.authenticated_rps))
            .allow_burst(non_zero(config.burst_size));

        // Anonymous callers get a fifth of the burst
        let unauth_quota = Quota::per_second(non_zero(config.unauthenticated_rps))
            .allow_burst(non_zero(config.burst_size / 5));

        Self {
            enabled: config.enabled,
            authenticated_rps: config.authenticated_rps,
            unauthenticated_rps: config.unauthenticated_rps,
            authenticated: Arc::new(GovernorLimiter::direct(auth_quota)),
            unauthenticated: Arc::new(GovernorLimiter::direct(unauth_quota)),
        }
    }

    fn exceeded() -> HubError {
        HubError::RateLimitExceeded {
            retry_after: Duration::from_secs(1),
        }
    }

    /// Check rate limit for a caller presenting a bearer token
    pub fn check_authenticated(&self) -> HubResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.authenticated.check().map_err(|_| Self::exceeded())
    }

    /// Check rate limit for an anonymous caller
    pub fn check_unauthenticated(&self) -> HubResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.unauthenticated.check().map_err(|_| Self::exceeded())
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, HubError> {
    let has_auth_header = request.headers().get("authorization").is_some();

    let limit = if has_auth_header {
        ctx.rate_limiter.check_authenticated()?;
        ctx.rate_limiter.authenticated_rps
    } else {
        ctx.rate_limiter.check_unauthenticated()?;
        ctx.rate_limiter.unauthenticated_rps
    };

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert("X-RateLimit-Limit", HeaderValue::from(limit));
    Ok(response)
}
