//! Rate limiting middleware using token bucket algorithm

use agentdesk_common::config::RateLimitConfig;
use agentdesk_common::errors::AppError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Process-wide limiter shared by all guarded routes
pub type GlobalRateLimiter = DefaultDirectRateLimiter;

/// Create a new rate limiter; zero values are raised to one
pub fn create_rate_limiter(config: &RateLimitConfig) -> Arc<GlobalRateLimiter> {
    let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(config.burst).unwrap_or(per_second);

    Arc::new(RateLimiter::direct(
        Quota::per_second(per_second).allow_burst(burst),
    ))
}

/// Reject the request with 429 once the bucket is empty
pub async fn rate_limit(
    State(limiter): State<Arc<GlobalRateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
            Err(AppError::RateLimited)
        }
    }
}
