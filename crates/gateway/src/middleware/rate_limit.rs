//! Rate limiting middleware using token bucket algorithm
//!
//! Guards the unauthenticated relay endpoints, where every registration
//! attempt costs a full credential scan.

use airwave_common::{
    config::RateLimitConfig,
    errors::{AppError, Result},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter using governor crate
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Shared limiter for the relay endpoints. `None` when limiting is disabled.
#[derive(Clone)]
pub struct RelayRateLimiter {
    limiter: Option<Arc<GlobalRateLimiter>>,
    requests_per_second: u32,
}

/// Create the relay endpoint limiter from configuration
pub fn create_rate_limiter(config: &RateLimitConfig) -> Result<RelayRateLimiter> {
    if !config.enabled {
        return Ok(RelayRateLimiter {
            limiter: None,
            requests_per_second: config.requests_per_second,
        });
    }

    let per_second = NonZeroU32::new(config.requests_per_second).ok_or_else(|| AppError::Configuration {
        message: "rate_limit.requests_per_second must be greater than zero".to_string(),
    })?;
    let burst = NonZeroU32::new(config.burst).ok_or_else(|| AppError::Configuration {
        message: "rate_limit.burst must be greater than zero".to_string(),
    })?;

    let quota = Quota::per_second(per_second).allow_burst(burst);
    Ok(RelayRateLimiter {
        limiter: Some(Arc::new(RateLimiter::direct(quota))),
        requests_per_second: config.requests_per_second,
    })
}

/// Rate limiting middleware
pub async fn rate_limit(
    State(limiter): State<RelayRateLimiter>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, AppError> {
    if let Some(bucket) = &limiter.limiter {
        if bucket.check().is_err() {
            tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
            return Err(AppError::RateLimited {
                limit: limiter.requests_per_second,
            });
        }
    }

    Ok(next.run(request).await)
}
