//! Rate limiting middleware using token bucket algorithm

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use kgfusion_common::config::RateLimitConfig;
use kgfusion_common::errors::AppError;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter using governor crate
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Limiter plus the configured rate, reported back in rejections
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<GlobalRateLimiter>,
    requests_per_second: u32,
}

impl RateLimitState {
    /// Zero rates are raised to one request per second
    pub fn new(config: &RateLimitConfig) -> Self {
        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst).unwrap_or(per_second);
        let quota = Quota::per_second(per_second).allow_burst(burst);

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            requests_per_second: per_second.get(),
        }
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    match state.limiter.check() {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!("Rate limit exceeded");
            AppError::RateLimited {
                limit: state.requests_per_second,
            }
            .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(requests_per_second: u32, burst: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second,
            burst,
            enabled: true,
        }
    }

    #[test]
    fn test_burst_is_enforced() {
        let state = RateLimitState::new(&config(1, 2));
        assert!(state.limiter.check().is_ok());
        assert!(state.limiter.check().is_ok());
        assert!(state.limiter.check().is_err());
    }

    #[test]
    fn test_zero_rate_is_raised() {
        let state = RateLimitState::new(&config(0, 0));
        assert_eq!(state.requests_per_second, 1);
        assert!(state.limiter.check().is_ok());
    }
}
