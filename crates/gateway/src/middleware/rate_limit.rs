//! Rate limiting middleware using token bucket algorithm

use askroute_common::errors::AppError;
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
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter using governor crate
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Process-wide limiter plus the quota reported in 429 responses
pub struct GlobalLimit {
    limiter: GlobalRateLimiter,
    requests_per_second: u32,
}

impl GlobalLimit {
    /// Take one token; false when the bucket is empty
    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

/// Create a new rate limiter; `None` when either quota value is zero
pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> Option<Arc<GlobalLimit>> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second)?)
        .allow_burst(NonZeroU32::new(burst)?);

    Some(Arc::new(GlobalLimit {
        limiter: RateLimiter::direct(quota),
        requests_per_second,
    }))
}

/// Rejects with 429 once the global bucket is empty
pub async fn rate_limit(
    State(limit): State<Arc<GlobalLimit>>,
    request: Request,
    next: Next,
) -> Response {
    if limit.check() {
        return next.run(request).await;
    }

    tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
    AppError::RateLimited { limit: limit.requests_per_second }.into_response()
}
