/// Per-user rate limiting for expensive AI routes
///
/// Each (user, route class) pair owns a token bucket kept in process memory.
/// A bucket starts full, refills continuously, and each request takes one
/// token.
///
/// # Limits
///
/// - **Chat messages**: 20 requests/minute
/// - **Advice generation**: 10 requests/minute
///
/// # Headers
///
/// - `X-RateLimit-Limit`: requests allowed per minute
/// - `X-RateLimit-Remaining`: whole tokens left after this request
/// - `Retry-After`: seconds to wait (429 responses only)
///
/// # Example
///
/// ```no_run
/// use axum::routing::{post, MethodRouter};
/// use famhealth_api::{app::AppState, middleware::rate_limit::chat_rate_limit};
///
/// # fn example(state: AppState) {
/// # async fn handler() {}
/// let route: MethodRouter<AppState> = post(handler).route_layer(axum::middleware::from_fn_with_state(state, chat_rate_limit));
/// # }
/// ```

use crate::app::AppState;
use crate::error::ApiError;
use axum::{
    extract::{Extension, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use famhealth_shared::auth::middleware::AuthContext;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use uuid::Uuid;

/// Buckets are pruned once the table grows past this size
const PRUNE_THRESHOLD: usize = 1024;

/// Routes sharing one budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateClass {
    ChatMessage,
    AdviceGeneration,
}

impl RateClass {
    pub fn limit(&self) -> RateLimit {
        match self {
            RateClass::ChatMessage => RateLimit::per_minute(20),
            RateClass::AdviceGeneration => RateLimit::per_minute(10),
        }
    }

    fn message(&self) -> &'static str {
        match self {
            RateClass::ChatMessage => "Too many chat messages, please slow down",
            RateClass::AdviceGeneration => "Too many advice requests, please try again later",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub requests_per_minute: u32,

    /// Tokens per second
    pub refill_rate: f64,

    /// Burst capacity
    pub bucket_capacity: u32,
}

impl RateLimit {
    pub fn per_minute(requests: u32) -> Self {
        RateLimit {
            requests_per_minute: requests,
            refill_rate: requests as f64 / 60.0,
            bucket_capacity: requests,
        }
    }
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, now: Instant) -> Self {
        TokenBucket {
            tokens: capacity as f64,
            last_refill: now,
        }
    }

    fn refill(&mut self, limit: &RateLimit, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * limit.refill_rate).min(limit.bucket_capacity as f64);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn seconds_until_available(&self, rate: f64) -> u64 {
        let deficit = 1.0 - self.tokens;
        if deficit <= 0.0 {
            0
        } else {
            ((deficit / rate).ceil() as u64).max(1)
        }
    }

    fn is_full(&self, limit: &RateLimit) -> bool {
        self.tokens >= limit.bucket_capacity as f64
    }
}

/// Outcome of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: u64 },
}

/// Token bucket table shared by all requests
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<(Uuid, RateClass), TokenBucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, user_id: Uuid, class: RateClass) -> RateDecision {
        self.check_at(user_id, class, Instant::now())
    }

    pub fn check_at(&self, user_id: Uuid, class: RateClass, now: Instant) -> RateDecision {
        let limit = class.limit();
        let mut buckets = self.buckets.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if buckets.len() > PRUNE_THRESHOLD {
            buckets.retain(|(_, c), bucket| {
                let mut probe = bucket.clone();
                probe.refill(&c.limit(), now);
                !probe.is_full(&c.limit())
            });
        }

        let bucket = buckets
            .entry((user_id, class))
            .or_insert_with(|| TokenBucket::new(limit.bucket_capacity, now));
        bucket.refill(&limit, now);

        if bucket.try_consume() {
            RateDecision::Allowed {
                remaining: bucket.tokens.floor() as u32,
            }
        } else {
            RateDecision::Limited {
                retry_after: bucket.seconds_until_available(limit.refill_rate),
            }
        }
    }
}

async fn enforce(
    state: &AppState,
    user_id: Uuid,
    class: RateClass,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let limit = class.limit();

    match state.rate_limiter.check(user_id, class) {
        RateDecision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", HeaderValue::from(limit.requests_per_minute));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
            Ok(response)
        }
        RateDecision::Limited { retry_after } => {
            tracing::warn!(%user_id, ?class, retry_after, "rate limit exceeded");
            Err(ApiError::RateLimitExceeded {
                retry_after,
                message: class.message().to_string(),
            })
        }
    }
}

/// Limits `POST /chat/sessions/:id/messages`
pub async fn chat_rate_limit(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    enforce(&state, auth.user_id, RateClass::ChatMessage, request, next).await
}

/// Limits `POST /advice/generate`
pub async fn advice_rate_limit(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    enforce(&state, auth.user_id, RateClass::AdviceGeneration, request, next).await
}
