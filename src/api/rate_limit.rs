//! Fixed-window request rate limiting.
//!
//! One process-wide limiter covers the whole router: 100 requests per 60
//! seconds per client address. Addresses come from proxy headers
//! (`x-forwarded-for`, then `x-real-ip`); requests without either share an
//! "unknown" bucket. The limiter holds no background state and exposes an
//! explicit [`FixedWindowLimiter::reset`] for teardown and tests.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_LIMIT: u32 = 100;
// Above this many tracked addresses, expired buckets are pruned on the way in.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after_secs: u64 },
}

#[derive(Debug)]
struct Bucket {
    window_start: Instant,
    count: u32,
}

/// Process-wide fixed-window counter keyed by client address.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    window: Duration,
    limit: u32,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW, DEFAULT_LIMIT)
    }

    #[must_use]
    pub fn with_window(window: Duration, limit: u32) -> Self {
        Self {
            window,
            limit: limit.max(1),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    /// Drop all counters. Intended for teardown and tests.
    pub fn reset(&self) {
        self.lock_buckets().clear();
    }

    fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut buckets = self.lock_buckets();

        if buckets.len() > PRUNE_THRESHOLD {
            let window = self.window;
            buckets.retain(|_, bucket| now.duration_since(bucket.window_start) < window);
        }

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            window_start: now,
            count: 0,
        });

        if now.duration_since(bucket.window_start) >= self.window {
            bucket.window_start = now;
            bucket.count = 0;
        }

        if bucket.count >= self.limit {
            let elapsed = now.duration_since(bucket.window_start);
            let remaining = self.window.saturating_sub(elapsed);
            return RateDecision::Limited {
                retry_after_secs: remaining.as_secs().max(1),
            };
        }

        bucket.count += 1;
        RateDecision::Allowed
    }

    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<String, Bucket>> {
        match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract a client address for rate limiting from common proxy headers.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Router-wide middleware enforcing the fixed window.
pub async fn limit_requests(
    State(limiter): State<Arc<FixedWindowLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = extract_client_ip(request.headers()).unwrap_or_else(|| "unknown".to_string());

    match limiter.check(&key) {
        RateDecision::Allowed => next.run(request).await,
        RateDecision::Limited { retry_after_secs } => {
            let body = serde_json::json!({
                "success": false,
                "message": "Too many requests. Please try again later.",
                "retryAfter": retry_after_secs,
            });
            (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", retry_after_secs.to_string())],
                Json(body),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let limiter = FixedWindowLimiter::with_window(Duration::from_secs(60), 3);
        let now = Instant::now();

        for _ in 0..3 {
            assert_eq!(limiter.check_at("1.2.3.4", now), RateDecision::Allowed);
        }
        assert!(matches!(
            limiter.check_at("1.2.3.4", now),
            RateDecision::Limited { .. }
        ));
    }

    #[test]
    fn buckets_are_per_address() {
        let limiter = FixedWindowLimiter::with_window(Duration::from_secs(60), 1);
        let now = Instant::now();

        assert_eq!(limiter.check_at("1.2.3.4", now), RateDecision::Allowed);
        assert_eq!(limiter.check_at("5.6.7.8", now), RateDecision::Allowed);
        assert!(matches!(
            limiter.check_at("1.2.3.4", now),
            RateDecision::Limited { .. }
        ));
    }

    #[test]
    fn window_rollover_resets_count() {
        let limiter = FixedWindowLimiter::with_window(Duration::from_secs(60), 1);
        let now = Instant::now();

        assert_eq!(limiter.check_at("1.2.3.4", now), RateDecision::Allowed);
        assert!(matches!(
            limiter.check_at("1.2.3.4", now),
            RateDecision::Limited { .. }
        ));

        let later = now + Duration::from_secs(61);
        assert_eq!(limiter.check_at("1.2.3.4", later), RateDecision::Allowed);
    }

    #[test]
    fn limited_reports_retry_after() {
        let limiter = FixedWindowLimiter::with_window(Duration::from_secs(60), 1);
        let now = Instant::now();

        assert_eq!(limiter.check_at("1.2.3.4", now), RateDecision::Allowed);
        let decision = limiter.check_at("1.2.3.4", now + Duration::from_secs(10));
        match decision {
            RateDecision::Limited { retry_after_secs } => {
                assert!(retry_after_secs >= 1);
                assert!(retry_after_secs <= 60);
            }
            RateDecision::Allowed => panic!("expected limited decision"),
        }
    }

    #[test]
    fn reset_clears_counters() {
        let limiter = FixedWindowLimiter::with_window(Duration::from_secs(60), 1);
        let now = Instant::now();

        assert_eq!(limiter.check_at("1.2.3.4", now), RateDecision::Allowed);
        limiter.reset();
        assert_eq!(limiter.check_at("1.2.3.4", now), RateDecision::Allowed);
    }

    #[test]
    fn extract_client_ip_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("1.2.3.4".to_string()));
    }

    #[test]
    fn extract_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("9.9.9.9".to_string()));
    }

    #[test]
    fn extract_client_ip_none_when_missing() {
        assert_eq!(extract_client_ip(&HeaderMap::new()), None);
    }
}
