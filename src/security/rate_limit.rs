//! Token-bucket rate limiting keyed by a [`KeyResolver`].
//!
//! Keys can come from client-supplied headers, so the bucket map is bounded:
//! buckets idle for a full refill period are dropped (a fresh bucket would be
//! full anyway), and unseen keys are refused once `max_tracked_keys` is hit.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;

use crate::config::schema::RateLimitConfig;
use crate::observability::metrics;
use crate::security::key_resolver::{self, ClientAddressKeyResolver, KeyResolver};

/// Checks between two idle sweeps.
const PRUNE_EVERY: u64 = 1024;

/// Shortest idle period before a bucket may be dropped.
const MIN_IDLE_TTL: Duration = Duration::from_secs(1);

/// A simple token bucket.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Shared limiter state.
pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
    resolver: Box<dyn KeyResolver>,
    rps: f64,
    burst: f64,
    idle_ttl: Duration,
    max_tracked_keys: usize,
    checks: AtomicU64,
}

impl RateLimiter {
    pub fn new(
        resolver: Box<dyn KeyResolver>,
        requests_per_second: u32,
        burst_size: u32,
        max_tracked_keys: usize,
    ) -> Self {
        let rps = requests_per_second as f64;
        let burst = burst_size as f64;
        let idle_ttl = Duration::try_from_secs_f64(burst / rps)
            .unwrap_or(Duration::MAX)
            .max(MIN_IDLE_TTL);

        Self {
            buckets: DashMap::new(),
            resolver,
            rps,
            burst,
            idle_ttl,
            max_tracked_keys,
            checks: AtomicU64::new(0),
        }
    }

    /// Build from configuration. Unknown resolver names fall back to the client address.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let resolver = key_resolver::from_name(&config.key_resolver).unwrap_or_else(|| {
            tracing::warn!(key_resolver = %config.key_resolver, "Unknown key resolver, using client address");
            Box::new(ClientAddressKeyResolver)
        });
        Self::new(
            resolver,
            config.requests_per_second,
            config.burst_size,
            config.max_tracked_keys,
        )
    }

    pub fn resolver_name(&self) -> &'static str {
        self.resolver.name()
    }

    /// Number of keys currently holding a bucket.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    /// Take one token for `key`.
    pub fn check(&self, key: &str) -> bool {
        if self.checks.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune_idle(Instant::now());
        }

        if let Some(mut bucket) = self.buckets.get_mut(key) {
            return bucket.try_acquire(self.burst, self.rps);
        }

        if self.buckets.len() >= self.max_tracked_keys {
            self.prune_idle(Instant::now());
            if self.buckets.len() >= self.max_tracked_keys {
                tracing::debug!(
                    tracked = self.buckets.len(),
                    max = self.max_tracked_keys,
                    "Rate limiter full, refusing new key"
                );
                return false;
            }
        }

        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.burst));
        bucket.try_acquire(self.burst, self.rps)
    }

    /// Drop buckets untouched for a full refill period as of `now`.
    fn prune_idle(&self, now: Instant) {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_update) < self.idle_ttl);
        let dropped = before.saturating_sub(self.buckets.len());
        if dropped > 0 {
            tracing::debug!(dropped, remaining = self.buckets.len(), "Pruned idle rate limit buckets");
        }
    }
}

/// Middleware rejecting requests over the limit with 429.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));
    let key = limiter.resolver.resolve(remote, request.headers());

    if limiter.check(&key) {
        next.run(request).await
    } else {
        tracing::warn!(client = %key, key_resolver = limiter.resolver_name(), "Rate limit exceeded");
        metrics::record_rate_limited(limiter.resolver_name());
        (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::get, Router};
    use tower::ServiceExt;

    use crate::security::key_resolver::ForwardedForKeyResolver;

    #[test]
    fn burst_then_reject() {
        let limiter = RateLimiter::new(Box::new(ClientAddressKeyResolver), 1, 3, 100);

        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));

        // Other keys have their own bucket
        assert!(limiter.check("10.0.0.2"));
    }

    #[test]
    fn unknown_resolver_falls_back() {
        let config = RateLimitConfig {
            key_resolver: "principal".into(),
            ..RateLimitConfig::default()
        };
        assert_eq!(RateLimiter::from_config(&config).resolver_name(), "client-address");
    }

    #[test]
    fn idle_buckets_are_pruned() {
        let limiter = RateLimiter::new(Box::new(ForwardedForKeyResolver), 1, 5, 100_000);
        for i in 0..20_000u32 {
            assert!(limiter.check(&format!("198.51.{}.{}", i / 256, i % 256)));
        }
        // Periodic sweeps ran, but nothing was idle yet
        assert_eq!(limiter.tracked_keys(), 20_000);

        limiter.prune_idle(Instant::now() + Duration::from_millis(400));
        assert_eq!(limiter.tracked_keys(), 20_000);

        limiter.prune_idle(Instant::now() + Duration::from_secs(10));
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn idle_ttl_is_a_full_refill() {
        let slow = RateLimiter::new(Box::new(ClientAddressKeyResolver), 2, 50, 10);
        assert_eq!(slow.idle_ttl, Duration::from_secs(25));

        let fast = RateLimiter::new(Box::new(ClientAddressKeyResolver), 1000, 10, 10);
        assert_eq!(fast.idle_ttl, MIN_IDLE_TTL);
    }

    #[test]
    fn full_limiter_refuses_new_keys_only() {
        let limiter = RateLimiter::new(Box::new(ClientAddressKeyResolver), 1, 10, 2);
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.2"));

        assert!(!limiter.check("10.0.0.3"));
        assert!(limiter.check("10.0.0.1"));
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[tokio::test]
    async fn spoofed_forwarded_for_stays_bounded() {
        let limiter = Arc::new(RateLimiter::new(Box::new(ForwardedForKeyResolver), 1, 50, 1_000));
        let app = Router::new()
            .route("/api/customers", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(Arc::clone(&limiter), rate_limit_middleware));

        let mut refused = 0;
        for i in 0..20_000u32 {
            let request = Request::builder()
                .uri("/api/customers")
                .header("x-forwarded-for", format!("203.0.{}.{}", i / 256, i % 256))
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                refused += 1;
            }
        }

        assert_eq!(limiter.tracked_keys(), 1_000);
        assert_eq!(refused, 19_000);
    }
}
