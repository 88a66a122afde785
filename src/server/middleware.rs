// Request middleware: per-client rate limiting for the /api routes

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::ApiError;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket per client IP. Cheap to clone.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

struct RateLimiterInner {
    buckets: DashMap<IpAddr, Bucket>,
    /// Burst capacity
    capacity: f64,
    /// Tokens per second
    refill_rate: f64,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64, burst: f64) -> Self {
        Self {
            inner: Arc::new(RateLimiterInner {
                buckets: DashMap::new(),
                capacity: burst.max(1.0),
                refill_rate: requests_per_second,
            }),
        }
    }

    /// Take one token for `ip`; false when the bucket is empty
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut bucket = self.inner.buckets.entry(ip).or_insert_with(|| Bucket {
            tokens: self.inner.capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.inner.refill_rate).min(self.inner.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Forget clients idle for longer than `idle`
    pub fn purge_idle(&self, idle: Duration) {
        let now = Instant::now();
        self.inner
            .buckets
            .retain(|_, bucket| now.duration_since(bucket.last_refill) < idle);
    }

    pub fn tracked_ips(&self) -> usize {
        self.inner.buckets.len()
    }
}

/// Rejects with 429 once a client's bucket is empty
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&request).unwrap_or(IpAddr::from([127, 0, 0, 1]));

    if limiter.check(ip) {
        next.run(request).await
    } else {
        tracing::warn!(ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
        ApiError::RateLimited.into_response()
    }
}

/// Leftmost `X-Forwarded-For` entry, else the socket peer
fn client_ip(request: &Request<Body>) -> Option<IpAddr> {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());

    forwarded.or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}
