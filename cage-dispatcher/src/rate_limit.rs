//! Sliding-window rate limiter for the dispatcher HTTP surface.
//!
//! In-memory, per-client-IP. Two static tiers: `read_limiter()` at
//! 120 req/min for GET endpoints, `write_limiter()` at 30 req/min for
//! POST/DELETE endpoints that mutate the registry or run commands.

use axum::{
    extract::{ConnectInfo, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }
}

struct Bucket {
    timestamps: Vec<Instant>,
}

impl Bucket {
    fn new() -> Self {
        Self {
            timestamps: Vec::new(),
        }
    }

    fn check_and_record(&mut self, window_secs: u64, max_requests: u32) -> bool {
        let now = Instant::now();
        let cutoff = now - Duration::from_secs(window_secs);
        self.timestamps.retain(|t| *t > cutoff);

        if (self.timestamps.len() as u32) < max_requests {
            self.timestamps.push(now);
            true
        } else {
            false
        }
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
    last_gc: Mutex<Instant>,
}

const GC_INTERVAL_SECS: u64 = 300;

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
            last_gc: Mutex::new(Instant::now()),
        }
    }

    pub fn check(&self, ip: IpAddr) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());

        {
            let mut last_gc = self.last_gc.lock().unwrap_or_else(|e| e.into_inner());
            if last_gc.elapsed().as_secs() >= GC_INTERVAL_SECS {
                let cutoff = Instant::now() - Duration::from_secs(self.config.window_secs * 2);
                buckets.retain(|_, b| b.timestamps.last().is_some_and(|t| *t > cutoff));
                *last_gc = Instant::now();
            }
        }

        let bucket = buckets.entry(ip).or_insert_with(Bucket::new);
        bucket.check_and_record(self.config.window_secs, self.config.max_requests)
    }
}

static READ_LIMITER: once_cell::sync::Lazy<RateLimiter> =
    once_cell::sync::Lazy::new(|| RateLimiter::new(RateLimitConfig::new(120, 60)));

static WRITE_LIMITER: once_cell::sync::Lazy<RateLimiter> =
    once_cell::sync::Lazy::new(|| RateLimiter::new(RateLimitConfig::new(30, 60)));

pub fn read_limiter() -> &'static RateLimiter {
    &READ_LIMITER
}

pub fn write_limiter() -> &'static RateLimiter {
    &WRITE_LIMITER
}

fn extract_client_ip(req: &Request) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .or_else(|| {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.split(',').next())
                .and_then(|s| s.trim().parse().ok())
        })
}

pub async fn read_rate_limit(request: Request, next: Next) -> Response {
    if let Some(ip) = extract_client_ip(&request) {
        if !read_limiter().check(ip) {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [("retry-after", "60")],
                "Rate limit exceeded",
            )
                .into_response();
        }
    }
    next.run(request).await
}

pub async fn write_rate_limit(request: Request, next: Next) -> Response {
    if let Some(ip) = extract_client_ip(&request) {
        if !write_limiter().check(ip) {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [("retry-after", "60")],
                "Rate limit exceeded",
            )
                .into_response();
        }
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_within_limit() {
        let limiter = RateLimiter::new(RateLimitConfig::new(3, 60));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));
    }

    #[test]
    fn separate_ips_independent() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, 60));
        let ip1: IpAddr = "10.0.0.1".parse().unwrap();
        let ip2: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check(ip1));
        assert!(!limiter.check(ip1));
        assert!(limiter.check(ip2));
    }
}
