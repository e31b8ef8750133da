//! Fixed-window request limit per client address.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use moka::future::Cache;

use super::views;

const MAX_TRACKED_CLIENTS: u64 = 100_000;

#[derive(Clone)]
pub struct RateLimiter {
    // a counter lives for exactly one window from the first request
    hits: Cache<IpAddr, Arc<AtomicU32>>,
    max: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, max: u32) -> Self {
        Self {
            hits: Cache::builder()
                .max_capacity(MAX_TRACKED_CLIENTS)
                .time_to_live(window)
                .build(),
            max,
        }
    }

    /// Counts a request from `ip`, returns how many are left in the current
    /// window or `None` once the limit is exceeded.
    pub async fn check(&self, ip: IpAddr) -> Option<u32> {
        let counter = self
            .hits
            .get_with(ip, async { Arc::new(AtomicU32::new(0)) })
            .await;

        let seen = counter.fetch_add(1, Ordering::Relaxed);
        (seen < self.max).then(|| self.max - seen - 1)
    }
}

/// Requests without a peer address (in-process calls) are not limited.
pub async fn limit(State(limiter): State<RateLimiter>, req: Request, next: Next) -> Response {
    let Some(ip) = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
    else {
        return next.run(req).await;
    };

    let Some(remaining) = limiter.check(ip).await else {
        log::warn!("rate limit exceeded for {ip}");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            views::error(
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests, please try again later.",
            ),
        )
            .into_response();
    };

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert("ratelimit-limit", HeaderValue::from(limiter.max));
    headers.insert("ratelimit-remaining", HeaderValue::from(remaining));
    response
}
