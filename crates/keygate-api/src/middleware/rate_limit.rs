//! Fixed-window request throttling per client
//!
//! Each client key (the caller's IP) gets `limit` requests per window. The
//! window starts at the client's first request and resets once it has fully
//! elapsed. Rejected requests get 429 with `Retry-After`; allowed ones carry
//! `X-RateLimit-Limit` and `X-RateLimit-Remaining`.
//!
//! The key is the socket peer address. `X-Forwarded-For` / `X-Real-IP` are
//! only used when `trust_proxy_headers` is set, i.e. when every request
//! arrives through a proxy that overwrites them.
//!
//! Author: hephaex@gmail.com

use crate::audit::{audit_log, extract_ip_address, AuditEvent};
use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use keygate_core::RateLimitConfig;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of a single [`RateLimiter::check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

/// Shared fixed-window limiter
#[derive(Clone)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    trust_proxy_headers: bool,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            trust_proxy_headers: false,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.limit, Duration::from_secs(config.window_secs))
            .trust_proxy_headers(config.trust_proxy_headers)
    }

    /// Key clients by forwarding headers instead of the peer address
    pub fn trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Count one request from `key`
    pub async fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now()).await
    }

    /// Count one request from `key` as if it arrived at `now`
    pub async fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut windows = self.windows.lock().await;
        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.saturating_duration_since(window.started) >= self.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        if window.count >= self.limit {
            let elapsed = now.saturating_duration_since(window.started);
            return RateLimitDecision::Limited {
                retry_after: self.window.saturating_sub(elapsed),
            };
        }

        window.count += 1;
        RateLimitDecision::Allowed {
            remaining: self.limit - window.count,
        }
    }

    /// Drop windows that have fully elapsed
    pub async fn cleanup(&self) {
        self.cleanup_at(Instant::now()).await
    }

    pub async fn cleanup_at(&self, now: Instant) {
        let mut windows = self.windows.lock().await;
        windows.retain(|_, w| now.saturating_duration_since(w.started) < self.window);
    }

    /// Number of clients currently tracked
    pub async fn tracked_clients(&self) -> usize {
        self.windows.lock().await.len()
    }

    /// Periodically run [`cleanup`](Self::cleanup) on the current runtime
    pub fn spawn_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(limiter.window);
            loop {
                interval.tick().await;
                limiter.cleanup().await;
            }
        })
    }
}

/// Throttling key for a request
///
/// The socket address, unless `trust_proxy_headers` is set, in which case the
/// first `X-Forwarded-For` hop, then `X-Real-IP`, then the socket address.
pub fn client_key(
    headers: &HeaderMap,
    remote: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> String {
    trust_proxy_headers
        .then(|| extract_ip_address(headers))
        .flatten()
        .or_else(|| remote.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware enforcing the limiter on every request it wraps
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(request.headers(), remote, limiter.trust_proxy_headers);

    match limiter.check(&key).await {
        RateLimitDecision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(limiter.limit()));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            response
        }
        RateLimitDecision::Limited { retry_after } => {
            audit_log(&AuditEvent::RateLimited {
                client: key,
                resource: request.uri().path().to_string(),
            });

            // Round up so clients never retry early
            let retry_after_secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            let mut response = AppError::TooManyRequests { retry_after_secs }.into_response();
            response
                .headers_mut()
                .insert("x-ratelimit-limit", HeaderValue::from(limiter.limit()));
            response
                .headers_mut()
                .insert("x-ratelimit-remaining", HeaderValue::from(0u32));
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_limit_within_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();

        assert_eq!(
            limiter.check_at("a", start).await,
            RateLimitDecision::Allowed { remaining: 2 }
        );
        assert_eq!(
            limiter.check_at("a", start).await,
            RateLimitDecision::Allowed { remaining: 1 }
        );
        assert_eq!(
            limiter.check_at("a", start).await,
            RateLimitDecision::Allowed { remaining: 0 }
        );

        match limiter.check_at("a", start + Duration::from_secs(10)).await {
            RateLimitDecision::Limited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(50))
            }
            other => panic!("expected limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();

        assert!(matches!(
            limiter.check_at("a", start).await,
            RateLimitDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check_at("a", start + Duration::from_secs(59)).await,
            RateLimitDecision::Limited { .. }
        ));
        assert!(matches!(
            limiter.check_at("a", start + Duration::from_secs(60)).await,
            RateLimitDecision::Allowed { .. }
        ));
    }

    #[tokio::test]
    async fn test_clients_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(matches!(
            limiter.check_at("a", now).await,
            RateLimitDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check_at("b", now).await,
            RateLimitDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check_at("a", now).await,
            RateLimitDecision::Limited { .. }
        ));
    }

    #[tokio::test]
    async fn test_cleanup_drops_expired_windows() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        let start = Instant::now();

        limiter.check_at("old", start).await;
        limiter.check_at("new", start + Duration::from_secs(30)).await;
        assert_eq!(limiter.tracked_clients().await, 2);

        limiter.cleanup_at(start + Duration::from_secs(61)).await;
        assert_eq!(limiter.tracked_clients().await, 1);
    }

    #[test]
    fn test_client_key_precedence() {
        let remote: SocketAddr = "10.0.0.9:5555".parse().unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers, None, true), "unknown");
        assert_eq!(client_key(&headers, Some(remote), true), "10.0.0.9");

        headers.insert("x-real-ip", "198.51.100.7".parse().unwrap());
        assert_eq!(client_key(&headers, Some(remote), true), "198.51.100.7");

        headers.insert("x-forwarded-for", "203.0.113.1, 10.0.0.1".parse().unwrap());
        assert_eq!(client_key(&headers, Some(remote), true), "203.0.113.1");
    }

    #[test]
    fn test_client_key_ignores_forwarding_headers_by_default() {
        let remote: SocketAddr = "10.0.0.9:5555".parse().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.1".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.7".parse().unwrap());

        assert_eq!(client_key(&headers, Some(remote), false), "10.0.0.9");
        assert_eq!(client_key(&headers, None, false), "unknown");
    }

    #[tokio::test]
    async fn test_rotating_forwarded_for_still_limited() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
        let peer: SocketAddr = "192.0.2.10:40000".parse().unwrap();

        let mut statuses = Vec::new();
        for i in 0..10 {
            let mut request = axum::http::Request::builder()
                .uri("/")
                .header("x-forwarded-for", format!("10.0.0.{i}"))
                .body(Body::empty())
                .unwrap();
            request.extensions_mut().insert(ConnectInfo(peer));
            statuses.push(app.clone().oneshot(request).await.unwrap().status());
        }

        assert_eq!(&statuses[..2], &[StatusCode::OK, StatusCode::OK]);
        assert!(statuses[2..]
            .iter()
            .all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
    }

    #[tokio::test]
    async fn test_trusted_proxy_headers_separate_clients() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60)).trust_proxy_headers(true);
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));

        let request = |ip: &str| {
            axum::http::Request::builder()
                .uri("/")
                .header("x-forwarded-for", ip)
                .body(Body::empty())
                .unwrap()
        };

        let first = app.clone().oneshot(request("203.0.113.1")).await.unwrap();
        let other = app.clone().oneshot(request("203.0.113.2")).await.unwrap();
        let again = app.oneshot(request("203.0.113.1")).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(other.status(), StatusCode::OK);
        assert_eq!(again.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_middleware_returns_429() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));

        let peer: SocketAddr = "203.0.113.5:51000".parse().unwrap();
        let request = || {
            let mut request = axum::http::Request::builder()
                .uri("/")
                .body(Body::empty())
                .unwrap();
            request.extensions_mut().insert(ConnectInfo(peer));
            request
        };

        let first = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers()["x-ratelimit-remaining"], "0");

        let second = app.oneshot(request()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = second.headers()["retry-after"]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_after > 0 && retry_after <= 60);
    }
}
