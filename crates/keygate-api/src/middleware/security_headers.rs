//! Security headers middleware
//!
//! Stamps a fixed set of hardening headers onto every response, including
//! error responses produced by guards and the rate limiter. Auth responses
//! carry tokens, so caching is disabled as well.
//!
//! Author: hephaex@gmail.com

use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    // Legacy XSS auditors are disabled; CSP covers this
    ("x-xss-protection", "0"),
    (
        "strict-transport-security",
        "max-age=31536000; includeSubDomains",
    ),
    (
        "content-security-policy",
        "default-src 'self'; frame-ancestors 'none'",
    ),
    ("referrer-policy", "no-referrer"),
    ("permissions-policy", "geolocation=(), camera=(), microphone=()"),
];

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    for (name, value) in SECURITY_HEADERS {
        headers.insert(
            HeaderName::from_static(*name),
            HeaderValue::from_static(*value),
        );
    }

    // Handlers may set their own Cache-Control
    if !headers.contains_key(header::CACHE_CONTROL) {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        response::IntoResponse,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/ok", get(|| async { (StatusCode::OK, "fine") }))
            .route(
                "/denied",
                get(|| async { StatusCode::UNAUTHORIZED.into_response() }),
            )
            .route(
                "/cached",
                get(|| async { ([(header::CACHE_CONTROL, "max-age=60")], "cached") }),
            )
            .layer(middleware::from_fn(security_headers_middleware))
    }

    async fn get_path(path: &str) -> Response {
        app()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_security_headers_added() {
        let response = get_path("/ok").await;
        assert_eq!(response.status(), StatusCode::OK);

        let headers = response.headers();
        for (name, value) in SECURITY_HEADERS {
            assert_eq!(headers.get(*name).unwrap(), *value, "header {name}");
        }
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
    }

    #[tokio::test]
    async fn test_security_headers_on_error_response() {
        let response = get_path("/denied").await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");
    }

    #[tokio::test]
    async fn test_handler_cache_control_kept() {
        let response = get_path("/cached").await;
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "max-age=60"
        );
    }
}
