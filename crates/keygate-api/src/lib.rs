//! Keygate API - authentication and access-control server
//!
//! Registration, login, refresh-token rotation, and role-guarded account
//! administration over HTTP.
//!
//! Author: hephaex@gmail.com

pub mod audit;
pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::{http::HeaderValue, Router};
use keygate_core::config::ServerConfig;
use state::AppState;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the complete application router
///
/// API routes are throttled and mounted under `server.api_prefix`; health
/// probes and the OpenAPI docs stay at the root.
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut api = routes::api_routes(&state);
    if state.config.rate_limit.enabled {
        api = api.layer(axum::middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            middleware::rate_limit_middleware,
        ));
    }

    let prefix = state.config.server.api_prefix.trim_end_matches('/');
    let router = if prefix.is_empty() {
        api
    } else {
        Router::new().nest(prefix, api)
    };

    router
        .merge(routes::health_routes())
        .merge(openapi::swagger_ui_router())
        .layer(axum::middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(cors_layer(&state.config.server))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the configured origins; cross-origin requests are refused when
/// none are configured
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        tracing::debug!("No CORS origins configured");
    } else {
        tracing::info!("CORS configured with {} allowed origins", origins.len());
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
        .expose_headers([
            axum::http::header::RETRY_AFTER,
            axum::http::HeaderName::from_static("x-total-count"),
            axum::http::HeaderName::from_static("x-ratelimit-limit"),
            axum::http::HeaderName::from_static("x-ratelimit-remaining"),
        ])
}

/// Router over fresh in-memory state with default configuration
#[cfg(any(test, feature = "test-utils"))]
pub fn create_router_for_testing() -> Router {
    create_router_for_testing_with(keygate_core::AppConfig::default())
}

/// Router over fresh in-memory state with the given configuration
#[cfg(any(test, feature = "test-utils"))]
pub fn create_router_for_testing_with(config: keygate_core::AppConfig) -> Router {
    create_router(Arc::new(AppState::for_testing(config)))
}
