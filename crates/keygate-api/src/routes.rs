//! API route definitions
//!
//! Routes are grouped by access policy and each group gets its own guard
//! layer. Paths shared between groups (`/users`, `/users/:id`) are merged per
//! method, so every method keeps its own policy.
//!
//! Author: hephaex@gmail.com

use crate::auth::{guard_middleware, GuardState, RoutePolicy};
use crate::handlers::{auth, health, users};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use keygate_core::Role;
use std::sync::Arc;

/// Create API routes (mounted under the configured prefix)
pub fn api_routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    let guarded = |policy: RoutePolicy| GuardState::new(state.auth.clone(), policy);

    // No token required; a token that is sent must still be valid
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route_layer(middleware::from_fn_with_state(
            guarded(RoutePolicy::public()),
            guard_middleware,
        ));

    // Any authenticated account
    let authenticated_routes = Router::new()
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/validate", post(auth::validate_handler))
        .route("/users/me", get(users::get_me))
        .route("/users/:id", patch(users::update_user))
        .route_layer(middleware::from_fn_with_state(
            guarded(RoutePolicy::authenticated()),
            guard_middleware,
        ));

    // Staff: read access to all accounts
    let staff_routes = Router::new()
        .route("/users", get(users::list_users))
        .route("/users/:id", get(users::get_user))
        .route_layer(middleware::from_fn_with_state(
            guarded(RoutePolicy::roles(&[Role::Admin, Role::Moderator])),
            guard_middleware,
        ));

    let admin_routes = Router::new()
        .route("/users", post(users::create_user))
        .route("/users/:id", delete(users::delete_user))
        .route_layer(middleware::from_fn_with_state(
            guarded(RoutePolicy::roles(&[Role::Admin])),
            guard_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .merge(staff_routes)
        .merge(admin_routes)
}

/// Health probes; never rate limited or guarded
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness_check))
        .route("/health/ready", get(health::readiness_check))
}
