//! OpenAPI documentation
//!
//! Swagger UI is served at `/swagger-ui` and the raw document at
//! `/api-docs/openapi.json`. New endpoints need a `#[utoipa::path]` on the
//! handler and an entry in `paths(...)` below.
//!
//! Author: hephaex@gmail.com

use crate::auth::{
    AuthResponse, CreateAccountRequest, LoginRequest, MessageResponse, RefreshRequest,
    RegisterRequest, UpdateAccountRequest, ValidateResponse,
};
use crate::error::ApiError;
use crate::handlers::health::{HealthResponse, ReadinessChecks, ReadinessResponse};
use axum::Router;
use keygate_core::{AccountPublic, Role};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Keygate API",
        description = "Account registration, login, token rotation, and role-based access control.\n\n\
            Protected endpoints take `Authorization: Bearer <access_token>`."
    ),
    tags(
        (name = "auth", description = "Registration, login, and session tokens"),
        (name = "users", description = "Account administration"),
        (name = "health", description = "Liveness and readiness probes")
    ),
    components(
        schemas(
            ApiError,
            Role,
            AccountPublic,
            RegisterRequest,
            LoginRequest,
            RefreshRequest,
            CreateAccountRequest,
            UpdateAccountRequest,
            AuthResponse,
            MessageResponse,
            ValidateResponse,
            HealthResponse,
            ReadinessResponse,
            ReadinessChecks,
        )
    ),
    paths(
        crate::handlers::auth::register_handler,
        crate::handlers::auth::login_handler,
        crate::handlers::auth::refresh_handler,
        crate::handlers::auth::logout_handler,
        crate::handlers::auth::validate_handler,
        crate::handlers::users::create_user,
        crate::handlers::users::list_users,
        crate::handlers::users::get_me,
        crate::handlers::users::get_user,
        crate::handlers::users::update_user,
        crate::handlers::users::delete_user,
        crate::handlers::health::health_check,
        crate::handlers::health::liveness_check,
        crate::handlers::health::readiness_check,
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by protected paths
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Swagger UI plus the OpenAPI document
pub fn swagger_ui_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}
