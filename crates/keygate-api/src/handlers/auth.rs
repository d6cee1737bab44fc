//! Authentication API handlers
//!
//! Author: hephaex@gmail.com

use crate::auth::{
    AuthResponse, AuthenticatedIdentity, LoginRequest, MessageResponse, RefreshRequest,
    RegisterRequest, ValidateResponse,
};
use crate::error::AppError;
use crate::extract::ApiJson;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use validator::Validate;

/// Register a new account
///
/// New accounts get the `user` role and an open session.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account registered", body = AuthResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 409, description = "Email already registered", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Login with email and password
///
/// Replaces any existing session; earlier refresh tokens stop working.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Malformed body", body = crate::error::ApiError),
        (status = 401, description = "Invalid credentials", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    Ok(Json(state.auth.login(request).await?))
}

/// Exchange a refresh token for a new token pair
///
/// Each refresh token is single-use.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens rotated", body = AuthResponse),
        (status = 400, description = "Malformed body", body = crate::error::ApiError),
        (status = 401, description = "Invalid, expired, or reused refresh token", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    if request.validate().is_err() {
        return Err(AppError::Unauthorized);
    }
    Ok(Json(
        state.auth.refresh_with_token(&request.refresh_token).await?,
    ))
}

/// End the current session
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    identity: AuthenticatedIdentity,
) -> Result<Json<MessageResponse>, AppError> {
    state.auth.logout(identity.user_id).await?;
    Ok(Json(MessageResponse::new("Logged out successfully")))
}

/// Confirm the access token and return its account
#[utoipa::path(
    post,
    path = "/api/v1/auth/validate",
    tag = "auth",
    responses(
        (status = 200, description = "Token is valid", body = ValidateResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn validate_handler(
    State(state): State<Arc<AppState>>,
    identity: AuthenticatedIdentity,
) -> Result<Json<ValidateResponse>, AppError> {
    let account = state.auth.validate(identity.user_id).await?;
    Ok(Json(ValidateResponse {
        user: account.to_public(),
    }))
}
