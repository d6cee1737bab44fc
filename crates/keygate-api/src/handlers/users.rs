//! Account administration handlers
//!
//! Route policies decide who reaches each handler; the self-or-admin rule for
//! updates lives in the service.
//!
//! Author: hephaex@gmail.com

use crate::auth::{AuthenticatedIdentity, CreateAccountRequest, UpdateAccountRequest};
use crate::error::AppError;
use crate::extract::ApiJson;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use keygate_core::AccountPublic;
use std::sync::Arc;
use uuid::Uuid;

/// Create an account (admin)
#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "users",
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Account created", body = AccountPublic),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 403, description = "Admin role required", body = crate::error::ApiError),
        (status = 409, description = "Email already registered", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    identity: AuthenticatedIdentity,
    ApiJson(request): ApiJson<CreateAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    let account = state.auth.create_account(&identity, request).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// List accounts, newest first (admin, moderator)
///
/// The total is also returned in `X-Total-Count`.
#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "users",
    responses(
        (status = 200, description = "All live accounts", body = Vec<AccountPublic>),
        (status = 403, description = "Admin or moderator role required", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let accounts = state.auth.list_accounts().await?;
    let total = state.auth.count_accounts().await?;

    Ok((
        [(
            HeaderName::from_static("x-total-count"),
            HeaderValue::from(total),
        )],
        Json(accounts),
    ))
}

/// The caller's own account
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    tag = "users",
    responses(
        (status = 200, description = "Current account", body = AccountPublic),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    identity: AuthenticatedIdentity,
) -> Result<Json<AccountPublic>, AppError> {
    Ok(Json(state.auth.get_account(identity.user_id).await?))
}

/// Fetch one account (admin, moderator)
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "Account ID")),
    responses(
        (status = 200, description = "Account", body = AccountPublic),
        (status = 404, description = "No such account", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AccountPublic>, AppError> {
    Ok(Json(state.auth.get_account(id).await?))
}

/// Update a profile (self, or admin for anyone; roles admin-only)
#[utoipa::path(
    patch,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "Account ID")),
    request_body = UpdateAccountRequest,
    responses(
        (status = 200, description = "Updated account", body = AccountPublic),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 403, description = "Not allowed to edit this account", body = crate::error::ApiError),
        (status = 404, description = "No such account", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    identity: AuthenticatedIdentity,
    Path(id): Path<Uuid>,
    ApiJson(request): ApiJson<UpdateAccountRequest>,
) -> Result<Json<AccountPublic>, AppError> {
    Ok(Json(state.auth.update_account(&identity, id, request).await?))
}

/// Soft-delete an account (admin)
#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "Account ID")),
    responses(
        (status = 204, description = "Account deleted"),
        (status = 403, description = "Admin role required", body = crate::error::ApiError),
        (status = 404, description = "No such account", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    identity: AuthenticatedIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.auth.remove_account(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
