//! Route guards: bearer-token identity and role checks
//!
//! Each route group carries a [`RoutePolicy`]. [`guard_middleware`] runs the
//! identity check and then the role check for that policy:
//!
//! 1. No token on a public route: pass through anonymously.
//! 2. A token, on any route: it must verify and name a live, active account,
//!    otherwise 401. Roles are taken from the stored account, not the token.
//! 3. Required roles: the identity must hold at least one, otherwise 403
//!    (401 if there is no identity at all).
//!
//! On success the [`AuthenticatedIdentity`] is placed in request extensions
//! and can be taken as a handler argument.

use super::jwt::{validate_access_token, TokenError};
use super::service::AuthService;
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::error::AppError;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use keygate_core::{Account, Role};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Caller identity resolved by the guard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatedIdentity {
    pub user_id: Uuid,
    pub email: String,
    pub roles: Vec<Role>,
}

impl AuthenticatedIdentity {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.has_role(*r))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

impl From<&Account> for AuthenticatedIdentity {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.id,
            email: account.email.clone(),
            roles: account.roles.clone(),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedIdentity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedIdentity>()
            .cloned()
            .ok_or(AuthError::MissingAuthHeader)
    }
}

/// Access requirements for a group of routes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutePolicy {
    /// Anonymous callers allowed
    pub public: bool,
    /// Caller must hold at least one of these; empty means any identity
    pub required_roles: Vec<Role>,
}

impl RoutePolicy {
    pub fn public() -> Self {
        Self {
            public: true,
            required_roles: vec![],
        }
    }

    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn roles(roles: &[Role]) -> Self {
        Self {
            public: false,
            required_roles: roles.to_vec(),
        }
    }
}

/// Guard failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] TokenError),

    #[error("Account is missing or inactive")]
    InactiveAccount,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error(transparent)]
    Service(AppError),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::InvalidToken(_)
            | AuthError::InactiveAccount => AppError::Unauthorized,
            AuthError::InsufficientPermissions => {
                AppError::Forbidden("Insufficient permissions".to_string())
            }
            AuthError::Service(err) => err,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}

/// Pull the bearer token, if any, out of the Authorization header
pub fn extract_bearer(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value.to_str().map_err(|_| AuthError::InvalidAuthHeader)?;
    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidAuthHeader)?;

    Ok(Some(token))
}

/// Identity check
///
/// Returns `Ok(None)` only for an anonymous request on a public route.
pub async fn resolve_identity(
    service: &AuthService,
    policy: &RoutePolicy,
    headers: &HeaderMap,
) -> Result<Option<AuthenticatedIdentity>, AuthError> {
    let token = match extract_bearer(headers)? {
        Some(token) => token,
        None if policy.public => return Ok(None),
        None => return Err(AuthError::MissingAuthHeader),
    };

    let claims = validate_access_token(service.jwt_config(), token)?;
    let account_id = claims.account_id()?;

    match service.validate(account_id).await {
        Ok(account) => Ok(Some(AuthenticatedIdentity::from(&account))),
        Err(AppError::Unauthorized) => Err(AuthError::InactiveAccount),
        Err(other) => Err(AuthError::Service(other)),
    }
}

/// Role check
pub fn authorize(
    policy: &RoutePolicy,
    identity: Option<&AuthenticatedIdentity>,
) -> Result<(), AuthError> {
    if policy.required_roles.is_empty() {
        return Ok(());
    }

    match identity {
        None => Err(AuthError::MissingAuthHeader),
        Some(identity) if identity.has_any_role(&policy.required_roles) => Ok(()),
        Some(_) => Err(AuthError::InsufficientPermissions),
    }
}

/// State for one guarded route group
#[derive(Clone)]
pub struct GuardState {
    pub service: AuthService,
    pub policy: Arc<RoutePolicy>,
}

impl GuardState {
    pub fn new(service: AuthService, policy: RoutePolicy) -> Self {
        Self {
            service,
            policy: Arc::new(policy),
        }
    }
}

/// Identity and role guard for a route group
///
/// ```ignore
/// Router::new()
///     .route("/users", get(list_users))
///     .route_layer(middleware::from_fn_with_state(
///         GuardState::new(service, RoutePolicy::roles(&[Role::Admin])),
///         guard_middleware,
///     ));
/// ```
pub async fn guard_middleware(
    State(guard): State<GuardState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let identity = match resolve_identity(&guard.service, &guard.policy, request.headers()).await {
        Ok(identity) => identity,
        Err(AuthError::Service(err)) => return Err(AuthError::Service(err)),
        Err(err) => {
            audit_log(&AuditEvent::InvalidToken {
                reason: err.to_string(),
                ip_address: extract_ip_address(request.headers()),
                user_agent: extract_user_agent(request.headers()),
            });
            return Err(err);
        }
    };

    if let Err(err) = authorize(&guard.policy, identity.as_ref()) {
        audit_log(&AuditEvent::AccessDenied {
            user_id: identity.as_ref().map(|i| i.user_id),
            resource: format!("{} {}", request.method(), request.uri().path()),
            required_roles: guard
                .policy
                .required_roles
                .iter()
                .map(|r| r.to_string())
                .collect(),
            ip_address: extract_ip_address(request.headers()),
        });
        return Err(err);
    }

    if let Some(identity) = identity {
        request.extensions_mut().insert(identity);
    }

    Ok(next.run(request).await)
}
