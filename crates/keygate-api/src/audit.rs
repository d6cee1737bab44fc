//! Security audit logging for authentication events
//!
//! Every event is emitted at INFO level on the `audit` target, with the full
//! event serialized as JSON in the `event` field, so the stream can be routed
//! to a security log separately from operational logs:
//!
//! ```text
//! RUST_LOG=info,audit=info
//! ```
//!
//! Audit records may carry the internal reason behind a generic client-facing
//! error (for example, which login check failed). Passwords and tokens never
//! appear here.
//!
//! Author: hephaex@gmail.com

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Security audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// New self-registered account
    RegistrationSuccess {
        user_id: Uuid,
        email: String,
        roles: Vec<String>,
    },

    /// Registration refused (duplicate email, weak password)
    RegistrationFailure { email: String, reason: String },

    LoginSuccess { user_id: Uuid, email: String },

    /// Failed login; `reason` is internal only
    LoginFailure { email: String, reason: String },

    /// Refresh token rotated
    TokenRefresh { user_id: Uuid },

    /// Refresh token refused: replayed, revoked, or lost a rotation race
    RefreshRejected { user_id: Uuid, reason: String },

    /// Session revoked
    Logout { user_id: Uuid },

    /// Account created by an administrator
    AccountCreated {
        user_id: Uuid,
        email: String,
        created_by: Uuid,
    },

    AccountUpdated {
        user_id: Uuid,
        updated_by: Uuid,
        roles_changed: bool,
    },

    AccountDeleted { user_id: Uuid, deleted_by: Uuid },

    /// Authenticated caller lacks the role a route requires
    AccessDenied {
        user_id: Option<Uuid>,
        resource: String,
        required_roles: Vec<String>,
        ip_address: Option<String>,
    },

    /// Bearer token failed verification, or its account is gone or inactive
    InvalidToken {
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Client exceeded its request window
    RateLimited { client: String, resource: String },
}

impl AuditEvent {
    fn summary(&self) -> &'static str {
        match self {
            AuditEvent::RegistrationSuccess { .. } => "Registration successful",
            AuditEvent::RegistrationFailure { .. } => "Registration failed",
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::TokenRefresh { .. } => "Token refresh",
            AuditEvent::RefreshRejected { .. } => "Refresh token rejected",
            AuditEvent::Logout { .. } => "User logout",
            AuditEvent::AccountCreated { .. } => "Account created",
            AuditEvent::AccountUpdated { .. } => "Account updated",
            AuditEvent::AccountDeleted { .. } => "Account deleted",
            AuditEvent::AccessDenied { .. } => "Access denied",
            AuditEvent::InvalidToken { .. } => "Invalid token",
            AuditEvent::RateLimited { .. } => "Rate limit exceeded",
        }
    }
}

/// Write an event to the audit log
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();
    let event_json = serde_json::to_string(event).unwrap_or_else(|_| format!("{event:?}"));

    match event {
        AuditEvent::LoginFailure { email, reason }
        | AuditEvent::RegistrationFailure { email, reason } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                email = %email,
                reason = %reason,
                "{}",
                event.summary()
            );
        }
        AuditEvent::AccessDenied {
            user_id,
            resource,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = ?user_id,
                resource = %resource,
                ip_address = ?ip_address,
                "{}",
                event.summary()
            );
        }
        AuditEvent::InvalidToken {
            reason, ip_address, ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                reason = %reason,
                ip_address = ?ip_address,
                "{}",
                event.summary()
            );
        }
        _ => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                "{}",
                event.summary()
            );
        }
    }
}

/// Client IP as reported by proxy headers
///
/// Takes the first hop of `X-Forwarded-For`, then `X-Real-IP`. Callers with
/// access to the socket address fall back to it themselves.
pub fn extract_ip_address(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            if let Some(first_ip) = xff_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return Some(first_ip.to_string());
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            let ip_str = ip_str.trim();
            if !ip_str.is_empty() {
                return Some(ip_str.to_string());
            }
        }
    }

    None
}

pub fn extract_user_agent(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}
