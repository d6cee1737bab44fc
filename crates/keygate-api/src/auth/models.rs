//! Request and response bodies for the auth and account endpoints
//!
//! Requests derive `validator::Validate`; the session service runs the checks
//! and turns failures into field-level 400 responses. Password strength is a
//! separate policy check in [`super::password::validate_password_strength`].

use keygate_core::{AccountPublic, AccountUpdate, Role};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

/// Self-registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email(message = "Must be a valid email address"))]
    pub email: String,

    #[validate(length(min = 1, max = 128, message = "Password is required"))]
    pub password: String,

    #[validate(length(min = 1, max = 50, message = "First name must be 1-50 characters"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 50, message = "Last name must be 1-50 characters"))]
    pub last_name: String,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 254, message = "Email is required"))]
    pub email: String,

    #[validate(length(min = 1, max = 128, message = "Password is required"))]
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// Administrative account creation
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    #[validate(email(message = "Must be a valid email address"))]
    pub email: String,

    #[validate(length(min = 1, max = 128, message = "Password is required"))]
    pub password: String,

    #[validate(length(min = 1, max = 50, message = "First name must be 1-50 characters"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 50, message = "Last name must be 1-50 characters"))]
    pub last_name: String,

    /// Defaults to `["user"]`
    #[serde(default)]
    pub roles: Option<Vec<Role>>,
}

/// Partial profile update; omitted fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    #[validate(length(min = 1, max = 50, message = "First name must be 1-50 characters"))]
    pub first_name: Option<String>,

    #[validate(length(min = 1, max = 50, message = "Last name must be 1-50 characters"))]
    pub last_name: Option<String>,

    #[validate(url(message = "Avatar must be a URL"))]
    pub avatar: Option<String>,

    /// Only administrators may change roles
    #[validate(length(min = 1, message = "At least one role is required"))]
    pub roles: Option<Vec<Role>>,
}

impl From<UpdateAccountRequest> for AccountUpdate {
    fn from(request: UpdateAccountRequest) -> Self {
        Self {
            first_name: request.first_name,
            last_name: request.last_name,
            avatar: request.avatar,
            roles: request.roles,
        }
    }
}

/// Successful register, login, or refresh
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: AccountPublic,
    pub access_token: String,
    pub refresh_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// Plain acknowledgement body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Token validation result
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub user: AccountPublic,
}

/// Flatten validator output into `field -> messages`, keyed by wire name
pub fn field_errors(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value ({})", e.code))
                })
                .collect();
            (camel_case(&field), messages)
        })
        .collect()
}

/// `first_name` -> `firstName`, matching the bodies' field names
fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper_next = false;
    for c in field.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "Passw0rd!".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Liddell".to_string(),
        }
    }

    #[test]
    fn test_valid_register_request() {
        assert!(register("alice@example.com").validate().is_ok());
    }

    #[test]
    fn test_invalid_email_reported_by_field() {
        let errors = register("not-an-email").validate().unwrap_err();
        let fields = field_errors(&errors);

        assert_eq!(fields.len(), 1);
        assert_eq!(fields["email"], vec!["Must be a valid email address".to_string()]);
    }

    #[test]
    fn test_multiple_fields_reported() {
        let request = RegisterRequest {
            first_name: String::new(),
            last_name: "x".repeat(51),
            ..register("alice@example.com")
        };
        let fields = field_errors(&request.validate().unwrap_err());

        assert!(fields.contains_key("firstName"));
        assert!(fields.contains_key("lastName"));
        assert!(!fields.contains_key("email"));
    }

    #[test]
    fn test_update_request_optional_fields() {
        assert!(UpdateAccountRequest::default().validate().is_ok());

        let request = UpdateAccountRequest {
            first_name: Some(String::new()),
            ..Default::default()
        };
        assert!(request.validate().is_err());

        let request = UpdateAccountRequest {
            roles: Some(vec![]),
            ..Default::default()
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_update_request_deserializes_roles() {
        let request: UpdateAccountRequest =
            serde_json::from_str(r#"{"roles":["moderator"]}"#).unwrap();
        let update = AccountUpdate::from(request);

        assert_eq!(update.roles, Some(vec![Role::Moderator]));
        assert!(update.first_name.is_none());
    }

    #[test]
    fn test_bodies_use_camel_case() {
        let request: RegisterRequest = serde_json::from_str(
            r#"{"email":"alice@example.com","password":"Passw0rd!","firstName":"Alice","lastName":"L"}"#,
        )
        .unwrap();
        assert_eq!(request.first_name, "Alice");
        assert_eq!(request.last_name, "L");

        let request: RefreshRequest =
            serde_json::from_str(r#"{"refreshToken":"abc"}"#).unwrap();
        assert_eq!(request.refresh_token, "abc");

        assert!(serde_json::from_str::<RegisterRequest>(
            r#"{"email":"a@b.co","password":"x","first_name":"A","last_name":"B"}"#
        )
        .is_err());
    }

    #[test]
    fn test_camel_case_field_names() {
        assert_eq!(camel_case("first_name"), "firstName");
        assert_eq!(camel_case("refresh_token"), "refreshToken");
        assert_eq!(camel_case("email"), "email");
    }
}
