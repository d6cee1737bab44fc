//! Account records and roles
//!
//! An `Account` is the stored identity record. It carries the password hash and
//! the hash of the single live refresh token, so it is deliberately not
//! `Serialize`; everything that leaves the process goes through `AccountPublic`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Account role
///
/// - Admin: account management, including deletes and role changes
/// - Moderator: can list and inspect accounts
/// - User: default role for self-registered accounts
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Moderator => "moderator",
            Role::User => "user",
        }
    }

    /// Sort, dedupe, and fall back to `[User]` when empty
    pub fn normalize_set(mut roles: Vec<Role>) -> Vec<Role> {
        roles.sort();
        roles.dedup();
        if roles.is_empty() {
            roles.push(Role::User);
        }
        roles
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "moderator" => Ok(Role::Moderator),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Trim and lowercase an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Stored account record
#[derive(Clone)]
pub struct Account {
    pub id: Uuid,
    /// Always normalized with [`normalize_email`]
    pub email: String,
    /// Argon2id PHC string
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    /// Non-empty, sorted, no duplicates
    pub roles: Vec<Role>,
    pub is_active: bool,
    /// SHA-256 of the currently valid refresh token, if a session is open
    pub refresh_token_hash: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub email_verified: bool,
    pub avatar: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Hashes stay out of logs.
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("roles", &self.roles)
            .field("is_active", &self.is_active)
            .field("has_session", &self.refresh_token_hash.is_some())
            .field("is_deleted", &self.is_deleted)
            .finish_non_exhaustive()
    }
}

/// Fields needed to create an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub roles: Vec<Role>,
}

impl Account {
    /// Build a fresh, active account with no session
    pub fn new(new: NewAccount) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(&new.email),
            password_hash: new.password_hash,
            first_name: new.first_name.trim().to_string(),
            last_name: new.last_name.trim().to_string(),
            roles: Role::normalize_set(new.roles),
            is_active: true,
            refresh_token_hash: None,
            last_login: None,
            email_verified: false,
            avatar: None,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Convert to the representation safe for API responses
    pub fn to_public(&self) -> AccountPublic {
        AccountPublic {
            id: self.id,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            roles: self.roles.clone(),
            is_active: self.is_active,
            email_verified: self.email_verified,
            avatar: self.avatar.clone(),
            last_login: self.last_login,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Public account representation
///
/// Excludes the password hash and the refresh-token hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountPublic {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub roles: Vec<Role>,
    pub is_active: bool,
    pub email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile changes; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar: Option<String>,
    pub roles: Option<Vec<Role>>,
}

impl AccountUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.avatar.is_none()
            && self.roles.is_none()
    }

    /// Apply the changes in place and bump `updated_at`
    pub fn apply(&self, account: &mut Account) {
        if let Some(first_name) = &self.first_name {
            account.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = &self.last_name {
            account.last_name = last_name.trim().to_string();
        }
        if let Some(avatar) = &self.avatar {
            account.avatar = Some(avatar.clone());
        }
        if let Some(roles) = &self.roles {
            account.roles = Role::normalize_set(roles.clone());
        }
        account.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Account {
        Account::new(NewAccount {
            email: "  Alice@Example.COM ".to_string(),
            password_hash: "$argon2id$v=19$m=8,t=1,p=1$c2FsdA$aGFzaA".to_string(),
            first_name: " Alice ".to_string(),
            last_name: "Liddell".to_string(),
            roles: vec![],
        })
    }

    #[test]
    fn test_new_account_normalizes_fields() {
        let account = sample();
        assert_eq!(account.email, "alice@example.com");
        assert_eq!(account.first_name, "Alice");
        assert_eq!(account.roles, vec![Role::User]);
        assert!(account.is_active);
        assert!(account.refresh_token_hash.is_none());
        assert!(!account.is_deleted);
    }

    #[test]
    fn test_role_parse_and_display() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" moderator".parse::<Role>().unwrap(), Role::Moderator);
        assert!("root".parse::<Role>().is_err());
        assert_eq!(Role::User.to_string(), "user");
    }

    #[test]
    fn test_normalize_role_set() {
        let roles = Role::normalize_set(vec![Role::User, Role::Admin, Role::User]);
        assert_eq!(roles, vec![Role::Admin, Role::User]);
    }

    #[test]
    fn test_public_view_has_no_secrets() {
        let mut account = sample();
        account.refresh_token_hash = Some("deadbeef".to_string());

        let json = serde_json::to_value(account.to_public()).unwrap();
        let obj = json.as_object().unwrap();

        assert!(!obj.contains_key("password_hash"));
        assert!(!obj.contains_key("refresh_token_hash"));
        assert_eq!(json["email"], "alice@example.com");
        assert_eq!(json["roles"], serde_json::json!(["user"]));
        assert_eq!(json["firstName"], "Alice");
        assert_eq!(json["isActive"], true);
        assert!(obj.contains_key("createdAt"));
        assert!(!obj.contains_key("first_name"));
    }

    #[test]
    fn test_debug_redacts_hashes() {
        let account = sample();
        let debug = format!("{account:?}");
        assert!(!debug.contains("argon2id"));
    }

    #[test]
    fn test_update_apply() {
        let mut account = sample();
        let update = AccountUpdate {
            last_name: Some("Pleasance ".to_string()),
            roles: Some(vec![Role::Moderator]),
            ..Default::default()
        };
        assert!(!update.is_empty());

        update.apply(&mut account);
        assert_eq!(account.last_name, "Pleasance");
        assert_eq!(account.first_name, "Alice");
        assert_eq!(account.roles, vec![Role::Moderator]);
        assert!(AccountUpdate::default().is_empty());
    }
}
