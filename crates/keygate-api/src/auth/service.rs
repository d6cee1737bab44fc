//! Authentication service layer
//!
//! Orchestrates registration, login, refresh-token rotation, logout, and
//! account administration on top of a [`CredentialStore`].
//!
//! Session model: each account holds at most one live refresh token, stored
//! as its SHA-256 digest. Login replaces it, refresh rotates it with a
//! compare-and-swap, logout clears it. A refresh token that no longer matches
//! the stored digest is dead; presenting it again is logged as a replay.

use super::jwt::{generate_token_pair, validate_refresh_token, JwtConfig, TokenPair};
use super::guard::AuthenticatedIdentity;
use super::models::{
    field_errors, AuthResponse, CreateAccountRequest, LoginRequest, RegisterRequest,
    UpdateAccountRequest,
};
use super::password::{
    hash_password_blocking, validate_password_strength, verify_password_blocking, PasswordConfig,
};
use crate::audit::{audit_log, AuditEvent};
use crate::error::AppError;
use chrono::Utc;
use keygate_core::{
    Account, AccountPublic, AccountUpdate, AppConfig, CredentialStore, NewAccount, Role,
    StoreError,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;
use validator::Validate;

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    jwt_config: JwtConfig,
    password_config: PasswordConfig,
    /// Hash checked when the email is unknown, so that login costs the same
    /// whether or not the account exists
    dummy_hash: Arc<OnceCell<String>>,
}

const DUMMY_PASSWORD: &str = "keygate-dummy-Passw0rd";

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        jwt_config: JwtConfig,
        password_config: PasswordConfig,
    ) -> Self {
        Self {
            store,
            jwt_config,
            password_config,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// Build from application configuration
    pub fn from_config(store: Arc<dyn CredentialStore>, config: &AppConfig) -> Self {
        Self::new(
            store,
            JwtConfig::from(&config.auth),
            PasswordConfig::from(&config.auth),
        )
    }

    pub fn jwt_config(&self) -> &JwtConfig {
        &self.jwt_config
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Register a new account with the default role and open a session
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AppError> {
        request
            .validate()
            .map_err(|e| AppError::Validation(field_errors(&e)))?;
        validate_password_strength(&request.password)
            .map_err(|msg| AppError::invalid_field("password", msg))?;

        let account = self
            .create(
                &request.email,
                request.password,
                &request.first_name,
                &request.last_name,
                vec![Role::User],
            )
            .await
            .inspect_err(|e| {
                if let AppError::Conflict(reason) = e {
                    audit_log(&AuditEvent::RegistrationFailure {
                        email: request.email.clone(),
                        reason: reason.clone(),
                    });
                }
            })?;

        let response = self.open_session(&account).await?;

        audit_log(&AuditEvent::RegistrationSuccess {
            user_id: account.id,
            email: account.email.clone(),
            roles: account.roles.iter().map(|r| r.to_string()).collect(),
        });

        Ok(response)
    }

    /// Verify credentials and open a new session
    ///
    /// Any previously issued refresh token stops working. Unknown email, wrong
    /// password, and inactive account are indistinguishable to the caller.
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AppError> {
        request
            .validate()
            .map_err(|e| AppError::Validation(field_errors(&e)))?;

        let reject = |reason: &str| {
            audit_log(&AuditEvent::LoginFailure {
                email: request.email.clone(),
                reason: reason.to_string(),
            });
            AppError::Unauthorized
        };

        let Some(mut account) = self.store.find_by_email(&request.email).await? else {
            let dummy = self.dummy_hash().await?;
            verify_password_blocking(request.password.clone(), dummy).await;
            return Err(reject("unknown email"));
        };

        if !verify_password_blocking(request.password.clone(), account.password_hash.clone()).await
        {
            return Err(reject("password mismatch"));
        }

        if !account.is_active {
            return Err(reject("account inactive"));
        }

        let now = Utc::now();
        self.store.record_login(account.id, now).await?;
        account.last_login = Some(now);
        account.updated_at = now;

        let response = self.open_session(&account).await?;

        audit_log(&AuditEvent::LoginSuccess {
            user_id: account.id,
            email: account.email.clone(),
        });

        Ok(response)
    }

    /// Rotate the session of `account_id` using its current refresh token
    ///
    /// Succeeds at most once per refresh token: the stored digest is swapped
    /// only if it still matches the presented one, so of two concurrent calls
    /// with the same token exactly one wins.
    pub async fn refresh(
        &self,
        account_id: Uuid,
        presented: &str,
    ) -> Result<AuthResponse, AppError> {
        let claims = validate_refresh_token(&self.jwt_config, presented)?;
        if claims.account_id()? != account_id {
            return Err(self.refresh_rejected(account_id, "token subject mismatch"));
        }

        let account = match self.store.find_by_id(account_id).await? {
            Some(account) if account.is_active => account,
            Some(_) => return Err(self.refresh_rejected(account_id, "account inactive")),
            None => return Err(AppError::Unauthorized),
        };

        let presented_hash = hash_token(presented);
        if account.refresh_token_hash.as_deref() != Some(presented_hash.as_str()) {
            return Err(self.refresh_rejected(account_id, "token does not match active session"));
        }

        let pair = self.issue_pair(&account)?;
        let swapped = self
            .store
            .swap_refresh_token_hash(account.id, &presented_hash, hash_token(&pair.refresh_token))
            .await
            .map_err(session_store_error)?;
        if !swapped {
            return Err(self.refresh_rejected(account_id, "lost rotation race"));
        }

        audit_log(&AuditEvent::TokenRefresh {
            user_id: account.id,
        });

        Ok(self.auth_response(&account, pair))
    }

    /// Refresh using only the token; the account comes from its verified `sub`
    pub async fn refresh_with_token(&self, presented: &str) -> Result<AuthResponse, AppError> {
        let claims = validate_refresh_token(&self.jwt_config, presented)?;
        self.refresh(claims.account_id()?, presented).await
    }

    /// Revoke the account's session; idempotent
    pub async fn logout(&self, account_id: Uuid) -> Result<(), AppError> {
        match self.store.set_refresh_token_hash(account_id, None).await {
            Ok(()) | Err(StoreError::AccountNotFound) => {}
            Err(e) => return Err(e.into()),
        }

        audit_log(&AuditEvent::Logout {
            user_id: account_id,
        });
        Ok(())
    }

    /// Resolve an account ID from a verified access token to a live account
    pub async fn validate(&self, account_id: Uuid) -> Result<Account, AppError> {
        match self.store.find_by_id(account_id).await? {
            Some(account) if account.is_active => Ok(account),
            _ => Err(AppError::Unauthorized),
        }
    }

    /// Administrative creation; does not open a session
    pub async fn create_account(
        &self,
        actor: &AuthenticatedIdentity,
        request: CreateAccountRequest,
    ) -> Result<AccountPublic, AppError> {
        request
            .validate()
            .map_err(|e| AppError::Validation(field_errors(&e)))?;
        validate_password_strength(&request.password)
            .map_err(|msg| AppError::invalid_field("password", msg))?;

        let account = self
            .create(
                &request.email,
                request.password,
                &request.first_name,
                &request.last_name,
                request.roles.unwrap_or_default(),
            )
            .await?;

        audit_log(&AuditEvent::AccountCreated {
            user_id: account.id,
            email: account.email.clone(),
            created_by: actor.user_id,
        });

        Ok(account.to_public())
    }

    /// All live accounts, newest first
    pub async fn list_accounts(&self) -> Result<Vec<AccountPublic>, AppError> {
        let accounts = self.store.list().await?;
        Ok(accounts.iter().map(Account::to_public).collect())
    }

    pub async fn count_accounts(&self) -> Result<u64, AppError> {
        Ok(self.store.count().await?)
    }

    pub async fn get_account(&self, id: Uuid) -> Result<AccountPublic, AppError> {
        self.store
            .find_by_id(id)
            .await?
            .map(|a| a.to_public())
            .ok_or_else(|| AppError::NotFound("User".to_string()))
    }

    /// Apply a profile update
    ///
    /// Callers may edit their own profile; administrators may edit anyone's.
    /// Only administrators may change roles.
    pub async fn update_account(
        &self,
        actor: &AuthenticatedIdentity,
        id: Uuid,
        request: UpdateAccountRequest,
    ) -> Result<AccountPublic, AppError> {
        if actor.user_id != id && !actor.is_admin() {
            return Err(AppError::Forbidden(
                "You can only update your own profile".to_string(),
            ));
        }
        if request.roles.is_some() && !actor.is_admin() {
            return Err(AppError::Forbidden(
                "Only administrators can change roles".to_string(),
            ));
        }
        request
            .validate()
            .map_err(|e| AppError::Validation(field_errors(&e)))?;

        let update = AccountUpdate::from(request);
        if update.is_empty() {
            return Err(AppError::BadRequest("No fields to update".to_string()));
        }

        let account = self.store.update_profile(id, &update).await?;

        audit_log(&AuditEvent::AccountUpdated {
            user_id: id,
            updated_by: actor.user_id,
            roles_changed: update.roles.is_some(),
        });

        Ok(account.to_public())
    }

    /// Soft-delete an account and revoke its session
    pub async fn remove_account(
        &self,
        actor: &AuthenticatedIdentity,
        id: Uuid,
    ) -> Result<(), AppError> {
        self.store.soft_delete(id).await?;

        audit_log(&AuditEvent::AccountDeleted {
            user_id: id,
            deleted_by: actor.user_id,
        });
        Ok(())
    }

    async fn create(
        &self,
        email: &str,
        password: String,
        first_name: &str,
        last_name: &str,
        roles: Vec<Role>,
    ) -> Result<Account, AppError> {
        if self.store.find_by_email(email).await?.is_some() {
            return Err(StoreError::EmailAlreadyExists.into());
        }

        let password_hash = hash_password_blocking(password, self.password_config.clone()).await?;

        // The store re-checks uniqueness on insert; a concurrent registration
        // that slipped past the lookup above still gets a conflict.
        let account = self
            .store
            .insert(Account::new(NewAccount {
                email: email.to_string(),
                password_hash,
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                roles,
            }))
            .await?;

        Ok(account)
    }

    /// Issue a token pair and make its refresh token the only live one
    /// Hash of a fixed password under this service's hashing parameters
    async fn dummy_hash(&self) -> Result<String, AppError> {
        let hash = self
            .dummy_hash
            .get_or_try_init(|| {
                hash_password_blocking(DUMMY_PASSWORD.to_string(), self.password_config.clone())
            })
            .await?;
        Ok(hash.clone())
    }

    async fn open_session(&self, account: &Account) -> Result<AuthResponse, AppError> {
        let pair = self.issue_pair(account)?;
        self.store
            .set_refresh_token_hash(account.id, Some(hash_token(&pair.refresh_token)))
            .await
            .map_err(session_store_error)?;
        Ok(self.auth_response(account, pair))
    }

    fn issue_pair(&self, account: &Account) -> Result<TokenPair, AppError> {
        Ok(generate_token_pair(&self.jwt_config, account)?)
    }

    fn auth_response(&self, account: &Account, pair: TokenPair) -> AuthResponse {
        AuthResponse {
            user: account.to_public(),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt_config.access_expiration_secs,
        }
    }

    fn refresh_rejected(&self, user_id: Uuid, reason: &str) -> AppError {
        audit_log(&AuditEvent::RefreshRejected {
            user_id,
            reason: reason.to_string(),
        });
        AppError::Unauthorized
    }
}

/// An account that vanished mid-session is an auth failure, not a 404
fn session_store_error(err: StoreError) -> AppError {
    match err {
        StoreError::AccountNotFound => AppError::Unauthorized,
        other => other.into(),
    }
}

/// SHA-256 hex digest used to store refresh tokens
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keygate_core::MemoryCredentialStore;

    fn service() -> AuthService {
        AuthService::new(
            Arc::new(MemoryCredentialStore::new()),
            JwtConfig::default(),
            PasswordConfig {
                memory_cost: 1024,
                time_cost: 1,
                parallelism: 1,
                output_len: Some(32),
            },
        )
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "Passw0rd!".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Liddell".to_string(),
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn admin() -> AuthenticatedIdentity {
        AuthenticatedIdentity {
            user_id: Uuid::new_v4(),
            email: "admin@example.com".to_string(),
            roles: vec![Role::Admin],
        }
    }

    #[test]
    fn test_hash_token() {
        let hash = hash_token("abc");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_token("abc"));
        assert_ne!(hash, hash_token("abd"));
    }

    #[tokio::test]
    async fn test_register_opens_session() {
        let service = service();
        let response = service
            .register(register_request("Alice@Example.com"))
            .await
            .unwrap();

        assert_eq!(response.user.email, "alice@example.com");
        assert_eq!(response.user.roles, vec![Role::User]);
        assert_eq!(response.token_type, "Bearer");

        let stored = service.validate(response.user.id).await.unwrap();
        assert_eq!(
            stored.refresh_token_hash,
            Some(hash_token(&response.refresh_token))
        );
        assert_ne!(stored.password_hash, "Passw0rd!");
    }

    #[tokio::test]
    async fn test_register_duplicate_email_conflicts() {
        let service = service();
        service
            .register(register_request("dup@example.com"))
            .await
            .unwrap();

        let result = service.register(register_request("DUP@example.com")).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(service.count_accounts().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_register_weak_password_rejected() {
        let service = service();
        let request = RegisterRequest {
            password: "password".to_string(),
            ..register_request("weak@example.com")
        };

        match service.register(request).await {
            Err(AppError::Validation(fields)) => assert!(fields.contains_key("password")),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(service.count_accounts().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let service = service();
        let registered = service
            .register(register_request("carol@example.com"))
            .await
            .unwrap();

        let unknown = service
            .login(login_request("nobody@example.com", "Passw0rd!"))
            .await;
        let wrong = service
            .login(login_request("carol@example.com", "Wrong0ne!"))
            .await;
        assert!(matches!(unknown, Err(AppError::Unauthorized)));
        assert!(matches!(wrong, Err(AppError::Unauthorized)));

        // Deleted accounts fail the same way
        service.store().soft_delete(registered.user.id).await.unwrap();
        let deleted = service
            .login(login_request("carol@example.com", "Passw0rd!"))
            .await;
        assert!(matches!(deleted, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_unknown_email_still_verifies_a_hash() {
        let service = service();
        assert!(service.dummy_hash.get().is_none());

        let result = service
            .login(login_request("nobody@example.com", "Passw0rd!"))
            .await;
        assert!(matches!(result, Err(AppError::Unauthorized)));

        // Same Argon2 parameters as real account hashes
        let dummy = service.dummy_hash.get().expect("dummy hash computed");
        assert!(dummy.starts_with("$argon2id$"));
        assert!(dummy.contains("m=1024,t=1,p=1"));
        assert!(crate::auth::password::verify_password(DUMMY_PASSWORD, dummy));

        // Computed once and reused
        let _ = service
            .login(login_request("other@example.com", "Passw0rd!"))
            .await;
        assert_eq!(service.dummy_hash.get(), Some(dummy));
    }

    #[tokio::test]
    async fn test_login_response_carries_fresh_last_login() {
        let service = service();
        let registered = service
            .register(register_request("frank@example.com"))
            .await
            .unwrap();
        assert!(registered.user.last_login.is_none());

        let before = Utc::now();
        let login = service
            .login(login_request("frank@example.com", "Passw0rd!"))
            .await
            .unwrap();

        let last_login = login.user.last_login.expect("last login set");
        assert!(last_login >= before);

        let stored = service.validate(login.user.id).await.unwrap();
        assert_eq!(stored.last_login, Some(last_login));
    }

    #[tokio::test]
    async fn test_login_replaces_previous_session() {
        let service = service();
        let registered = service
            .register(register_request("dave@example.com"))
            .await
            .unwrap();

        let login = service
            .login(login_request("dave@example.com", "Passw0rd!"))
            .await
            .unwrap();
        assert_ne!(login.access_token, registered.access_token);
        assert_ne!(login.refresh_token, registered.refresh_token);

        let stale = service
            .refresh(registered.user.id, &registered.refresh_token)
            .await;
        assert!(matches!(stale, Err(AppError::Unauthorized)));

        assert!(service
            .refresh(login.user.id, &login.refresh_token)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_rejects_replay() {
        let service = service();
        let first = service
            .register(register_request("erin@example.com"))
            .await
            .unwrap();

        let second = service
            .refresh_with_token(&first.refresh_token)
            .await
            .unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);

        let replay = service.refresh_with_token(&first.refresh_token).await;
        assert!(matches!(replay, Err(AppError::Unauthorized)));

        assert!(service
            .refresh_with_token(&second.refresh_token)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_refresh_single_winner() {
        let service = service();
        let session = service
            .register(register_request("frank@example.com"))
            .await
            .unwrap();

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let service = service.clone();
                let token = session.refresh_token.clone();
                tokio::spawn(async move { service.refresh_with_token(&token).await })
            })
            .collect();

        let winners = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_refresh_with_foreign_account_id() {
        let service = service();
        let session = service
            .register(register_request("grace@example.com"))
            .await
            .unwrap();

        let result = service
            .refresh(Uuid::new_v4(), &session.refresh_token)
            .await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_access_token_is_not_a_refresh_token() {
        let service = service();
        let session = service
            .register(register_request("heidi@example.com"))
            .await
            .unwrap();

        let result = service.refresh_with_token(&session.access_token).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_logout_revokes_and_is_idempotent() {
        let service = service();
        let session = service
            .register(register_request("ivan@example.com"))
            .await
            .unwrap();

        service.logout(session.user.id).await.unwrap();
        service.logout(session.user.id).await.unwrap();
        service.logout(Uuid::new_v4()).await.unwrap();

        let result = service.refresh_with_token(&session.refresh_token).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));

        // The account itself is still valid
        assert!(service.validate(session.user.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_validate_unknown_account() {
        let result = service().validate(Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_update_account_permissions() {
        let service = service();
        let session = service
            .register(register_request("judy@example.com"))
            .await
            .unwrap();
        let me = AuthenticatedIdentity {
            user_id: session.user.id,
            email: session.user.email.clone(),
            roles: vec![Role::User],
        };

        let renamed = service
            .update_account(
                &me,
                me.user_id,
                UpdateAccountRequest {
                    first_name: Some("Judith".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.first_name, "Judith");

        let self_promotion = service
            .update_account(
                &me,
                me.user_id,
                UpdateAccountRequest {
                    roles: Some(vec![Role::Admin]),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(self_promotion, Err(AppError::Forbidden(_))));

        let promoted = service
            .update_account(
                &admin(),
                me.user_id,
                UpdateAccountRequest {
                    roles: Some(vec![Role::Moderator]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(promoted.roles, vec![Role::Moderator]);

        let other = service
            .update_account(&me, Uuid::new_v4(), UpdateAccountRequest::default())
            .await;
        assert!(matches!(other, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_create_and_remove_account() {
        let service = service();
        let admin = admin();

        let created = service
            .create_account(
                &admin,
                CreateAccountRequest {
                    email: "mod@example.com".to_string(),
                    password: "Passw0rd!".to_string(),
                    first_name: "Mo".to_string(),
                    last_name: "Derator".to_string(),
                    roles: Some(vec![Role::Moderator, Role::User]),
                },
            )
            .await
            .unwrap();
        assert_eq!(created.roles, vec![Role::Moderator, Role::User]);
        assert_eq!(service.list_accounts().await.unwrap().len(), 1);

        let session = service
            .login(login_request("mod@example.com", "Passw0rd!"))
            .await
            .unwrap();

        service.remove_account(&admin, created.id).await.unwrap();

        assert!(matches!(
            service.get_account(created.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.refresh_with_token(&session.refresh_token).await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            service.remove_account(&admin, created.id).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(service.count_accounts().await.unwrap(), 0);
    }
}
