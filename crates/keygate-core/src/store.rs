//! Credential store contract and in-memory backend
//!
//! The store owns two guarantees the session layer relies on:
//! - email uniqueness among non-deleted accounts is enforced on insert,
//!   not just checked beforehand
//! - refresh-token rotation is a compare-and-swap on the stored hash
//!
//! Soft-deleted accounts are invisible to every lookup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::account::{normalize_email, Account, AccountUpdate};

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Account not found")]
    AccountNotFound,

    #[error("Email already exists")]
    EmailAlreadyExists,
}

/// Persistence operations for account records
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new account; fails with `EmailAlreadyExists` when a live
    /// account already owns the email
    async fn insert(&self, account: Account) -> Result<Account, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Lookup by email; the argument is normalized before matching
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// All live accounts, newest first
    async fn list(&self) -> Result<Vec<Account>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    async fn update_profile(&self, id: Uuid, update: &AccountUpdate)
        -> Result<Account, StoreError>;

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Unconditionally replace (or clear) the stored refresh-token hash
    async fn set_refresh_token_hash(
        &self,
        id: Uuid,
        hash: Option<String>,
    ) -> Result<(), StoreError>;

    /// Replace the stored hash only if it still equals `expected`.
    ///
    /// Returns `Ok(false)` when the hash changed underneath (rotated by another
    /// refresh, or cleared by logout).
    async fn swap_refresh_token_hash(
        &self,
        id: Uuid,
        expected: &str,
        new_hash: String,
    ) -> Result<bool, StoreError>;

    /// Mark deleted, deactivate, and drop any session
    async fn soft_delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// Connectivity check for readiness probes
    async fn ping(&self) -> Result<(), StoreError>;
}

/// In-memory credential store
///
/// Used when no database is configured and throughout the test suite.
#[derive(Default)]
pub struct MemoryCredentialStore {
    accounts: RwLock<HashMap<Uuid, Account>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn live_mut(accounts: &mut HashMap<Uuid, Account>, id: Uuid) -> Result<&mut Account, StoreError> {
    accounts
        .get_mut(&id)
        .filter(|a| !a.is_deleted)
        .ok_or(StoreError::AccountNotFound)
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn insert(&self, mut account: Account) -> Result<Account, StoreError> {
        account.email = normalize_email(&account.email);

        // Check and insert under one write lock
        let mut accounts = self.accounts.write().await;
        if accounts
            .values()
            .any(|a| !a.is_deleted && a.email == account.email)
        {
            return Err(StoreError::EmailAlreadyExists);
        }

        accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&id).filter(|a| !a.is_deleted).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let email = normalize_email(email);
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| !a.is_deleted && a.email == email)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Account>, StoreError> {
        let accounts = self.accounts.read().await;
        let mut live: Vec<Account> = accounts.values().filter(|a| !a.is_deleted).cloned().collect();
        live.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(live)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().filter(|a| !a.is_deleted).count() as u64)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: &AccountUpdate,
    ) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.write().await;
        let account = live_mut(&mut accounts, id)?;
        update.apply(account);
        Ok(account.clone())
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        let account = live_mut(&mut accounts, id)?;
        account.last_login = Some(at);
        account.updated_at = at;
        Ok(())
    }

    async fn set_refresh_token_hash(
        &self,
        id: Uuid,
        hash: Option<String>,
    ) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        let account = live_mut(&mut accounts, id)?;
        account.refresh_token_hash = hash;
        Ok(())
    }

    async fn swap_refresh_token_hash(
        &self,
        id: Uuid,
        expected: &str,
        new_hash: String,
    ) -> Result<bool, StoreError> {
        let mut accounts = self.accounts.write().await;
        let account = live_mut(&mut accounts, id)?;
        if account.refresh_token_hash.as_deref() != Some(expected) {
            return Ok(false);
        }
        account.refresh_token_hash = Some(new_hash);
        Ok(true)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        let account = live_mut(&mut accounts, id)?;
        let now = Utc::now();
        account.is_deleted = true;
        account.deleted_at = Some(now);
        account.is_active = false;
        account.refresh_token_hash = None;
        account.updated_at = now;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
