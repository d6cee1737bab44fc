//! PostgreSQL credential store
//!
//! Account records live in a single `users` table. Email uniqueness among
//! live accounts is a partial unique index, so concurrent registrations are
//! resolved by the database rather than by the caller's pre-check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use crate::account::{normalize_email, Account, AccountUpdate, Role};
use crate::store::{CredentialStore, StoreError};

const ACCOUNT_COLUMNS: &str = "id, email, password_hash, first_name, last_name, roles, \
    is_active, refresh_token_hash, last_login, email_verified, avatar, is_deleted, \
    deleted_at, created_at, updated_at";

/// PostgreSQL credential store
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    /// Create a new store connection
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `users` table and its indexes if missing
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                email TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                roles TEXT[] NOT NULL DEFAULT ARRAY['user'],
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                refresh_token_hash TEXT,
                last_login TIMESTAMPTZ,
                email_verified BOOLEAN NOT NULL DEFAULT FALSE,
                avatar TEXT,
                is_deleted BOOLEAN NOT NULL DEFAULT FALSE,
                deleted_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to create users table: {e}")))?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS users_email_live_idx ON users (email) WHERE NOT is_deleted",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to create email index: {e}")))?;

        Ok(())
    }
}

/// Account row from database
#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    roles: Vec<String>,
    is_active: bool,
    refresh_token_hash: Option<String>,
    last_login: Option<DateTime<Utc>>,
    email_verified: bool,
    avatar: Option<String>,
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        let roles = row
            .roles
            .iter()
            .filter_map(|r| match r.parse::<Role>() {
                Ok(role) => Some(role),
                Err(e) => {
                    tracing::warn!(account_id = %row.id, "Ignoring stored role: {e}");
                    None
                }
            })
            .collect();

        Account {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            roles: Role::normalize_set(roles),
            is_active: row.is_active,
            refresh_token_hash: row.refresh_token_hash,
            last_login: row.last_login,
            email_verified: row.email_verified,
            avatar: row.avatar,
            is_deleted: row.is_deleted,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn role_strings(roles: &[Role]) -> Vec<String> {
    roles.iter().map(|r| r.as_str().to_string()).collect()
}

fn db_error(context: &str, e: sqlx::Error) -> StoreError {
    StoreError::DatabaseError(format!("{context}: {e}"))
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn insert(&self, account: Account) -> Result<Account, StoreError> {
        let query = format!(
            r#"
            INSERT INTO users (
                id, email, password_hash, first_name, last_name, roles,
                is_active, refresh_token_hash, last_login, email_verified, avatar,
                is_deleted, deleted_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, FALSE, NULL, $12, $13)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );

        let row: AccountRow = sqlx::query_as(&query)
            .bind(account.id)
            .bind(normalize_email(&account.email))
            .bind(&account.password_hash)
            .bind(&account.first_name)
            .bind(&account.last_name)
            .bind(role_strings(&account.roles))
            .bind(account.is_active)
            .bind(&account.refresh_token_hash)
            .bind(account.last_login)
            .bind(account.email_verified)
            .bind(&account.avatar)
            .bind(account.created_at)
            .bind(account.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db) = &e {
                    if db.is_unique_violation() {
                        return StoreError::EmailAlreadyExists;
                    }
                }
                db_error("Failed to create account", e)
            })?;

        Ok(row.into())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1 AND NOT is_deleted");

        let row: Option<AccountRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to fetch account", e))?;

        Ok(row.map(Account::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let query =
            format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = $1 AND NOT is_deleted");

        let row: Option<AccountRow> = sqlx::query_as(&query)
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to fetch account", e))?;

        Ok(row.map(Account::from))
    }

    async fn list(&self) -> Result<Vec<Account>, StoreError> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE NOT is_deleted ORDER BY created_at DESC"
        );

        let rows: Vec<AccountRow> = sqlx::query_as(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list accounts", e))?;

        Ok(rows.into_iter().map(Account::from).collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE NOT is_deleted")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to count accounts", e))?;

        Ok(count.max(0) as u64)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: &AccountUpdate,
    ) -> Result<Account, StoreError> {
        let query = format!(
            r#"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                avatar = COALESCE($4, avatar),
                roles = COALESCE($5, roles),
                updated_at = NOW()
            WHERE id = $1 AND NOT is_deleted
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );

        let roles = update
            .roles
            .clone()
            .map(|r| role_strings(&Role::normalize_set(r)));

        let row: Option<AccountRow> = sqlx::query_as(&query)
            .bind(id)
            .bind(update.first_name.as_deref().map(str::trim))
            .bind(update.last_name.as_deref().map(str::trim))
            .bind(update.avatar.as_deref())
            .bind(roles)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to update account", e))?;

        row.map(Account::from).ok_or(StoreError::AccountNotFound)
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE users SET last_login = $2, updated_at = $2 WHERE id = $1 AND NOT is_deleted",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to record login", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AccountNotFound);
        }
        Ok(())
    }

    async fn set_refresh_token_hash(
        &self,
        id: Uuid,
        hash: Option<String>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token_hash = $2 WHERE id = $1 AND NOT is_deleted",
        )
        .bind(id)
        .bind(hash)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to store refresh token", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AccountNotFound);
        }
        Ok(())
    }

    async fn swap_refresh_token_hash(
        &self,
        id: Uuid,
        expected: &str,
        new_hash: String,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET refresh_token_hash = $3
            WHERE id = $1 AND NOT is_deleted AND refresh_token_hash = $2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(new_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to rotate refresh token", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                is_deleted = TRUE,
                deleted_at = NOW(),
                is_active = FALSE,
                refresh_token_hash = NULL,
                updated_at = NOW()
            WHERE id = $1 AND NOT is_deleted
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to delete account", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AccountNotFound);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Ping failed", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::NewAccount;

    #[test]
    fn test_row_conversion_drops_unknown_roles() {
        let now = Utc::now();
        let row = AccountRow {
            id: Uuid::new_v4(),
            email: "row@example.com".to_string(),
            password_hash: "hash".to_string(),
            first_name: "Row".to_string(),
            last_name: "Test".to_string(),
            roles: vec!["admin".to_string(), "superuser".to_string()],
            is_active: true,
            refresh_token_hash: None,
            last_login: None,
            email_verified: false,
            avatar: None,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };

        let account = Account::from(row);
        assert_eq!(account.roles, vec![Role::Admin]);
    }

    async fn test_store() -> PgCredentialStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let store = PgCredentialStore::connect(&url, 2).await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn test_unique_email_enforced_by_index() {
        let store = test_store().await;
        let email = format!("pg-{}@example.com", Uuid::new_v4());
        let new = || {
            Account::new(NewAccount {
                email: email.clone(),
                password_hash: "hash".to_string(),
                first_name: "Pg".to_string(),
                last_name: "Test".to_string(),
                roles: vec![],
            })
        };

        store.insert(new()).await.unwrap();
        assert!(matches!(
            store.insert(new()).await,
            Err(StoreError::EmailAlreadyExists)
        ));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn test_swap_refresh_hash() {
        let store = test_store().await;
        let account = store
            .insert(Account::new(NewAccount {
                email: format!("swap-{}@example.com", Uuid::new_v4()),
                password_hash: "hash".to_string(),
                first_name: "Pg".to_string(),
                last_name: "Swap".to_string(),
                roles: vec![],
            }))
            .await
            .unwrap();

        store
            .set_refresh_token_hash(account.id, Some("h1".to_string()))
            .await
            .unwrap();
        assert!(store
            .swap_refresh_token_hash(account.id, "h1", "h2".to_string())
            .await
            .unwrap());
        assert!(!store
            .swap_refresh_token_hash(account.id, "h1", "h3".to_string())
            .await
            .unwrap());
    }
}
