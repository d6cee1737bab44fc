//! Keygate Core - Account model, configuration, and credential storage
//!
//! This crate defines the pieces of Keygate that do not depend on HTTP:
//! - Account records, roles, and the public account view
//! - Common error types
//! - The `CredentialStore` trait with in-memory and PostgreSQL backends
//! - Configuration management

pub mod account;
pub mod config;
pub mod postgres;
pub mod store;

pub use account::{normalize_email, Account, AccountPublic, AccountUpdate, NewAccount, Role};
pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, LoggingConfig, RateLimitConfig,
    ServerConfig, DEV_ACCESS_SECRET, DEV_REFRESH_SECRET,
};
pub use postgres::PgCredentialStore;
pub use store::{CredentialStore, MemoryCredentialStore, StoreError};

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for Keygate operations
#[derive(Error, Debug)]
pub enum KeygateError {
    #[error("Account not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, KeygateError>;
