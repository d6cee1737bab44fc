//! Password hashing and verification using Argon2id
//!
//! Hashes are PHC strings (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`), so the
//! salt and cost parameters travel with the hash and verification needs nothing
//! else. Async callers use [`hash_password_blocking`] to keep hashing off the
//! runtime threads.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use keygate_core::AuthConfig;
use thiserror::Error;
use tracing::warn;

/// Longest accepted password, in bytes
pub const MAX_PASSWORD_BYTES: usize = 128;

/// Password hashing errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Password must not be empty")]
    Empty,

    #[error("Password exceeds {MAX_PASSWORD_BYTES} bytes")]
    TooLong,
}

/// Argon2 cost parameters
///
/// Raising memory or iterations makes offline guessing more expensive and
/// every login slower by the same factor.
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Memory cost in KiB (default: 65536 = 64 MB)
    pub memory_cost: u32,
    /// Iterations (default: 3)
    pub time_cost: u32,
    /// Lanes (default: 4)
    pub parallelism: u32,
    /// Output length in bytes (default: 32)
    pub output_len: Option<usize>,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 65536,
            time_cost: 3,
            parallelism: 4,
            output_len: Some(32),
        }
    }
}

impl From<&AuthConfig> for PasswordConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            memory_cost: config.password_memory_kib,
            time_cost: config.password_time_cost,
            parallelism: config.password_parallelism,
            ..Default::default()
        }
    }
}

impl PasswordConfig {
    fn to_params(&self) -> Result<Params, PasswordError> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            self.output_len,
        )
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }
}

/// Hash a password with the default cost profile
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    hash_password_with_config(password, &PasswordConfig::default())
}

/// Hash a password with explicit cost parameters
///
/// Each call draws a fresh random salt, so hashing the same password twice
/// yields different strings.
pub fn hash_password_with_config(
    password: &str,
    config: &PasswordConfig,
) -> Result<String, PasswordError> {
    if password.is_empty() {
        return Err(PasswordError::Empty);
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(PasswordError::TooLong);
    }

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        config.to_params()?,
    );

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))
}

/// Run [`hash_password_with_config`] on the blocking thread pool
pub async fn hash_password_blocking(
    password: String,
    config: PasswordConfig,
) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash_password_with_config(&password, &config))
        .await
        .map_err(|e| PasswordError::HashingFailed(format!("hashing task failed: {e}")))?
}

/// Check a password against a stored PHC hash
///
/// Never errors: a malformed or foreign hash simply fails to match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    if password.is_empty() || password.len() > MAX_PASSWORD_BYTES {
        return false;
    }

    let parsed = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Stored password hash is not a valid PHC string");
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Async counterpart of [`verify_password`]
pub async fn verify_password_blocking(password: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .unwrap_or(false)
}

/// Password policy for new accounts
///
/// - 8 to 32 characters
/// - at least one uppercase and one lowercase letter
/// - at least one digit or special character
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    let length = password.chars().count();
    if length < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }
    if length > 32 {
        return Err("Password must be at most 32 characters long".to_string());
    }

    let has_uppercase = password.chars().any(|c| c.is_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_digit_or_special = password
        .chars()
        .any(|c| c.is_ascii_digit() || !c.is_alphanumeric());

    if !has_uppercase || !has_lowercase {
        return Err("Password must contain both uppercase and lowercase letters".to_string());
    }
    if !has_digit_or_special {
        return Err("Password must contain a digit or a special character".to_string());
    }

    Ok(())
}
