//! JWT issuance and verification
//!
//! Access and refresh tokens are both HS256 JWTs but are signed with different
//! secrets, so one can never be accepted in place of the other.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use keygate_core::{Account, AuthConfig, Role, DEV_ACCESS_SECRET, DEV_REFRESH_SECRET};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Claims carried by every token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - account ID
    pub sub: String,
    /// Unique token ID; keeps two tokens minted in the same second distinct
    pub jti: String,
    /// Issued at (Unix epoch seconds)
    pub iat: u64,
    /// Expiration (Unix epoch seconds)
    pub exp: u64,
    pub email: String,
    pub roles: Vec<Role>,
}

impl Claims {
    /// Parse `sub` as an account ID
    pub fn account_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Malformed)
    }
}

/// Token issuance and verification errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Failed to encode token: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),

    #[error("Malformed token")]
    Malformed,

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token signature")]
    BadSignature,

    #[error("System time error: {0}")]
    SystemTime(#[from] std::time::SystemTimeError),
}

/// Which of the two token families to sign or check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Signing configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    /// Access token lifetime in seconds (default: 900)
    pub access_expiration_secs: u64,
    /// Refresh token lifetime in seconds (default: 604800)
    pub refresh_expiration_secs: u64,
    pub issuer: String,
    /// Clock skew tolerated on `exp`
    pub leeway_secs: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            access_secret: DEV_ACCESS_SECRET.to_string(),
            refresh_secret: DEV_REFRESH_SECRET.to_string(),
            access_expiration_secs: 15 * 60,
            refresh_expiration_secs: 7 * 24 * 60 * 60,
            issuer: "keygate".to_string(),
            leeway_secs: 5,
        }
    }
}

impl From<&AuthConfig> for JwtConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            access_secret: config.access_secret.clone(),
            refresh_secret: config.refresh_secret.clone(),
            access_expiration_secs: config.access_ttl_secs,
            refresh_expiration_secs: config.refresh_ttl_secs,
            issuer: config.issuer.clone(),
            leeway_secs: config.leeway_secs,
        }
    }
}

impl JwtConfig {
    fn secret(&self, kind: TokenKind) -> &str {
        match kind {
            TokenKind::Access => &self.access_secret,
            TokenKind::Refresh => &self.refresh_secret,
        }
    }

    fn ttl(&self, kind: TokenKind) -> u64 {
        match kind {
            TokenKind::Access => self.access_expiration_secs,
            TokenKind::Refresh => self.refresh_expiration_secs,
        }
    }
}

/// A freshly minted access/refresh pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Sign a token of the given kind for an account
pub fn issue_token(
    config: &JwtConfig,
    kind: TokenKind,
    user_id: Uuid,
    email: &str,
    roles: &[Role],
) -> Result<String, TokenError> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

    let claims = Claims {
        iss: config.issuer.clone(),
        sub: user_id.to_string(),
        jti: Uuid::new_v4().to_string(),
        iat: now,
        exp: now + config.ttl(kind),
        email: email.to_string(),
        roles: roles.to_vec(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.secret(kind).as_bytes()),
    )?;

    Ok(token)
}

/// Check signature, issuer, and expiry; return the claims
pub fn verify_token(config: &JwtConfig, kind: TokenKind, token: &str) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    validation.set_required_spec_claims(&["exp", "iss", "sub"]);
    validation.leeway = config.leeway_secs;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret(kind).as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::BadSignature,
        _ => TokenError::Malformed,
    })?;

    Ok(token_data.claims)
}

pub fn generate_access_token(
    config: &JwtConfig,
    user_id: Uuid,
    email: &str,
    roles: &[Role],
) -> Result<String, TokenError> {
    issue_token(config, TokenKind::Access, user_id, email, roles)
}

pub fn validate_access_token(config: &JwtConfig, token: &str) -> Result<Claims, TokenError> {
    verify_token(config, TokenKind::Access, token)
}

pub fn validate_refresh_token(config: &JwtConfig, token: &str) -> Result<Claims, TokenError> {
    verify_token(config, TokenKind::Refresh, token)
}

/// Issue both tokens for an account
pub fn generate_token_pair(config: &JwtConfig, account: &Account) -> Result<TokenPair, TokenError> {
    Ok(TokenPair {
        access_token: issue_token(
            config,
            TokenKind::Access,
            account.id,
            &account.email,
            &account.roles,
        )?,
        refresh_token: issue_token(
            config,
            TokenKind::Refresh,
            account.id,
            &account.email,
            &account.roles,
        )?,
    })
}
