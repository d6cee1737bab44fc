//! Keygate Configuration Management
//!
//! Handles configuration from environment variables and TOML config files,
//! with development defaults so the server starts without any setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Signing secret used when `JWT_SECRET` is not set
pub const DEV_ACCESS_SECRET: &str = "development-access-secret-change-in-production";

/// Signing secret used when `JWT_REFRESH_SECRET` is not set
pub const DEV_REFRESH_SECRET: &str = "development-refresh-secret-change-in-production";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Credential store connection
    pub database: DatabaseConfig,

    /// Token and password hashing settings
    pub auth: AuthConfig,

    /// Request throttling
    pub rate_limit: RateLimitConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_override()
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse("API_PORT")? {
            self.server.port = port;
        }
        if let Ok(prefix) = std::env::var("API_PREFIX") {
            self.server.api_prefix = prefix;
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // PostgreSQL
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.postgres_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Some(size) = env_parse("DATABASE_POOL_SIZE")? {
            self.database.pool_size = size;
        }

        // Tokens
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.auth.access_secret = secret;
        }
        if let Ok(secret) = std::env::var("JWT_REFRESH_SECRET") {
            self.auth.refresh_secret = secret;
        }
        if let Some(secs) = env_parse("JWT_EXPIRATION_SECS")? {
            self.auth.access_ttl_secs = secs;
        }
        if let Some(secs) = env_parse("JWT_REFRESH_EXPIRATION_SECS")? {
            self.auth.refresh_ttl_secs = secs;
        }
        if let Ok(issuer) = std::env::var("JWT_ISSUER") {
            self.auth.issuer = issuer;
        }
        if let Some(secs) = env_parse("JWT_LEEWAY_SECS")? {
            self.auth.leeway_secs = secs;
        }

        // Password hashing
        if let Some(cost) = env_parse("PASSWORD_COST")? {
            self.auth.password_time_cost = cost;
        }
        if let Some(kib) = env_parse("PASSWORD_MEMORY_KIB")? {
            self.auth.password_memory_kib = kib;
        }

        // Throttling
        if let Some(window) = env_parse("THROTTLE_TTL")? {
            self.rate_limit.window_secs = window;
        }
        if let Some(limit) = env_parse("THROTTLE_LIMIT")? {
            self.rate_limit.limit = limit;
        }
        if let Some(trust) = env_parse("TRUST_PROXY_HEADERS")? {
            self.rate_limit.trust_proxy_headers = trust;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = env_parse("LOG_JSON")? {
            self.logging.json_format = json;
        }

        Ok(self)
    }

    /// Reject settings that would make the service insecure or unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.access_secret.is_empty() {
            return Err(ConfigError::MissingRequired("JWT_SECRET".to_string()));
        }
        if self.auth.refresh_secret.is_empty() {
            return Err(ConfigError::MissingRequired("JWT_REFRESH_SECRET".to_string()));
        }
        if self.auth.access_secret == self.auth.refresh_secret {
            return Err(ConfigError::InvalidValue {
                key: "JWT_REFRESH_SECRET".to_string(),
                value: "must differ from JWT_SECRET".to_string(),
            });
        }
        if self.auth.access_ttl_secs == 0 || self.auth.refresh_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "JWT_EXPIRATION_SECS".to_string(),
                value: "0".to_string(),
            });
        }
        if self.rate_limit.limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "THROTTLE_LIMIT".to_string(),
                value: "0".to_string(),
            });
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "THROTTLE_TTL".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Prefix for every API route, e.g. `/api/v1`
    pub api_prefix: String,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            api_prefix: "/api/v1".to_string(),
            // Empty by default for security - set via CORS_ORIGINS env var
            cors_origins: vec![],
        }
    }
}

/// Credential store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; the in-memory store is used when unset
    pub postgres_url: Option<String>,

    /// PostgreSQL connection pool size
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: None,
            pool_size: 10,
        }
    }
}

/// Token signing and password hashing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for access tokens
    pub access_secret: String,

    /// HMAC secret for refresh tokens (must differ from the access secret)
    pub refresh_secret: String,

    /// Access token lifetime (default: 900 = 15 minutes)
    pub access_ttl_secs: u64,

    /// Refresh token lifetime (default: 604800 = 7 days)
    pub refresh_ttl_secs: u64,

    /// `iss` claim written and required on every token
    pub issuer: String,

    /// Clock skew tolerated when checking `exp`
    pub leeway_secs: u64,

    /// Argon2 iterations
    pub password_time_cost: u32,

    /// Argon2 memory in KiB
    pub password_memory_kib: u32,

    /// Argon2 lanes
    pub password_parallelism: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_secret: DEV_ACCESS_SECRET.to_string(),
            refresh_secret: DEV_REFRESH_SECRET.to_string(),
            access_ttl_secs: 15 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
            issuer: "keygate".to_string(),
            leeway_secs: 5,
            password_time_cost: 3,
            password_memory_kib: 65536, // 64 MB
            password_parallelism: 4,
        }
    }
}

impl AuthConfig {
    /// True when either signing secret is still the built-in development value
    pub fn uses_development_secrets(&self) -> bool {
        self.access_secret == DEV_ACCESS_SECRET || self.refresh_secret == DEV_REFRESH_SECRET
    }
}

/// Fixed-window rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Turn throttling off entirely
    pub enabled: bool,

    /// Requests allowed per client per window
    pub limit: u32,

    /// Window length in seconds
    pub window_secs: u64,

    /// Key clients by `X-Forwarded-For` / `X-Real-IP` instead of the peer
    /// address. Only safe behind a proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 100,
            window_secs: 60,
            trust_proxy_headers: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
