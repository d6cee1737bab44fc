//! Application state management
//!
//! Author: hephaex@gmail.com

use crate::auth::service::AuthService;
use crate::middleware::rate_limit::RateLimiter;
use keygate_core::config::AppConfig;
use keygate_core::{CredentialStore, MemoryCredentialStore, PgCredentialStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Session manager and account service
    pub auth: AuthService,
    /// Per-client request throttle
    pub rate_limiter: RateLimiter,
    /// Server start time
    pub start_time: Instant,
    /// Ready status
    pub is_ready: AtomicBool,
}

impl AppState {
    /// Build state around an existing credential store
    pub fn new(config: AppConfig, store: Arc<dyn CredentialStore>) -> Self {
        let auth = AuthService::from_config(store, &config);
        Self::with_auth(config, auth)
    }

    /// Build state around a preconfigured auth service
    pub fn with_auth(config: AppConfig, auth: AuthService) -> Self {
        let rate_limiter = RateLimiter::from_config(&config.rate_limit);
        Self {
            config,
            auth,
            rate_limiter,
            start_time: Instant::now(),
            is_ready: AtomicBool::new(true),
        }
    }

    /// Connect the configured credential store and build state
    ///
    /// Uses PostgreSQL when `database.postgres_url` is set (running the schema
    /// migration), otherwise an in-memory store that loses data on restart.
    pub async fn from_config(config: AppConfig) -> keygate_core::Result<Self> {
        let store: Arc<dyn CredentialStore> = match &config.database.postgres_url {
            Some(url) => {
                let store = PgCredentialStore::connect(url, config.database.pool_size).await?;
                store.migrate().await?;
                tracing::info!("Using PostgreSQL credential store");
                Arc::new(store)
            }
            None => {
                tracing::warn!("DATABASE_URL not set; accounts are kept in memory only");
                Arc::new(MemoryCredentialStore::new())
            }
        };

        Ok(Self::new(config, store))
    }

    /// In-memory state with cheap password hashing, for tests
    #[cfg(any(test, feature = "test-utils"))]
    pub fn for_testing(config: AppConfig) -> Self {
        let auth = AuthService::new(
            Arc::new(MemoryCredentialStore::new()),
            crate::auth::jwt::JwtConfig::from(&config.auth),
            crate::auth::password::PasswordConfig {
                memory_cost: 1024,
                time_cost: 1,
                parallelism: 1,
                output_len: Some(32),
            },
        );
        Self::with_auth(config, auth)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Set ready status
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }
}
