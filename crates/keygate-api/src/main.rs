//! Keygate API Server
//!
//! Author: hephaex@gmail.com

use keygate_api::{create_router, state::AppState};
use keygate_core::config::{AppConfig, LoggingConfig};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (file first, environment on top)
    let config = match std::env::var("KEYGATE_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };

    init_tracing(&config.logging);

    config.validate()?;
    if config.auth.uses_development_secrets() {
        tracing::warn!("JWT_SECRET/JWT_REFRESH_SECRET not set; using development signing secrets");
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Create application state
    let state = Arc::new(AppState::from_config(config).await?);
    let _cleanup = state.rate_limiter.spawn_cleanup();

    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Keygate API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "keygate_api={level},keygate_core={level},audit=info,tower_http={level}",
            level = logging.level
        )
        .into()
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}
