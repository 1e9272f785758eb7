//! Axum server runner with CORS, request tracing and graceful shutdown.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use http::{header, Method};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;

/// CORS configuration for the HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins. `["*"]` allows all origins.
    pub allowed_origins: Vec<String>,
    /// Max age for CORS preflight cache in seconds.
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            max_age_secs: 3600,
        }
    }
}

impl CorsConfig {
    /// Parse comma-separated origins string.
    pub fn from_comma_separated(origins: &str) -> Self {
        let allowed_origins: Vec<String> = origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            allowed_origins: if allowed_origins.is_empty() {
                vec!["*".to_string()]
            } else {
                allowed_origins
            },
            ..Default::default()
        }
    }
}

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_config: Option<CorsConfig>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_config: None,
        }
    }
}

/// Build a CORS layer from configuration.
pub fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    let allow_origin = if config.allowed_origins.len() == 1 && config.allowed_origins[0] == "*" {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            config
                .allowed_origins
                .iter()
                .filter_map(|origin| origin.parse().ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(config.max_age_secs))
}

/// Serve `router` until the cancellation token fires.
pub async fn run_http_server(
    config: HttpServerConfig,
    router: Router,
    cancellation_token: CancellationToken,
) -> Result<(), anyhow::Error> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    let mut router = router.layer(TraceLayer::new_for_http());
    if let Some(cors_config) = &config.cors_config {
        router = router.layer(build_cors_layer(cors_config));
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    debug!(address = %addr, cors = config.cors_config.is_some(), "Starting HTTP server");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            cancellation_token.cancelled().await;
            debug!("HTTP server shutdown signal received");
        })
        .await
        .map_err(|e| {
            tracing::error!("HTTP server error: {}", e);
            anyhow::Error::from(e)
        })?;

    debug!("HTTP server stopped gracefully");
    Ok(())
}
