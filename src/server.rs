//! HTTP server bootstrap
//!
//! Thin wrapper around `axum::serve` that binds the listener and installs
//! ctrl-c graceful shutdown.

use axum::Router;

use crate::Result;

/// Configuration for the HTTP listener
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8402")
    pub bind_addr: String,
}

impl ServerConfig {
    /// Create a new server config
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
        }
    }
}

/// Bind and serve the application until shutdown
pub async fn serve(router: Router, config: ServerConfig) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| {
            crate::GatewayError::config(format!("Failed to bind to {}: {}", config.bind_addr, e))
        })?;

    tracing::info!("🚀 gateway listening on http://{}", config.bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| crate::GatewayError::internal(format!("Server error: {}", e)))?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown signal received");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_new() {
        let config = ServerConfig::new("127.0.0.1:3000");
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
    }
}
