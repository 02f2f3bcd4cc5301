//! # HTTP Server
//!
//! Combines the partition and observability routers into one axum app.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::config::{HttpConfigError, HttpServerConfig};
use super::observability_routes::{health_routes, observability_routes};
use super::partition_routes::partition_routes;
use crate::control::ControlService;
use crate::observability::Event;

/// HTTP server for the control API
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with default configuration
    pub fn new(service: Arc<ControlService>) -> Self {
        Self::with_config(HttpServerConfig::default(), service)
    }

    /// Create a new HTTP server with custom configuration
    pub fn with_config(config: HttpServerConfig, service: Arc<ControlService>) -> Self {
        let router = Self::build_router(&config, service);
        Self { config, router }
    }

    /// Build the combined router with all endpoints
    fn build_router(config: &HttpServerConfig, service: Arc<ControlService>) -> Router {
        Router::new()
            // Health check at root level
            .merge(health_routes(Arc::clone(&service)))
            // Partition actions and views under /api
            .nest("/api", partition_routes(Arc::clone(&service)))
            // Observability routes under /observability
            .nest("/observability", observability_routes(service))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(config.cors_layer()),
            )
    }

    /// Address `start` will bind
    pub fn bind_addr(&self) -> Result<SocketAddr, HttpConfigError> {
        self.config.bind_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serve until `shutdown` is cancelled
    pub async fn start(self, shutdown: CancellationToken) -> Result<(), io::Error> {
        let addr = self
            .config
            .bind_addr()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(
            event = %Event::Serving,
            address = %listener.local_addr()?,
            "control API listening"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlSettings;
    use crate::observability::MetricsRegistry;
    use crate::partition::MemoryFilter;
    use crate::probe::ScriptedProbe;
    use crate::resolver::StaticResolver;
    use std::net::Ipv4Addr;

    fn service() -> Arc<ControlService> {
        Arc::new(ControlService::new(
            ControlSettings::new("upstream", "http://upstream/status"),
            Arc::new(StaticResolver::new(
                Ipv4Addr::new(172, 18, 0, 40),
                "172.18.0.0/16".parse().unwrap(),
            )),
            Arc::new(MemoryFilter::new()),
            Arc::new(ScriptedProbe::new([])),
            Arc::new(MetricsRegistry::new()),
        ))
    }

    #[test]
    fn test_server_creation() {
        let server = HttpServer::new(service());
        assert_eq!(server.bind_addr().unwrap(), "0.0.0.0:8090".parse().unwrap());
    }

    #[test]
    fn test_server_with_custom_port() {
        let config = HttpServerConfig::with_port(8080);
        let server = HttpServer::with_config(config, service());
        assert_eq!(server.bind_addr().unwrap(), "0.0.0.0:8080".parse().unwrap());
    }

    #[tokio::test]
    async fn test_invalid_host_is_rejected() {
        let config = HttpServerConfig {
            host: "not a host".to_string(),
            ..HttpServerConfig::default()
        };
        let server = HttpServer::with_config(config, service());
        let err = server.start(CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
