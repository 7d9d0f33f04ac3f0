//! # HTTP Server
//!
//! Combines the route groups into one axum router over a shared gateway.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::admin_routes::admin_routes;
use super::campus_routes::campus_routes;
use super::config::HttpServerConfig;
use super::library_routes::library_routes;
use super::student_routes::student_routes;
use crate::gateway::Gateway;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    pub fn with_config(config: HttpServerConfig, gateway: Arc<Gateway>) -> Self {
        let router = Self::build_router(&config, gateway);
        Self { config, router }
    }

    fn build_router(config: &HttpServerConfig, gateway: Arc<Gateway>) -> Router {
        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|origin| match origin.parse() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!(origin = %origin, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .route("/health", get(health_handler))
            .merge(student_routes(gateway.clone()))
            .merge(library_routes(gateway.clone()))
            .merge(campus_routes(gateway.clone()))
            .nest("/admin", admin_routes(gateway))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    pub async fn start(self) -> std::io::Result<()> {
        let addr: SocketAddr = self.config.socket_addr().parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid listen address {}: {}", self.config.socket_addr(), e),
            )
        })?;

        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "unigate listening");
        axum::serve(listener, self.router).await
    }
}

async fn health_handler() -> impl IntoResponse {
    let response = HealthResponse {
        status: "success",
        version: env!("CARGO_PKG_VERSION"),
    };

    (StatusCode::OK, Json(response))
}
