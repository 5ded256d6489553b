//! HTTP Server
//!
//! Router construction and server lifecycle.

use crate::handler;
use axum::routing::{get, post};
use axum::Router;
use fanout_core::{Broker, ShutdownToken};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const DEFAULT_HTTP_PORT: u16 = 8080;

/// HTTP Server Configuration
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub addr: SocketAddr,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_HTTP_PORT)),
        }
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<Broker>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/queues", get(handler::list_queues))
        .route("/queues/:name", get(handler::queue_stats))
        .route("/queues/:name/messages", post(handler::publish))
        .route("/queues/:name/subscriptions", post(handler::subscribe))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Running server
pub struct ServerHandle {
    /// Address actually bound (resolves port 0)
    pub local_addr: SocketAddr,
    pub join: JoinHandle<()>,
}

/// HTTP Server
pub struct HttpServer {
    config: HttpServerConfig,
    broker: Arc<Broker>,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, broker: Arc<Broker>) -> Self {
        Self { config, broker }
    }

    /// Bind the listener and serve until `shutdown` fires
    ///
    /// Graceful shutdown waits for open responses to finish, so close the
    /// broker first to end subscription streams.
    pub async fn start(self, mut shutdown: ShutdownToken) -> Result<ServerHandle, String> {
        let listener = TcpListener::bind(self.config.addr)
            .await
            .map_err(|e| format!("Failed to bind {}: {}", self.config.addr, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| format!("Failed to read local address: {}", e))?;

        let app = build_router(AppState {
            broker: self.broker,
        });

        info!(addr = %local_addr, "HTTP server listening");

        let join = tokio::spawn(async move {
            let result = axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async move { shutdown.wait().await })
                .await;
            match result {
                Ok(()) => info!("HTTP server stopped"),
                Err(e) => error!(error = %e, "HTTP server failed"),
            }
        });

        Ok(ServerHandle { local_addr, join })
    }
}
