use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use relay_hub::Registry;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::{routes, ws};

/// Shared application state passed to axum handlers.
///
/// The registry is an explicit instance owned by the server handle — created
/// at start, torn down at stop — never a process global.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub shutdown: CancellationToken,
    pub send_timeout: Duration,
    pub inbound_buffer: usize,
}

/// Build the axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/ws/{id}", get(ws::connect))
        .route("/api/v1/send", post(routes::send))
        .route("/api/v1/health-check", get(routes::health_check))
        .fallback(routes::fallback)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind and start serving. Returns a handle that owns the registry and the
/// shutdown token.
pub async fn start(config: ServerConfig) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(Registry::new());
    let shutdown = CancellationToken::new();

    let state = AppState {
        registry: Arc::clone(&registry),
        shutdown: shutdown.clone(),
        send_timeout: config.send_timeout,
        inbound_buffer: config.inbound_buffer,
    };
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "relay server started");

    let serve_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
            .await
            .ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        registry,
        shutdown,
        _server: server,
    })
}

/// Handle returned by [`start`] — keeps the serve task alive and owns the
/// service lifecycle.
pub struct ServerHandle {
    pub port: u16,
    pub registry: Arc<Registry>,
    shutdown: CancellationToken,
    _server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and forcibly close every session.
    pub fn stop(&self) {
        self.shutdown.cancel();
        let closed = self.registry.close_all();
        tracing::info!(sessions = closed, "relay server stopped");
    }
}
