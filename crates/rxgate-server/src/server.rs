//! Transport layer: accepts WebSocket connections and drives one receive
//! loop per session. Messages within a session are dispatched strictly in
//! arrival order; sessions run concurrently and independently.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, trace};

use rxgate_core::provider::PredictionProvider;
use rxgate_store::Database;

use crate::handlers::HandlerState;
use crate::registry::{self, SessionRegistry};
use crate::router;

/// Server configuration.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            max_send_queue: 256,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
    pub registry: Arc<SessionRegistry>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Bind and start serving. Returns a handle that stops the accept loop on
/// `shutdown()`; in-flight sessions drain on their own tasks.
pub async fn start(
    config: ServerConfig,
    db: Database,
    provider: Arc<dyn PredictionProvider>,
) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(SessionRegistry::new(config.max_send_queue));
    let sweep = registry::start_sweep_task(Arc::clone(&registry), Duration::from_secs(60));

    let handler_state = Arc::new(HandlerState::new(db, provider));
    let app_state = AppState {
        handler_state,
        registry: Arc::clone(&registry),
    };

    let router = build_router(app_state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    info!(addr = %local_addr, "server listening");

    let accept = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .ok();
    });

    Ok(ServerHandle {
        local_addr,
        registry,
        accept,
        sweep,
    })
}

/// Handle returned by `start()` — keeps background tasks alive.
pub struct ServerHandle {
    local_addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    accept: tokio::task::JoinHandle<()>,
    sweep: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn session_count(&self) -> usize {
        self.registry.count()
    }

    /// Stop accepting new connections. Existing sessions keep their tasks
    /// and drain normally; no response is truncated.
    pub fn shutdown(&self) {
        self.accept.abort();
        self.sweep.abort();
        info!("server shut down");
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

/// Drive one connection: register, pump messages, deregister.
async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: AppState) {
    let (session_id, mut outbound) = state.registry.register(Some(addr.to_string()));
    info!(session_id = %session_id, remote = %addr, "session connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: forward queued responses and send periodic pings.
    let writer_id = session_id.clone();
    let writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(registry::HEARTBEAT_INTERVAL);
        ping.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                msg = outbound.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    trace!(session_id = %writer_id, "sent ping");
                }
            }
        }
    });

    // Reader loop: one message at a time, strictly in arrival order. Each
    // dispatch completes (and its response is queued) before the next read.
    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            WsMessage::Text(text) => {
                let response = router::dispatch(&state.handler_state, text.as_str()).await;
                if response.is_error() {
                    debug!(session_id = %session_id, "request answered with error document");
                }
                if !state.registry.send_to(&session_id, response.to_json())
                    && !state.registry.contains(&session_id)
                {
                    // Swept while processing; nothing left to write to
                    break;
                }
            }
            WsMessage::Pong(_) => state.registry.record_pong(&session_id),
            WsMessage::Close(_) => break,
            WsMessage::Ping(_) => {} // axum replies automatically
            _ => {}
        }
    }

    // Both the graceful close and the error path land here; deregistration
    // is idempotent. Dropping the session closes the outbound queue, which
    // lets the writer drain any queued responses before exiting.
    state.registry.deregister(&session_id);
    let _ = writer.await;
    info!(session_id = %session_id, "session disconnected");
}

/// Health check HTTP endpoint: summary counts plus live session count.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    match rxgate_store::stats::summary(&state.handler_state.db) {
        Ok(summary) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "healthy",
                "sessions": state.registry.count(),
                "totals": summary,
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unhealthy",
                "message": e.to_string(),
            })),
        ),
    }
}
