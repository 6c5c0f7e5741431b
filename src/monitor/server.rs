//! Dashboard HTTP server
//!
//! ## Endpoints
//!
//! - `WS /ws` - heartbeat stream, one full-table frame per broadcast tick
//! - `GET /api/servers` - the same table, once
//! - `GET /*` - static dashboard files, when a directory is configured

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::get,
};
use futures::{SinkExt, stream::StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info};

use crate::{config::DashboardConfig, protocol::Heartbeat};

use super::{broadcast::HeartbeatSender, record::ServerTable};

/// State shared by the dashboard handlers
#[derive(Clone)]
pub struct DashboardState {
    pub table: Arc<ServerTable>,
    pub heartbeat_tx: HeartbeatSender,
}

pub fn router(state: DashboardState, config: &DashboardConfig) -> Router {
    let app = Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/servers", get(list_servers))
        .with_state(state);
    let app = with_static_files(app, config);

    // dashboards may be served from elsewhere and only open the socket here
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    app.layer(cors).layer(TraceLayer::new_for_http())
}

#[cfg(feature = "web-dashboard")]
fn with_static_files(app: Router, config: &DashboardConfig) -> Router {
    use tower_http::services::ServeDir;

    match &config.static_dir {
        Some(static_dir) if static_dir.exists() => {
            info!("serving dashboard from {}", static_dir.display());
            app.fallback_service(ServeDir::new(static_dir))
        }
        Some(static_dir) => {
            info!("dashboard directory {} not found", static_dir.display());
            app
        }
        None => app,
    }
}

#[cfg(not(feature = "web-dashboard"))]
fn with_static_files(app: Router, _config: &DashboardConfig) -> Router {
    app
}

/// GET /api/servers
pub async fn list_servers(State(state): State<DashboardState>) -> Json<Heartbeat> {
    Json(Heartbeat {
        servers: state.table.snapshot().await,
    })
}

/// WS /ws
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<DashboardState>,
) -> Response {
    // join the broadcast before the handshake finishes, so the next tick is
    // the client's first frame
    let heartbeats = state.heartbeat_tx.subscribe();
    ws.on_upgrade(move |socket| stream_heartbeats(socket, heartbeats))
}

async fn stream_heartbeats(socket: WebSocket, mut heartbeats: broadcast::Receiver<Arc<str>>) {
    info!("monitoring dashboard connected");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        loop {
            match heartbeats.recv().await {
                Ok(frame) => {
                    if sender.send(Message::Text(frame.to_string())).await.is_err() {
                        debug!("send failed, dashboard disconnected");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("dashboard fell behind, skipped {skipped} heartbeats");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    info!("monitoring dashboard disconnected");
}

/// Bind the dashboard server and serve it in a background task.
///
/// Returns the bound address. Failing to bind is the one startup error the
/// monitor cannot recover from.
pub async fn spawn_dashboard_server(
    config: &DashboardConfig,
    state: DashboardState,
) -> anyhow::Result<SocketAddr> {
    let bind_addr = SocketAddr::new(config.bind, config.port);
    let app = router(state, config);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("monitor dashboard listening on {addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("dashboard server error: {}", e);
        }
    });

    Ok(addr)
}
