//! HTTP surface of the agent
//!
//! - `GET /ws` - websocket streaming `monitoring-stats` frames
//! - anything else - counted as an inbound request and answered with `OK`

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Request, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use futures::{SinkExt, stream::StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::{
    MetricSnapshot,
    protocol::{Envelope, MONITORING_STATS},
};

use super::counter::RequestCounter;

/// State shared by the agent's handlers
#[derive(Clone)]
pub struct AgentState {
    pub requests: Arc<RequestCounter>,
    pub snapshot_tx: broadcast::Sender<MetricSnapshot>,
}

pub fn router(state: AgentState) -> Router {
    Router::new()
        .route("/", get(acknowledge))
        .fallback(acknowledge)
        .layer(middleware::from_fn_with_state(
            state.requests.clone(),
            count_requests,
        ))
        .route("/ws", get(websocket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn acknowledge() -> &'static str {
    "OK"
}

/// Counts every request passing through, whatever it returns.
pub async fn count_requests(
    State(requests): State<Arc<RequestCounter>>,
    request: Request,
    next: Next,
) -> Response {
    requests.increment();
    next.run(request).await
}

/// GET /ws
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AgentState>) -> Response {
    // subscribe before the upgrade completes, so the first tick after the
    // handshake already reaches this monitor
    let snapshots = state.snapshot_tx.subscribe();
    ws.on_upgrade(move |socket| stream_snapshots(socket, snapshots))
}

async fn stream_snapshots(socket: WebSocket, mut snapshots: broadcast::Receiver<MetricSnapshot>) {
    info!("monitor connected");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        loop {
            match snapshots.recv().await {
                Ok(snapshot) => {
                    let text = match Envelope::new(MONITORING_STATS, snapshot).to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("failed to encode snapshot: {e}");
                            continue;
                        }
                    };

                    if sender.send(Message::Text(text)).await.is_err() {
                        debug!("send failed, monitor disconnected");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("monitor fell behind, dropped {skipped} snapshots");
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

    info!("monitor disconnected");
}

/// Bind the agent's HTTP server and serve it in a background task.
///
/// Returns the bound address.
pub async fn spawn_agent_server(bind_addr: SocketAddr, state: AgentState) -> anyhow::Result<SocketAddr> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("agent listening on {addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("agent server error: {}", e);
        }
    });

    Ok(addr)
}
