//! HTTP surface for approvals and dashboard observation.
//!
//! The server exposes the approval API (`POST /gates/{id}/respond`),
//! workflow status reads, and the event stream, available both as a
//! drainable buffer for polling dashboards and as a WebSocket push feed.
//!
//! Events are stored in a bounded ring buffer; when the buffer is full the
//! oldest event is dropped to make room. Delivery is best-effort
//! throughout: a slow WebSocket subscriber misses events rather than
//! applying backpressure to the pipeline.

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{RwLock, oneshot};
use tower_http::cors::CorsLayer;

use crate::errors::WorkflowError;
use crate::orchestrator::{EventEnvelope, Orchestrator};

/// Maximum number of events retained for polling clients.
const DEFAULT_MAX_EVENTS: usize = 10_000;

/// Body of a gate response.
#[derive(Debug, Deserialize)]
pub struct GateResponse {
    pub approved: bool,
    #[serde(default)]
    pub feedback: Option<String>,
}

pub(crate) struct AppState {
    orchestrator: Arc<Orchestrator>,
    events: RwLock<VecDeque<EventEnvelope>>,
    max_events: usize,
}

impl AppState {
    async fn push_event(&self, envelope: EventEnvelope) {
        let mut events = self.events.write().await;
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(envelope);
    }
}

/// Approval and dashboard server.
pub struct DashboardServer {
    state: Arc<AppState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    addr: Option<SocketAddr>,
}

impl DashboardServer {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            state: Arc::new(AppState {
                orchestrator,
                events: RwLock::new(VecDeque::new()),
                max_events: DEFAULT_MAX_EVENTS,
            }),
            shutdown_tx: None,
            addr: None,
        }
    }

    /// Start serving on the given address. Port 0 picks a dynamic port.
    /// Returns the base URL clients should use.
    pub async fn start(&mut self, bind: &str) -> Result<String> {
        let listener = TcpListener::bind(bind)
            .await
            .with_context(|| format!("Failed to bind dashboard server on {bind}"))?;
        let addr = listener.local_addr().context("Failed to get server address")?;
        self.addr = Some(addr);

        // Mirror the broadcast channel into the polling buffer.
        let state = self.state.clone();
        let mut rx = state.orchestrator.events().subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => state.push_event(envelope).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let app = build_router(self.state.clone());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                tracing::error!(error = %e, "dashboard server error");
            }
        });

        let url = format!("http://{addr}");
        tracing::info!(%url, "dashboard server listening");
        Ok(url)
    }

    /// Stop the server gracefully.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.addr = None;
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }
}

pub(crate) fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/workflows/{id}", get(get_workflow))
        .route("/gates/{id}/respond", post(respond_gate))
        .route("/events", get(drain_events))
        .route("/events/stream", get(stream_events))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.orchestrator.load_workflow(&id).await {
        Ok(workflow) => Json(workflow).into_response(),
        Err(err) => error_response(err),
    }
}

async fn respond_gate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<GateResponse>,
) -> Response {
    match state
        .orchestrator
        .respond(&id, body.approved, body.feedback)
        .await
    {
        Ok(workflow) => Json(workflow).into_response(),
        Err(err) => error_response(err),
    }
}

async fn drain_events(State(state): State<Arc<AppState>>) -> Json<Vec<EventEnvelope>> {
    let mut events = state.events.write().await;
    Json(events.drain(..).collect())
}

async fn stream_events(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| forward_events(socket, state))
}

async fn forward_events(mut socket: WebSocket, state: Arc<AppState>) {
    let mut rx = state.orchestrator.events().subscribe();
    loop {
        match rx.recv().await {
            Ok(envelope) => {
                let Ok(text) = serde_json::to_string(&envelope) else {
                    continue;
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                tracing::debug!(missed, "websocket subscriber lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn error_response(err: WorkflowError) -> Response {
    let status = match &err {
        WorkflowError::WorkflowNotFound(_)
        | WorkflowError::GateNotFound(_)
        | WorkflowError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::GateAlreadyResolved { .. } => StatusCode::CONFLICT,
        WorkflowError::InvalidState { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}
