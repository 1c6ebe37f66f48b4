use std::sync::Mutex;
use std::time::Duration;

use axum::{
    Json,
    body::Bytes,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::api::{ApiError, ApiJson, SharedState};
use super::auth::bearer_token;
use super::models::Quest;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Ping cadence and the pong deadline for one connection.
#[derive(Debug, Clone, Copy)]
pub struct Keepalive {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            ping_interval: PING_INTERVAL,
            pong_timeout: PONG_TIMEOUT,
        }
    }
}

pub const STATUS_IDLE: &str = "idle";
pub const STATUS_DISCONNECTED: &str = "disconnected";
pub const STATUS_UNREACHABLE: &str = "unreachable";

// ── WebSocket message types ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum WsMessage {
    StatusUpdate { status: String },
    QuestCreated { quest: Quest },
    QuestUpdated { quest: Quest },
    QuestDeleted { quest_id: i64 },
    /// Something changed outside this server (the agent stepped); clients
    /// should refetch the board.
    QuestsChanged {},
}

/// Serialize and broadcast a WsMessage to all connected WebSocket clients.
/// Returns silently even if no clients are connected.
pub fn broadcast_message(tx: &broadcast::Sender<String>, msg: &WsMessage) {
    match serde_json::to_string(msg) {
        Ok(json) => {
            let _ = tx.send(json); // Ignore error if no receivers
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize WsMessage");
        }
    }
}

// ── Status hub ───────────────────────────────────────────────────────

/// Latest agent status plus the fan-out channel for every live update.
pub struct StatusHub {
    tx: broadcast::Sender<String>,
    current: Mutex<String>,
}

impl StatusHub {
    pub fn new(initial: impl Into<String>) -> Self {
        let (tx, _rx) = broadcast::channel::<String>(256);
        Self {
            tx,
            current: Mutex::new(initial.into()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> String {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Record `status`; broadcasts and returns true only when it changed.
    pub fn set_status(&self, status: &str) -> bool {
        {
            let mut current = self
                .current
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if *current == status {
                return false;
            }
            *current = status.to_string();
        }
        tracing::info!(status = %status, "agent status changed");
        self.broadcast(&WsMessage::StatusUpdate {
            status: status.to_string(),
        });
        true
    }

    pub fn broadcast(&self, msg: &WsMessage) {
        broadcast_message(&self.tx, msg);
    }
}

// ── WebSocket handler ────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// Browsers cannot set headers on a WebSocket handshake, so the session
/// token may also arrive as `?token=`. The session is checked before the
/// upgrade itself.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Query(query): Query<WsAuthQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers));
    let Some(token) = token else {
        return ApiError::Unauthorized.into_response();
    };
    match state.store.session_exists(token).await {
        Ok(true) => {}
        Ok(false) => return ApiError::Unauthorized.into_response(),
        Err(e) => return ApiError::from(e).into_response(),
    }

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, state)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, receiver) = socket.split();
    let rx = state.status.subscribe();

    let hello = WsMessage::StatusUpdate {
        status: state.status.current(),
    };
    if let Ok(json) = serde_json::to_string(&hello) {
        if sender.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }

    run_socket_loop(sender, receiver, rx, Keepalive::default()).await;
}

/// Core WebSocket loop with ping/pong keepalive.
///
/// Combines broadcast forwarding, client message receiving, and periodic
/// ping/pong health checking into a single select loop. If no Pong arrives
/// within `keepalive.pong_timeout` of the oldest unanswered Ping, the
/// connection is considered dead and the loop exits.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<String>,
    keepalive: Keepalive,
) {
    let mut ping_interval = tokio::time::interval(keepalive.ping_interval);
    // First tick is immediate.
    ping_interval.tick().await;

    let mut pong_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                pong_deadline.get_or_insert_with(|| Instant::now() + keepalive.pong_timeout);
            }

            _ = wait_until(pong_deadline) => {
                tracing::debug!("websocket pong timeout; closing");
                break;
            }

            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if sender.send(Message::Text(msg.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "websocket client lagged");
                        continue;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => pong_deadline = None,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ── Agent status feed ────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AgentStatusReport {
    pub status: String,
}

/// `POST /api/agent/status`: the agent pushes its status here. Accepts the
/// gateway token or a dashboard session as bearer.
pub async fn agent_status_callback(
    State(state): State<SharedState>,
    headers: HeaderMap,
    ApiJson(report): ApiJson<AgentStatusReport>,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers).ok_or(ApiError::Unauthorized)?;
    let allowed = state.agent.token_matches(&token).await?
        || state.store.session_exists(token).await?;
    if !allowed {
        return Err(ApiError::Unauthorized);
    }

    let status = report.status.trim();
    if status.is_empty() {
        return Err(ApiError::BadRequest("Status is required".into()));
    }
    let changed = state.status.set_status(status);
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({"success": true, "changed": changed})),
    ))
}

/// Poll the agent's `/status` every `interval`; an unreachable agent is
/// reported as such, an unconfigured one as disconnected.
pub fn spawn_status_poller(state: SharedState, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            poll_once(&state).await;
        }
    })
}

pub(crate) async fn poll_once(state: &SharedState) {
    let next = match state.agent.fetch_status().await {
        Ok(Some(status)) => status,
        Ok(None) => STATUS_DISCONNECTED.to_string(),
        Err(e) => {
            tracing::debug!(error = %e, "agent status poll failed");
            STATUS_UNREACHABLE.to_string()
        }
    };
    state.status.set_status(&next);
}

// ── Tests ────────────────────────────────────────────────────────────
