use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequest, Path, Request, State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::agent::AgentClient;
use super::auth;
use super::inventory_api;
use super::models::*;
use super::store::SharedStore;
use super::ws::{self, StatusHub, WsMessage};
use crate::errors::ControlError;
use crate::inventory::Inventory;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub store: SharedStore,
    pub status: StatusHub,
    pub agent: AgentClient,
    pub inventory: Inventory,
}

pub type SharedState = Arc<AppState>;

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized,
    Conflict(String),
    BadGateway(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::QuestNotFound { .. }
            | ControlError::TaskNotFound { .. }
            | ControlError::NuggetNotFound { .. } => ApiError::NotFound(err.to_string()),
            ControlError::NuggetExists { .. } => ApiError::Conflict(err.to_string()),
            ControlError::InvalidNuggetName { .. } => ApiError::BadRequest(err.to_string()),
            ControlError::BadRequest(msg) => ApiError::BadRequest(msg),
            ControlError::Unauthorized => ApiError::Unauthorized,
            ControlError::AgentNotConfigured => ApiError::ServiceUnavailable(err.to_string()),
            ControlError::Agent(msg) => ApiError::BadGateway(msg),
            ControlError::Shell { .. } | ControlError::ShellTimeout { .. } => {
                tracing::error!(error = %err, "inventory command failed");
                ApiError::Internal(err.to_string())
            }
            ControlError::Other(e) => e.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %format!("{:#}", err), "request failed");
        ApiError::Internal(err.to_string())
    }
}

/// `Json` that reports malformed bodies (including unknown enum values)
/// as 400 with the usual `{"error": ...}` shape.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

fn parse_id(raw: &str, kind: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {} ID", kind)))
}

// ── Router ────────────────────────────────────────────────────────────

/// All JSON routes. Everything except login, the agent status callback
/// and `/health` sits behind [`auth::require_auth`].
pub fn api_router(state: SharedState) -> Router<SharedState> {
    let protected = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/session", get(auth::session))
        .route("/api/change-password", post(auth::change_password))
        .route("/api/quests", get(list_quests).post(create_quest))
        .route("/api/quests/summary", get(quest_summary))
        .route("/api/quests/step", post(step_quests))
        .route("/api/quests/step/dry-run", get(dry_run_step))
        .route("/api/quests/logs/latest", get(latest_logs))
        .route(
            "/api/quests/{id}",
            get(get_quest).patch(update_quest).delete(delete_quest),
        )
        .route("/api/quests/{id}/reset", post(reset_quest))
        .route("/api/quests/{id}/run", post(run_quest))
        .route("/api/quests/{id}/tasks", post(create_task))
        .route("/api/tasks/{id}", patch(update_task).delete(delete_task))
        .route("/api/settings", get(get_settings).post(save_settings))
        .merge(inventory_api::inventory_router())
        .route_layer(middleware::from_fn_with_state(state, auth::require_auth));

    Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/agent/status", post(ws::agent_status_callback))
        .route("/health", get(health_check))
        .merge(protected)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_quests(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let quests = state.store.list_quests().await?;
    Ok(Json(quests))
}

async fn quest_summary(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let quests = state.store.list_quests().await?;
    Ok(Json(BoardSummary::from_quests(&quests)))
}

async fn create_quest(
    State(state): State<SharedState>,
    ApiJson(mut req): ApiJson<NewQuest>,
) -> Result<impl IntoResponse, ApiError> {
    req.title = req.title.trim().to_string();
    if req.title.is_empty() {
        return Err(ApiError::BadRequest("Title is required".into()));
    }
    let quest = state.store.create_quest(req).await?;
    tracing::info!(quest_id = quest.id, "quest created");
    let id = quest.id;
    state.status.broadcast(&WsMessage::QuestCreated { quest });
    Ok((StatusCode::CREATED, Json(json!({"success": true, "id": id}))))
}

async fn get_quest(
    State(state): State<SharedState>,
    Path(raw_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&raw_id, "quest")?;
    let quest = state
        .store
        .get_quest(id)
        .await?
        .ok_or(ControlError::QuestNotFound { id })?;
    Ok(Json(quest))
}

async fn update_quest(
    State(state): State<SharedState>,
    Path(raw_id): Path<String>,
    ApiJson(patch): ApiJson<QuestPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&raw_id, "quest")?;
    if patch.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".into()));
    }
    if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::BadRequest("Title is required".into()));
    }
    let quest = state
        .store
        .update_quest(id, patch)
        .await?
        .ok_or(ControlError::QuestNotFound { id })?;
    tracing::info!(quest_id = id, status = quest.status.as_str(), "quest updated");
    state.status.broadcast(&WsMessage::QuestUpdated {
        quest: quest.clone(),
    });
    Ok(Json(quest))
}

async fn delete_quest(
    State(state): State<SharedState>,
    Path(raw_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&raw_id, "quest")?;
    if !state.store.delete_quest(id).await? {
        return Err(ControlError::QuestNotFound { id }.into());
    }
    tracing::info!(quest_id = id, "quest deleted");
    state
        .status
        .broadcast(&WsMessage::QuestDeleted { quest_id: id });
    Ok(StatusCode::NO_CONTENT)
}

async fn reset_quest(
    State(state): State<SharedState>,
    Path(raw_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&raw_id, "quest")?;
    let quest = state
        .store
        .reset_quest(id)
        .await?
        .ok_or(ControlError::QuestNotFound { id })?;
    tracing::info!(quest_id = id, "quest reset");
    state.status.broadcast(&WsMessage::QuestUpdated { quest });
    Ok(Json(json!({"success": true})))
}

async fn create_task(
    State(state): State<SharedState>,
    Path(raw_id): Path<String>,
    ApiJson(mut req): ApiJson<NewTask>,
) -> Result<impl IntoResponse, ApiError> {
    let quest_id = parse_id(&raw_id, "quest")?;
    req.title = req.title.trim().to_string();
    if req.title.is_empty() {
        return Err(ApiError::BadRequest("Title is required".into()));
    }
    let task = state
        .store
        .create_task(quest_id, req)
        .await?
        .ok_or(ControlError::QuestNotFound { id: quest_id })?;
    state.status.broadcast(&WsMessage::QuestsChanged {});
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<SharedState>,
    Path(raw_id): Path<String>,
    ApiJson(patch): ApiJson<TaskPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&raw_id, "task")?;
    if patch.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".into()));
    }
    if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::BadRequest("Title is required".into()));
    }
    let task = state
        .store
        .update_task(id, patch)
        .await?
        .ok_or(ControlError::TaskNotFound { id })?;
    state.status.broadcast(&WsMessage::QuestsChanged {});
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<SharedState>,
    Path(raw_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&raw_id, "task")?;
    if !state.store.delete_task(id).await? {
        return Err(ControlError::TaskNotFound { id }.into());
    }
    state.status.broadcast(&WsMessage::QuestsChanged {});
    Ok(StatusCode::NO_CONTENT)
}

// ── Settings ──────────────────────────────────────────────────────────

async fn get_settings(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.list_settings().await?))
}

/// Strings are stored as-is; any other JSON value as its JSON text.
fn setting_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

async fn save_settings(
    State(state): State<SharedState>,
    ApiJson(body): ApiJson<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let Value::Object(map) = body else {
        return Err(ApiError::BadRequest("Settings must be a JSON object".into()));
    };
    let entries: BTreeMap<String, String> = map
        .into_iter()
        .map(|(key, value)| (key, setting_text(value)))
        .collect();
    let count = entries.len();
    state.store.save_settings(entries).await?;
    tracing::info!(count, "settings saved");
    Ok(Json(json!({"success": true})))
}

// ── Agent proxy ───────────────────────────────────────────────────────

async fn step_quests(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let reply = state.agent.step().await?;
    state.status.broadcast(&WsMessage::QuestsChanged {});
    Ok(Json(reply))
}

async fn dry_run_step(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.agent.dry_run().await?))
}

async fn latest_logs(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.agent.latest_logs().await?))
}

async fn run_quest(
    State(state): State<SharedState>,
    Path(raw_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&raw_id, "quest")?;
    let reply = state.agent.run_quest(id).await?;
    tracing::info!(quest_id = id, "quest run requested");
    state.status.broadcast(&WsMessage::QuestsChanged {});
    Ok(Json(reply))
}

// ── Tests ─────────────────────────────────────────────────────────────
