//! `/api/inventory/*`: nugget CRUD, brain git sync and qmd search.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use super::api::{ApiError, ApiJson, SharedState};

#[derive(Deserialize)]
pub struct NewNuggetRequest {
    pub name: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Deserialize)]
pub struct SaveNuggetRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Deserialize)]
pub struct CommitRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

pub fn inventory_router() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/inventory/nuggets",
            get(list_nuggets).post(create_nugget),
        )
        .route(
            "/api/inventory/nuggets/{name}",
            get(get_nugget).put(save_nugget).delete(delete_nugget),
        )
        .route("/api/inventory/git", get(git_status).post(git_commit_push))
        .route("/api/inventory/search", get(search_nuggets))
        .route("/api/inventory/reindex", post(reindex))
}

async fn list_nuggets(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let nuggets = state.inventory.list_nuggets().await?;
    Ok(Json(json!({"nuggets": nuggets})))
}

async fn create_nugget(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<NewNuggetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let path = state.inventory.create_nugget(&req.name, &req.content).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"success": true, "name": req.name, "path": path})),
    ))
}

async fn get_nugget(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.inventory.get_nugget(&name).await?))
}

async fn save_nugget(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    ApiJson(req): ApiJson<SaveNuggetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let path = state.inventory.save_nugget(&name, &req.content).await?;
    Ok(Json(json!({"success": true, "path": path})))
}

async fn delete_nugget(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.inventory.delete_nugget(&name).await?;
    Ok(Json(json!({"success": true})))
}

async fn git_status(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.inventory.git_status().await?))
}

async fn git_commit_push(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<CommitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.inventory.commit_and_push(&req.message).await?))
}

async fn search_nuggets(
    State(state): State<SharedState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.inventory.search(&query.q).await?))
}

async fn reindex(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.inventory.reindex().await?))
}
