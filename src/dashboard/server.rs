use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{any, get},
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use super::agent::AgentClient;
use super::api::{self, AppState, SharedState};
use super::store::{SharedStore, open_store};
use super::ws::{self, StatusHub};
use crate::config::ControlConfig;
use crate::inventory::Inventory;

/// Assemble shared state. The indicator starts `idle` when an agent
/// endpoint is known and `disconnected` otherwise.
pub async fn build_state(store: SharedStore, config: &ControlConfig) -> Result<SharedState> {
    let agent = AgentClient::new(store.clone(), config.agent.clone())?;
    let initial = match agent.endpoint().await {
        Ok(Some(_)) => ws::STATUS_IDLE,
        Ok(None) => ws::STATUS_DISCONNECTED,
        Err(e) => {
            tracing::warn!(error = %e, "could not resolve agent endpoint");
            ws::STATUS_DISCONNECTED
        }
    };
    Ok(Arc::new(AppState {
        store,
        status: StatusHub::new(initial),
        agent,
        inventory: Inventory::from_config(&config.inventory),
    }))
}

/// Build the full application router: API, WebSocket and (optionally) the
/// pre-built SPA with `index.html` as the client-routing fallback. Unknown
/// `/api` paths stay JSON 404s either way.
pub fn build_router(state: SharedState, static_dir: Option<&Path>) -> Router {
    let router = api::api_router(state.clone())
        .route("/ws", get(ws::ws_handler))
        .route("/api", any(not_found))
        .route("/api/{*rest}", any(not_found));

    let router = match static_dir {
        Some(dir) => {
            let spa = ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")));
            router.fallback_service(spa)
        }
        None => router.fallback(not_found),
    };

    router.with_state(state).layer(TraceLayer::new_for_http())
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"})))
}

/// Open the store, start background tasks and serve until Ctrl+C.
pub async fn start_server(config: ControlConfig) -> Result<()> {
    let store = open_store(&config.database).await?;
    let state = build_state(store, &config).await?;

    if let Some(secs) = config.agent.status_poll_secs {
        tracing::info!(secs, "polling agent status");
        ws::spawn_status_poller(state.clone(), Duration::from_secs(secs));
    }

    let mut app = build_router(state, config.server.static_dir.as_deref());

    if config.server.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if config.server.dev_mode {
        "0.0.0.0"
    } else {
        config.server.host.as_str()
    };
    let addr = format!("{}:{}", host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "control center listening");
    println!("Control center running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
