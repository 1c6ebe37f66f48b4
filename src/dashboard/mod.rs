//! Dashboard back-end: quest board, settings, agent proxy and live status.
//!
//! ## Overview
//!
//! The browser talks to a single axum server. Quests and their tasks live
//! in a libSQL store (a local file or a hosted database); step requests are
//! forwarded to the external agent gateway; the agent's current status is
//! fanned out to every open WebSocket.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (Router, SPA fallback, poller)       │
//! │  (SPA)   │ <─────── │    ├─ auth.rs  (login, require_auth)             │
//! └──────────┘ WebSocket│    ├─ api.rs   (quests, tasks, settings, agent)  │
//!                       │    ├─ inventory_api.rs (nuggets, git, search)    │
//!                       │    └─ ws.rs    (StatusHub, /ws, status feed)     │
//!                       │         │                                        │
//!                       │         v                                        │
//!                       │  store.rs  (Store trait, open_store)             │
//!                       │    └─ db.rs  (BoardDb: libSQL file or hosted)    │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module      | Responsibility                                          |
//! |-------------|---------------------------------------------------------|
//! | `models`    | `Quest`, `Task`, `Status`, `Priority`, patch payloads   |
//! | `agent`     | `AgentClient`: gateway URL/token resolution + proxying  |
//!
//! ## Typical Request Flow (agent step)
//!
//! 1. `POST /api/quests/step` passes `auth::require_auth`.
//! 2. `AgentClient` resolves the gateway from settings, then config.
//! 3. The agent response is returned verbatim and a `quests-changed`
//!    message tells every client to refetch the board.

pub mod agent;
pub mod api;
pub mod auth;
pub mod db;
pub mod inventory_api;
pub mod models;
pub mod server;
pub mod store;
pub mod ws;
