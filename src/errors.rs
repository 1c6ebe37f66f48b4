//! Typed error hierarchy for the control center.
//!
//! `ControlError` carries the domain failures raised by the quest board,
//! the agent proxy and the nugget inventory. The HTTP layer maps each
//! variant onto a status code in `dashboard::api::ApiError`.

use thiserror::Error;

/// Errors from the dashboard back-end subsystems.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Quest {id} not found")]
    QuestNotFound { id: i64 },

    #[error("Task {id} not found")]
    TaskNotFound { id: i64 },

    #[error("Nugget not found: {name}")]
    NuggetNotFound { name: String },

    #[error("Nugget already exists: {name}")]
    NuggetExists { name: String },

    #[error("Invalid nugget name '{name}': only letters, digits, '-' and '_' are allowed")]
    InvalidNuggetName { name: String },

    #[error("Agent gateway is not configured")]
    AgentNotConfigured,

    #[error("Agent request failed: {0}")]
    Agent(String),

    #[error("Command `{command}` failed: {stderr}")]
    Shell { command: String, stderr: String },

    #[error("Command `{command}` timed out after {secs}s")]
    ShellTimeout { command: String, secs: u64 },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
