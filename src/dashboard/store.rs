//! Persistence seam for quests, tasks, sessions, config and settings.
//!
//! [`BoardDb`](super::db::BoardDb) implements [`Store`] on libSQL, for a
//! local database file as well as a hosted database. Handlers only see
//! `Arc<dyn Store>`.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::db::BoardDb;
use super::models::*;
use crate::config::{DatabaseBackend, DatabaseSection};

/// Tables are created idempotently; the layout matches databases written
/// by earlier versions of the dashboard so an existing file can be reused.
pub(crate) const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS quests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        description TEXT,
        status TEXT DEFAULT 'todo',
        is_ready INTEGER DEFAULT 0,
        priority TEXT DEFAULT 'medium',
        sort_order INTEGER DEFAULT 0,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        quest_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        description TEXT,
        status TEXT DEFAULT 'todo',
        is_ready INTEGER DEFAULT 0,
        sort_order INTEGER DEFAULT 0,
        result TEXT,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (quest_id) REFERENCES quests(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS sessions (
        token TEXT PRIMARY KEY,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS config (
        key TEXT PRIMARY KEY,
        value TEXT
    );

    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_tasks_quest ON tasks(quest_id);
";

pub(crate) const QUEST_COLUMNS: &str = "id, title, COALESCE(description, ''), COALESCE(status, 'todo'), \
     COALESCE(is_ready, 0), COALESCE(priority, 'medium'), COALESCE(sort_order, 0), \
     COALESCE(created_at, ''), COALESCE(updated_at, '')";

pub(crate) const TASK_COLUMNS: &str = "id, quest_id, title, COALESCE(description, ''), COALESCE(status, 'todo'), \
     COALESCE(is_ready, 0), COALESCE(sort_order, 0), result, \
     COALESCE(created_at, ''), COALESCE(updated_at, '')";

pub(crate) const UPDATE_QUEST_SQL: &str = "UPDATE quests SET
        title = COALESCE(?1, title),
        description = COALESCE(?2, description),
        status = COALESCE(?3, status),
        is_ready = COALESCE(?4, is_ready),
        priority = COALESCE(?5, priority),
        sort_order = COALESCE(?6, sort_order),
        updated_at = CURRENT_TIMESTAMP
     WHERE id = ?7";

pub(crate) const UPDATE_TASK_SQL: &str = "UPDATE tasks SET
        title = COALESCE(?1, title),
        description = COALESCE(?2, description),
        status = COALESCE(?3, status),
        is_ready = COALESCE(?4, is_ready),
        sort_order = COALESCE(?5, sort_order),
        result = COALESCE(?6, result),
        updated_at = CURRENT_TIMESTAMP
     WHERE id = ?7";

pub(crate) const RESET_QUEST_SQL: &str = "UPDATE quests
     SET status = 'todo', is_ready = 0, updated_at = CURRENT_TIMESTAMP
     WHERE id = ?1";

/// Key of the config row holding the shared dashboard password.
pub const PASSWORD_KEY: &str = "kanban_password";

/// Raw quest columns as read from either backend.
pub(crate) struct QuestRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: String,
    pub is_ready: i64,
    pub priority: String,
    pub sort_order: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl QuestRow {
    pub fn into_quest(self) -> Result<Quest> {
        Ok(Quest {
            id: self.id,
            title: self.title,
            description: self.description,
            status: Status::from_str(&self.status)
                .map_err(|e| anyhow::anyhow!(e))
                .with_context(|| format!("Quest {} has an unreadable status", self.id))?,
            is_ready: self.is_ready != 0,
            priority: Priority::from_str(&self.priority)
                .map_err(|e| anyhow::anyhow!(e))
                .with_context(|| format!("Quest {} has an unreadable priority", self.id))?,
            sort_order: self.sort_order,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Raw task columns as read from either backend.
pub(crate) struct TaskRow {
    pub id: i64,
    pub quest_id: i64,
    pub title: String,
    pub description: String,
    pub status: String,
    pub is_ready: i64,
    pub sort_order: i64,
    pub result: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TaskRow {
    pub fn into_task(self) -> Result<Task> {
        Ok(Task {
            id: self.id,
            quest_id: self.quest_id,
            title: self.title,
            description: self.description,
            status: Status::from_str(&self.status)
                .map_err(|e| anyhow::anyhow!(e))
                .with_context(|| format!("Task {} has an unreadable status", self.id))?,
            is_ready: self.is_ready != 0,
            sort_order: self.sort_order,
            result: self.result,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Attach each task to its quest, preserving the quests' order.
pub(crate) fn group_tasks(quests: Vec<Quest>, tasks: Vec<Task>) -> Vec<QuestWithTasks> {
    let mut by_quest: BTreeMap<i64, Vec<Task>> = BTreeMap::new();
    for task in tasks {
        by_quest.entry(task.quest_id).or_default().push(task);
    }
    quests
        .into_iter()
        .map(|quest| {
            let tasks = by_quest.remove(&quest.id).unwrap_or_default();
            QuestWithTasks { quest, tasks }
        })
        .collect()
}

/// Async access to the dashboard's relational data.
///
/// Lookups return `Ok(None)` / `Ok(false)` for missing rows; `Err` is
/// reserved for backend failures.
#[async_trait]
pub trait Store: Send + Sync {
    /// All quests ordered by `sort_order, id`, each with its tasks.
    async fn list_quests(&self) -> Result<Vec<QuestWithTasks>>;
    async fn get_quest(&self, id: i64) -> Result<Option<QuestWithTasks>>;
    async fn create_quest(&self, new: NewQuest) -> Result<Quest>;
    async fn update_quest(&self, id: i64, patch: QuestPatch) -> Result<Option<Quest>>;
    async fn delete_quest(&self, id: i64) -> Result<bool>;
    /// Delete the quest's tasks and put it back to `todo`, not ready.
    async fn reset_quest(&self, id: i64) -> Result<Option<Quest>>;

    async fn create_task(&self, quest_id: i64, new: NewTask) -> Result<Option<Task>>;
    async fn update_task(&self, id: i64, patch: TaskPatch) -> Result<Option<Task>>;
    async fn delete_task(&self, id: i64) -> Result<bool>;

    async fn create_session(&self, token: String) -> Result<()>;
    async fn session_exists(&self, token: String) -> Result<bool>;
    async fn delete_session(&self, token: String) -> Result<bool>;

    async fn get_config(&self, key: String) -> Result<Option<String>>;
    async fn set_config(&self, key: String, value: String) -> Result<()>;

    async fn list_settings(&self) -> Result<BTreeMap<String, String>>;
    async fn save_settings(&self, entries: BTreeMap<String, String>) -> Result<()>;
}

pub type SharedStore = Arc<dyn Store>;

/// Open the configured backend, creating tables as needed.
pub async fn open_store(config: &DatabaseSection) -> Result<SharedStore> {
    match config.backend {
        DatabaseBackend::Sqlite => {
            if let Some(parent) = config.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .context("Failed to create database directory")?;
                }
            }
            let db = BoardDb::open_local(&config.path)
                .await
                .context("Failed to initialize dashboard database")?;
            tracing::info!(path = %config.path.display(), "opened local store");
            Ok(Arc::new(db))
        }
        DatabaseBackend::Remote => {
            let url = config
                .url
                .clone()
                .context("database.url is required for the remote backend")?;
            let token = config.auth_token.clone().unwrap_or_default();
            let store = BoardDb::connect_remote(url.clone(), token).await?;
            tracing::info!(url = %url, "opened remote libsql store");
            Ok(Arc::new(store))
        }
    }
}
