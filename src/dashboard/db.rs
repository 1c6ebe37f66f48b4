//! libSQL-backed store for quests, tasks, sessions, config and settings.
//!
//! One engine serves every deployment: a local database file, a hosted
//! libSQL database, or `:memory:` in tests.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use libsql::params::Params;
use libsql::{Builder, Connection, Database, Row, Value};
use tokio::sync::Mutex;

use super::models::*;
use super::store::{
    QUEST_COLUMNS, QuestRow, RESET_QUEST_SQL, SCHEMA, Store, TASK_COLUMNS, TaskRow,
    UPDATE_QUEST_SQL, UPDATE_TASK_SQL, group_tasks,
};

/// A single libSQL connection serialized behind an async mutex, so a
/// transaction never interleaves with another request's statements.
pub struct BoardDb {
    _db: Database,
    conn: Mutex<Connection>,
}

fn text(v: Option<&str>) -> Value {
    match v {
        Some(s) => Value::Text(s.to_string()),
        None => Value::Null,
    }
}

fn int(v: Option<i64>) -> Value {
    match v {
        Some(n) => Value::Integer(n),
        None => Value::Null,
    }
}

fn get_i64(row: &Row, idx: i32) -> Result<i64> {
    match row.get_value(idx).context("Failed to read column")? {
        Value::Integer(n) => Ok(n),
        Value::Null => Ok(0),
        Value::Text(s) => s
            .parse()
            .with_context(|| format!("Column {} is not an integer: {}", idx, s)),
        other => anyhow::bail!("Column {} is not an integer: {:?}", idx, other),
    }
}

fn get_opt_string(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx).context("Failed to read column")? {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s)),
        Value::Integer(n) => Ok(Some(n.to_string())),
        Value::Real(f) => Ok(Some(f.to_string())),
        Value::Blob(b) => Ok(Some(String::from_utf8_lossy(&b).into_owned())),
    }
}

fn get_string(row: &Row, idx: i32) -> Result<String> {
    Ok(get_opt_string(row, idx)?.unwrap_or_default())
}

fn quest_row(row: &Row) -> Result<QuestRow> {
    Ok(QuestRow {
        id: get_i64(row, 0)?,
        title: get_string(row, 1)?,
        description: get_string(row, 2)?,
        status: get_string(row, 3)?,
        is_ready: get_i64(row, 4)?,
        priority: get_string(row, 5)?,
        sort_order: get_i64(row, 6)?,
        created_at: get_string(row, 7)?,
        updated_at: get_string(row, 8)?,
    })
}

fn task_row(row: &Row) -> Result<TaskRow> {
    Ok(TaskRow {
        id: get_i64(row, 0)?,
        quest_id: get_i64(row, 1)?,
        title: get_string(row, 2)?,
        description: get_string(row, 3)?,
        status: get_string(row, 4)?,
        is_ready: get_i64(row, 5)?,
        sort_order: get_i64(row, 6)?,
        result: get_opt_string(row, 7)?,
        created_at: get_string(row, 8)?,
        updated_at: get_string(row, 9)?,
    })
}

async fn query_quests(conn: &Connection, where_clause: &str, params: Params) -> Result<Vec<Quest>> {
    let sql = format!(
        "SELECT {} FROM quests {} ORDER BY sort_order ASC, id ASC",
        QUEST_COLUMNS, where_clause
    );
    let mut rows = conn.query(&sql, params).await.context("Failed to query quests")?;
    let mut quests = Vec::new();
    while let Some(row) = rows.next().await.context("Failed to read quest row")? {
        quests.push(quest_row(&row)?.into_quest()?);
    }
    Ok(quests)
}

async fn query_tasks(conn: &Connection, where_clause: &str, params: Params) -> Result<Vec<Task>> {
    let sql = format!(
        "SELECT {} FROM tasks {} ORDER BY sort_order ASC, id ASC",
        TASK_COLUMNS, where_clause
    );
    let mut rows = conn.query(&sql, params).await.context("Failed to query tasks")?;
    let mut tasks = Vec::new();
    while let Some(row) = rows.next().await.context("Failed to read task row")? {
        tasks.push(task_row(&row)?.into_task()?);
    }
    Ok(tasks)
}

async fn quest_by_id(conn: &Connection, id: i64) -> Result<Option<Quest>> {
    let quests = query_quests(conn, "WHERE id = ?1", by_id(id)).await?;
    Ok(quests.into_iter().next())
}

async fn task_by_id(conn: &Connection, id: i64) -> Result<Option<Task>> {
    let tasks = query_tasks(conn, "WHERE id = ?1", by_id(id)).await?;
    Ok(tasks.into_iter().next())
}

fn by_id(id: i64) -> Params {
    Params::Positional(vec![Value::Integer(id)])
}

impl BoardDb {
    /// Open (or create) a database file and run migrations.
    pub async fn open_local(path: &Path) -> Result<Self> {
        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        Self::from_database(db).await
    }

    /// Connect to a hosted database (`libsql://…` or `https://…`).
    pub async fn connect_remote(url: String, auth_token: String) -> Result<Self> {
        let db = Builder::new_remote(url, auth_token)
            .build()
            .await
            .context("Failed to open remote libsql database")?;
        Self::from_database(db).await
    }

    /// In-memory database (for testing).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .context("Failed to open in-memory libsql database")?;
        Self::from_database(db).await
    }

    async fn from_database(db: Database) -> Result<Self> {
        let conn = db.connect().context("Failed to connect to libsql database")?;
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .context("Failed to enable foreign keys")?;
        conn.execute_batch(SCHEMA)
            .await
            .context("Failed to create tables")?;
        Ok(Self {
            _db: db,
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl Store for BoardDb {
    async fn list_quests(&self) -> Result<Vec<QuestWithTasks>> {
        let conn = self.conn.lock().await;
        let quests = query_quests(&conn, "", Params::None).await?;
        let tasks = query_tasks(&conn, "", Params::None).await?;
        Ok(group_tasks(quests, tasks))
    }

    async fn get_quest(&self, id: i64) -> Result<Option<QuestWithTasks>> {
        let conn = self.conn.lock().await;
        let Some(quest) = quest_by_id(&conn, id).await? else {
            return Ok(None);
        };
        let tasks = query_tasks(&conn, "WHERE quest_id = ?1", by_id(id)).await?;
        Ok(Some(QuestWithTasks { quest, tasks }))
    }

    async fn create_quest(&self, new: NewQuest) -> Result<Quest> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO quests (title, description, status, is_ready, priority, sort_order)
             VALUES (?1, ?2, 'todo', 0, ?3, ?4)",
            Params::Positional(vec![
                Value::Text(new.title),
                Value::Text(new.description),
                Value::Text(new.priority.as_str().to_string()),
                Value::Integer(new.sort_order),
            ]),
        )
        .await
        .context("Failed to insert quest")?;
        let id = conn.last_insert_rowid();
        quest_by_id(&conn, id)
            .await?
            .context("Quest not found after insert")
    }

    async fn update_quest(&self, id: i64, patch: QuestPatch) -> Result<Option<Quest>> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                UPDATE_QUEST_SQL,
                Params::Positional(vec![
                    text(patch.title.as_deref()),
                    text(patch.description.as_deref()),
                    text(patch.status.map(|s| s.as_str())),
                    int(patch.is_ready.map(i64::from)),
                    text(patch.priority.map(|p| p.as_str())),
                    int(patch.sort_order),
                    Value::Integer(id),
                ]),
            )
            .await
            .context("Failed to update quest")?;
        if changed == 0 {
            return Ok(None);
        }
        quest_by_id(&conn, id).await
    }

    async fn delete_quest(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        // Connections opened elsewhere may lack `PRAGMA foreign_keys`.
        let tx = conn.transaction().await.context("Failed to begin transaction")?;
        tx.execute("DELETE FROM tasks WHERE quest_id = ?1", by_id(id))
            .await
            .context("Failed to delete quest tasks")?;
        let count = tx
            .execute("DELETE FROM quests WHERE id = ?1", by_id(id))
            .await
            .context("Failed to delete quest")?;
        tx.commit().await.context("Failed to commit quest delete")?;
        Ok(count > 0)
    }

    async fn reset_quest(&self, id: i64) -> Result<Option<Quest>> {
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await.context("Failed to begin transaction")?;
        let changed = tx
            .execute(RESET_QUEST_SQL, by_id(id))
            .await
            .context("Failed to reset quest")?;
        if changed == 0 {
            tx.rollback().await.context("Failed to roll back quest reset")?;
            return Ok(None);
        }
        tx.execute("DELETE FROM tasks WHERE quest_id = ?1", by_id(id))
            .await
            .context("Failed to delete quest tasks")?;
        tx.commit().await.context("Failed to commit quest reset")?;
        quest_by_id(&conn, id).await
    }

    async fn create_task(&self, quest_id: i64, new: NewTask) -> Result<Option<Task>> {
        let conn = self.conn.lock().await;
        if quest_by_id(&conn, quest_id).await?.is_none() {
            return Ok(None);
        }
        conn.execute(
            "INSERT INTO tasks (quest_id, title, description, status, is_ready, sort_order)
             VALUES (?1, ?2, ?3, 'todo', 0, ?4)",
            Params::Positional(vec![
                Value::Integer(quest_id),
                Value::Text(new.title),
                Value::Text(new.description),
                Value::Integer(new.sort_order),
            ]),
        )
        .await
        .context("Failed to insert task")?;
        let id = conn.last_insert_rowid();
        task_by_id(&conn, id).await
    }

    async fn update_task(&self, id: i64, patch: TaskPatch) -> Result<Option<Task>> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                UPDATE_TASK_SQL,
                Params::Positional(vec![
                    text(patch.title.as_deref()),
                    text(patch.description.as_deref()),
                    text(patch.status.map(|s| s.as_str())),
                    int(patch.is_ready.map(i64::from)),
                    int(patch.sort_order),
                    text(patch.result.as_deref()),
                    Value::Integer(id),
                ]),
            )
            .await
            .context("Failed to update task")?;
        if changed == 0 {
            return Ok(None);
        }
        task_by_id(&conn, id).await
    }

    async fn delete_task(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let count = conn
            .execute("DELETE FROM tasks WHERE id = ?1", by_id(id))
            .await
            .context("Failed to delete task")?;
        Ok(count > 0)
    }

    async fn create_session(&self, token: String) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO sessions (token) VALUES (?1)",
            Params::Positional(vec![Value::Text(token)]),
        )
        .await
        .context("Failed to insert session")?;
        Ok(())
    }

    async fn session_exists(&self, token: String) -> Result<bool> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT 1 FROM sessions WHERE token = ?1",
                Params::Positional(vec![Value::Text(token)]),
            )
            .await
            .context("Failed to look up session")?;
        Ok(rows.next().await.context("Failed to read session row")?.is_some())
    }

    async fn delete_session(&self, token: String) -> Result<bool> {
        let conn = self.conn.lock().await;
        let count = conn
            .execute(
                "DELETE FROM sessions WHERE token = ?1",
                Params::Positional(vec![Value::Text(token)]),
            )
            .await
            .context("Failed to delete session")?;
        Ok(count > 0)
    }

    async fn get_config(&self, key: String) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT value FROM config WHERE key = ?1",
                Params::Positional(vec![Value::Text(key)]),
            )
            .await
            .context("Failed to read config")?;
        match rows.next().await.context("Failed to read config row")? {
            Some(row) => get_opt_string(&row, 0),
            None => Ok(None),
        }
    }

    async fn set_config(&self, key: String, value: String) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
            Params::Positional(vec![Value::Text(key), Value::Text(value)]),
        )
        .await
        .context("Failed to write config")?;
        Ok(())
    }

    async fn list_settings(&self) -> Result<BTreeMap<String, String>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query("SELECT key, value FROM settings", Params::None)
            .await
            .context("Failed to query settings")?;
        let mut settings = BTreeMap::new();
        while let Some(row) = rows.next().await.context("Failed to read settings row")? {
            settings.insert(get_string(&row, 0)?, get_string(&row, 1)?);
        }
        Ok(settings)
    }

    async fn save_settings(&self, entries: BTreeMap<String, String>) -> Result<()> {
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await.context("Failed to begin transaction")?;
        for (key, value) in entries {
            tx.execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                Params::Positional(vec![Value::Text(key.clone()), Value::Text(value)]),
            )
            .await
            .with_context(|| format!("Failed to save setting {}", key))?;
        }
        tx.commit().await.context("Failed to commit settings")?;
        Ok(())
    }
}
