//! SQLite-backed session/task store.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{CoreError, ErrorKind};

use super::{NewSession, Session, SessionPatch, SessionStatus, Task, TaskPatch, TaskStatus};

pub struct SessionStore {
    pool: SqlitePool,
    debug_logging: bool,
}

fn parse_ts(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<Session> {
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let deadline: Option<String> = row.try_get("deadline")?;
    Ok(Session {
        id: row.try_get("id")?,
        status: SessionStatus::parse(&status)?,
        created_at: parse_ts(&created_at)?,
        deadline: deadline.as_deref().map(parse_ts).transpose()?,
        raw_plan: row.try_get("raw_plan")?,
    })
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<Task> {
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    Ok(Task {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        task_order: row.try_get("task_order")?,
        description: row.try_get("description")?,
        status: TaskStatus::parse(&status)?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
        react_history: row.try_get("react_history")?,
    })
}

impl SessionStore {
    /// Open (creating if missing) the database at `database_url` and run
    /// migrations. Accepts `sqlite://path` URLs and `sqlite::memory:`.
    pub async fn connect(database_url: &str, debug_logging: bool) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // A shared in-memory database exists per connection; cap the pool at
        // one so every query sees the same data.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        let store = Self {
            pool,
            debug_logging,
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                deadline TEXT,
                raw_plan TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                task_order INTEGER NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                react_history TEXT,
                UNIQUE(session_id, task_order)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tasks_session ON tasks(session_id, task_order)",
        )
        .execute(&self.pool)
        .await?;

        info!("Session store migration complete");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    pub async fn create_session(&self, initial: NewSession) -> anyhow::Result<Session> {
        let id = Uuid::new_v4().to_string();
        let status = initial.status.unwrap_or(SessionStatus::Open);
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO sessions (id, status, created_at, deadline, raw_plan)
             VALUES (?, ?, ?, ?, NULL)",
        )
        .bind(&id)
        .bind(status.as_str())
        .bind(now.to_rfc3339())
        .bind(initial.deadline.map(|d| d.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        if self.debug_logging {
            debug!(session_id = %id, status = status.as_str(), "Session created");
        }

        Ok(Session {
            id,
            status,
            created_at: now,
            deadline: initial.deadline,
            raw_plan: None,
        })
    }

    pub async fn retrieve_session(&self, id: &str) -> anyhow::Result<Option<Session>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_session).transpose()
    }

    /// Apply a partial update. Fails with `SessionNotFound` when the id is
    /// absent. The single UPDATE statement keeps the patch atomic with
    /// respect to concurrent writers.
    pub async fn update_session(&self, id: &str, patch: SessionPatch) -> anyhow::Result<Session> {
        let result = sqlx::query(
            "UPDATE sessions SET
                status = COALESCE(?, status),
                deadline = COALESCE(?, deadline),
                raw_plan = COALESCE(?, raw_plan)
             WHERE id = ?",
        )
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.deadline.map(|d| d.to_rfc3339()))
        .bind(&patch.raw_plan)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::new(
                ErrorKind::SessionNotFound,
                format!("Session not found: {}", id),
            )
            .into());
        }

        if self.debug_logging {
            debug!(session_id = %id, status = ?patch.status, "Session updated");
        }

        self.retrieve_session(id).await?.ok_or_else(|| {
            CoreError::new(ErrorKind::SessionNotFound, format!("Session not found: {}", id)).into()
        })
    }

    /// Most recent sessions first.
    pub async fn list_sessions(&self, limit: i64) -> anyhow::Result<Vec<Session>> {
        let rows = sqlx::query("SELECT * FROM sessions ORDER BY created_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_session).collect()
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Insert a task for the session. When `order` is omitted the statement
    /// computes `max(task_order)+1` (or 0) in the same INSERT, which sqlite's
    /// writer serialization makes atomic under concurrent inserts.
    pub async fn insert_task(
        &self,
        session_id: &str,
        description: &str,
        order: Option<i64>,
    ) -> anyhow::Result<Task> {
        if description.trim().is_empty() {
            return Err(CoreError::new(
                ErrorKind::Internal,
                "Task description must be non-empty",
            )
            .into());
        }
        if self.retrieve_session(session_id).await?.is_none() {
            return Err(CoreError::new(
                ErrorKind::SessionNotFound,
                format!("Session not found: {}", session_id),
            )
            .into());
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO tasks (id, session_id, task_order, description, status, created_at, updated_at, react_history)
             VALUES (
                ?, ?,
                COALESCE(?, (SELECT COALESCE(MAX(task_order) + 1, 0) FROM tasks WHERE session_id = ?)),
                ?, 'PENDING', ?, ?, NULL
             )",
        )
        .bind(&id)
        .bind(session_id)
        .bind(order)
        .bind(session_id)
        .bind(description)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.retrieve_task(&id).await?.ok_or_else(|| {
            CoreError::new(ErrorKind::Internal, "Inserted task vanished").into()
        })
    }

    pub async fn retrieve_task(&self, id: &str) -> anyhow::Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_task).transpose()
    }

    /// Tasks for the session in strictly ascending `task_order`.
    pub async fn list_tasks(&self, session_id: &str) -> anyhow::Result<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE session_id = ? ORDER BY task_order ASC")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_task).collect()
    }

    /// Apply a partial update; `updated_at` always advances. Fails with
    /// `TaskNotFound` when the id is absent.
    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> anyhow::Result<Task> {
        let result = sqlx::query(
            "UPDATE tasks SET
                status = COALESCE(?, status),
                description = COALESCE(?, description),
                react_history = COALESCE(?, react_history),
                updated_at = ?
             WHERE id = ?",
        )
        .bind(patch.status.map(|s| s.as_str()))
        .bind(&patch.description)
        .bind(&patch.react_history)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(
                CoreError::new(ErrorKind::TaskNotFound, format!("Task not found: {}", id)).into(),
            );
        }

        self.retrieve_task(id)
            .await?
            .ok_or_else(|| CoreError::new(ErrorKind::TaskNotFound, format!("Task not found: {}", id)).into())
    }

    /// Status-only update. Returns `None` (rather than failing) when the task
    /// does not exist.
    pub async fn update_task_status(
        &self,
        id: &str,
        status: TaskStatus,
    ) -> anyhow::Result<Option<Task>> {
        let result = sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.retrieve_task(id).await
    }
}
