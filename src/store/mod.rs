//! Durable sessions and tasks.
//!
//! Two tables, `sessions` and `tasks`, with relational semantics: a task
//! belongs to exactly one session and carries a monotonically increasing
//! `task_order` unique within it. The serialized plan (`raw_plan`) and the
//! per-task react history are opaque TEXT payloads that round-trip exactly;
//! the schema stays decoupled from the evolving entry shape.

mod sqlite;

pub use sqlite::SessionStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, ErrorKind};

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Session lifecycle. Transitions form a DAG; terminal states are
/// `Completed`, `Failed` and `DeadlineExceeded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Open,
    Planning,
    AwaitingConfirmation,
    Executing,
    Completed,
    Failed,
    DeadlineExceeded,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "OPEN",
            SessionStatus::Planning => "PLANNING",
            SessionStatus::AwaitingConfirmation => "AWAITING_CONFIRMATION",
            SessionStatus::Executing => "EXECUTING",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Failed => "FAILED",
            SessionStatus::DeadlineExceeded => "DEADLINE_EXCEEDED",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "OPEN" => Ok(SessionStatus::Open),
            "PLANNING" => Ok(SessionStatus::Planning),
            "AWAITING_CONFIRMATION" => Ok(SessionStatus::AwaitingConfirmation),
            "EXECUTING" => Ok(SessionStatus::Executing),
            "COMPLETED" => Ok(SessionStatus::Completed),
            "FAILED" => Ok(SessionStatus::Failed),
            "DEADLINE_EXCEEDED" => Ok(SessionStatus::DeadlineExceeded),
            other => Err(CoreError::new(
                ErrorKind::Internal,
                format!("Unknown session status in store: {}", other),
            )
            .into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::DeadlineExceeded
        )
    }
}

/// Task lifecycle: `Pending → InProgress → (Completed | Failed)`, no backward
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "PENDING" => Ok(TaskStatus::Pending),
            "IN_PROGRESS" => Ok(TaskStatus::InProgress),
            "COMPLETED" => Ok(TaskStatus::Completed),
            "FAILED" => Ok(TaskStatus::Failed),
            other => Err(CoreError::new(
                ErrorKind::Internal,
                format!("Unknown task status in store: {}", other),
            )
            .into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A unit of work bounded by a user prompt and an optional deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    /// Serialized plan payload: an ordered sequence of task snapshots, opaque
    /// to the store.
    pub raw_plan: Option<String>,
}

/// One ordered step within a session's plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub session_id: String,
    /// Position within the session, starting at 0.
    pub task_order: i64,
    pub description: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Serialized react history, opaque to the store.
    pub react_history: Option<String>,
}

/// Initial attributes for a fresh session.
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub status: Option<SessionStatus>,
    pub deadline: Option<DateTime<Utc>>,
}

/// Partial update for a session; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub status: Option<SessionStatus>,
    pub deadline: Option<DateTime<Utc>>,
    pub raw_plan: Option<String>,
}

/// Partial update for a task; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub description: Option<String>,
    pub react_history: Option<String>,
}
