//! Agent orchestrator.
//!
//! Planning turns a development goal into an ordered list of persisted
//! tasks; execution drives them sequentially, each through the ReAct loop,
//! with a cooperative deadline check between tasks.

mod react;

pub use react::{ReactEntry, MAX_HISTORY_ITEMS, MAX_LOOP_STEPS, TASK_COMPLETE};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{CoreError, ErrorKind};
use crate::llm::LlmRunner;
use crate::store::{
    NewSession, SessionPatch, SessionStatus, SessionStore, Task, TaskStatus,
};

#[derive(Debug, Clone)]
pub struct PlanningRequest {
    pub prompt: String,
    pub repo_url: String,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct RefineRequest {
    pub session_id: String,
    pub refinement_prompt: String,
}

/// Terminal outcome of a plan execution plus the full react log.
#[derive(Debug)]
pub struct ExecutionReport {
    pub status: SessionStatus,
    pub log: Vec<ReactEntry>,
}

pub struct Orchestrator {
    store: Arc<SessionStore>,
    runner: Arc<LlmRunner>,
}

impl Orchestrator {
    pub fn new(store: Arc<SessionStore>, runner: Arc<LlmRunner>) -> Self {
        Self { store, runner }
    }

    // -----------------------------------------------------------------------
    // Planning
    // -----------------------------------------------------------------------

    /// Create a session, ask the model for an ordered plan, persist each step
    /// as a task, and park the session awaiting confirmation.
    pub async fn start_planning(&self, request: PlanningRequest) -> anyhow::Result<Vec<Task>> {
        let session = self
            .store
            .create_session(NewSession {
                status: Some(SessionStatus::Planning),
                deadline: request.deadline,
            })
            .await?;
        info!(session_id = %session.id, "Planning started");

        let prompt = format!(
            "Break the following development goal into a short ordered list of \
             concrete tasks.\n\
             Goal: {}\n\
             Repository: {}\n\
             Respond with a JSON array of objects, each with a single \
             \"description\" string.",
            request.prompt, request.repo_url
        );

        let descriptions = self.generate_plan(&prompt).await?;

        let mut tasks = Vec::with_capacity(descriptions.len());
        for description in &descriptions {
            tasks.push(self.store.insert_task(&session.id, description, None).await?);
        }

        self.store
            .update_session(
                &session.id,
                SessionPatch {
                    status: Some(SessionStatus::AwaitingConfirmation),
                    raw_plan: Some(serde_json::to_string(&tasks)?),
                    ..SessionPatch::default()
                },
            )
            .await?;

        info!(session_id = %session.id, tasks = tasks.len(), "Plan ready");
        Ok(tasks)
    }

    /// Replace the session's plan with a revision of it. The prior tasks stay
    /// in the store as history; the new plan snapshot contains only the fresh
    /// tasks.
    pub async fn refine_plan(&self, request: RefineRequest) -> anyhow::Result<Vec<Task>> {
        let session = self
            .store
            .retrieve_session(&request.session_id)
            .await?
            .ok_or_else(|| {
                CoreError::new(
                    ErrorKind::SessionNotFound,
                    format!("Session not found: {}", request.session_id),
                )
            })?;

        let existing = self.store.list_tasks(&session.id).await?;
        let current: Vec<&str> = existing.iter().map(|t| t.description.as_str()).collect();

        let prompt = format!(
            "The current plan is: {}.\n\
             Revise it according to this request: {}\n\
             Respond with the full revised plan as a JSON array of objects, \
             each with a single \"description\" string.",
            current.join(", "),
            request.refinement_prompt
        );

        let descriptions = self.generate_plan(&prompt).await?;

        let mut tasks = Vec::with_capacity(descriptions.len());
        for description in &descriptions {
            tasks.push(self.store.insert_task(&session.id, description, None).await?);
        }

        self.store
            .update_session(
                &session.id,
                SessionPatch {
                    raw_plan: Some(serde_json::to_string(&tasks)?),
                    ..SessionPatch::default()
                },
            )
            .await?;

        info!(session_id = %session.id, tasks = tasks.len(), "Plan refined");
        Ok(tasks)
    }

    /// One JSON-mode round-trip, with a plain-generation fallback that parses
    /// raw or fenced JSON.
    async fn generate_plan(&self, prompt: &str) -> anyhow::Result<Vec<String>> {
        let value = match self.runner.generate_json(prompt).await {
            Ok(value) => value,
            Err(first_err) => {
                warn!(error = %first_err, "JSON-mode planning failed, retrying as text");
                let text = self.runner.generate_content(prompt).await?;
                let inner = crate::llm::strip_code_fence(&text);
                serde_json::from_str(inner).map_err(|e| {
                    CoreError::new(
                        ErrorKind::PlanParseFailed,
                        format!("Failed to parse plan from model response: {}", e),
                    )
                })?
            }
        };
        parse_descriptions(&value)
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Drive a confirmed plan to a terminal status. Tasks run strictly in
    /// order; the deadline is checked at the top of every iteration, so a
    /// long-running task overruns it until the next boundary.
    pub async fn execute_plan(&self, session_id: &str) -> anyhow::Result<ExecutionReport> {
        let session = self
            .store
            .retrieve_session(session_id)
            .await?
            .ok_or_else(|| {
                CoreError::new(
                    ErrorKind::SessionNotFound,
                    format!("Session not found: {}", session_id),
                )
            })?;

        if session.status != SessionStatus::AwaitingConfirmation {
            return Err(CoreError::new(
                ErrorKind::SessionStateInvalid,
                format!(
                    "Session {} is {}, expected {}",
                    session_id,
                    session.status.as_str(),
                    SessionStatus::AwaitingConfirmation.as_str()
                ),
            )
            .into());
        }

        self.set_status(session_id, SessionStatus::Executing).await?;

        // The plan snapshot seeds execution; task status is tracked in memory
        // between iterations without re-querying.
        let mut plan: Vec<Task> = match session.raw_plan.as_deref() {
            Some(payload) => serde_json::from_str(payload)?,
            None => self.store.list_tasks(session_id).await?,
        };
        let mut log = Vec::new();

        loop {
            if let Some(deadline) = session.deadline {
                if Utc::now() > deadline {
                    warn!(session_id, "Session deadline exceeded");
                    self.set_status(session_id, SessionStatus::DeadlineExceeded)
                        .await?;
                    return Ok(ExecutionReport {
                        status: SessionStatus::DeadlineExceeded,
                        log,
                    });
                }
            }

            let Some(task) = plan.iter_mut().find(|t| t.status == TaskStatus::Pending) else {
                self.set_status(session_id, SessionStatus::Completed).await?;
                info!(session_id, "Plan execution completed");
                return Ok(ExecutionReport {
                    status: SessionStatus::Completed,
                    log,
                });
            };

            info!(session_id, task_id = %task.id, order = task.task_order, "Task started");
            self.store
                .update_task_status(&task.id, TaskStatus::InProgress)
                .await?;
            task.status = TaskStatus::InProgress;

            match react::run_react_loop(&self.runner, &self.store, task).await {
                // A task that exits by the safety bound is marked FAILED but
                // is fatal only to itself; the remaining tasks still run.
                Ok((final_status, entries)) => {
                    log.extend(entries);
                    self.store.update_task_status(&task.id, final_status).await?;
                    task.status = final_status;
                    info!(session_id, task_id = %task.id, status = final_status.as_str(), "Task finished");
                }
                Err(e) => {
                    // Model failure after retry exhaustion: the task is
                    // recorded failed and the error surfaces to the caller.
                    warn!(session_id, task_id = %task.id, error = %e, "Task aborted");
                    self.store
                        .update_task_status(&task.id, TaskStatus::Failed)
                        .await?;
                    self.set_status(session_id, SessionStatus::Failed).await?;
                    return Err(e);
                }
            }
        }
    }

    async fn set_status(&self, session_id: &str, status: SessionStatus) -> anyhow::Result<()> {
        self.store
            .update_session(
                session_id,
                SessionPatch {
                    status: Some(status),
                    ..SessionPatch::default()
                },
            )
            .await?;
        Ok(())
    }
}

/// Expect an array of `{"description": "..."}` objects with non-empty
/// descriptions.
fn parse_descriptions(value: &Value) -> anyhow::Result<Vec<String>> {
    let parse_failed = |detail: &str| -> anyhow::Error {
        CoreError::new(
            ErrorKind::PlanParseFailed,
            format!("Failed to parse plan from model response: {}", detail),
        )
        .into()
    };

    let Some(items) = value.as_array() else {
        return Err(parse_failed("expected a JSON array"));
    };

    let mut descriptions = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(description) = item["description"].as_str() else {
            return Err(parse_failed(&format!(
                "entry {} is missing a \"description\" string",
                i
            )));
        };
        if description.trim().is_empty() {
            return Err(parse_failed(&format!("entry {} has an empty description", i)));
        }
        descriptions.push(description.to_string());
    }
    Ok(descriptions)
}
