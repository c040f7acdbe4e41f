//! Per-task ReAct loop.
//!
//! Each iteration prompts the model with the task description plus a window
//! of recent history, dispatches any tool calls it emits, and persists the
//! grown history before the next request — crash recovery resumes at the
//! next step, not mid-tool-call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::llm::{LlmRunner, ToolCall, ToolCallOutcome};
use crate::store::{SessionStore, Task, TaskPatch, TaskStatus};
use crate::utils::truncate_str;

/// Most-recent history window included verbatim in prompts.
pub const MAX_HISTORY_ITEMS: usize = 5;
/// Hard safety bound on loop length.
pub const MAX_LOOP_STEPS: usize = 50;
/// Termination sentinel the model emits when the task is done.
pub const TASK_COMPLETE: &str = "TASK_COMPLETE";

/// One reason-act iteration: what the model said, what it called, and what
/// came back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolCallOutcome>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Aggregated tool-result payloads, in call order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<Value>,
}

/// Run the loop for one task until the model signals completion or the
/// safety bound trips. Returns the final task status and the entries
/// produced by this run (history already persisted on the way).
///
/// A runner error (retry budget exhausted, prompt too large) propagates;
/// the caller records the task as failed.
pub(crate) async fn run_react_loop(
    runner: &LlmRunner,
    store: &SessionStore,
    task: &Task,
) -> anyhow::Result<(TaskStatus, Vec<ReactEntry>)> {
    let mut history = decode_history(task.react_history.as_deref());
    let mut produced = Vec::new();

    loop {
        let prompt = build_task_prompt(&task.description, &history);
        let resp = runner.generate_with_tools(&prompt).await?;

        let tool_names: Vec<&str> = resp.tool_calls.iter().map(|tc| tc.name.as_str()).collect();
        info!(
            task_id = %task.id,
            step = history.len() + 1,
            has_content = resp.content.is_some(),
            tools = ?tool_names,
            "ReAct iteration"
        );

        let (tool_results, observation) = if resp.tool_calls.is_empty() {
            (None, None)
        } else {
            let outcomes = runner.execute_tool_calls(&resp.tool_calls).await;
            let observation =
                Value::Array(outcomes.iter().map(|o| o.result.clone()).collect());
            (Some(outcomes), Some(observation))
        };

        let entry = ReactEntry {
            tool_calls: (!resp.tool_calls.is_empty()).then(|| resp.tool_calls.clone()),
            tool_results,
            content: resp.content.clone(),
            observation,
        };
        history.push(entry.clone());
        produced.push(entry);

        // Persist before the next generation request: crash-consistency at
        // iteration granularity.
        store
            .update_task(
                &task.id,
                TaskPatch {
                    react_history: Some(serde_json::to_string(&history)?),
                    ..TaskPatch::default()
                },
            )
            .await?;

        if resp
            .content
            .as_deref()
            .is_some_and(|c| c.contains(TASK_COMPLETE))
        {
            return Ok((TaskStatus::Completed, produced));
        }
        if history.len() > MAX_LOOP_STEPS {
            warn!(task_id = %task.id, steps = history.len(), "ReAct safety bound hit");
            return Ok((TaskStatus::Failed, produced));
        }
    }
}

fn decode_history(payload: Option<&str>) -> Vec<ReactEntry> {
    let Some(payload) = payload else {
        return Vec::new();
    };
    match serde_json::from_str(payload) {
        Ok(history) => history,
        Err(e) => {
            warn!(error = %e, "Unreadable react history, starting fresh");
            Vec::new()
        }
    }
}

/// Compact prompt: task description, a line acknowledging elided actions,
/// the recent window flattened to content, and the completion instruction.
fn build_task_prompt(description: &str, history: &[ReactEntry]) -> String {
    let mut prompt = format!("You are working on the following task:\n{}\n", description);

    if history.len() > MAX_HISTORY_ITEMS {
        prompt.push_str(&format!(
            "\n({} earlier actions are not shown.)\n",
            history.len() - MAX_HISTORY_ITEMS
        ));
    }
    let recent = &history[history.len().saturating_sub(MAX_HISTORY_ITEMS)..];
    if !recent.is_empty() {
        prompt.push_str("\nRecent actions:\n");
        for entry in recent {
            let line = entry.content.as_deref().unwrap_or("[tool activity]");
            prompt.push_str("- ");
            prompt.push_str(&truncate_str(line, 500));
            prompt.push('\n');
        }
    }

    prompt.push_str(
        "\nUse the available tools as needed. When the task is fully finished, \
         reply with TASK_COMPLETE.",
    );
    prompt
}
