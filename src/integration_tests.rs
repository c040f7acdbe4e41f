//! Integration tests that exercise the real plan-and-execute flow with a
//! scripted model and a scripted container runtime.

use serde_json::{json, Value};

use crate::agent::{PlanningRequest, RefineRequest, TASK_COMPLETE};
use crate::error::{error_kind, ErrorKind};
use crate::llm::testing::MockProvider;
use crate::store::{NewSession, SessionStatus, TaskStatus};
use crate::testing::TestHarness;

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn planning_persists_ordered_tasks_and_parks_the_session() {
    let h = TestHarness::new().await;
    h.provider
        .push_response(MockProvider::text_response(
            r#"[{"description":"Task 1"},{"description":"Task 2"}]"#,
        ))
        .await;

    let tasks = h
        .orchestrator
        .start_planning(PlanningRequest {
            prompt: "Create a simple web server".to_string(),
            repo_url: "https://github.com/test/repo".to_string(),
            deadline: None,
        })
        .await
        .unwrap();

    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].task_order, 0);
    assert_eq!(tasks[1].task_order, 1);
    assert_eq!(tasks[0].description, "Task 1");
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Pending));

    // The planning prompt carried the goal and repository.
    let prompts = h.provider.prompts().await;
    assert!(prompts[0].contains("Create a simple web server"));
    assert!(prompts[0].contains("https://github.com/test/repo"));

    let session = h
        .store
        .retrieve_session(&tasks[0].session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::AwaitingConfirmation);

    // The stored plan snapshot round-trips to the returned list.
    let snapshot: Value = serde_json::from_str(session.raw_plan.as_deref().unwrap()).unwrap();
    assert_eq!(snapshot, serde_json::to_value(&tasks).unwrap());
}

#[tokio::test]
async fn fenced_plan_output_is_parsed() {
    let h = TestHarness::new().await;
    h.provider
        .push_response(MockProvider::text_response(
            "```json\n[{\"description\":\"Only task\"}]\n```",
        ))
        .await;

    let tasks = h
        .orchestrator
        .start_planning(PlanningRequest {
            prompt: "goal".to_string(),
            repo_url: "https://github.com/test/repo".to_string(),
            deadline: None,
        })
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].description, "Only task");
}

#[tokio::test]
async fn unparseable_plan_fails_with_plan_parse_failed() {
    let h = TestHarness::new().await;
    // Both the JSON attempt and the text fallback return prose.
    h.provider
        .push_response(MockProvider::text_response("I would suggest starting with..."))
        .await;
    h.provider
        .push_response(MockProvider::text_response("Still not JSON"))
        .await;

    let err = h
        .orchestrator
        .start_planning(PlanningRequest {
            prompt: "goal".to_string(),
            repo_url: "https://github.com/test/repo".to_string(),
            deadline: None,
        })
        .await
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::PlanParseFailed));
}

// ---------------------------------------------------------------------------
// Refinement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refinement_replaces_the_plan_wholesale() {
    let h = TestHarness::new().await;
    h.provider
        .push_response(MockProvider::text_response(
            r#"[{"description":"Build API"},{"description":"Write tests"}]"#,
        ))
        .await;

    let initial = h
        .orchestrator
        .start_planning(PlanningRequest {
            prompt: "goal".to_string(),
            repo_url: "https://github.com/test/repo".to_string(),
            deadline: None,
        })
        .await
        .unwrap();
    let session_id = initial[0].session_id.clone();

    h.provider
        .push_response(MockProvider::text_response(
            r#"[{"description":"Build API with auth"}]"#,
        ))
        .await;

    let refined = h
        .orchestrator
        .refine_plan(RefineRequest {
            session_id: session_id.clone(),
            refinement_prompt: "add authentication".to_string(),
        })
        .await
        .unwrap();

    // Fresh tasks continue the session's order sequence.
    assert_eq!(refined.len(), 1);
    assert_eq!(refined[0].task_order, 2);

    // The revision prompt contains the comma-joined prior plan.
    let prompts = h.provider.prompts().await;
    assert!(prompts[1].contains("Build API, Write tests"));
    assert!(prompts[1].contains("add authentication"));

    // The snapshot now holds only the new tasks.
    let session = h.store.retrieve_session(&session_id).await.unwrap().unwrap();
    let snapshot: Value = serde_json::from_str(session.raw_plan.as_deref().unwrap()).unwrap();
    assert_eq!(snapshot, serde_json::to_value(&refined).unwrap());
}

#[tokio::test]
async fn refining_a_missing_session_fails() {
    let h = TestHarness::new().await;
    let err = h
        .orchestrator
        .refine_plan(RefineRequest {
            session_id: "ghost".to_string(),
            refinement_prompt: "anything".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::SessionNotFound));
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

async fn confirmed_session_with_task(h: &TestHarness, description: &str) -> String {
    let session = h
        .store
        .create_session(NewSession {
            status: Some(SessionStatus::AwaitingConfirmation),
            deadline: None,
        })
        .await
        .unwrap();
    h.store
        .insert_task(&session.id, description, None)
        .await
        .unwrap();
    session.id
}

#[tokio::test]
async fn execution_runs_tools_until_the_completion_sentinel() {
    let h = TestHarness::new().await;
    let session_id = confirmed_session_with_task(&h, "List the repository contents").await;

    h.provider
        .push_response(MockProvider::tool_call_response(
            "call_1",
            "run_shell_command",
            json!({"command": "ls -l"}),
        ))
        .await;
    h.provider
        .push_response(MockProvider::text_response(TASK_COMPLETE))
        .await;

    let report = h.orchestrator.execute_plan(&session_id).await.unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.log.len(), 2);

    let first = &report.log[0];
    let calls = first.tool_calls.as_ref().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name, "run_shell_command");
    let results = first.tool_results.as_ref().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].tool_call_id, "call_1");
    assert!(results[0].result["stdout"].is_string());

    let last = &report.log[1];
    assert!(last.content.as_deref().unwrap().contains(TASK_COMPLETE));

    let tasks = h.store.list_tasks(&session_id).await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Completed);
    let session = h.store.retrieve_session(&session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
}

#[tokio::test]
async fn expired_deadline_short_circuits_without_model_calls() {
    let h = TestHarness::new().await;
    let session = h
        .store
        .create_session(NewSession {
            status: Some(SessionStatus::AwaitingConfirmation),
            deadline: Some(chrono::Utc::now() - chrono::Duration::seconds(1)),
        })
        .await
        .unwrap();
    h.store
        .insert_task(&session.id, "never runs", None)
        .await
        .unwrap();

    let report = h.orchestrator.execute_plan(&session.id).await.unwrap();

    assert_eq!(report.status, SessionStatus::DeadlineExceeded);
    assert!(report.log.is_empty());
    assert_eq!(h.provider.call_count().await, 0);

    let tasks = h.store.list_tasks(&session.id).await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Pending);
}

#[tokio::test]
async fn unknown_tool_results_keep_the_loop_alive() {
    let h = TestHarness::new().await;
    let session_id = confirmed_session_with_task(&h, "Try something odd").await;

    h.provider
        .push_response(MockProvider::tool_call_response(
            "call_1",
            "unknown_tool",
            json!({}),
        ))
        .await;
    h.provider
        .push_response(MockProvider::text_response(TASK_COMPLETE))
        .await;

    let report = h.orchestrator.execute_plan(&session_id).await.unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(
        report.log[0].tool_results.as_ref().unwrap()[0].result,
        json!({ "error": "Unknown tool: unknown_tool" })
    );
}

#[tokio::test]
async fn executing_an_unconfirmed_session_fails_without_mutation() {
    let h = TestHarness::new().await;
    let session = h
        .store
        .create_session(NewSession {
            status: Some(SessionStatus::Planning),
            deadline: None,
        })
        .await
        .unwrap();

    let err = h.orchestrator.execute_plan(&session.id).await.unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::SessionStateInvalid));

    let unchanged = h.store.retrieve_session(&session.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, SessionStatus::Planning);
    assert_eq!(h.provider.call_count().await, 0);
}

#[tokio::test]
async fn executing_a_missing_session_fails() {
    let h = TestHarness::new().await;
    let err = h.orchestrator.execute_plan("ghost").await.unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::SessionNotFound));
}

#[tokio::test]
async fn tasks_execute_in_plan_order() {
    let h = TestHarness::new().await;
    let session = h
        .store
        .create_session(NewSession {
            status: Some(SessionStatus::AwaitingConfirmation),
            deadline: None,
        })
        .await
        .unwrap();
    h.store.insert_task(&session.id, "first step", None).await.unwrap();
    h.store.insert_task(&session.id, "second step", None).await.unwrap();

    for _ in 0..2 {
        h.provider
            .push_response(MockProvider::text_response(TASK_COMPLETE))
            .await;
    }

    let report = h.orchestrator.execute_plan(&session.id).await.unwrap();
    assert_eq!(report.status, SessionStatus::Completed);

    let prompts = h.provider.prompts().await;
    assert!(prompts[0].contains("first step"));
    assert!(prompts[1].contains("second step"));

    let tasks = h.store.list_tasks(&session.id).await.unwrap();
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));
}

#[tokio::test]
async fn safety_bound_fails_the_task_after_fifty_steps() {
    let h = TestHarness::new().await;
    let session_id = confirmed_session_with_task(&h, "never finishes").await;

    // The mock's default response never contains the sentinel, so the loop
    // runs until the safety fuse trips. That fails the task, not the
    // session: with no pending tasks left, the session completes.
    let report = h.orchestrator.execute_plan(&session_id).await.unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.log.len(), 51);
    assert_eq!(h.provider.call_count().await, 51);

    let tasks = h.store.list_tasks(&session_id).await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Failed);
}

#[tokio::test]
async fn execution_continues_past_a_safety_bound_failure() {
    let h = TestHarness::new().await;
    let session = h
        .store
        .create_session(NewSession {
            status: Some(SessionStatus::AwaitingConfirmation),
            deadline: None,
        })
        .await
        .unwrap();
    h.store
        .insert_task(&session.id, "never finishes", None)
        .await
        .unwrap();
    h.store
        .insert_task(&session.id, "wrap up cleanly", None)
        .await
        .unwrap();

    // The second task's prompts carry its description; answer those with the
    // sentinel. The first task only ever sees the default response and burns
    // through the safety bound.
    h.provider
        .push_pattern("wrap up cleanly", MockProvider::text_response(TASK_COMPLETE))
        .await;

    let report = h.orchestrator.execute_plan(&session.id).await.unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.log.len(), 52);

    let tasks = h.store.list_tasks(&session.id).await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Failed);
    assert_eq!(tasks[1].status, TaskStatus::Completed);
}

#[tokio::test]
async fn react_history_is_persisted_and_resumed() {
    let h = TestHarness::new().await;
    let session_id = confirmed_session_with_task(&h, "long running work").await;

    // Seed three persisted iterations from an earlier run.
    let prior = serde_json::to_string(&json!([
        { "content": "inspected the repo" },
        { "content": "wrote the handler" },
        { "content": "ran the tests" }
    ]))
    .unwrap();
    let task_id = h.store.list_tasks(&session_id).await.unwrap()[0].id.clone();
    h.store
        .update_task(
            &task_id,
            crate::store::TaskPatch {
                react_history: Some(prior),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    h.provider
        .push_response(MockProvider::text_response(TASK_COMPLETE))
        .await;

    let report = h.orchestrator.execute_plan(&session_id).await.unwrap();

    // Only the new entry lands in this run's log.
    assert_eq!(report.log.len(), 1);

    // The resumed prompt showed the seeded history.
    let prompts = h.provider.prompts().await;
    assert!(prompts[0].contains("ran the tests"));

    // The persisted payload now carries all four entries.
    let task = h.store.retrieve_task(&task_id).await.unwrap().unwrap();
    let history: Vec<Value> =
        serde_json::from_str(task.react_history.as_deref().unwrap()).unwrap();
    assert_eq!(history.len(), 4);
}

#[tokio::test]
async fn model_failure_after_retries_fails_task_and_session() {
    let h = TestHarness::new().await;
    let session_id = confirmed_session_with_task(&h, "doomed").await;

    // More transient failures than the harness retry budget (2).
    for _ in 0..4 {
        h.provider.push_error("503 Service Unavailable").await;
    }

    let err = h.orchestrator.execute_plan(&session_id).await.unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::ModelUpstreamFatal));

    let tasks = h.store.list_tasks(&session_id).await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Failed);
    let session = h.store.retrieve_session(&session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
}
