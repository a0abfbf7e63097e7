//! Task requests and assignments travelling between agents.

use crate::prelude::*;
use colony_agent::HandlerError;
use colony_core::{MessageKind, Priority, Task, TaskResult, TaskStatus};
use serde_json::json;

#[test]
fn task_request_gets_a_response_in_the_same_conversation() {
    let runtime = runtime();
    let client = runtime.spawn_agent("client").unwrap();
    runtime.spawn_agent("worker").unwrap();
    let responses = record(&client, MessageKind::Response);

    client
        .send_message("worker", MessageKind::Task, json!({"task_id": "t-42"}))
        .unwrap();
    assert!(settles_at(&responses, 1));

    let response = &responses.messages()[0];
    assert_eq!(response.sender(), "worker");
    assert_eq!(response.receiver(), "client");
    similar_asserts::assert_eq!(
        serde_json::Value::Object(response.content().clone()),
        json!({
            "task_id": "t-42",
            "result": "Processed task t-42 successfully",
            "status": "completed",
        })
    );
}

#[test]
fn assigned_task_completes_on_the_creator() {
    let runtime = runtime();
    let boss = runtime.spawn_agent("boss").unwrap();
    let worker = runtime.spawn_agent("worker").unwrap();
    worker
        .tasks()
        .register_task_processor("report", |task: &Task| {
            Ok(json!({"pages": task.payload().get("pages").cloned()}))
        });

    let mut payload = serde_json::Map::new();
    payload.insert("task_type".into(), json!("report"));
    payload.insert("pages".into(), json!(3));
    let task = Task::new("quarterly report", payload)
        .with_priority(Priority::High)
        .with_creator("boss")
        .with_assignee("worker");
    let task_id = task.id().clone();
    boss.tasks().track(task.clone());

    assert!(boss
        .send_message("worker", MessageKind::TaskAssignment, json!({"task": task.to_value()}))
        .unwrap());

    let engine = boss.tasks();
    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        engine
            .get_task_status(task_id.as_str())
            .is_some_and(|t| t.status() == TaskStatus::Completed)
    }));
    let done = engine.get_task_status(task_id.as_str()).unwrap();
    assert_eq!(done.result(), Some(&TaskResult::Success(json!({"pages": 3}))));
    assert_eq!(
        worker.tasks().get_task_status(task_id.as_str()).unwrap().status(),
        TaskStatus::Completed
    );
}

#[test]
fn failing_processor_fails_the_creator_copy() {
    let runtime = runtime();
    let boss = runtime.spawn_agent("boss").unwrap();
    let worker = runtime.spawn_agent("worker").unwrap();
    worker.tasks().register_task_processor("flaky", |_: &Task| {
        Err(HandlerError::failed("disk full"))
    });

    let mut payload = serde_json::Map::new();
    payload.insert("task_type".into(), json!("flaky"));
    let task = Task::new("write logs", payload)
        .with_creator("boss")
        .with_assignee("worker");
    let task_id = task.id().clone();
    boss.tasks().track(task.clone());
    boss.send_message("worker", MessageKind::TaskAssignment, json!({"task": task.to_value()}))
        .unwrap();

    let engine = boss.tasks();
    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        engine
            .get_task_status(task_id.as_str())
            .is_some_and(|t| t.status() == TaskStatus::Failed)
    }));
    let failed = engine.get_task_status(task_id.as_str()).unwrap();
    assert!(failed.error().unwrap().contains("disk full"));
    assert_eq!(runtime.system_metrics().failed_tasks, 2);
}
