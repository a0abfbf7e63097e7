//! Planning requests decomposed on one agent and carried out by others.

use crate::prelude::*;
use colony_agent::{Agent, RoundRobin, DATA_PROCESSING};
use colony_core::{AgentId, AgentStatus, MessageKind, Task, TaskStatus};
use serde_json::json;

fn all_completed(agent: &Agent, expected: usize) -> bool {
    let tasks = agent.tasks().get_all_tasks();
    tasks.len() == expected && tasks.iter().all(|t| t.status() == TaskStatus::Completed)
}

fn assignees(tasks: &[Task]) -> Vec<String> {
    tasks
        .iter()
        .map(|t| t.assigned_agent().map(|a| a.to_string()).unwrap_or_default())
        .collect()
}

#[test]
fn planning_request_over_the_bus_runs_every_subtask() {
    let runtime = runtime();
    let requester = runtime.spawn_agent("requester").unwrap();
    let coordinator = runtime.spawn_agent("coordinator").unwrap();
    runtime.spawn_agent("w1").unwrap();
    runtime.attach_planner("coordinator").unwrap();

    assert!(requester
        .send_message(
            "coordinator",
            MessageKind::TaskPlanningRequest,
            json!({"task": {"task_id": "job-1", "description": "fetch and clean"}}),
        )
        .unwrap());

    assert!(wait_for(SPEC_WAIT_MAX_MS, || all_completed(&coordinator, 2)));
    let descriptions: Vec<String> = coordinator
        .tasks()
        .get_all_tasks()
        .iter()
        .map(|t| t.description().to_string())
        .collect();
    similar_asserts::assert_eq!(descriptions, vec!["fetch", "clean"]);
}

#[test]
fn data_processing_becomes_a_three_stage_pipeline() {
    let runtime = runtime();
    let coordinator = runtime.spawn_agent("coordinator").unwrap();
    for id in ["w1", "w2"] {
        let config = runtime
            .agent_config(&AgentId::new(id))
            .with_capabilities([DATA_PROCESSING]);
        runtime.spawn_agent_with(id, config).unwrap();
    }
    let planner = runtime.attach_planner("coordinator").unwrap();

    let mut payload = serde_json::Map::new();
    payload.insert("task_type".into(), json!(DATA_PROCESSING));
    payload.insert("source".into(), json!("in.csv"));
    payload.insert("processor".into(), json!("dedupe"));
    payload.insert("destination".into(), json!("out.csv"));
    let plan = planner.plan_and_allocate(Task::new("import", payload)).unwrap();

    let operations: Vec<_> = plan
        .subtasks
        .iter()
        .map(|t| t.payload()["operation"].clone())
        .collect();
    assert_eq!(operations, vec![json!("read"), json!("process"), json!("write")]);
    assert_eq!(plan.subtasks[1].dependencies(), &[plan.subtasks[0].id().clone()]);
    assert_eq!(plan.subtasks[2].dependencies(), &[plan.subtasks[1].id().clone()]);
    assert_eq!(plan.dispatched, 3);
    assert!(wait_for(SPEC_WAIT_MAX_MS, || all_completed(&coordinator, 3)));
}

#[test]
fn round_robin_cursor_carries_across_plans() {
    let runtime = runtime();
    runtime.spawn_agent("coordinator").unwrap();
    runtime.spawn_agent("w1").unwrap();
    runtime.spawn_agent("w2").unwrap();
    let planner = runtime.attach_planner("coordinator").unwrap();
    planner.set_allocation_strategy(RoundRobin::new());

    let first = planner
        .plan_and_allocate(Task::new("a and b", Default::default()))
        .unwrap();
    let second = planner
        .plan_and_allocate(Task::new("c and d", Default::default()))
        .unwrap();

    assert_eq!(assignees(&first.subtasks), vec!["coordinator", "w1"]);
    assert_eq!(assignees(&second.subtasks), vec!["w2", "coordinator"]);
}

#[test]
fn suspended_agents_get_no_work() {
    let runtime = runtime();
    let coordinator = runtime.spawn_agent("coordinator").unwrap();
    let resting = runtime.spawn_agent("resting").unwrap();
    runtime.spawn_agent("w1").unwrap();
    assert!(resting.suspend());
    assert_eq!(resting.status(), AgentStatus::Suspended);
    let planner = runtime.attach_planner("coordinator").unwrap();
    planner.set_allocation_strategy(RoundRobin::new());

    let plan = planner
        .plan_and_allocate(Task::new("x and y and z", Default::default()))
        .unwrap();
    assert_eq!(assignees(&plan.subtasks), vec!["coordinator", "w1", "coordinator"]);
    assert!(resting.tasks().get_all_tasks().is_empty());
    assert!(wait_for(SPEC_WAIT_MAX_MS, || all_completed(&coordinator, 3)));
}

#[test]
fn planner_settles_subtasks_of_a_foreign_task() {
    let runtime = runtime();
    let client = runtime.spawn_agent("client").unwrap();
    let coordinator = runtime.spawn_agent("coordinator").unwrap();
    runtime.spawn_agent("w1").unwrap();
    let outcomes = record(&client, MessageKind::TaskCompletion);
    let planner = runtime.attach_planner("coordinator").unwrap();
    planner.set_allocation_strategy(RoundRobin::new());

    let mut payload = serde_json::Map::new();
    payload.insert("task_type".into(), json!(DATA_PROCESSING));
    payload.insert("source".into(), json!("in.csv"));
    let plan = planner
        .plan_and_allocate(Task::new("import", payload).with_creator("client"))
        .unwrap();
    assert_eq!(assignees(&plan.subtasks), vec!["client", "coordinator", "w1"]);

    assert!(wait_for(SPEC_WAIT_MAX_MS, || all_completed(&coordinator, 3)));
    assert_eq!(coordinator.tasks().load(), 0);
    assert!(settles_at(&outcomes, 3));
}
