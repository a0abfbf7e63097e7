//! The runtime's own inbox and its reporting surface.

use crate::prelude::*;
use colony_core::{AgentStatus, MessageKind};
use colony_runtime::SYSTEM_AGENT;
use serde_json::json;

#[test]
fn operator_can_list_inspect_and_stop_the_colony() {
    let runtime = runtime();
    let operator = runtime.spawn_agent("operator").unwrap();
    let worker = runtime.spawn_agent("worker").unwrap();
    let replies = record(&operator, MessageKind::Response);

    operator
        .send_message(SYSTEM_AGENT, MessageKind::System, json!({"command": "list_agents"}))
        .unwrap();
    assert!(settles_at(&replies, 1));
    let listing = replies.messages()[0].content().clone();
    assert_eq!(listing["total_count"], 2);
    let ids: Vec<_> = listing["agents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["agent_id"].as_str().unwrap().to_string())
        .collect();
    similar_asserts::assert_eq!(ids, vec!["operator", "worker"]);

    operator
        .send_message(
            SYSTEM_AGENT,
            MessageKind::System,
            json!({"command": "agent_status", "agent_id": "worker"}),
        )
        .unwrap();
    assert!(settles_at(&replies, 2));
    let status = replies.messages()[1].content().clone();
    assert_eq!(status["agent_id"], "worker");
    assert_eq!(status["status"], "active");

    operator
        .send_message(SYSTEM_AGENT, MessageKind::System, json!({"command": "shutdown_all"}))
        .unwrap();
    assert!(wait_for(SPEC_WAIT_MAX_MS, || runtime.get_all_agents().is_empty()));
    assert_eq!(worker.status(), AgentStatus::Terminated);
    assert!(runtime.is_running());
}

#[test]
fn unknown_runtime_command_is_answered_with_an_error() {
    let runtime = runtime();
    let operator = runtime.spawn_agent("operator").unwrap();
    let replies = record(&operator, MessageKind::Response);

    operator
        .send_message(SYSTEM_AGENT, MessageKind::System, json!({"command": "reboot"}))
        .unwrap();
    assert!(settles_at(&replies, 1));
    let reply = &replies.messages()[0];
    assert_eq!(reply.content()["status"], "error");
    assert_eq!(reply.content()["message"], "Unknown command: reboot");
}

#[test]
fn report_counts_work_done_by_each_agent() {
    let runtime = runtime();
    let client = runtime.spawn_agent("client").unwrap();
    runtime.spawn_agent("worker").unwrap();
    let planner = runtime.attach_planner("client").unwrap();
    planner
        .plan_and_allocate(colony_core::Task::new("one and two", Default::default()))
        .unwrap();
    let engine = client.tasks();
    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        engine.get_all_tasks().iter().all(|t| t.is_terminal())
    }));

    let report = runtime.generate_report();
    assert_eq!(report.system.total_agents, 2);
    assert_eq!(report.agents.len(), 2);
    assert_eq!(report.agents[0].agent_id, "client");
    assert_eq!(report.agents[0].task_count, 2);
    assert_eq!(report.agents[0].completed_tasks, 2);
    assert_eq!(report.system.failed_tasks, 0);

    let status = runtime.get_system_status();
    assert_eq!(status.agent_count, 2);
    assert!(status.running);
    assert_eq!(status.broadcast_subscribers, 2);
}
