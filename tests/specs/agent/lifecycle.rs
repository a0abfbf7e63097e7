//! Agent lifecycle as seen from other agents.

use crate::prelude::*;
use colony_core::test_support::Recorder;
use colony_core::{AgentStatus, MessageKind};
use serde_json::json;

fn ask_task(from: &colony_agent::Agent, to: &str, task_id: &str) -> bool {
    from.send_message(to, MessageKind::Task, json!({"task_id": task_id}))
        .unwrap()
}

#[test]
fn stopped_agent_answers_nothing() {
    let runtime = runtime();
    let client = runtime.spawn_agent("client").unwrap();
    let worker = runtime.spawn_agent("worker").unwrap();
    let responses = record(&client, MessageKind::Response);

    assert!(ask_task(&client, "worker", "before"));
    assert!(settles_at(&responses, 1));

    assert!(worker.stop());
    assert_eq!(worker.status(), AgentStatus::Terminated);
    // the monitor may already have withdrawn the route
    ask_task(&client, "worker", "after");
    assert!(settles_at(&responses, 1));
    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        runtime.get_agent("worker").is_none() && !runtime.router().is_registered("worker")
    }));
}

#[test]
fn shutdown_command_stops_the_worker_thread() {
    let runtime = runtime();
    let ops = runtime.spawn_agent("ops").unwrap();
    let worker = runtime.spawn_agent("worker").unwrap();

    ops.send_message("worker", MessageKind::System, json!({"command": "shutdown"}))
        .unwrap();
    assert!(wait_for(SPEC_WAIT_MAX_MS, || worker.status() == AgentStatus::Terminated));
    assert!(!worker.is_running());
}

#[test]
fn suspended_agent_still_takes_messages_and_resumes() {
    let runtime = runtime();
    let client = runtime.spawn_agent("client").unwrap();
    let worker = runtime.spawn_agent("worker").unwrap();
    let responses = record(&client, MessageKind::Response);

    client
        .send_message("worker", MessageKind::System, json!({"command": "suspend"}))
        .unwrap();
    assert!(wait_for(SPEC_WAIT_MAX_MS, || worker.status() == AgentStatus::Suspended));

    assert!(ask_task(&client, "worker", "while-suspended"));
    assert!(settles_at(&responses, 1));
    assert_eq!(worker.status(), AgentStatus::Suspended);

    client
        .send_message("worker", MessageKind::System, json!({"command": "resume"}))
        .unwrap();
    assert!(wait_for(SPEC_WAIT_MAX_MS, || worker.status() == AgentStatus::Active));
}

#[test]
fn running_agents_keep_a_heartbeat() {
    let runtime = runtime();
    let worker = runtime.spawn_agent("worker").unwrap();
    assert!(wait_for(SPEC_WAIT_MAX_MS, || worker.last_heartbeat().is_some()));
    let first = worker.last_heartbeat().unwrap();
    assert!(wait_for(SPEC_WAIT_MAX_MS, || worker.last_heartbeat().unwrap() > first));
    assert!(runtime.check_health().warnings.is_empty());
}

#[test]
fn unregistered_agent_leaves_broadcasts_too() {
    let runtime = runtime();
    let herald = runtime.spawn_agent("herald").unwrap();
    let stays = record(&runtime.spawn_agent("stays").unwrap(), MessageKind::Broadcast);
    let leaves_agent = runtime.spawn_agent("leaves").unwrap();
    let leaves: Recorder = record(&leaves_agent, MessageKind::Broadcast);
    let before = runtime.bus().broadcast_subscriber_count();

    assert!(runtime.unregister_agent("leaves"));
    assert_eq!(runtime.bus().broadcast_subscriber_count(), before - 1);

    herald
        .send_message("broadcast", MessageKind::Broadcast, json!({"text": "roll call"}))
        .unwrap();
    assert!(settles_at(&stays, 1));
    assert!(leaves.is_empty());
}
