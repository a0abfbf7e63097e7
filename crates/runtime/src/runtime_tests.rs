// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use colony_agent::LifecycleConfig;
use colony_core::test_support::wait_for;
use colony_core::{AgentStatus, Task, TaskStatus};
use std::time::Duration;

fn fast_config() -> RuntimeConfig {
    RuntimeConfig {
        bus_poll_interval: Duration::from_millis(20),
        monitor_interval: Duration::from_millis(50),
        heartbeat_interval: Duration::from_millis(20),
        lifecycle: LifecycleConfig {
            idle_interval: Duration::from_millis(5),
            suspended_poll: Duration::from_millis(10),
            error_backoff: Duration::from_millis(20),
            join_timeout: Duration::from_secs(2),
        },
        ..RuntimeConfig::default()
    }
}

/// Records every `response` the agent receives.
fn collect_responses(agent: &Agent) -> Arc<Mutex<Vec<Message>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    agent.register_handler(MessageKind::Response, move |msg| {
        sink.lock().push(msg.clone());
        Ok(Value::Null)
    });
    seen
}

#[test]
fn new_runtime_is_running_and_empty() {
    let runtime = Runtime::new(fast_config()).unwrap();
    let status = runtime.get_system_status();
    assert!(status.running);
    assert_eq!(status.agent_count, 0);
    assert_eq!(status.message_queue_size, 0);
    assert!(runtime.bus().is_running());
    assert!(runtime.router().is_registered(SYSTEM_AGENT));
}

#[test]
fn spawned_agents_start_and_keep_order() {
    let runtime = Runtime::new(fast_config()).unwrap();
    for id in ["w2", "w1", "w3"] {
        let agent = runtime.spawn_agent(id).unwrap();
        assert!(agent.is_running());
    }
    let ids: Vec<String> = runtime
        .get_all_agents()
        .iter()
        .map(|a| a.id().to_string())
        .collect();
    assert_eq!(ids, vec!["w2", "w1", "w3"]);
    assert_eq!(runtime.get_system_status().agent_count, 3);
    assert!(runtime.get_agent("w1").is_some());
    assert!(runtime.get_agent("nope").is_none());
}

#[test]
fn duplicate_spawn_keeps_original_agent() {
    let runtime = Runtime::new(fast_config()).unwrap();
    let first = runtime.spawn_agent("a").unwrap();
    let err = runtime.spawn_agent("a").err().unwrap();
    assert!(matches!(err, RuntimeError::DuplicateAgent(id) if id == "a"));

    assert!(Arc::ptr_eq(&first, &runtime.get_agent("a").unwrap()));
    assert!(first.is_running());
    assert_eq!(runtime.router().topic_for("a").as_deref(), Some("agent.a"));
}

#[test]
fn task_round_trip_between_agents() {
    let runtime = Runtime::new(fast_config()).unwrap();
    let client = runtime.spawn_agent("client").unwrap();
    runtime.spawn_agent("worker").unwrap();
    let responses = collect_responses(&client);

    assert!(client
        .send_message("worker", MessageKind::Task, json!({"task_id": "t-1"}))
        .unwrap());
    assert!(wait_for(2000, || responses.lock().len() == 1));

    let response = responses.lock()[0].clone();
    assert_eq!(response.sender(), "worker");
    assert_eq!(response.content_str("status"), Some("completed"));
    assert_eq!(
        response.content_str("result"),
        Some("Processed task t-1 successfully")
    );
}

#[test]
fn unregister_stops_agent_and_withdraws_route() {
    let runtime = Runtime::new(fast_config()).unwrap();
    let agent = runtime.spawn_agent("a").unwrap();

    assert!(runtime.unregister_agent("a"));
    assert_eq!(agent.status(), AgentStatus::Terminated);
    assert!(!runtime.router().is_registered("a"));
    assert!(runtime.get_agent("a").is_none());
    assert!(!runtime.unregister_agent("a"));
}

#[test]
fn register_agent_built_elsewhere() {
    let runtime = Runtime::new(fast_config()).unwrap();
    let agent = Agent::new(
        "custom",
        Arc::clone(runtime.router()),
        AgentConfig::named("Custom"),
    );
    runtime.register_agent(Arc::clone(&agent)).unwrap();
    assert_eq!(runtime.get_agent("custom").unwrap().name(), "Custom");
    assert!(runtime.register_agent(agent).is_err());
}

#[test]
fn list_agents_command_replies_to_sender() {
    let runtime = Runtime::new(fast_config()).unwrap();
    let ops = runtime.spawn_agent("ops").unwrap();
    runtime.spawn_agent("w1").unwrap();
    let responses = collect_responses(&ops);

    ops.send_message(SYSTEM_AGENT, MessageKind::System, json!({"command": "list_agents"}))
        .unwrap();
    assert!(wait_for(2000, || responses.lock().len() == 1));

    let reply = responses.lock()[0].clone();
    assert_eq!(reply.sender(), SYSTEM_AGENT);
    assert_eq!(reply.content()["total_count"], 2);
    assert_eq!(reply.content()["agents"][1]["agent_id"], "w1");
}

#[test]
fn agent_status_command_reports_named_agent() {
    let runtime = Runtime::new(fast_config()).unwrap();
    let ops = runtime.spawn_agent("ops").unwrap();
    runtime.spawn_agent("w1").unwrap();
    let responses = collect_responses(&ops);

    ops.send_message(
        SYSTEM_AGENT,
        MessageKind::System,
        json!({"command": "agent_status", "agent_id": "w1"}),
    )
    .unwrap();
    ops.send_message(
        SYSTEM_AGENT,
        MessageKind::System,
        json!({"command": "agent_status", "agent_id": "ghost"}),
    )
    .unwrap();
    assert!(wait_for(2000, || responses.lock().len() == 2));

    let replies = responses.lock().clone();
    assert_eq!(replies[0].content()["agent_id"], "w1");
    assert_eq!(replies[1].content()["status"], "error");
}

#[test]
fn shutdown_all_command_stops_every_agent() {
    let runtime = Runtime::new(fast_config()).unwrap();
    let a = runtime.spawn_agent("a").unwrap();
    let b = runtime.spawn_agent("b").unwrap();

    runtime
        .send_system_message(SYSTEM_AGENT, "shutdown_all", serde_json::Map::new())
        .unwrap();
    assert!(wait_for(2000, || runtime.get_all_agents().is_empty()));
    assert_eq!(a.status(), AgentStatus::Terminated);
    assert_eq!(b.status(), AgentStatus::Terminated);
    // the runtime itself keeps running
    assert!(runtime.is_running());
    assert!(runtime.spawn_agent("c").is_ok());
}

#[test]
fn system_message_controls_agent() {
    let runtime = Runtime::new(fast_config()).unwrap();
    let agent = runtime.spawn_agent("a").unwrap();
    runtime
        .send_system_message("a", "suspend", serde_json::Map::new())
        .unwrap();
    assert!(wait_for(2000, || agent.status() == AgentStatus::Suspended));
    runtime
        .send_system_message("a", "resume", serde_json::Map::new())
        .unwrap();
    assert!(wait_for(2000, || agent.status() == AgentStatus::Active));
}

#[test]
fn monitor_reaps_agents_stopped_out_of_band() {
    let runtime = Runtime::new(fast_config()).unwrap();
    let agent = runtime.spawn_agent("a").unwrap();
    agent.stop();
    assert!(wait_for(2000, || runtime.get_agent("a").is_none()));
}

#[test]
fn planner_allocates_over_registry() {
    let runtime = Runtime::new(fast_config()).unwrap();
    let coordinator = runtime.spawn_agent("coordinator").unwrap();
    runtime.spawn_agent("w1").unwrap();
    runtime.spawn_agent("w2").unwrap();
    let planner = runtime.attach_planner("coordinator").unwrap();

    let plan = planner
        .plan_and_allocate(Task::new("fetch and clean and store", Default::default()))
        .unwrap();
    assert_eq!(plan.subtasks.len(), 3);
    assert_eq!(plan.dispatched, 3);

    let engine = Arc::clone(coordinator.tasks());
    assert!(wait_for(3000, || {
        let tasks = engine.get_all_tasks();
        tasks.len() == 3 && tasks.iter().all(|t| t.status() == TaskStatus::Completed)
    }));
    // workers keep their own completed copy; the coordinator tracks all three
    let remote = plan
        .subtasks
        .iter()
        .filter(|t| t.assigned_agent() != Some(coordinator.id()))
        .count();
    assert_eq!(runtime.system_metrics().completed_tasks, 3 + remote);
}

#[test]
fn attach_planner_needs_known_agent() {
    let runtime = Runtime::new(fast_config()).unwrap();
    assert!(matches!(
        runtime.attach_planner("ghost"),
        Err(RuntimeError::AgentNotFound(_))
    ));
}

#[test]
fn shutdown_is_idempotent_and_final() {
    let runtime = Runtime::new(fast_config()).unwrap();
    let agent = runtime.spawn_agent("a").unwrap();

    runtime.shutdown();
    runtime.shutdown();

    assert!(!runtime.is_running());
    assert!(!runtime.bus().is_running());
    assert_eq!(agent.status(), AgentStatus::Terminated);
    assert!(runtime.get_all_agents().is_empty());
    assert!(!runtime.get_system_status().running);
    assert!(matches!(runtime.spawn_agent("b"), Err(RuntimeError::ShutDown)));
}

#[test]
fn dropping_runtime_stops_bus() {
    let runtime = Runtime::new(fast_config()).unwrap();
    let agent = runtime.spawn_agent("a").unwrap();
    let bus = Arc::clone(runtime.bus());
    drop(runtime);
    assert!(!bus.is_running());
    assert_eq!(agent.status(), AgentStatus::Terminated);
}

#[test]
fn runtimes_are_isolated() {
    let first = Runtime::new(fast_config()).unwrap();
    let second = Runtime::new(fast_config()).unwrap();
    first.spawn_agent("a").unwrap();
    second.spawn_agent("a").unwrap();
    assert_eq!(first.get_system_status().agent_count, 1);
    assert_eq!(second.get_system_status().agent_count, 1);
    first.shutdown();
    assert!(second.get_agent("a").unwrap().is_running());
}
