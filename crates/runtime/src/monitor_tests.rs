// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use colony_agent::{Agent, AgentConfig, HEARTBEAT_KEY};
use colony_bus::MessageRouter;
use colony_core::test_support::{message, task, wait_for};
use colony_core::{FakeClock, Task};
use serde_json::json;

struct Fixture {
    registry: Arc<AgentRegistry>,
    bus: Arc<PubSubBus>,
    router: Arc<MessageRouter>,
}

fn fixture() -> Fixture {
    let bus = Arc::new(PubSubBus::default());
    Fixture {
        registry: Arc::new(AgentRegistry::new()),
        router: Arc::new(MessageRouter::new(Arc::clone(&bus))),
        bus,
    }
}

impl Fixture {
    fn monitor(&self, config: MonitorConfig) -> ExecutionMonitor {
        ExecutionMonitor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.bus),
            config,
            SystemClock,
        )
    }

    fn agent(&self, id: &str, config: AgentConfig) -> Arc<Agent> {
        let agent = Agent::new(id, Arc::clone(&self.router), config);
        self.registry.insert(Arc::clone(&agent)).unwrap();
        agent
    }
}

fn finished(id: &str, status: TaskStatus) -> Task {
    let mut t = task(id, "default");
    match status {
        TaskStatus::Completed => t.complete(json!("ok")).unwrap(),
        TaskStatus::Failed => t.fail("boom").unwrap(),
        _ => {}
    }
    t
}

#[test]
fn quiet_system_has_no_warnings() {
    let f = fixture();
    f.agent("a", AgentConfig::default());
    let report = f.monitor(MonitorConfig::default()).check();
    assert_eq!(report, HealthReport::default());
}

#[test]
fn warns_on_deep_queue() {
    let f = fixture();
    for _ in 0..3 {
        f.bus
            .publish("idle.topic", message("x", "y", "ping", json!({})))
            .unwrap();
    }
    let monitor = f.monitor(MonitorConfig {
        queue_warning_threshold: 2,
        ..MonitorConfig::default()
    });
    assert_eq!(
        monitor.check().warnings,
        vec![HealthWarning::QueueDepth { size: 3 }]
    );
}

#[test]
fn warns_on_stale_heartbeat_of_running_agent() {
    let f = fixture();
    let config = AgentConfig {
        heartbeat_interval: Duration::from_secs(3600),
        ..AgentConfig::default()
    };
    let agent = f.agent("slow", config);
    let minute_ago = SystemClock.epoch_ms() - 60_000;
    agent.state().set(HEARTBEAT_KEY, json!(minute_ago)).unwrap();
    agent.start().unwrap();

    let report = f.monitor(MonitorConfig::default()).check();
    assert_eq!(report.warnings.len(), 1);
    assert!(matches!(
        &report.warnings[0],
        HealthWarning::StaleHeartbeat { agent_id, silent_ms }
            if agent_id == "slow" && *silent_ms >= 60_000
    ));
    agent.stop();
}

#[test]
fn idle_agents_are_not_checked_for_heartbeats() {
    let f = fixture();
    let agent = f.agent("idle", AgentConfig::default());
    agent.state().set(HEARTBEAT_KEY, json!(0)).unwrap();
    assert!(f.monitor(MonitorConfig::default()).check().warnings.is_empty());
}

#[test]
fn warns_on_failure_rate_and_priority_backlog() {
    let f = fixture();
    let agent = f.agent("a", AgentConfig::default());
    agent.tasks().track(finished("ok-1", TaskStatus::Completed));
    agent.tasks().track(finished("bad-1", TaskStatus::Failed));
    for i in 0..3 {
        agent
            .tasks()
            .track(task(&format!("hot-{i}"), "default").with_priority(Priority::Urgent));
    }

    let monitor = f.monitor(MonitorConfig {
        high_priority_threshold: 2,
        ..MonitorConfig::default()
    });
    assert_eq!(
        monitor.check().warnings,
        vec![
            HealthWarning::FailureRate { failed: 1, total: 5 },
            HealthWarning::HighPriorityBacklog { count: 3 },
        ]
    );
}

#[test]
fn reaps_terminated_agents() {
    let f = fixture();
    f.agent("keep", AgentConfig::default());
    let gone = f.agent("gone", AgentConfig::default());
    gone.stop();

    let report = f.monitor(MonitorConfig::default()).check();
    assert_eq!(report.reaped, vec!["gone"]);
    assert_eq!(f.registry.ids(), vec!["keep"]);
    assert!(!f.router.is_registered("gone"));
    assert!(f.router.is_registered("keep"));
}

#[test]
fn metrics_count_tasks_per_agent() {
    let f = fixture();
    let a = f.agent("a", AgentConfig::default());
    let b = f.agent("b", AgentConfig::default());
    a.tasks().track(finished("a1", TaskStatus::Completed));
    a.tasks().track(finished("a2", TaskStatus::Failed));
    b.tasks().track(task("b1", "default").with_priority(Priority::High));

    let monitor = ExecutionMonitor::new(
        Arc::clone(&f.registry),
        Arc::clone(&f.bus),
        MonitorConfig::default(),
        FakeClock::new(),
    );
    let system = monitor.system_metrics();
    assert_eq!(
        system,
        SystemMetrics {
            total_agents: 2,
            total_tasks: 3,
            completed_tasks: 1,
            failed_tasks: 1,
            high_priority_tasks: 1,
            uptime_secs: 0.0,
        }
    );

    let metrics = monitor.agent_metrics("a").unwrap();
    assert_eq!(metrics.task_count, 2);
    assert_eq!(metrics.completed_tasks, 1);
    assert_eq!(metrics.failed_tasks, 1);
    assert_eq!(metrics.status, AgentStatus::Idle);
    assert!(monitor.agent_metrics("ghost").is_none());

    let report = monitor.generate_report();
    let ids: Vec<&str> = report.agents.iter().map(|m| m.agent_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[test]
fn uptime_follows_clock() {
    let f = fixture();
    let clock = FakeClock::new();
    let monitor = ExecutionMonitor::new(
        Arc::clone(&f.registry),
        Arc::clone(&f.bus),
        MonitorConfig::default(),
        clock.clone(),
    );
    clock.advance(Duration::from_secs(90));
    assert_eq!(monitor.system_metrics().uptime_secs, 90.0);
}

#[test]
fn thread_runs_checks_until_stopped() {
    let f = fixture();
    let gone = f.agent("gone", AgentConfig::default());
    gone.stop();

    let monitor = Arc::new(f.monitor(MonitorConfig {
        interval: Duration::from_millis(10),
        ..MonitorConfig::default()
    }));
    let mut handle = MonitorHandle::spawn(monitor).unwrap();
    assert!(wait_for(2000, || f.registry.is_empty()));
    assert!(handle.is_alive());

    handle.stop();
    assert!(!handle.is_alive());
}

#[test]
fn warnings_render_for_logs() {
    let warning = HealthWarning::StaleHeartbeat {
        agent_id: AgentId::new("w1"),
        silent_ms: 45_000,
    };
    assert_eq!(warning.to_string(), "agent w1 has no heartbeat for 45000ms");
}
