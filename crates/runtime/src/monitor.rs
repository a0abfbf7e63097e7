// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution monitor: periodic health checks over the agent registry.
//!
//! Each pass reads queue depth, heartbeats and task counts, logs a warning
//! per finding and reaps TERMINATED agents from the registry and the router.

use crate::registry::AgentRegistry;
use colony_bus::PubSubBus;
use colony_core::{
    catch_panic, join_with_timeout, AgentId, AgentStatus, Clock, JoinError, Priority, StopSignal,
    SystemClock, TaskStatus,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Thresholds for one health pass.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub queue_warning_threshold: usize,
    pub heartbeat_timeout: Duration,
    pub failure_rate_threshold: f64,
    pub high_priority_threshold: usize,
    pub join_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            queue_warning_threshold: 100,
            heartbeat_timeout: Duration::from_secs(30),
            failure_rate_threshold: 0.1,
            high_priority_threshold: 10,
            join_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemMetrics {
    pub total_agents: usize,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub high_priority_tasks: usize,
    pub uptime_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentMetrics {
    pub agent_id: AgentId,
    pub status: AgentStatus,
    pub task_count: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub last_heartbeat: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorReport {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub system: SystemMetrics,
    pub agents: Vec<AgentMetrics>,
}

/// One finding from a health pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthWarning {
    QueueDepth { size: usize },
    StaleHeartbeat { agent_id: AgentId, silent_ms: u64 },
    FailureRate { failed: usize, total: usize },
    HighPriorityBacklog { count: usize },
}

impl fmt::Display for HealthWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthWarning::QueueDepth { size } => write!(f, "message queue size is high: {size}"),
            HealthWarning::StaleHeartbeat { agent_id, silent_ms } => {
                write!(f, "agent {agent_id} has no heartbeat for {silent_ms}ms")
            }
            HealthWarning::FailureRate { failed, total } => {
                write!(f, "high task failure rate: {failed}/{total}")
            }
            HealthWarning::HighPriorityBacklog { count } => {
                write!(f, "high number of high priority tasks: {count}")
            }
        }
    }
}

/// Outcome of [`ExecutionMonitor::check`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthReport {
    pub warnings: Vec<HealthWarning>,
    pub reaped: Vec<AgentId>,
}

pub struct ExecutionMonitor<C: Clock = SystemClock> {
    registry: Arc<AgentRegistry>,
    bus: Arc<PubSubBus>,
    config: MonitorConfig,
    clock: C,
    started: Instant,
}

impl<C: Clock> ExecutionMonitor<C> {
    pub fn new(
        registry: Arc<AgentRegistry>,
        bus: Arc<PubSubBus>,
        config: MonitorConfig,
        clock: C,
    ) -> Self {
        let started = clock.now();
        Self {
            registry,
            bus,
            config,
            clock,
            started,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run one health pass.
    pub fn check(&self) -> HealthReport {
        let mut warnings = Vec::new();

        let size = self.bus.queue_len();
        if size > self.config.queue_warning_threshold {
            warnings.push(HealthWarning::QueueDepth { size });
        }

        let now = self.clock.epoch_ms();
        let timeout = self.config.heartbeat_timeout.as_millis() as u64;
        for agent in self.registry.all() {
            if !agent.is_running() {
                continue;
            }
            // Not ticked yet.
            let Some(last) = agent.last_heartbeat() else {
                continue;
            };
            let silent_ms = now.saturating_sub(last);
            if silent_ms > timeout {
                warnings.push(HealthWarning::StaleHeartbeat {
                    agent_id: agent.id().clone(),
                    silent_ms,
                });
            }
        }

        let metrics = self.system_metrics();
        if metrics.total_tasks > 0
            && metrics.failed_tasks as f64 > metrics.total_tasks as f64 * self.config.failure_rate_threshold
        {
            warnings.push(HealthWarning::FailureRate {
                failed: metrics.failed_tasks,
                total: metrics.total_tasks,
            });
        }
        if metrics.high_priority_tasks > self.config.high_priority_threshold {
            warnings.push(HealthWarning::HighPriorityBacklog {
                count: metrics.high_priority_tasks,
            });
        }

        for warning in &warnings {
            tracing::warn!(%warning, "health check");
        }

        let reaped: Vec<AgentId> = self
            .registry
            .reap_terminated()
            .into_iter()
            .map(|agent| {
                agent.detach();
                tracing::info!(agent_id = %agent.id(), "removed terminated agent");
                agent.id().clone()
            })
            .collect();

        tracing::debug!(
            agents = metrics.total_agents,
            tasks = metrics.total_tasks,
            queue = size,
            "system metrics"
        );
        HealthReport { warnings, reaped }
    }

    pub fn system_metrics(&self) -> SystemMetrics {
        let agents = self.registry.all();
        let mut metrics = SystemMetrics {
            total_agents: agents.len(),
            uptime_secs: self.clock.now().duration_since(self.started).as_secs_f64(),
            ..SystemMetrics::default()
        };
        for agent in &agents {
            for task in agent.tasks().get_all_tasks() {
                metrics.total_tasks += 1;
                match task.status() {
                    TaskStatus::Completed => metrics.completed_tasks += 1,
                    TaskStatus::Failed => metrics.failed_tasks += 1,
                    _ => {}
                }
                if task.priority() >= Priority::High {
                    metrics.high_priority_tasks += 1;
                }
            }
        }
        metrics
    }

    pub fn agent_metrics(&self, agent_id: &str) -> Option<AgentMetrics> {
        let agent = self.registry.get(agent_id)?;
        let tasks = agent.tasks().get_all_tasks();
        let count = |status: TaskStatus| tasks.iter().filter(|t| t.status() == status).count();
        Some(AgentMetrics {
            agent_id: agent.id().clone(),
            status: agent.status(),
            task_count: tasks.len(),
            completed_tasks: count(TaskStatus::Completed),
            failed_tasks: count(TaskStatus::Failed),
            last_heartbeat: agent.last_heartbeat(),
        })
    }

    pub fn generate_report(&self) -> MonitorReport {
        let agents = self
            .registry
            .ids()
            .iter()
            .filter_map(|id| self.agent_metrics(id.as_str()))
            .collect();
        MonitorReport {
            timestamp: chrono::Utc::now(),
            system: self.system_metrics(),
            agents,
        }
    }
}

/// Running monitor thread.
pub struct MonitorHandle {
    stop: StopSignal,
    thread: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl MonitorHandle {
    /// Start checking every `interval` until stopped.
    pub fn spawn<C>(monitor: Arc<ExecutionMonitor<C>>) -> std::io::Result<Self>
    where
        C: Clock + 'static,
    {
        let stop = StopSignal::new();
        let signal = stop.clone();
        let interval = monitor.config.interval;
        let join_timeout = monitor.config.join_timeout;
        let thread = std::thread::Builder::new()
            .name("colony-monitor".to_string())
            .spawn(move || {
                tracing::info!("runtime monitor started");
                while !signal.wait(interval) {
                    if let Err(panic) = catch_panic(|| monitor.check()) {
                        tracing::error!(%panic, "health check panicked");
                    }
                }
                tracing::debug!("runtime monitor exiting");
            })?;
        Ok(Self {
            stop,
            thread: Some(thread),
            join_timeout,
        })
    }

    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn stop(&mut self) {
        self.stop.trigger();
        let Some(thread) = self.thread.take() else {
            return;
        };
        match join_with_timeout(thread, self.join_timeout) {
            Ok(()) => tracing::info!("runtime monitor stopped"),
            Err(JoinError::TimedOut(after)) => {
                tracing::warn!(?after, "monitor did not exit in time")
            }
            Err(e) => tracing::error!(error = %e, "monitor join failed"),
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop.trigger();
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
