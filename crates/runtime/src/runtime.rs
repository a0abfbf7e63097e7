// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The runtime: one bus, one router, the agent registry and the monitor.
//!
//! Several runtimes can live in one process; nothing here is global. The
//! runtime answers `system` messages addressed to [`SYSTEM_AGENT`] on the
//! `system.runtime` topic (`list_agents`, `agent_status`, `shutdown_all`).

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::monitor::{
    AgentMetrics, ExecutionMonitor, HealthReport, MonitorConfig, MonitorHandle, MonitorReport,
    SystemMetrics,
};
use crate::registry::AgentRegistry;
use chrono::{DateTime, Utc};
use colony_agent::{Agent, AgentConfig, AgentDirectory, TaskPlanner};
use colony_bus::{DeliveryError, MessageRouter, PubSubBus};
use colony_core::{AgentId, Message, MessageKind, SystemClock};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Address of the runtime itself.
pub const SYSTEM_AGENT: &str = "system";
pub const SYSTEM_TOPIC: &str = "system.runtime";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatus {
    pub agent_count: usize,
    pub message_queue_size: usize,
    pub running: bool,
    pub broadcast_subscribers: usize,
    pub timestamp: DateTime<Utc>,
}

/// One row of the `list_agents` reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSummary {
    pub agent_id: AgentId,
    pub name: String,
    pub status: colony_core::AgentStatus,
}

pub struct Runtime {
    config: RuntimeConfig,
    bus: Arc<PubSubBus>,
    router: Arc<MessageRouter>,
    registry: Arc<AgentRegistry>,
    monitor: Arc<ExecutionMonitor>,
    monitor_thread: Mutex<Option<MonitorHandle>>,
    running: AtomicBool,
}

impl Runtime {
    /// Start the bus and the monitor and register the system endpoint.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let bus = Arc::new(PubSubBus::new(config.bus_config()));
        bus.start()?;
        let router = Arc::new(MessageRouter::new(Arc::clone(&bus)));
        let registry = Arc::new(AgentRegistry::new());

        let monitor = Arc::new(ExecutionMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&bus),
            MonitorConfig {
                interval: config.monitor_interval,
                queue_warning_threshold: config.queue_warning_threshold,
                heartbeat_timeout: config.heartbeat_timeout,
                failure_rate_threshold: config.failure_rate_threshold,
                high_priority_threshold: config.high_priority_threshold,
                ..MonitorConfig::default()
            },
            SystemClock,
        ));
        let monitor_thread = match MonitorHandle::spawn(Arc::clone(&monitor)) {
            Ok(handle) => handle,
            Err(e) => {
                bus.stop();
                return Err(RuntimeError::Spawn(e));
            }
        };

        let endpoint = SystemEndpoint {
            registry: Arc::downgrade(&registry),
            router: Arc::downgrade(&router),
        };
        router.register_agent(SYSTEM_AGENT, SYSTEM_TOPIC, move |msg: &Message| {
            endpoint.handle(msg)
        });

        tracing::info!(
            queue_capacity = config.queue_capacity,
            monitor_interval = ?config.monitor_interval,
            "runtime started"
        );
        Ok(Self {
            config,
            bus,
            router,
            registry,
            monitor,
            monitor_thread: Mutex::new(Some(monitor_thread)),
            running: AtomicBool::new(true),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<PubSubBus> {
        &self.bus
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn monitor(&self) -> &Arc<ExecutionMonitor> {
        &self.monitor
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<(), RuntimeError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(RuntimeError::ShutDown)
        }
    }

    /// Agent settings derived from the runtime config.
    pub fn agent_config(&self, agent_id: &AgentId) -> AgentConfig {
        self.config.agent_config(agent_id)
    }

    /// Build, register and start an agent with the runtime's defaults.
    pub fn spawn_agent(&self, id: impl Into<AgentId>) -> Result<Arc<Agent>, RuntimeError> {
        let id = id.into();
        let config = self.agent_config(&id);
        self.spawn_agent_with(id, config)
    }

    /// Build, register and start an agent with explicit settings.
    pub fn spawn_agent_with(
        &self,
        id: impl Into<AgentId>,
        config: AgentConfig,
    ) -> Result<Arc<Agent>, RuntimeError> {
        self.ensure_running()?;
        let id = id.into();
        let agent = self.registry.insert_with(&id, || {
            Agent::new(id.clone(), Arc::clone(&self.router), config)
        })?;
        if let Err(e) = agent.start() {
            self.registry.remove(id.as_str());
            agent.detach();
            return Err(e.into());
        }
        tracing::info!(agent_id = %id, name = %agent.name(), "registered agent");
        Ok(agent)
    }

    /// Register an agent built elsewhere on this runtime's router.
    pub fn register_agent(&self, agent: Arc<Agent>) -> Result<(), RuntimeError> {
        self.ensure_running()?;
        let id = agent.id().clone();
        self.registry.insert(agent)?;
        tracing::info!(agent_id = %id, "registered agent");
        Ok(())
    }

    /// Stop the agent and withdraw its routes. Returns whether it was known.
    pub fn unregister_agent(&self, agent_id: &str) -> bool {
        let Some(agent) = self.registry.remove(agent_id) else {
            return false;
        };
        agent.detach();
        tracing::info!(%agent_id, "unregistered agent");
        true
    }

    pub fn get_agent(&self, agent_id: &str) -> Option<Arc<Agent>> {
        self.registry.get(agent_id)
    }

    /// Every registered agent, in registration order.
    pub fn get_all_agents(&self) -> Vec<Arc<Agent>> {
        self.registry.all()
    }

    /// Attach a planner to `agent_id` that allocates over this registry.
    pub fn attach_planner(&self, agent_id: &str) -> Result<Arc<TaskPlanner>, RuntimeError> {
        let agent = self
            .get_agent(agent_id)
            .ok_or_else(|| RuntimeError::AgentNotFound(agent_id.to_string()))?;
        let directory = Arc::clone(&self.registry) as Arc<dyn AgentDirectory>;
        Ok(agent.attach_planner(directory))
    }

    /// Send a `system` command from the runtime.
    pub fn send_system_message(
        &self,
        receiver: &str,
        command: &str,
        mut content: serde_json::Map<String, Value>,
    ) -> Result<bool, RuntimeError> {
        content.insert("command".to_string(), Value::from(command));
        let message = Message::new(SYSTEM_AGENT, receiver, MessageKind::System, Value::Object(content))
            .map_err(colony_bus::BusError::from)?;
        Ok(self.router.route_message(message)?)
    }

    pub fn get_system_status(&self) -> SystemStatus {
        SystemStatus {
            agent_count: self.registry.len(),
            message_queue_size: self.bus.queue_len(),
            running: self.is_running(),
            broadcast_subscribers: self.bus.broadcast_subscriber_count(),
            timestamp: Utc::now(),
        }
    }

    pub fn system_metrics(&self) -> SystemMetrics {
        self.monitor.system_metrics()
    }

    pub fn agent_metrics(&self, agent_id: &str) -> Option<AgentMetrics> {
        self.monitor.agent_metrics(agent_id)
    }

    pub fn generate_report(&self) -> MonitorReport {
        self.monitor.generate_report()
    }

    /// Run one health pass now, outside the monitor's schedule.
    pub fn check_health(&self) -> HealthReport {
        self.monitor.check()
    }

    /// Stop the monitor, every agent, then the bus. Idempotent.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!("shutting down runtime");
        if let Some(mut monitor) = self.monitor_thread.lock().take() {
            monitor.stop();
        }
        stop_all(&self.registry);
        self.router.unregister_agent(SYSTEM_AGENT);
        self.bus.stop();
        tracing::info!("runtime shutdown complete");
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Stop and detach every agent, emptying the registry. Dropping the agents
/// here also releases planners that point back at the registry.
fn stop_all(registry: &AgentRegistry) -> usize {
    let agents = registry.drain();
    for agent in &agents {
        agent.detach();
    }
    agents.len()
}

/// Inbox for messages addressed to the runtime.
struct SystemEndpoint {
    registry: Weak<AgentRegistry>,
    router: Weak<MessageRouter>,
}

impl SystemEndpoint {
    fn handle(&self, msg: &Message) -> Result<(), DeliveryError> {
        if msg.kind() != &MessageKind::System {
            tracing::debug!(kind = %msg.kind(), from = %msg.sender(), "system endpoint ignored message");
            return Ok(());
        }
        let (Some(registry), Some(router)) = (self.registry.upgrade(), self.router.upgrade()) else {
            return Ok(());
        };
        let command = msg.content_str("command").unwrap_or_default();
        let reply = match command {
            "list_agents" => {
                let agents: Vec<AgentSummary> = registry
                    .all()
                    .iter()
                    .map(|agent| AgentSummary {
                        agent_id: agent.id().clone(),
                        name: agent.name().to_string(),
                        status: agent.status(),
                    })
                    .collect();
                json!({"agents": agents, "total_count": agents.len()})
            }
            "agent_status" => {
                let agent_id = msg.content_str("agent_id").unwrap_or_default();
                match registry.get(agent_id) {
                    Some(agent) => serde_json::to_value(agent.status_report())
                        .map_err(|e| DeliveryError::new(e.to_string()))?,
                    None => json!({"status": "error", "message": format!("Unknown agent: {agent_id}")}),
                }
            }
            "shutdown_all" => {
                let stopped = stop_all(&registry);
                tracing::info!(stopped, requested_by = %msg.sender(), "all agents shut down");
                json!({"status": "shutting_down", "stopped": stopped})
            }
            other => {
                tracing::warn!(command = %other, "unknown runtime command");
                json!({"status": "error", "message": format!("Unknown command: {other}")})
            }
        };

        let response = msg
            .reply(SYSTEM_AGENT, MessageKind::Response, reply)
            .map_err(|e| DeliveryError::new(e.to_string()))?;
        router
            .route_message(response)
            .map_err(|e| DeliveryError::new(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
