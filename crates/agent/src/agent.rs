// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent: an addressable actor wiring together its lifecycle, handler
//! table, task engine, consensus and dialogue state.
//!
//! Every inbound message goes through [`Agent::handle_message`], which holds
//! the per-agent dispatch lock, marks the agent BUSY for the duration of the
//! handler and turns handler errors and panics into an error result.

use crate::chat::{ChatResponder, TextGenerator};
use crate::consensus::ConsensusMechanism;
use crate::dialogue::DialogueManager;
use crate::error::{HandlerError, LifecycleError};
use crate::handler::HandlerRegistry;
use crate::lifecycle::{HookContext, HookPoint, LifecycleConfig, LifecycleInfo, LifecycleManager};
use crate::outbox::Outbox;
use crate::planner::{AgentDirectory, TaskPlanner, GENERAL_CAPABILITY};
use crate::task_engine::TaskEngine;
use chrono::{DateTime, Utc};
use colony_bus::{MessageRouter, SubscriptionId};
use colony_core::{
    catch_panic, AgentId, AgentState, AgentStatus, Clock, Message, MessageKind, StateMetadata,
    StateStore, SystemClock,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// State key holding the last heartbeat, in epoch milliseconds.
pub const HEARTBEAT_KEY: &str = "last_heartbeat";

/// Extra autonomous behaviour run on every worker tick.
pub type TickFn = Arc<dyn Fn(&Agent) -> Result<(), HandlerError> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Display name; defaults to the agent id
    pub name: Option<String>,
    pub lifecycle: LifecycleConfig,
    pub heartbeat_interval: Duration,
    pub capabilities: Vec<String>,
    /// Persist state to this JSON file
    pub state_path: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: None,
            lifecycle: LifecycleConfig::default(),
            heartbeat_interval: Duration::from_secs(5),
            capabilities: vec![GENERAL_CAPABILITY.to_string()],
            state_path: None,
        }
    }
}

impl AgentConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }
}

/// Snapshot returned by the `status` system command.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub agent_id: AgentId,
    pub name: String,
    pub status: AgentStatus,
    pub lifecycle: LifecycleInfo,
    pub state: StateMetadata,
    pub handlers: Vec<String>,
    pub capabilities: Vec<String>,
    pub open_tasks: usize,
    pub timestamp: DateTime<Utc>,
}

pub struct Agent {
    id: AgentId,
    name: String,
    capabilities: Mutex<Vec<String>>,
    heartbeat_interval: Duration,
    clock: SystemClock,
    outbox: Outbox,
    lifecycle: LifecycleManager,
    handlers: HandlerRegistry,
    state: Arc<dyn StateStore>,
    tasks: Arc<TaskEngine>,
    consensus: Arc<ConsensusMechanism>,
    dialogue: Arc<DialogueManager>,
    ticks: Mutex<Vec<TickFn>>,
    dispatch_lock: Mutex<()>,
    broadcast_subscription: Mutex<Option<SubscriptionId>>,
}

impl Agent {
    /// Build an agent, register its route on `router` and subscribe it to
    /// broadcasts. The agent ends IDLE, ready to start.
    pub fn new(id: impl Into<AgentId>, router: Arc<MessageRouter>, config: AgentConfig) -> Arc<Self> {
        let id = id.into();
        let state: Arc<dyn StateStore> = match &config.state_path {
            Some(path) => Arc::new(AgentState::persistent(id.clone(), path.clone())),
            None => Arc::new(AgentState::in_memory(id.clone())),
        };
        let outbox = Outbox::new(id.clone(), Arc::clone(&router));

        let agent = Arc::new_cyclic(|weak: &Weak<Agent>| {
            let agent = Agent {
                name: config.name.clone().unwrap_or_else(|| id.to_string()),
                capabilities: Mutex::new(config.capabilities.clone()),
                heartbeat_interval: config.heartbeat_interval,
                clock: SystemClock,
                lifecycle: LifecycleManager::new(id.clone(), config.lifecycle.clone()),
                handlers: HandlerRegistry::new(),
                state,
                tasks: Arc::new(TaskEngine::new(outbox.clone())),
                consensus: Arc::new(ConsensusMechanism::new(outbox.clone(), SystemClock)),
                dialogue: Arc::new(DialogueManager::new(outbox.clone())),
                ticks: Mutex::new(Vec::new()),
                dispatch_lock: Mutex::new(()),
                broadcast_subscription: Mutex::new(None),
                outbox,
                id: id.clone(),
            };
            agent.install_default_handlers(weak);
            agent.tasks.install(&agent.handlers);
            agent.consensus.install(&agent.handlers);
            agent.dialogue.install(&agent.handlers);

            let tick = weak.clone();
            agent.lifecycle.set_main_loop(move || match tick.upgrade() {
                Some(agent) => agent.tick(),
                None => Ok(()),
            });
            agent
        });

        let inbox = Arc::downgrade(&agent);
        router.register_agent(id.clone(), format!("agent.{id}"), move |msg: &Message| {
            if let Some(agent) = inbox.upgrade() {
                agent.handle_message(msg);
            }
            Ok(())
        });
        let listener = Arc::downgrade(&agent);
        let subscription = router.bus().subscribe_broadcast(move |msg: &Message| {
            if let Some(agent) = listener.upgrade() {
                if msg.sender() != &agent.id {
                    agent.handle_message(msg);
                }
            }
            Ok(())
        });
        *agent.broadcast_subscription.lock() = Some(subscription);

        agent.lifecycle.mark_ready();
        tracing::info!(agent_id = %agent.id, name = %agent.name, "agent initialized");
        agent
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> AgentStatus {
        self.lifecycle.status()
    }

    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    pub fn capabilities(&self) -> Vec<String> {
        self.capabilities.lock().clone()
    }

    pub fn set_capabilities(&self, capabilities: Vec<String>) {
        *self.capabilities.lock() = capabilities;
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn state(&self) -> &Arc<dyn StateStore> {
        &self.state
    }

    pub fn tasks(&self) -> &Arc<TaskEngine> {
        &self.tasks
    }

    pub fn consensus(&self) -> &Arc<ConsensusMechanism> {
        &self.consensus
    }

    pub fn dialogue(&self) -> &Arc<DialogueManager> {
        &self.dialogue
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn register_handler<F>(&self, kind: impl Into<MessageKind>, handler: F)
    where
        F: Fn(&Message) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.handlers.register(kind, handler);
    }

    pub fn add_hook<F>(&self, point: HookPoint, hook: F)
    where
        F: Fn(&HookContext<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.lifecycle.add_hook(point, hook);
    }

    /// Run `f` on every worker tick, after the built-in behaviour.
    pub fn on_tick<F>(&self, f: F)
    where
        F: Fn(&Agent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.ticks.lock().push(Arc::new(f));
    }

    /// Attach a planner that answers `task_planning_request`.
    pub fn attach_planner(&self, directory: Arc<dyn AgentDirectory>) -> Arc<TaskPlanner> {
        let planner = Arc::new(TaskPlanner::new(
            self.outbox.clone(),
            Arc::clone(&self.tasks),
            directory,
        ));
        planner.install(&self.handlers);
        planner
    }

    /// Answer chat and task messages with `generator`.
    pub fn attach_chat(&self, generator: Arc<dyn TextGenerator>) -> Arc<ChatResponder> {
        let responder = Arc::new(ChatResponder::new(self.outbox.clone(), generator));
        responder.install(&self.handlers);
        responder
    }

    pub fn start(&self) -> Result<bool, LifecycleError> {
        self.lifecycle.start()
    }

    pub fn stop(&self) -> bool {
        self.lifecycle.stop(true)
    }

    pub fn suspend(&self) -> bool {
        self.lifecycle.suspend()
    }

    pub fn resume(&self) -> bool {
        self.lifecycle.resume()
    }

    /// Send from this agent. Returns whether the router delivered it.
    pub fn send_message(
        &self,
        receiver: &str,
        kind: impl Into<MessageKind>,
        content: Value,
    ) -> Result<bool, HandlerError> {
        self.outbox.send(receiver, kind, content)
    }

    /// Dispatch one message to its handler.
    ///
    /// Messages are dropped while the agent is stopping. The BUSY status is
    /// lifted afterwards unless the handler moved the agent elsewhere.
    pub fn handle_message(&self, msg: &Message) -> Value {
        let _dispatch = self.dispatch_lock.lock();
        let Some(previous) = self.lifecycle.begin_dispatch() else {
            tracing::debug!(agent_id = %self.id, message_id = %msg.id(), "agent stopped, message dropped");
            return json!({"status": "dropped"});
        };

        let kind = msg.kind();
        let result = match self.handlers.get(kind) {
            Some(handler) => {
                tracing::debug!(agent_id = %self.id, message_id = %msg.id(), %kind, "processing message");
                match catch_panic(|| handler(msg)) {
                    Ok(Ok(value)) => value,
                    Ok(Err(e)) => {
                        tracing::error!(agent_id = %self.id, message_id = %msg.id(), error = %e, "handler failed");
                        json!({"status": "error", "message": e.to_string()})
                    }
                    Err(panic) => {
                        tracing::error!(agent_id = %self.id, message_id = %msg.id(), %panic, "handler panicked");
                        json!({"status": "error", "message": panic})
                    }
                }
            }
            None => {
                tracing::warn!(agent_id = %self.id, %kind, "no handler for message type");
                json!({"status": "error", "message": format!("No handler for type {kind}")})
            }
        };

        self.lifecycle.end_dispatch(previous);
        result
    }

    pub fn status_report(&self) -> StatusReport {
        StatusReport {
            agent_id: self.id.clone(),
            name: self.name.clone(),
            status: self.status(),
            lifecycle: self.lifecycle.info(),
            state: self.state.metadata(),
            handlers: self
                .handlers
                .kinds()
                .iter()
                .map(|k| k.as_str().to_string())
                .collect(),
            capabilities: self.capabilities(),
            open_tasks: self.tasks.load(),
            timestamp: Utc::now(),
        }
    }

    /// Epoch milliseconds of the last heartbeat, if any.
    pub fn last_heartbeat(&self) -> Option<u64> {
        self.state.get(HEARTBEAT_KEY).and_then(|v| v.as_u64())
    }

    /// Stop, then withdraw the route and the broadcast subscription.
    pub fn detach(&self) {
        self.lifecycle.stop(true);
        let router = self.outbox.router();
        router.unregister_agent(self.id.as_str());
        if let Some(subscription) = self.broadcast_subscription.lock().take() {
            router.bus().unsubscribe_broadcast(subscription);
        }
    }

    fn tick(&self) -> Result<(), HandlerError> {
        if self.status() == AgentStatus::Active {
            let now = self.clock.epoch_ms();
            let due = match self.last_heartbeat() {
                Some(last) => now.saturating_sub(last) >= self.heartbeat_interval.as_millis() as u64,
                None => true,
            };
            if due {
                self.state.set(HEARTBEAT_KEY, json!(now))?;
                tracing::debug!(agent_id = %self.id, "heartbeat");
            }
        }
        self.consensus.check_deadlines();

        let ticks = self.ticks.lock().clone();
        for tick in &ticks {
            tick(self)?;
        }
        Ok(())
    }

    fn install_default_handlers(&self, weak: &Weak<Agent>) {
        let me = weak.clone();
        self.handlers.register(MessageKind::Task, move |msg| {
            let agent = upgrade(&me)?;
            agent.default_task(msg)
        });
        let me = weak.clone();
        self.handlers.register(MessageKind::System, move |msg| {
            let agent = upgrade(&me)?;
            agent.default_system(msg)
        });
        let me = weak.clone();
        self.handlers.register(MessageKind::Notification, move |msg| {
            let agent = upgrade(&me)?;
            agent.default_notification(msg)
        });
    }

    /// `task {task_id}`: acknowledge with a `response` to the sender.
    fn default_task(&self, msg: &Message) -> Result<Value, HandlerError> {
        let task_id = msg.content_str("task_id").unwrap_or("unknown");
        tracing::info!(agent_id = %self.id, %task_id, "received task");
        let delivered = self.outbox.reply(
            msg,
            MessageKind::Response,
            json!({
                "task_id": task_id,
                "result": format!("Processed task {task_id} successfully"),
                "status": "completed",
            }),
        )?;
        if !delivered {
            tracing::warn!(agent_id = %self.id, %task_id, to = %msg.sender(), "response undeliverable");
        }
        Ok(json!({"status": "success", "task_id": task_id}))
    }

    /// `system {command}`
    fn default_system(&self, msg: &Message) -> Result<Value, HandlerError> {
        let command = msg.content_str("command").unwrap_or_default();
        match command {
            "status" => Ok(serde_json::to_value(self.status_report())?),
            "shutdown" => {
                self.lifecycle.stop(true);
                Ok(json!({"status": "shutting_down"}))
            }
            "suspend" => {
                self.lifecycle.suspend();
                Ok(json!({"status": "suspended"}))
            }
            "resume" => {
                self.lifecycle.resume();
                Ok(json!({"status": "resumed"}))
            }
            other => {
                tracing::warn!(agent_id = %self.id, command = %other, "unknown system command");
                Ok(json!({"status": "error", "message": format!("Unknown command: {other}")}))
            }
        }
    }

    /// `notification {title?}`
    fn default_notification(&self, msg: &Message) -> Result<Value, HandlerError> {
        let title = msg
            .content_str("title")
            .or_else(|| msg.content_str("text"))
            .unwrap_or_default();
        tracing::info!(agent_id = %self.id, from = %msg.sender(), %title, "notification");
        Ok(json!({"status": "received", "notification_id": msg.id()}))
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        if let Some(subscription) = self.broadcast_subscription.get_mut().take() {
            self.outbox.router().bus().unsubscribe_broadcast(subscription);
        }
    }
}

fn upgrade(agent: &Weak<Agent>) -> Result<Arc<Agent>, HandlerError> {
    agent
        .upgrade()
        .ok_or_else(|| HandlerError::failed("agent is gone"))
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
