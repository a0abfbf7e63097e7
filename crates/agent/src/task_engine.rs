// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent task store and executor.
//!
//! A task assigned to the owning agent runs synchronously in the submitting
//! thread. The processor is chosen by `payload.task_type`, falling back to
//! `"default"`. Completion and failure are reported to the task's creator
//! with `task_completion` / `task_failure` messages. A task tracked on behalf
//! of another agent also has its final notice relayed to that agent.
//!
//! The store is only mutated by the owning agent or by inbound
//! `task_assignment` / `task_completion` / `task_failure` messages.

use crate::error::HandlerError;
use crate::handler::HandlerRegistry;
use crate::outbox::Outbox;
use colony_core::{
    catch_panic, AgentId, Content, Message, MessageKind, Priority, Task, TaskId, TaskResult,
    DEFAULT_TASK_TYPE,
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Executes one task, returning its result payload.
pub type TaskProcessor = Arc<dyn Fn(&Task) -> Result<Value, HandlerError> + Send + Sync>;

pub struct TaskEngine {
    outbox: Outbox,
    tasks: Mutex<IndexMap<TaskId, Task>>,
    processors: Mutex<HashMap<String, TaskProcessor>>,
    relays: Mutex<HashMap<TaskId, AgentId>>,
}

impl TaskEngine {
    /// Engine with the built-in `"default"` processor registered.
    pub fn new(outbox: Outbox) -> Self {
        let engine = Self {
            outbox,
            tasks: Mutex::new(IndexMap::new()),
            processors: Mutex::new(HashMap::new()),
            relays: Mutex::new(HashMap::new()),
        };
        let agent_id = engine.agent_id().clone();
        engine.register_task_processor(DEFAULT_TASK_TYPE, move |task| {
            tracing::info!(agent_id = %agent_id, task_id = %task.id(), "processing default task");
            Ok(json!({
                "status": "success",
                "result": format!("Processed task: {}", task.description()),
                "processed_by": agent_id.as_str(),
            }))
        });
        engine
    }

    pub fn agent_id(&self) -> &AgentId {
        self.outbox.agent_id()
    }

    /// Wire the inbound task message handlers into `handlers`.
    pub fn install(self: &Arc<Self>, handlers: &HandlerRegistry) {
        let engine = Arc::clone(self);
        handlers.register(MessageKind::TaskAssignment, move |msg| engine.handle_assignment(msg));
        let engine = Arc::clone(self);
        handlers.register(MessageKind::TaskCompletion, move |msg| engine.handle_completion(msg));
        let engine = Arc::clone(self);
        handlers.register(MessageKind::TaskFailure, move |msg| engine.handle_failure(msg));
    }

    pub fn register_task_processor<F>(&self, task_type: impl Into<String>, processor: F)
    where
        F: Fn(&Task) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.processors
            .lock()
            .insert(task_type.into(), Arc::new(processor));
    }

    /// Store `task`, executing it now if it is assigned to this agent.
    ///
    /// A terminal local copy with the same id is never overwritten.
    pub fn submit_task(&self, task: Task) -> TaskId {
        let task_id = task.id().clone();
        let run_here = task.assigned_agent() == Some(self.agent_id());
        if !self.store(task) {
            return task_id;
        }
        tracing::info!(agent_id = %self.agent_id(), %task_id, "task submitted");
        if run_here {
            self.execute(&task_id);
        }
        task_id
    }

    /// Build a task created by this agent and submit it.
    pub fn create_and_submit_task(
        &self,
        description: impl Into<String>,
        payload: Content,
        priority: Priority,
        assigned: Option<AgentId>,
    ) -> TaskId {
        let mut task = Task::new(description, payload)
            .with_priority(priority)
            .with_creator(self.agent_id().clone());
        if let Some(agent) = assigned {
            task = task.with_assignee(agent);
        }
        self.submit_task(task)
    }

    /// Store a copy of a task owned elsewhere, without executing it.
    pub fn track(&self, task: Task) {
        self.store(task);
    }

    /// Track `task` and relay its final outcome to `origin` as well.
    pub fn track_on_behalf(&self, task: Task, origin: AgentId) {
        if origin != *self.agent_id() {
            self.relays.lock().insert(task.id().clone(), origin);
        }
        self.store(task);
    }

    fn store(&self, task: Task) -> bool {
        let mut tasks = self.tasks.lock();
        if let Some(existing) = tasks.get(task.id()) {
            if existing.is_terminal() {
                tracing::debug!(
                    task_id = %task.id(),
                    status = %existing.status(),
                    "keeping terminal local copy"
                );
                return false;
            }
        }
        tasks.insert(task.id().clone(), task);
        true
    }

    pub fn get_task_status(&self, task_id: &str) -> Option<Task> {
        self.tasks.lock().get(task_id).cloned()
    }

    /// All tasks in submission order.
    pub fn get_all_tasks(&self) -> Vec<Task> {
        self.tasks.lock().values().cloned().collect()
    }

    /// Cancel a non-terminal task. Returns whether it was cancelled.
    pub fn cancel_task(&self, task_id: &str) -> bool {
        let mut tasks = self.tasks.lock();
        let Some(task) = tasks.get_mut(task_id) else {
            return false;
        };
        match task.cancel() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(agent_id = %self.agent_id(), error = %e, "cancel rejected");
                false
            }
        }
    }

    /// Number of non-terminal tasks.
    pub fn load(&self) -> usize {
        self.tasks
            .lock()
            .values()
            .filter(|t| !t.is_terminal())
            .count()
    }

    fn execute(&self, task_id: &TaskId) {
        let agent_id = self.agent_id().clone();

        let snapshot = {
            let mut tasks = self.tasks.lock();
            let Some(task) = tasks.get_mut(task_id) else {
                return;
            };
            let started = task
                .assign_to(agent_id.clone())
                .and_then(|()| task.start_execution());
            if let Err(e) = started {
                tracing::warn!(%agent_id, %task_id, error = %e, "task not started");
                return;
            }
            task.clone()
        };
        tracing::info!(%agent_id, %task_id, "starting task");

        let task_type = snapshot.task_type().to_string();
        let processor = {
            let processors = self.processors.lock();
            processors
                .get(&task_type)
                .or_else(|| processors.get(DEFAULT_TASK_TYPE))
                .cloned()
        };

        let outcome = match processor {
            None => Err(format!("No processor found for task type: {task_type}")),
            Some(processor) => match catch_panic(|| processor(&snapshot)) {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(e)) => Err(e.to_string()),
                Err(panic) => Err(panic),
            },
        };

        let finished = {
            let mut tasks = self.tasks.lock();
            let Some(task) = tasks.get_mut(task_id) else {
                return;
            };
            let applied = match &outcome {
                Ok(result) => task.complete(result.clone()),
                Err(error) => task.fail(error.clone()),
            };
            if let Err(e) = applied {
                tracing::warn!(%agent_id, %task_id, error = %e, "task result discarded");
                return;
            }
            task.clone()
        };

        match &outcome {
            Ok(_) => tracing::info!(%agent_id, %task_id, "task completed"),
            Err(error) => tracing::error!(%agent_id, %task_id, %error, "task failed"),
        }
        self.notify_creator(&finished);
    }

    fn notify_creator(&self, task: &Task) {
        if let Some(creator) = task.creator().filter(|c| *c != self.agent_id()) {
            self.notify(creator, task);
        }
        self.relay(task);
    }

    /// Pass a finished task's outcome on to the agent it was tracked for.
    fn relay(&self, task: &Task) {
        if !task.is_terminal() {
            return;
        }
        let Some(origin) = self.relays.lock().remove(task.id()) else {
            return;
        };
        tracing::debug!(task_id = %task.id(), %origin, "relaying task outcome");
        self.notify(&origin, task);
    }

    fn notify(&self, target: &AgentId, task: &Task) {
        let (kind, content) = match task.result() {
            Some(TaskResult::Success(result)) => (
                MessageKind::TaskCompletion,
                json!({"task_id": task.id(), "result": result}),
            ),
            Some(TaskResult::Error(error)) => (
                MessageKind::TaskFailure,
                json!({"task_id": task.id(), "error": error}),
            ),
            None => return,
        };
        match self.outbox.send(target.as_str(), kind, content) {
            Ok(true) => {}
            Ok(false) => tracing::warn!(task_id = %task.id(), %target, "task owner unreachable"),
            Err(e) => tracing::warn!(task_id = %task.id(), %target, error = %e, "failed to notify task owner"),
        }
    }

    /// `task_assignment {task}`
    pub fn handle_assignment(&self, msg: &Message) -> Result<Value, HandlerError> {
        let task = msg
            .content()
            .get("task")
            .cloned()
            .ok_or(HandlerError::MissingField("task"))?;
        let task = Task::from_value(task)?;
        let task_id = self.submit_task(task);
        Ok(json!({"status": "accepted", "task_id": task_id}))
    }

    /// `task_completion {task_id, result}`
    pub fn handle_completion(&self, msg: &Message) -> Result<Value, HandlerError> {
        let task_id = msg
            .content_str("task_id")
            .ok_or(HandlerError::MissingField("task_id"))?;
        let result = msg.content().get("result").cloned().unwrap_or(Value::Null);
        let finished = self.tasks.lock().get_mut(task_id).and_then(|task| match task.complete(result) {
            Ok(()) => {
                tracing::info!(%task_id, from = %msg.sender(), "task completed remotely");
                Some(task.clone())
            }
            Err(e) => {
                tracing::debug!(%task_id, error = %e, "completion ignored");
                None
            }
        });
        if let Some(task) = finished {
            self.relay(&task);
        }
        Ok(json!({"status": "acknowledged"}))
    }

    /// `task_failure {task_id, error}`
    pub fn handle_failure(&self, msg: &Message) -> Result<Value, HandlerError> {
        let task_id = msg
            .content_str("task_id")
            .ok_or(HandlerError::MissingField("task_id"))?;
        let error = msg.content_str("error").unwrap_or("Unknown error");
        let finished = self.tasks.lock().get_mut(task_id).and_then(|task| match task.fail(error) {
            Ok(()) => {
                tracing::warn!(%task_id, from = %msg.sender(), %error, "task failed remotely");
                Some(task.clone())
            }
            Err(e) => {
                tracing::debug!(%task_id, error = %e, "failure ignored");
                None
            }
        });
        if let Some(task) = finished {
            self.relay(&task);
        }
        Ok(json!({"status": "acknowledged"}))
    }
}

#[cfg(test)]
#[path = "task_engine_tests.rs"]
mod tests;
