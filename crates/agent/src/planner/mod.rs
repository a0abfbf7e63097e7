// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task planning: decompose a task, allocate the pieces, dispatch them.
//!
//! The planner reads the roster from an [`AgentDirectory`] (the runtime's
//! registry), tracks every subtask in its own agent's [`TaskEngine`] and
//! sends assigned subtasks out as `task_assignment` messages. The planner
//! agent creates every subtask; a parent owned by another agent hears each
//! subtask's outcome through a relay.

mod allocate;
mod decompose;

pub use allocate::{
    hash_pick, AllocationStrategy, LoadBalanced, PriorityBased, RoundRobin, GENERAL_CAPABILITY,
};
pub use decompose::{DecompositionStrategy, KeywordSplit, StructuredDecomposition, DATA_PROCESSING};

use crate::error::HandlerError;
use crate::handler::HandlerRegistry;
use crate::outbox::Outbox;
use crate::task_engine::TaskEngine;
use colony_core::{AgentId, Content, Message, MessageKind, Priority, Task, TaskId};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

/// Read-only view of the agents available for work.
pub trait AgentDirectory: Send + Sync {
    /// Live agents in registration order.
    fn roster(&self) -> Vec<AgentId>;

    fn capabilities(&self, agent_id: &AgentId) -> Vec<String>;

    /// Open (non-terminal) tasks held by the agent.
    fn load(&self, agent_id: &AgentId) -> usize;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub capabilities: Vec<String>,
    pub load: usize,
}

/// Snapshot of the roster taken once per planning run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanningContext {
    agents: Vec<AgentProfile>,
}

impl PlanningContext {
    pub fn new(agents: Vec<AgentProfile>) -> Self {
        Self { agents }
    }

    pub fn gather(directory: &dyn AgentDirectory) -> Self {
        let agents = directory
            .roster()
            .into_iter()
            .map(|id| AgentProfile {
                capabilities: directory.capabilities(&id),
                load: directory.load(&id),
                id,
            })
            .collect();
        Self { agents }
    }

    pub fn agents(&self) -> &[AgentProfile] {
        &self.agents
    }

    pub fn roster(&self) -> Vec<AgentId> {
        self.agents.iter().map(|a| a.id.clone()).collect()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("invalid planning request: {0}")]
    InvalidRequest(String),
    #[error("decomposition of task {0} produced no subtasks")]
    Empty(TaskId),
}

/// Result summary of one planning run.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub task_id: TaskId,
    pub subtasks: Vec<Task>,
    /// Subtasks that reached an agent
    pub dispatched: usize,
}

pub struct TaskPlanner {
    outbox: Outbox,
    engine: Arc<TaskEngine>,
    directory: Arc<dyn AgentDirectory>,
    decomposition: Mutex<Box<dyn DecompositionStrategy>>,
    allocation: Mutex<Box<dyn AllocationStrategy>>,
}

impl TaskPlanner {
    /// Planner with structured decomposition and load-balanced allocation.
    pub fn new(outbox: Outbox, engine: Arc<TaskEngine>, directory: Arc<dyn AgentDirectory>) -> Self {
        Self {
            outbox,
            engine,
            directory,
            decomposition: Mutex::new(Box::new(StructuredDecomposition::default())),
            allocation: Mutex::new(Box::new(LoadBalanced)),
        }
    }

    pub fn install(self: &Arc<Self>, handlers: &HandlerRegistry) {
        let this = Arc::clone(self);
        handlers.register(MessageKind::TaskPlanningRequest, move |msg| this.handle_planning_request(msg));
    }

    pub fn set_decomposition_strategy(&self, strategy: impl DecompositionStrategy + 'static) {
        *self.decomposition.lock() = Box::new(strategy);
    }

    pub fn set_allocation_strategy(&self, strategy: impl AllocationStrategy + 'static) {
        *self.allocation.lock() = Box::new(strategy);
    }

    pub fn strategy_names(&self) -> (&'static str, &'static str) {
        (self.decomposition.lock().name(), self.allocation.lock().name())
    }

    pub fn plan_and_allocate(&self, task: Task) -> Result<Plan, PlanError> {
        let me = self.outbox.agent_id().clone();
        let context = PlanningContext::gather(self.directory.as_ref());

        let mut subtasks: Vec<Task> = self
            .decomposition
            .lock()
            .decompose(&task, &context)
            .into_iter()
            .map(|sub| sub.with_creator(me.clone()))
            .collect();
        if subtasks.is_empty() {
            return Err(PlanError::Empty(task.id().clone()));
        }
        tracing::info!(agent_id = %me, task_id = %task.id(), subtasks = subtasks.len(), "decomposed task");

        self.allocation.lock().allocate(&mut subtasks, &context);

        let mut dispatched = 0;
        // Subtask notices come back here; the parent's creator hears the outcome via relay.
        let origin = task.creator().filter(|c| **c != me).cloned();
        for subtask in &subtasks {
            match &origin {
                Some(origin) => self.engine.track_on_behalf(subtask.clone(), origin.clone()),
                None => self.engine.track(subtask.clone()),
            }
            if self.dispatch(subtask) {
                dispatched += 1;
            }
        }
        tracing::info!(
            agent_id = %me,
            task_id = %task.id(),
            dispatched,
            agents = context.agent_count(),
            "allocated subtasks"
        );
        Ok(Plan {
            task_id: task.id().clone(),
            subtasks,
            dispatched,
        })
    }

    fn dispatch(&self, subtask: &Task) -> bool {
        let Some(assignee) = subtask.assigned_agent() else {
            return false;
        };
        let content = json!({"task": subtask.to_value()});
        match self.outbox.send(assignee.as_str(), MessageKind::TaskAssignment, content) {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(task_id = %subtask.id(), %assignee, "assignee unreachable");
                false
            }
            Err(e) => {
                tracing::warn!(task_id = %subtask.id(), %assignee, error = %e, "failed to dispatch subtask");
                false
            }
        }
    }

    /// `task_planning_request {task}`
    pub fn handle_planning_request(&self, msg: &Message) -> Result<Value, HandlerError> {
        let raw = msg
            .content()
            .get("task")
            .cloned()
            .ok_or(HandlerError::MissingField("task"))?;
        let outcome = task_from_request(raw).and_then(|task| self.plan_and_allocate(task));
        Ok(match outcome {
            Ok(plan) => json!({
                "status": "success",
                "task_id": plan.task_id,
                "subtasks_count": plan.subtasks.len(),
            }),
            Err(e) => {
                tracing::error!(agent_id = %self.outbox.agent_id(), error = %e, "planning request failed");
                json!({"status": "error", "message": e.to_string()})
            }
        })
    }
}

/// Accept either a full task or a partial `{task_id?, description, payload?,
/// priority?}` object.
fn task_from_request(raw: Value) -> Result<Task, PlanError> {
    if let Ok(task) = Task::from_value(raw.clone()) {
        return Ok(task);
    }
    let Value::Object(fields) = raw else {
        return Err(PlanError::InvalidRequest("task must be an object".into()));
    };
    let description = fields
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let payload = match fields.get("payload") {
        None | Some(Value::Null) => Content::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(PlanError::InvalidRequest("payload must be an object".into())),
    };
    let priority = match fields.get("priority").and_then(Value::as_i64) {
        None => Priority::default(),
        Some(level) => Priority::try_from(level).map_err(|e| PlanError::InvalidRequest(e.to_string()))?,
    };

    let mut task = Task::new(description, payload).with_priority(priority);
    if let Some(id) = fields.get("task_id").and_then(Value::as_str) {
        task = task.with_id(id);
    }
    Ok(task)
}

#[cfg(test)]
#[path = "../planner_tests.rs"]
mod tests;
