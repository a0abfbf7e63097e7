// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task identifier and state machine.
//!
//! ```text
//! PENDING ──assign_to──▶ ASSIGNED ──start_execution──▶ IN_PROGRESS
//!    │                      │                              │
//!    └──────────────────────┴──── complete / fail / cancel ┴──▶ COMPLETED | FAILED | CANCELLED
//! ```
//!
//! Terminal states are final: any further transition is rejected with
//! [`TaskError::Terminal`] and leaves the task untouched.

use crate::agent::AgentId;
use crate::message::{Content, Priority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

crate::define_id! {
    /// Unique identifier for a task within a task engine's store.
    pub struct TaskId;
}

/// Processor type used when the payload names none.
pub const DEFAULT_TASK_TYPE: &str = "default";

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Assigned => write!(f, "assigned"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Rejected task transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task {id} is already {status}")]
    Terminal { id: TaskId, status: TaskStatus },
    #[error("task {id} cannot {action} while {status}")]
    InvalidTransition {
        id: TaskId,
        status: TaskStatus,
        action: &'static str,
    },
}

/// Outcome recorded on a finished task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResult {
    Success(Value),
    Error(String),
}

/// A unit of work owned by one agent's task engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    task_id: TaskId,
    description: String,
    payload: Content,
    priority: Priority,
    creator_id: Option<AgentId>,
    assigned_agent: Option<AgentId>,
    status: TaskStatus,
    created_at: DateTime<Utc>,
    assigned_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    result: Option<TaskResult>,
    #[serde(default)]
    dependencies: Vec<TaskId>,
}

impl Task {
    /// New PENDING task with a random id and normal priority.
    pub fn new(description: impl Into<String>, payload: Content) -> Self {
        Self {
            task_id: TaskId::random(),
            description: description.into(),
            payload,
            priority: Priority::Normal,
            creator_id: None,
            assigned_agent: None,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            assigned_at: None,
            completed_at: None,
            result: None,
            dependencies: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.task_id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_creator(mut self, creator: impl Into<AgentId>) -> Self {
        self.creator_id = Some(creator.into());
        self
    }

    /// Names the intended executor without changing the status.
    pub fn with_assignee(mut self, agent: impl Into<AgentId>) -> Self {
        self.assigned_agent = Some(agent.into());
        self
    }

    pub fn id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn payload(&self) -> &Content {
        &self.payload
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn creator(&self) -> Option<&AgentId> {
        self.creator_id.as_ref()
    }

    pub fn assigned_agent(&self) -> Option<&AgentId> {
        self.assigned_agent.as_ref()
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn assigned_at(&self) -> Option<DateTime<Utc>> {
        self.assigned_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn result(&self) -> Option<&TaskResult> {
        self.result.as_ref()
    }

    pub fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `payload.task_type`, or `"default"`.
    pub fn task_type(&self) -> &str {
        self.payload
            .get("task_type")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_TASK_TYPE)
    }

    /// Error message of a failed task.
    pub fn error(&self) -> Option<&str> {
        match &self.result {
            Some(TaskResult::Error(msg)) => Some(msg),
            _ => None,
        }
    }

    fn ensure_open(&self) -> Result<(), TaskError> {
        if self.status.is_terminal() {
            return Err(TaskError::Terminal {
                id: self.task_id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    pub fn assign_to(&mut self, agent: impl Into<AgentId>) -> Result<(), TaskError> {
        self.ensure_open()?;
        if self.status == TaskStatus::InProgress {
            return Err(TaskError::InvalidTransition {
                id: self.task_id.clone(),
                status: self.status,
                action: "be reassigned",
            });
        }
        self.assigned_agent = Some(agent.into());
        self.status = TaskStatus::Assigned;
        self.assigned_at = Some(Utc::now());
        Ok(())
    }

    pub fn start_execution(&mut self) -> Result<(), TaskError> {
        self.ensure_open()?;
        if self.status != TaskStatus::Assigned {
            return Err(TaskError::InvalidTransition {
                id: self.task_id.clone(),
                status: self.status,
                action: "start",
            });
        }
        self.status = TaskStatus::InProgress;
        Ok(())
    }

    pub fn complete(&mut self, result: Value) -> Result<(), TaskError> {
        self.finish(TaskStatus::Completed, Some(TaskResult::Success(result)))
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TaskError> {
        self.finish(TaskStatus::Failed, Some(TaskResult::Error(error.into())))
    }

    pub fn cancel(&mut self) -> Result<(), TaskError> {
        self.finish(TaskStatus::Cancelled, None)
    }

    fn finish(&mut self, status: TaskStatus, result: Option<TaskResult>) -> Result<(), TaskError> {
        self.ensure_open()?;
        self.status = status;
        self.result = result;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Append a dependency, ignoring duplicates.
    pub fn add_dependency(&mut self, task_id: impl Into<TaskId>) {
        let task_id = task_id.into();
        if !self.dependencies.contains(&task_id) {
            self.dependencies.push(task_id);
        }
    }

    /// Dictionary form used on the wire (`task_assignment`).
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
