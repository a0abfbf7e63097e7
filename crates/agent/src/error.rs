// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-side errors

use colony_bus::BusError;
use colony_core::{AgentId, MessageError, StateError, TaskError};
use thiserror::Error;

/// Failure inside a message handler, task processor, or lifecycle hook.
///
/// Never crosses the bus: the dispatch wrapper turns it into a
/// `{"status": "error", "message": ...}` result.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl HandlerError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Errors from lifecycle control
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to spawn worker for agent {agent_id}: {source}")]
    Spawn {
        agent_id: AgentId,
        #[source]
        source: std::io::Error,
    },
}
