// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the runtime

use crate::config::ConfigError;
use colony_agent::{HandlerError, LifecycleError};
use colony_bus::BusError;
use colony_core::AgentId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("agent already registered: {0}")]
    DuplicateAgent(AgentId),
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    #[error("runtime is shut down")]
    ShutDown,
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),
    #[error("failed to spawn monitor: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("logging setup failed: {0}")]
    Logging(String),
}
