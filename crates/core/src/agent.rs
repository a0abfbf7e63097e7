// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent identifier and lifecycle status.
//!
//! An agent is an addressable actor. Its status is driven by the lifecycle
//! manager (start/stop/suspend/resume) and by the message dispatch wrapper,
//! which holds the agent BUSY for the duration of one handler invocation.

use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for an agent, unique across a router while registered.
    pub struct AgentId;
}

impl AgentId {
    /// Generate an id of the form `{prefix}_{unix_secs}_{8 hex chars}`.
    pub fn generate(prefix: &str) -> Self {
        let secs = chrono::Utc::now().timestamp();
        let uuid = crate::id::uuid_string();
        Self(format!("{}_{}_{}", prefix, secs, &uuid[..8]))
    }
}

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Constructed, not yet registered
    Initializing,
    /// Registered and ready, worker not started
    Idle,
    /// Worker thread running
    Active,
    /// Inside a handler invocation
    Busy,
    /// Worker paused; messages still dispatch
    Suspended,
    /// Stop requested, worker shutting down
    Terminating,
    /// Stopped for good
    Terminated,
}

impl AgentStatus {
    /// ACTIVE or BUSY.
    pub fn is_running(self) -> bool {
        matches!(self, AgentStatus::Active | AgentStatus::Busy)
    }

    pub fn is_terminal(self) -> bool {
        self == AgentStatus::Terminated
    }

    /// Whether a lifecycle `start` may proceed from this status.
    pub fn can_start(self) -> bool {
        matches!(self, AgentStatus::Initializing | AgentStatus::Idle)
    }

    pub fn can_suspend(self) -> bool {
        self.is_running()
    }

    pub fn can_resume(self) -> bool {
        self == AgentStatus::Suspended
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Initializing => "initializing",
            AgentStatus::Idle => "idle",
            AgentStatus::Active => "active",
            AgentStatus::Busy => "busy",
            AgentStatus::Suspended => "suspended",
            AgentStatus::Terminating => "terminating",
            AgentStatus::Terminated => "terminated",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
