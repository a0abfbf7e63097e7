// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The runtime's agent table, in registration order.

use crate::error::RuntimeError;
use colony_agent::{Agent, AgentDirectory};
use colony_core::{AgentId, AgentStatus};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
pub struct AgentRegistry {
    agents: Mutex<IndexMap<AgentId, Arc<Agent>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, agent: Arc<Agent>) -> Result<(), RuntimeError> {
        let mut agents = self.agents.lock();
        if agents.contains_key(agent.id()) {
            return Err(RuntimeError::DuplicateAgent(agent.id().clone()));
        }
        agents.insert(agent.id().clone(), agent);
        Ok(())
    }

    /// Build and insert under one lock, so a duplicate id never constructs
    /// a second agent (and never steals the first one's route).
    pub fn insert_with<F>(&self, id: &AgentId, build: F) -> Result<Arc<Agent>, RuntimeError>
    where
        F: FnOnce() -> Arc<Agent>,
    {
        let mut agents = self.agents.lock();
        if agents.contains_key(id) {
            return Err(RuntimeError::DuplicateAgent(id.clone()));
        }
        let agent = build();
        agents.insert(id.clone(), Arc::clone(&agent));
        Ok(agent)
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Agent>> {
        self.agents.lock().shift_remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Agent>> {
        self.agents.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.lock().contains_key(id)
    }

    pub fn all(&self) -> Vec<Arc<Agent>> {
        self.agents.lock().values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<AgentId> {
        self.agents.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every TERMINATED agent, handing the removed agents back.
    pub fn reap_terminated(&self) -> Vec<Arc<Agent>> {
        let mut reaped = Vec::new();
        self.agents.lock().retain(|_, agent| {
            if agent.status() == AgentStatus::Terminated {
                reaped.push(Arc::clone(agent));
                false
            } else {
                true
            }
        });
        reaped
    }

    /// Empty the table, handing back what it held.
    pub fn drain(&self) -> Vec<Arc<Agent>> {
        self.agents.lock().drain(..).map(|(_, agent)| agent).collect()
    }
}

/// Agents that can take work: not suspended and not stopping.
fn accepts_work(status: AgentStatus) -> bool {
    matches!(
        status,
        AgentStatus::Idle | AgentStatus::Active | AgentStatus::Busy
    )
}

impl AgentDirectory for AgentRegistry {
    fn roster(&self) -> Vec<AgentId> {
        self.agents
            .lock()
            .iter()
            .filter(|(_, agent)| accepts_work(agent.status()))
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn capabilities(&self, agent_id: &AgentId) -> Vec<String> {
        self.get(agent_id.as_str())
            .map(|agent| agent.capabilities())
            .unwrap_or_default()
    }

    fn load(&self, agent_id: &AgentId) -> usize {
        self.get(agent_id.as_str())
            .map_or(0, |agent| agent.tasks().load())
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
