// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task allocation strategies
//!
//! Every strategy leaves subtasks unassigned when the roster is empty.

use super::PlanningContext;
use colony_core::{AgentId, Task};
use sha2::{Digest, Sha256};

/// Capability that lets an agent take any task type.
pub const GENERAL_CAPABILITY: &str = "general";

/// Assigns subtasks to agents from the planning context's roster.
pub trait AllocationStrategy: Send {
    fn name(&self) -> &'static str;

    fn allocate(&mut self, subtasks: &mut [Task], context: &PlanningContext);
}

fn assign(task: &mut Task, agent: &AgentId) {
    if let Err(e) = task.assign_to(agent.clone()) {
        tracing::warn!(task_id = %task.id(), %agent, error = %e, "allocation skipped");
    }
}

fn roster_or_warn(context: &PlanningContext) -> Option<Vec<AgentId>> {
    let roster = context.roster();
    if roster.is_empty() {
        tracing::warn!("no agents available for task allocation");
        return None;
    }
    Some(roster)
}

/// Subtask `i` goes to `roster[(cursor + i) % n]`; the cursor carries over
/// between calls.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl AllocationStrategy for RoundRobin {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn allocate(&mut self, subtasks: &mut [Task], context: &PlanningContext) {
        let Some(roster) = roster_or_warn(context) else {
            return;
        };
        for task in subtasks.iter_mut() {
            let agent = &roster[self.cursor % roster.len()];
            assign(task, agent);
            self.cursor = self.cursor.wrapping_add(1);
        }
    }
}

/// Agents ranked by open task count, least loaded first. Ties keep roster
/// order. Subtask `i` goes to `ranked[i % n]`.
#[derive(Debug, Default)]
pub struct LoadBalanced;

impl AllocationStrategy for LoadBalanced {
    fn name(&self) -> &'static str {
        "load_balanced"
    }

    fn allocate(&mut self, subtasks: &mut [Task], context: &PlanningContext) {
        if roster_or_warn(context).is_none() {
            return;
        }
        let mut ranked: Vec<(&AgentId, usize)> = context
            .agents()
            .iter()
            .map(|agent| (&agent.id, agent.load))
            .collect();
        ranked.sort_by_key(|(_, load)| *load);

        for (i, task) in subtasks.iter_mut().enumerate() {
            assign(task, ranked[i % ranked.len()].0);
        }
    }
}

/// Highest priority first, each to the first agent that advertises the
/// task's type or [`GENERAL_CAPABILITY`]. With no capable agent the pick is
/// a stable hash of the task id over the roster.
#[derive(Debug, Default)]
pub struct PriorityBased;

impl PriorityBased {
    fn best_agent<'a>(task: &Task, context: &'a PlanningContext) -> Option<&'a AgentId> {
        let task_type = task.task_type();
        context
            .agents()
            .iter()
            .find(|agent| {
                agent
                    .capabilities
                    .iter()
                    .any(|cap| cap == task_type || cap == GENERAL_CAPABILITY)
            })
            .map(|agent| &agent.id)
    }
}

/// Deterministic roster slot for a task id.
pub fn hash_pick(task_id: &str, roster_len: usize) -> usize {
    if roster_len == 0 {
        return 0;
    }
    let digest = Sha256::digest(task_id.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) % roster_len as u64) as usize
}

impl AllocationStrategy for PriorityBased {
    fn name(&self) -> &'static str {
        "priority_based"
    }

    fn allocate(&mut self, subtasks: &mut [Task], context: &PlanningContext) {
        let Some(roster) = roster_or_warn(context) else {
            return;
        };
        let mut order: Vec<usize> = (0..subtasks.len()).collect();
        order.sort_by(|a, b| subtasks[*b].priority().cmp(&subtasks[*a].priority()));

        for i in order {
            let task = &mut subtasks[i];
            let agent = match Self::best_agent(task, context) {
                Some(agent) => agent.clone(),
                None => roster[hash_pick(task.id().as_str(), roster.len())].clone(),
            };
            assign(task, &agent);
        }
    }
}

#[cfg(test)]
#[path = "allocate_tests.rs"]
mod tests;
