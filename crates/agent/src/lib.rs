// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! colony-agent: agents, their lifecycle and the collaboration protocols
//! they speak (tasks, planning, consensus, dialogue, chat)

pub mod agent;
pub mod chat;
pub mod consensus;
pub mod dialogue;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod outbox;
pub mod planner;
pub mod task_engine;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use agent::{Agent, AgentConfig, StatusReport, TickFn, HEARTBEAT_KEY};
pub use chat::{
    ChatResponder, ChatRole, ChatTurn, GenerationError, ModelInfo, TextGenerator, DEGRADED_REPLY,
    MAX_HISTORY,
};
pub use consensus::{
    tally, ConsensusId, ConsensusMechanism, ConsensusMethod, ConsensusProcess, Decision,
    DecisionObserver, Role, Votes, DEFAULT_CONSENSUS_TIMEOUT,
};
pub use dialogue::{Dialogue, DialogueEntry, DialogueManager, DialogueState};
pub use error::{HandlerError, LifecycleError};
pub use handler::{Handler, HandlerRegistry};
pub use lifecycle::{
    Hook, HookContext, HookPoint, LifecycleConfig, LifecycleInfo, LifecycleManager, MainLoop,
};
pub use outbox::Outbox;
pub use planner::{
    AgentDirectory, AgentProfile, AllocationStrategy, DecompositionStrategy, KeywordSplit,
    LoadBalanced, Plan, PlanError, PlanningContext, PriorityBased, RoundRobin,
    StructuredDecomposition, TaskPlanner, DATA_PROCESSING, GENERAL_CAPABILITY,
};
pub use task_engine::{TaskEngine, TaskProcessor};
