// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time-bounded voting rounds between agents.
//!
//! The initiator records its own `true` vote, sends `consensus_proposal` to
//! every other participant and waits for `consensus_vote` replies. A round
//! finalises when every expected voter has voted or its deadline passes;
//! the initiator then sends `consensus_result` to the other voters.
//!
//! Participants only learn the initiator, so their record carries no roster.
//! Deadlines are enforced by [`ConsensusMechanism::check_deadlines`], which
//! the owning agent's worker calls on every tick.

use crate::error::HandlerError;
use crate::handler::HandlerRegistry;
use crate::outbox::Outbox;
use colony_core::{deadline_after, AgentId, Clock, Message, MessageKind, SystemClock};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

colony_core::define_id! {
    /// Identifier of one voting round.
    pub struct ConsensusId;
}

pub const DEFAULT_CONSENSUS_TIMEOUT: Duration = Duration::from_secs(30);

/// Tally rule for a round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusMethod {
    #[default]
    Majority,
    Unanimous,
    Weighted,
}

impl ConsensusMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsensusMethod::Majority => "majority",
            ConsensusMethod::Unanimous => "unanimous",
            ConsensusMethod::Weighted => "weighted",
        }
    }
}

impl fmt::Display for ConsensusMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsensusMethod {
    type Err = HandlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "majority" => Ok(ConsensusMethod::Majority),
            "unanimous" => Ok(ConsensusMethod::Unanimous),
            "weighted" => Ok(ConsensusMethod::Weighted),
            other => Err(HandlerError::failed(format!("unknown consensus method: {other}"))),
        }
    }
}

/// Votes keyed by voter, in arrival order.
pub type Votes = IndexMap<AgentId, bool>;

/// Decide a round from the votes received so far.
///
/// `expected` only matters for UNANIMOUS. Weights default to 1.0 per voter.
pub fn tally(
    method: ConsensusMethod,
    votes: &Votes,
    expected: &[AgentId],
    weights: &HashMap<AgentId, f64>,
) -> bool {
    if votes.is_empty() {
        return false;
    }
    match method {
        ConsensusMethod::Unanimous => {
            expected.iter().all(|voter| votes.contains_key(voter)) && votes.values().all(|v| *v)
        }
        ConsensusMethod::Majority => {
            let yes = votes.values().filter(|v| **v).count();
            yes * 2 > votes.len()
        }
        ConsensusMethod::Weighted => {
            let weight = |voter: &AgentId| weights.get(voter).copied().unwrap_or(1.0);
            let total: f64 = votes.keys().map(weight).sum();
            let yes: f64 = votes
                .iter()
                .filter(|(_, v)| **v)
                .map(|(voter, _)| weight(voter))
                .sum();
            yes > total / 2.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Participant,
}

/// One round as seen by this agent.
#[derive(Debug, Clone)]
pub struct ConsensusProcess {
    pub id: ConsensusId,
    pub role: Role,
    pub initiator: AgentId,
    /// Every voter the initiator waits for, itself included. Empty for
    /// participants.
    pub expected: Vec<AgentId>,
    pub proposal: Value,
    pub method: ConsensusMethod,
    pub votes: Votes,
    pub deadline: Instant,
}

impl ConsensusProcess {
    fn all_voted(&self) -> bool {
        self.expected.iter().all(|voter| self.votes.contains_key(voter))
    }
}

/// A finished round, handed to `on_decision` observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub consensus_id: ConsensusId,
    pub result: bool,
    pub votes: Votes,
    pub timed_out: bool,
}

pub type DecisionObserver = Arc<dyn Fn(&Decision) + Send + Sync>;

pub struct ConsensusMechanism<C: Clock = SystemClock> {
    outbox: Outbox,
    clock: C,
    processes: Mutex<HashMap<ConsensusId, ConsensusProcess>>,
    weights: Mutex<HashMap<AgentId, f64>>,
    observers: Mutex<Vec<DecisionObserver>>,
}

impl<C: Clock> ConsensusMechanism<C> {
    pub fn new(outbox: Outbox, clock: C) -> Self {
        Self {
            outbox,
            clock,
            processes: Mutex::new(HashMap::new()),
            weights: Mutex::new(HashMap::new()),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        self.outbox.agent_id()
    }

    pub fn install(self: &Arc<Self>, handlers: &HandlerRegistry) {
        let this = Arc::clone(self);
        handlers.register(MessageKind::ConsensusProposal, move |msg| this.handle_proposal(msg));
        let this = Arc::clone(self);
        handlers.register(MessageKind::ConsensusVote, move |msg| this.handle_vote(msg));
        let this = Arc::clone(self);
        handlers.register(MessageKind::ConsensusResult, move |msg| this.handle_result(msg));
    }

    /// Weight used by WEIGHTED rounds this agent initiates.
    pub fn set_weight(&self, voter: impl Into<AgentId>, weight: f64) {
        self.weights.lock().insert(voter.into(), weight);
    }

    pub fn on_decision<F>(&self, observer: F)
    where
        F: Fn(&Decision) + Send + Sync + 'static,
    {
        self.observers.lock().push(Arc::new(observer));
    }

    /// Open a round and send the proposal to every other participant.
    pub fn propose_decision(
        &self,
        participants: &[AgentId],
        proposal: Value,
        method: ConsensusMethod,
        timeout: Duration,
    ) -> ConsensusId {
        let me = self.agent_id().clone();
        let consensus_id = ConsensusId::random();

        let mut expected: Vec<AgentId> = Vec::with_capacity(participants.len() + 1);
        for voter in participants.iter().chain(std::iter::once(&me)) {
            if !expected.contains(voter) {
                expected.push(voter.clone());
            }
        }
        let mut votes = Votes::new();
        votes.insert(me.clone(), true);

        self.processes.lock().insert(
            consensus_id.clone(),
            ConsensusProcess {
                id: consensus_id.clone(),
                role: Role::Initiator,
                initiator: me.clone(),
                expected: expected.clone(),
                proposal: proposal.clone(),
                method,
                votes,
                deadline: deadline_after(self.clock.now(), timeout),
            },
        );

        let content = json!({
            "consensus_id": consensus_id,
            "proposal": proposal,
            "method": method,
            "timeout": timeout.as_secs_f64(),
        });
        for voter in expected.iter().filter(|v| **v != me) {
            self.send(voter, MessageKind::ConsensusProposal, content.clone());
        }
        tracing::info!(
            agent_id = %me,
            %consensus_id,
            %method,
            voters = expected.len(),
            "proposed decision"
        );

        // A round with no other voters is already complete.
        self.check_round(&consensus_id);
        consensus_id
    }

    /// Record this agent's vote. Returns false for an unknown round.
    pub fn vote(&self, consensus_id: &ConsensusId, approve: bool) -> bool {
        let me = self.agent_id().clone();
        let (role, initiator) = {
            let mut processes = self.processes.lock();
            let Some(process) = processes.get_mut(consensus_id) else {
                tracing::warn!(agent_id = %me, %consensus_id, "consensus round not found");
                return false;
            };
            process.votes.insert(me.clone(), approve);
            (process.role, process.initiator.clone())
        };
        match role {
            Role::Initiator => self.check_round(consensus_id),
            Role::Participant => self.send(
                &initiator,
                MessageKind::ConsensusVote,
                json!({"consensus_id": consensus_id, "vote": approve}),
            ),
        }
        true
    }

    pub fn get_process(&self, consensus_id: &str) -> Option<ConsensusProcess> {
        self.processes.lock().get(consensus_id).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.processes.lock().len()
    }

    /// Finalise overdue rounds this agent initiated and drop overdue
    /// participant records. Returns the number of rounds finalised.
    pub fn check_deadlines(&self) -> usize {
        let now = self.clock.now();
        let overdue: Vec<ConsensusProcess> = {
            let mut processes = self.processes.lock();
            let ids: Vec<ConsensusId> = processes
                .values()
                .filter(|p| p.deadline <= now)
                .map(|p| p.id.clone())
                .collect();
            ids.iter().filter_map(|id| processes.remove(id)).collect()
        };

        let mut finalised = 0;
        for process in overdue {
            match process.role {
                Role::Initiator => {
                    self.finalise(process, true);
                    finalised += 1;
                }
                Role::Participant => {
                    tracing::debug!(consensus_id = %process.id, "dropped expired consensus record")
                }
            }
        }
        finalised
    }

    fn check_round(&self, consensus_id: &ConsensusId) {
        let now = self.clock.now();
        let done = {
            let mut processes = self.processes.lock();
            let ready = processes.get(consensus_id).is_some_and(|p| {
                p.role == Role::Initiator && (p.all_voted() || p.deadline <= now)
            });
            if ready {
                processes.remove(consensus_id)
            } else {
                None
            }
        };
        if let Some(process) = done {
            let timed_out = !process.all_voted();
            self.finalise(process, timed_out);
        }
    }

    fn finalise(&self, process: ConsensusProcess, timed_out: bool) {
        let result = {
            let weights = self.weights.lock();
            tally(process.method, &process.votes, &process.expected, &weights)
        };
        let content = json!({
            "consensus_id": process.id,
            "result": result,
            "votes": process.votes,
        });
        let me = self.agent_id();
        for voter in process.expected.iter().filter(|v| *v != me) {
            self.send(voter, MessageKind::ConsensusResult, content.clone());
        }
        tracing::info!(
            agent_id = %me,
            consensus_id = %process.id,
            result,
            timed_out,
            votes = process.votes.len(),
            "consensus completed"
        );
        self.notify(&Decision {
            consensus_id: process.id,
            result,
            votes: process.votes,
            timed_out,
        });
    }

    fn notify(&self, decision: &Decision) {
        let observers = self.observers.lock().clone();
        for observer in &observers {
            if let Err(panic) = colony_core::catch_panic(|| observer(decision)) {
                tracing::error!(consensus_id = %decision.consensus_id, %panic, "decision observer panicked");
            }
        }
    }

    fn send(&self, to: &AgentId, kind: MessageKind, content: Value) {
        match self.outbox.send(to.as_str(), kind.clone(), content) {
            Ok(true) => {}
            Ok(false) => tracing::warn!(%to, %kind, "consensus message undeliverable"),
            Err(e) => tracing::warn!(%to, %kind, error = %e, "failed to send consensus message"),
        }
    }

    /// `consensus_proposal {consensus_id, proposal, method, timeout}`
    ///
    /// Records the round and votes `true` straight away.
    pub fn handle_proposal(&self, msg: &Message) -> Result<Value, HandlerError> {
        let consensus_id = ConsensusId::new(
            msg.content_str("consensus_id")
                .ok_or(HandlerError::MissingField("consensus_id"))?,
        );
        let method = match msg.content_str("method") {
            Some(method) => method.parse()?,
            None => ConsensusMethod::default(),
        };
        let timeout = msg
            .content()
            .get("timeout")
            .and_then(Value::as_f64)
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
            .unwrap_or(DEFAULT_CONSENSUS_TIMEOUT);

        self.processes.lock().insert(
            consensus_id.clone(),
            ConsensusProcess {
                id: consensus_id.clone(),
                role: Role::Participant,
                initiator: msg.sender().clone(),
                expected: Vec::new(),
                proposal: msg.content().get("proposal").cloned().unwrap_or(Value::Null),
                method,
                votes: Votes::new(),
                deadline: deadline_after(self.clock.now(), timeout),
            },
        );
        tracing::info!(
            agent_id = %self.agent_id(),
            %consensus_id,
            from = %msg.sender(),
            "received consensus proposal"
        );

        self.vote(&consensus_id, true);
        Ok(json!({"status": "acknowledged"}))
    }

    /// `consensus_vote {consensus_id, vote}`
    pub fn handle_vote(&self, msg: &Message) -> Result<Value, HandlerError> {
        let consensus_id = msg
            .content_str("consensus_id")
            .ok_or(HandlerError::MissingField("consensus_id"))?;
        let vote = msg
            .content()
            .get("vote")
            .and_then(Value::as_bool)
            .ok_or(HandlerError::MissingField("vote"))?;
        let voter = msg.sender();

        let recorded = {
            let mut processes = self.processes.lock();
            match processes.get_mut(consensus_id) {
                Some(process) if process.role == Role::Initiator => {
                    if process.expected.contains(voter) {
                        process.votes.insert(voter.clone(), vote);
                        true
                    } else {
                        tracing::warn!(%consensus_id, %voter, "vote from non-participant ignored");
                        false
                    }
                }
                _ => false,
            }
        };
        if recorded {
            tracing::debug!(%consensus_id, %voter, vote, "recorded vote");
            self.check_round(&ConsensusId::new(consensus_id));
        }
        Ok(json!({"status": "acknowledged"}))
    }

    /// `consensus_result {consensus_id, result, votes}`
    pub fn handle_result(&self, msg: &Message) -> Result<Value, HandlerError> {
        let consensus_id = ConsensusId::new(
            msg.content_str("consensus_id")
                .ok_or(HandlerError::MissingField("consensus_id"))?,
        );
        let result = msg
            .content()
            .get("result")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let votes: Votes = match msg.content().get("votes") {
            Some(votes) => serde_json::from_value(votes.clone())?,
            None => Votes::new(),
        };

        let known = self.processes.lock().remove(&consensus_id).is_some();
        tracing::info!(
            agent_id = %self.agent_id(),
            %consensus_id,
            result,
            known,
            "consensus result"
        );
        self.notify(&Decision {
            consensus_id,
            result,
            votes,
            timed_out: false,
        });
        Ok(json!({"status": "acknowledged"}))
    }
}

#[cfg(test)]
#[path = "consensus_tests.rs"]
mod tests;
