//! Consensus rounds run over the bus between live agents.

use crate::prelude::*;
use colony_agent::{Agent, ConsensusMethod, Decision};
use colony_core::{AgentId, MessageKind};
use colony_runtime::Runtime;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const ROUND_TIMEOUT: Duration = Duration::from_secs(2);

/// Make `agent` answer every proposal with a `no`.
fn dissent(runtime: &Runtime, agent: &Agent) {
    let router = Arc::clone(runtime.router());
    let me = agent.id().clone();
    agent.register_handler(MessageKind::ConsensusProposal, move |msg| {
        let vote = msg.reply(
            me.clone(),
            MessageKind::ConsensusVote,
            json!({"consensus_id": msg.content_str("consensus_id"), "vote": false}),
        )?;
        router.route_message(vote)?;
        Ok(Value::Null)
    });
}

/// Make `agent` ignore proposals entirely.
fn abstain(agent: &Agent) {
    agent.register_handler(MessageKind::ConsensusProposal, |_| Ok(Value::Null));
}

fn decisions(agent: &Agent) -> Arc<Mutex<Vec<Decision>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    agent.consensus().on_decision(move |decision| sink.lock().push(decision.clone()));
    seen
}

/// Chair plus three voters, one of whom (`v3`) votes no.
fn split_vote(method: ConsensusMethod, weights: &[(&str, f64)]) -> Decision {
    let runtime = runtime();
    let chair = runtime.spawn_agent("chair").unwrap();
    let voters: Vec<AgentId> = ["v1", "v2", "v3"].iter().map(|v| AgentId::new(*v)).collect();
    for id in &voters {
        runtime.spawn_agent(id.clone()).unwrap();
    }
    dissent(&runtime, &runtime.get_agent("v3").unwrap());
    let seen = decisions(&chair);
    for (voter, weight) in weights {
        chair.consensus().set_weight(*voter, *weight);
    }

    chair
        .consensus()
        .propose_decision(&voters, json!({"action": "deploy"}), method, ROUND_TIMEOUT);
    assert!(wait_for(SPEC_WAIT_MAX_MS, || seen.lock().len() == 1));
    let decision = seen.lock()[0].clone();
    decision
}

#[test]
fn majority_carries_a_split_vote() {
    let decision = split_vote(ConsensusMethod::Majority, &[]);
    assert!(decision.result);
    assert!(!decision.timed_out);
    assert_eq!(decision.votes.len(), 4);
    assert_eq!(decision.votes.get("v3"), Some(&false));
}

#[test]
fn unanimous_fails_on_one_no() {
    let decision = split_vote(ConsensusMethod::Unanimous, &[]);
    assert!(!decision.result);
    assert!(!decision.timed_out);
    assert_eq!(decision.votes.len(), 4);
}

#[test]
fn weighted_vote_follows_the_heavy_voter() {
    let decision = split_vote(ConsensusMethod::Weighted, &[("v3", 5.0)]);
    assert!(!decision.result);
    let decision = split_vote(ConsensusMethod::Weighted, &[("v1", 5.0)]);
    assert!(decision.result);
}

#[test]
fn participants_hear_the_result() {
    let runtime = runtime();
    let chair = runtime.spawn_agent("chair").unwrap();
    let voter = runtime.spawn_agent("v1").unwrap();
    let results = record(&voter, MessageKind::ConsensusResult);

    let id = chair.consensus().propose_decision(
        &[AgentId::new("v1")],
        json!({"action": "rollback"}),
        ConsensusMethod::Unanimous,
        ROUND_TIMEOUT,
    );

    assert!(settles_at(&results, 1));
    let result = &results.messages()[0];
    assert_eq!(result.content_str("consensus_id"), Some(id.as_str()));
    assert_eq!(result.content()["result"], true);
    assert_eq!(result.content()["votes"], json!({"chair": true, "v1": true}));
}

#[test]
fn silent_voter_times_the_round_out() {
    let runtime = runtime();
    let chair = runtime.spawn_agent("chair").unwrap();
    runtime.spawn_agent("v1").unwrap();
    abstain(&runtime.spawn_agent("v2").unwrap());
    let seen = decisions(&chair);

    chair.consensus().propose_decision(
        &[AgentId::new("v1"), AgentId::new("v2")],
        json!({"action": "scale"}),
        ConsensusMethod::Majority,
        Duration::from_millis(200),
    );

    assert!(wait_for(SPEC_WAIT_MAX_MS, || seen.lock().len() == 1));
    let decision = seen.lock()[0].clone();
    assert!(decision.timed_out);
    // tallied over the votes that arrived
    assert!(decision.result);
    assert_eq!(decision.votes.len(), 2);
    assert!(!decision.votes.contains_key("v2"));
    assert_eq!(chair.consensus().active_count(), 0);
}
