// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! colony - run a small agent colony through a task round-trip, a planned
//! pipeline and a vote, then print the system status

use anyhow::{bail, Context, Result};
use clap::Parser;
use colony_agent::{Agent, ConsensusMethod, DATA_PROCESSING};
use colony_core::{deadline_after, AgentId, Content, Message, MessageKind, Task, TaskStatus};
use colony_runtime::{init_logging, parse_duration, Runtime, RuntimeConfig};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

const COORDINATOR: &str = "coordinator";
const POLL: Duration = Duration::from_millis(20);

#[derive(Parser, Debug)]
#[command(name = "colony", version, about = "Colony - in-process multi-agent runtime")]
struct Cli {
    /// TOML config file (overrides COLONY_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of worker agents to spawn
    #[arg(short, long, default_value_t = 3, value_parser = clap::value_parser!(u16).range(1..))]
    workers: u16,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// How long each step may take, e.g. "5s" or "500ms"
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    timeout: Duration,

    /// Voting rule for the consensus step
    #[arg(long, default_value = "majority")]
    method: ConsensusMethod,
}

fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = RuntimeConfig::load(cli.config.as_deref()).context("loading config")?;
    let log_file = cli.log_file.clone().or_else(|| config.log_file.clone());
    let _log_guard = init_logging(log_file.as_deref())?;

    let runtime = Runtime::new(config)?;
    let coordinator = runtime.spawn_agent(COORDINATOR)?;
    let mut workers = Vec::new();
    for n in 1..=cli.workers {
        let id = AgentId::new(format!("worker-{n}"));
        let config = runtime
            .agent_config(&id)
            .with_capabilities(["general", DATA_PROCESSING]);
        runtime.spawn_agent_with(id.clone(), config)?;
        workers.push(id);
    }
    println!("Started {} agents", runtime.get_system_status().agent_count);

    task_round_trip(&coordinator, &workers[0], cli.timeout)?;
    planned_pipeline(&runtime, &coordinator, cli.timeout)?;
    vote(&coordinator, &workers, cli.method, cli.timeout)?;

    println!("\nSystem status:");
    println!("{}", serde_json::to_string_pretty(&runtime.get_system_status())?);
    println!("\nMonitor report:");
    println!("{}", serde_json::to_string_pretty(&runtime.generate_report())?);

    runtime.shutdown();
    Ok(())
}

/// Send one `task` and wait for the worker's `response`.
fn task_round_trip(coordinator: &Agent, worker: &AgentId, timeout: Duration) -> Result<()> {
    let (tx, rx) = mpsc::channel::<Message>();
    let tx = Mutex::new(tx);
    coordinator.register_handler(MessageKind::Response, move |msg| {
        let _ = tx.lock().send(msg.clone());
        Ok(Value::Null)
    });

    let delivered = coordinator.send_message(
        worker.as_str(),
        MessageKind::Task,
        json!({"task_id": "demo-1", "description": "say hello"}),
    )?;
    if !delivered {
        bail!("no route to {worker}");
    }
    let response = rx
        .recv_timeout(timeout)
        .with_context(|| format!("no response from {worker}"))?;
    println!(
        "\n[task] {} answered: {}",
        response.sender(),
        response.content_str("result").unwrap_or_default()
    );
    Ok(())
}

/// Plan a data-processing task across the colony and wait for every step.
fn planned_pipeline(runtime: &Runtime, coordinator: &Agent, timeout: Duration) -> Result<()> {
    let planner = runtime.attach_planner(COORDINATOR)?;
    let mut payload = Content::new();
    payload.insert("task_type".into(), json!(DATA_PROCESSING));
    payload.insert("source".into(), json!("events.csv"));
    payload.insert("processor".into(), json!("dedupe"));
    payload.insert("destination".into(), json!("events.parquet"));
    let plan = planner.plan_and_allocate(Task::new("nightly import", payload))?;
    println!(
        "\n[plan] {} split into {} subtasks, {} dispatched",
        plan.task_id,
        plan.subtasks.len(),
        plan.dispatched
    );

    let engine = Arc::clone(coordinator.tasks());
    let done = wait_until(timeout, || {
        plan.subtasks.iter().all(|sub| {
            engine
                .get_task_status(sub.id().as_str())
                .is_some_and(|t| t.is_terminal())
        })
    });
    for sub in &plan.subtasks {
        let status = engine
            .get_task_status(sub.id().as_str())
            .map_or(TaskStatus::Pending, |t| t.status());
        println!(
            "  {} -> {}: {}",
            sub.description(),
            sub.assigned_agent().map_or("-", |a| a.as_str()),
            status
        );
    }
    if !done {
        bail!("pipeline did not finish within {timeout:?}");
    }
    Ok(())
}

/// Ask every worker to vote on a proposal.
fn vote(
    coordinator: &Agent,
    workers: &[AgentId],
    method: ConsensusMethod,
    timeout: Duration,
) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    coordinator.consensus().on_decision(move |decision| {
        let _ = tx.lock().send(decision.clone());
    });
    let id = coordinator.consensus().propose_decision(
        workers,
        json!({"action": "scale_up", "replicas": 5}),
        method,
        timeout,
    );
    // The round closes at its deadline at the latest; leave room for the tick.
    let decision = rx
        .recv_timeout(timeout.saturating_add(Duration::from_secs(1)))
        .with_context(|| format!("no decision for round {id}"))?;
    println!(
        "\n[vote] {} ({method}): {} with {} votes{}",
        decision.consensus_id,
        if decision.result { "approved" } else { "rejected" },
        decision.votes.len(),
        if decision.timed_out { ", timed out" } else { "" }
    );
    Ok(())
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = deadline_after(Instant::now(), timeout);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(POLL);
    }
    done()
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
