//! Test helpers for behavioral specifications.
//!
//! Builds runtimes with aggressive timings and records what agents receive.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use colony_agent::{Agent, LifecycleConfig};
use colony_core::test_support::Recorder;
use colony_core::MessageKind;
use colony_runtime::{Runtime, RuntimeConfig};
use serde_json::Value;
use std::time::Duration;

pub use colony_core::test_support::wait_for;

// Spec polling timeouts
pub const SPEC_WAIT_MAX_MS: u64 = 2000;
/// How long to keep watching when asserting that nothing else arrives.
pub const SPEC_QUIET_MS: u64 = 150;

/// Runtime config tuned for fast tests.
///
/// IMPORTANT:
///   Do NOT raise these to paper over a flaky spec.
///   Find the race instead.
pub fn fast_config() -> RuntimeConfig {
    RuntimeConfig {
        bus_poll_interval: Duration::from_millis(10),
        monitor_interval: Duration::from_millis(50),
        heartbeat_interval: Duration::from_millis(20),
        lifecycle: LifecycleConfig {
            idle_interval: Duration::from_millis(5),
            suspended_poll: Duration::from_millis(10),
            error_backoff: Duration::from_millis(20),
            join_timeout: Duration::from_secs(2),
        },
        ..RuntimeConfig::default()
    }
}

pub fn runtime() -> Runtime {
    Runtime::new(fast_config()).unwrap()
}

/// Record every message of `kind` that reaches `agent`.
pub fn record(agent: &Agent, kind: MessageKind) -> Recorder {
    let recorder = Recorder::new();
    let sink = recorder.clone();
    agent.register_handler(kind, move |msg| {
        sink.record(msg);
        Ok(Value::Null)
    });
    recorder
}

/// Wait until `recorder` holds exactly `count` messages and stays there.
pub fn settles_at(recorder: &Recorder, count: usize) -> bool {
    if !wait_for(SPEC_WAIT_MAX_MS, || recorder.len() >= count) {
        return false;
    }
    std::thread::sleep(Duration::from_millis(SPEC_QUIET_MS));
    recorder.len() == count
}
