// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! colony-runtime: owns the bus, the router and the agent registry, and
//! watches them from a monitor thread

pub mod config;
pub mod env;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod registry;
pub mod runtime;

pub use config::{parse_duration, ConfigError, RuntimeConfig};
pub use error::RuntimeError;
pub use logging::init_logging;
pub use monitor::{
    AgentMetrics, ExecutionMonitor, HealthReport, HealthWarning, MonitorConfig, MonitorHandle,
    MonitorReport, SystemMetrics,
};
pub use registry::AgentRegistry;
pub use runtime::{AgentSummary, Runtime, SystemStatus, SYSTEM_AGENT, SYSTEM_TOPIC};
