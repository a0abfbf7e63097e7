// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime configuration.
//!
//! Layered lowest to highest: built-in defaults, an optional TOML file
//! (`--config` or `COLONY_CONFIG`), then environment overrides. Durations in
//! the file are strings such as `"250ms"`, `"5s"` or `"2m"`.
//!
//! ```toml
//! queue_capacity = 5000
//! persist_state = true
//!
//! [monitor]
//! interval = "10s"
//! heartbeat_timeout = "1m"
//!
//! [agent]
//! heartbeat_interval = "2s"
//! idle_interval = "50ms"
//! ```

use crate::env;
use colony_agent::{AgentConfig, LifecycleConfig};
use colony_bus::{BusConfig, DEFAULT_QUEUE_CAPACITY};
use colony_core::{AgentId, AgentState};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid duration for {key}: {reason}")]
    Duration { key: &'static str, reason: String },
    #[error("{key} must be {expected}")]
    OutOfRange {
        key: &'static str,
        expected: &'static str,
    },
}

/// Everything a [`Runtime`](crate::Runtime) needs to start.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub queue_capacity: usize,
    /// Bus worker wait on an empty queue
    pub bus_poll_interval: Duration,
    pub bus_join_timeout: Duration,
    pub monitor_interval: Duration,
    pub queue_warning_threshold: usize,
    pub heartbeat_interval: Duration,
    /// A running agent silent for longer than this is reported
    pub heartbeat_timeout: Duration,
    /// Fraction of failed tasks that triggers a warning
    pub failure_rate_threshold: f64,
    pub high_priority_threshold: usize,
    pub lifecycle: LifecycleConfig,
    pub state_dir: Option<PathBuf>,
    /// Back agent state with `<state_dir>/<agent id>.json`
    pub persist_state: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            bus_poll_interval: Duration::from_millis(500),
            bus_join_timeout: Duration::from_secs(2),
            monitor_interval: Duration::from_secs(5),
            queue_warning_threshold: 100,
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(30),
            failure_rate_threshold: 0.1,
            high_priority_threshold: 10,
            lifecycle: LifecycleConfig::default(),
            state_dir: None,
            persist_state: false,
            log_file: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    queue_capacity: Option<usize>,
    bus_poll_interval: Option<String>,
    bus_join_timeout: Option<String>,
    state_dir: Option<PathBuf>,
    persist_state: Option<bool>,
    log_file: Option<PathBuf>,
    #[serde(default)]
    monitor: MonitorSection,
    #[serde(default)]
    agent: AgentSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MonitorSection {
    interval: Option<String>,
    queue_warning_threshold: Option<usize>,
    heartbeat_timeout: Option<String>,
    failure_rate_threshold: Option<f64>,
    high_priority_threshold: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AgentSection {
    heartbeat_interval: Option<String>,
    idle_interval: Option<String>,
    suspended_poll: Option<String>,
    error_backoff: Option<String>,
    join_timeout: Option<String>,
}

impl RuntimeConfig {
    /// Resolve the full layered configuration.
    ///
    /// `explicit` wins over `COLONY_CONFIG`; with neither, no file is read.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let path = explicit.map(Path::to_path_buf).or_else(env::config_path);
        if let Some(path) = path {
            let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            let file: ConfigFile =
                toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })?;
            config.apply_file(file)?;
        }
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with a TOML document, without consulting the environment.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        let mut config = Self::default();
        config.apply_file(file)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) -> Result<(), ConfigError> {
        set(&mut self.queue_capacity, file.queue_capacity);
        set_duration(&mut self.bus_poll_interval, "bus_poll_interval", file.bus_poll_interval)?;
        set_duration(&mut self.bus_join_timeout, "bus_join_timeout", file.bus_join_timeout)?;
        if file.state_dir.is_some() {
            self.state_dir = file.state_dir;
        }
        set(&mut self.persist_state, file.persist_state);
        if file.log_file.is_some() {
            self.log_file = file.log_file;
        }

        let monitor = file.monitor;
        set_duration(&mut self.monitor_interval, "monitor.interval", monitor.interval)?;
        set(&mut self.queue_warning_threshold, monitor.queue_warning_threshold);
        set_duration(
            &mut self.heartbeat_timeout,
            "monitor.heartbeat_timeout",
            monitor.heartbeat_timeout,
        )?;
        set(&mut self.failure_rate_threshold, monitor.failure_rate_threshold);
        set(&mut self.high_priority_threshold, monitor.high_priority_threshold);

        let agent = file.agent;
        set_duration(
            &mut self.heartbeat_interval,
            "agent.heartbeat_interval",
            agent.heartbeat_interval,
        )?;
        let lifecycle = &mut self.lifecycle;
        set_duration(&mut lifecycle.idle_interval, "agent.idle_interval", agent.idle_interval)?;
        set_duration(&mut lifecycle.suspended_poll, "agent.suspended_poll", agent.suspended_poll)?;
        set_duration(&mut lifecycle.error_backoff, "agent.error_backoff", agent.error_backoff)?;
        set_duration(&mut lifecycle.join_timeout, "agent.join_timeout", agent.join_timeout)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        set(&mut self.queue_capacity, env::queue_capacity());
        set(&mut self.monitor_interval, env::monitor_interval());
        set(&mut self.heartbeat_timeout, env::heartbeat_timeout());
        if let Some(dir) = env::state_dir_override() {
            self.state_dir = Some(dir);
        } else if self.state_dir.is_none() {
            self.state_dir = env::default_state_dir();
        }
        if let Some(path) = env::log_file() {
            self.log_file = Some(path);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::OutOfRange {
                key: "queue_capacity",
                expected: "at least 1",
            });
        }
        if !(0.0..=1.0).contains(&self.failure_rate_threshold) {
            return Err(ConfigError::OutOfRange {
                key: "monitor.failure_rate_threshold",
                expected: "between 0 and 1",
            });
        }
        if self.monitor_interval.is_zero() {
            return Err(ConfigError::OutOfRange {
                key: "monitor.interval",
                expected: "greater than zero",
            });
        }
        Ok(())
    }

    pub fn bus_config(&self) -> BusConfig {
        BusConfig {
            capacity: self.queue_capacity,
            poll_interval: self.bus_poll_interval,
            join_timeout: self.bus_join_timeout,
        }
    }

    /// Agent settings derived from this config. State is file-backed only
    /// when persistence is on and a state directory is known.
    pub fn agent_config(&self, agent_id: &AgentId) -> AgentConfig {
        let mut config = AgentConfig {
            lifecycle: self.lifecycle.clone(),
            heartbeat_interval: self.heartbeat_interval,
            ..AgentConfig::default()
        };
        if let (true, Some(dir)) = (self.persist_state, &self.state_dir) {
            config.state_path = Some(AgentState::default_path(dir, agent_id));
        }
        config
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn set_duration(
    slot: &mut Duration,
    key: &'static str,
    value: Option<String>,
) -> Result<(), ConfigError> {
    if let Some(raw) = value {
        *slot = parse_duration(&raw).map_err(|reason| ConfigError::Duration { key, reason })?;
    }
    Ok(())
}

/// Parse `"250ms"`, `"5s"`, `"2m"`, `"1h"`. A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let amount: u64 = digits
        .parse()
        .map_err(|_| format!("invalid number in duration: {s}"))?;

    match unit.trim() {
        "ms" => Ok(Duration::from_millis(amount)),
        "" | "s" | "sec" | "secs" => Ok(Duration::from_secs(amount)),
        "m" | "min" | "mins" => Ok(Duration::from_secs(amount * 60)),
        "h" | "hr" | "hrs" => Ok(Duration::from_secs(amount * 3600)),
        other => Err(format!("unknown duration unit: {other}")),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
