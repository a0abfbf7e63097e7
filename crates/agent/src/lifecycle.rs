// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent lifecycle: status state machine, hooks and the worker thread.
//!
//! ```text
//! INITIALIZING ─▶ IDLE ─start─▶ ACTIVE ◀─dispatch─▶ BUSY
//!                                 │  ▲                │
//!                          suspend│  │resume          │suspend
//!                                 ▼  │                ▼
//!                               SUSPENDED ◀───────────┘
//!
//! any non-terminal ─stop─▶ TERMINATING ─▶ TERMINATED
//! ```
//!
//! The worker runs the main-loop hook while not suspended, waiting the idle
//! interval between runs. A failing or panicking main loop runs the
//! `on_error` hooks and backs off; the worker only exits on stop.

use crate::error::{HandlerError, LifecycleError};
use colony_core::{catch_panic, join_with_timeout, AgentId, AgentStatus, JoinError, StopSignal};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Worker timing.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Wait between main-loop runs
    pub idle_interval: Duration,
    /// Re-check interval while suspended
    pub suspended_poll: Duration,
    /// Wait after a failed main-loop run
    pub error_backoff: Duration,
    /// Bound on the graceful stop join
    pub join_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_millis(100),
            suspended_poll: Duration::from_millis(500),
            error_backoff: Duration::from_secs(1),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Named points in the start/stop transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeStart,
    AfterStart,
    BeforeStop,
    AfterStop,
    OnError,
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookPoint::BeforeStart => "before_start",
            HookPoint::AfterStart => "after_start",
            HookPoint::BeforeStop => "before_stop",
            HookPoint::AfterStop => "after_stop",
            HookPoint::OnError => "on_error",
        };
        f.write_str(name)
    }
}

/// Passed to every hook invocation.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub agent_id: &'a AgentId,
    pub point: HookPoint,
    /// Set for `on_error`
    pub error: Option<&'a str>,
}

pub type Hook = Arc<dyn Fn(&HookContext<'_>) -> Result<(), HandlerError> + Send + Sync>;

/// The agent's autonomous behaviour, run by the worker on every tick.
pub type MainLoop = Arc<dyn Fn() -> Result<(), HandlerError> + Send + Sync>;

/// Lifecycle snapshot for status reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleInfo {
    pub agent_id: AgentId,
    pub status: AgentStatus,
    pub is_running: bool,
    pub thread_alive: bool,
}

struct Shared {
    agent_id: AgentId,
    config: LifecycleConfig,
    status: Mutex<AgentStatus>,
    hooks: Mutex<HashMap<HookPoint, Vec<Hook>>>,
    main_loop: Mutex<Option<MainLoop>>,
    stop: StopSignal,
}

impl Shared {
    fn status(&self) -> AgentStatus {
        *self.status.lock()
    }

    fn run_hooks(&self, point: HookPoint, error: Option<&str>) {
        let hooks = self.hooks.lock().get(&point).cloned().unwrap_or_default();
        let ctx = HookContext {
            agent_id: &self.agent_id,
            point,
            error,
        };
        for hook in &hooks {
            let failure = match catch_panic(|| hook(&ctx)) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => panic,
            };
            if point == HookPoint::OnError {
                tracing::debug!(agent_id = %self.agent_id, error = %failure, "on_error hook failed");
                continue;
            }
            tracing::error!(agent_id = %self.agent_id, hook = %point, error = %failure, "lifecycle hook failed");
            self.run_hooks(HookPoint::OnError, Some(&failure));
        }
    }
}

/// Drives one agent's status and worker thread.
pub struct LifecycleManager {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LifecycleManager {
    pub fn new(agent_id: AgentId, config: LifecycleConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                agent_id,
                config,
                status: Mutex::new(AgentStatus::Initializing),
                hooks: Mutex::new(HashMap::new()),
                main_loop: Mutex::new(None),
                stop: StopSignal::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.shared.agent_id
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.shared.config
    }

    pub fn status(&self) -> AgentStatus {
        self.shared.status()
    }

    /// INITIALIZING → IDLE once the agent is wired up.
    pub fn mark_ready(&self) {
        let mut status = self.shared.status.lock();
        if *status == AgentStatus::Initializing {
            *status = AgentStatus::Idle;
        }
    }

    pub fn add_hook<F>(&self, point: HookPoint, hook: F)
    where
        F: Fn(&HookContext<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.shared
            .hooks
            .lock()
            .entry(point)
            .or_default()
            .push(Arc::new(hook));
    }

    pub fn set_main_loop<F>(&self, main_loop: F)
    where
        F: Fn() -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let main_loop: MainLoop = Arc::new(main_loop);
        *self.shared.main_loop.lock() = Some(main_loop);
    }

    /// Start the worker. Returns false (and logs) when the current status
    /// does not allow a start.
    pub fn start(&self) -> Result<bool, LifecycleError> {
        let agent_id = &self.shared.agent_id;
        let current = self.status();
        match current {
            AgentStatus::Active | AgentStatus::Busy => {
                tracing::warn!(%agent_id, status = %current, "agent already running");
                return Ok(false);
            }
            AgentStatus::Suspended => {
                tracing::warn!(%agent_id, "agent is suspended, use resume");
                return Ok(false);
            }
            AgentStatus::Terminating | AgentStatus::Terminated => {
                tracing::error!(%agent_id, status = %current, "cannot restart a stopped agent");
                return Ok(false);
            }
            AgentStatus::Initializing | AgentStatus::Idle => {}
        }

        self.shared.run_hooks(HookPoint::BeforeStart, None);
        {
            let mut status = self.shared.status.lock();
            if !status.can_start() {
                tracing::warn!(%agent_id, status = %*status, "status changed during start");
                return Ok(false);
            }
            *status = AgentStatus::Active;
        }
        self.shared.stop.reset();

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name(format!("agent-{}-worker", agent_id))
            .spawn(move || run_worker(&shared));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(source) => {
                *self.shared.status.lock() = current;
                return Err(LifecycleError::Spawn {
                    agent_id: agent_id.clone(),
                    source,
                });
            }
        };
        *self.worker.lock() = Some(handle);

        self.shared.run_hooks(HookPoint::AfterStart, None);
        tracing::info!(%agent_id, "agent started");
        Ok(true)
    }

    /// Stop the agent. Returns false if it was already terminated.
    ///
    /// The status ends TERMINATED even if a graceful join times out.
    pub fn stop(&self, graceful: bool) -> bool {
        let agent_id = &self.shared.agent_id;
        if self.status().is_terminal() {
            tracing::debug!(%agent_id, "agent already terminated");
            return false;
        }

        self.shared.run_hooks(HookPoint::BeforeStop, None);
        *self.shared.status.lock() = AgentStatus::Terminating;
        self.shared.stop.trigger();

        let handle = self.worker.lock().take();
        if let (Some(handle), true) = (handle, graceful) {
            match join_with_timeout(handle, self.shared.config.join_timeout) {
                Ok(()) => {}
                Err(JoinError::TimedOut(after)) => {
                    tracing::warn!(%agent_id, ?after, "worker did not exit in time")
                }
                Err(JoinError::Panicked) => tracing::error!(%agent_id, "worker panicked"),
                Err(JoinError::CurrentThread) => {
                    tracing::debug!(%agent_id, "stopped from its own worker")
                }
            }
        }

        *self.shared.status.lock() = AgentStatus::Terminated;
        self.shared.run_hooks(HookPoint::AfterStop, None);
        tracing::info!(%agent_id, "agent stopped");
        true
    }

    /// ACTIVE/BUSY → SUSPENDED.
    pub fn suspend(&self) -> bool {
        let mut status = self.shared.status.lock();
        if !status.can_suspend() {
            tracing::debug!(agent_id = %self.shared.agent_id, status = %*status, "suspend ignored");
            return false;
        }
        *status = AgentStatus::Suspended;
        tracing::info!(agent_id = %self.shared.agent_id, "agent suspended");
        true
    }

    /// SUSPENDED → ACTIVE.
    pub fn resume(&self) -> bool {
        let mut status = self.shared.status.lock();
        if !status.can_resume() {
            tracing::debug!(agent_id = %self.shared.agent_id, status = %*status, "resume ignored");
            return false;
        }
        *status = AgentStatus::Active;
        tracing::info!(agent_id = %self.shared.agent_id, "agent resumed");
        true
    }

    /// Enter BUSY for one dispatch, returning the status to restore.
    /// `None` means the agent is stopping and the message should be dropped.
    /// A suspended agent stays SUSPENDED so a `resume` command can land.
    pub(crate) fn begin_dispatch(&self) -> Option<AgentStatus> {
        let mut status = self.shared.status.lock();
        let previous = *status;
        match previous {
            AgentStatus::Terminating | AgentStatus::Terminated => None,
            AgentStatus::Suspended => Some(previous),
            _ => {
                *status = AgentStatus::Busy;
                Some(previous)
            }
        }
    }

    /// Leave BUSY, unless the handler moved the agent elsewhere.
    pub(crate) fn end_dispatch(&self, previous: AgentStatus) {
        let mut status = self.shared.status.lock();
        if *status == AgentStatus::Busy {
            *status = previous;
        }
    }

    pub fn is_thread_alive(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn info(&self) -> LifecycleInfo {
        let status = self.status();
        LifecycleInfo {
            agent_id: self.shared.agent_id.clone(),
            status,
            is_running: status.is_running(),
            thread_alive: self.is_thread_alive(),
        }
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        self.shared.stop.trigger();
    }
}

fn run_worker(shared: &Shared) {
    let agent_id = &shared.agent_id;
    tracing::debug!(%agent_id, "worker started");
    loop {
        let status = shared.status();
        if shared.stop.is_triggered()
            || matches!(status, AgentStatus::Terminating | AgentStatus::Terminated)
        {
            break;
        }

        if status == AgentStatus::Suspended {
            if shared.stop.wait(shared.config.suspended_poll) {
                break;
            }
            continue;
        }

        let main_loop = shared.main_loop.lock().clone();
        let outcome = match main_loop {
            Some(main_loop) => match catch_panic(|| main_loop()) {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(panic) => Err(format!("main loop panicked: {panic}")),
            },
            None => Ok(()),
        };

        let wait = match outcome {
            Ok(()) => shared.config.idle_interval,
            Err(error) => {
                tracing::error!(%agent_id, %error, "main loop failed");
                shared.run_hooks(HookPoint::OnError, Some(&error));
                shared.config.error_backoff
            }
        };
        if shared.stop.wait(wait) {
            break;
        }
    }
    tracing::debug!(%agent_id, "worker exited");
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
