// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the runtime crate.

use std::path::PathBuf;
use std::time::Duration;

// --- Parse helpers (private) ---

fn parse_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|s| !s.is_empty())
}

// --- State directory ---

/// Explicit override: COLONY_STATE_DIR
pub fn state_dir_override() -> Option<PathBuf> {
    non_empty("COLONY_STATE_DIR").map(PathBuf::from)
}

/// Fallback when nothing is configured: XDG_STATE_HOME/colony > platform state dir
pub fn default_state_dir() -> Option<PathBuf> {
    if let Some(xdg) = non_empty("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("colony"));
    }
    dirs::state_dir().map(|dir| dir.join("colony"))
}

// --- Config file ---

pub fn config_path() -> Option<PathBuf> {
    non_empty("COLONY_CONFIG").map(PathBuf::from)
}

// --- Tuning overrides ---

pub fn queue_capacity() -> Option<usize> {
    non_empty("COLONY_QUEUE_CAPACITY").and_then(|s| s.trim().parse().ok())
}

pub fn monitor_interval() -> Option<Duration> {
    parse_ms("COLONY_MONITOR_INTERVAL_MS")
}

pub fn heartbeat_timeout() -> Option<Duration> {
    parse_ms("COLONY_HEARTBEAT_TIMEOUT_MS")
}

// --- Logging ---

pub fn log_file() -> Option<PathBuf> {
    non_empty("COLONY_LOG_FILE").map(PathBuf::from)
}
