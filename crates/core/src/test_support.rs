// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::message::{Message, MessageKind};
use crate::task::Task;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

// ── Message factory functions ───────────────────────────────────────────────

/// Build a message, panicking on invalid input.
pub fn message(sender: &str, receiver: &str, kind: impl Into<MessageKind>, content: Value) -> Message {
    match Message::new(sender, receiver, kind, content) {
        Ok(msg) => msg,
        Err(e) => panic!("invalid test message: {e}"),
    }
}

pub fn task_message(sender: &str, receiver: &str, task_id: &str) -> Message {
    message(
        sender,
        receiver,
        MessageKind::Task,
        json!({"task_id": task_id, "description": format!("task {task_id}")}),
    )
}

pub fn chat_message(sender: &str, receiver: &str, text: &str) -> Message {
    message(sender, receiver, MessageKind::Chat, json!({"text": text}))
}

pub fn notification(sender: &str, receiver: &str, text: &str) -> Message {
    message(sender, receiver, MessageKind::Notification, json!({"text": text}))
}

pub fn system_command(sender: &str, receiver: &str, command: &str) -> Message {
    message(sender, receiver, MessageKind::System, json!({"command": command}))
}

// ── Task factory functions ──────────────────────────────────────────────────

pub fn task(id: &str, task_type: &str) -> Task {
    let payload = json!({"task_type": task_type});
    Task::new(format!("task {id}"), payload.as_object().cloned().unwrap_or_default()).with_id(id)
}

// ── Recording sink ──────────────────────────────────────────────────────────

/// Thread-safe collector for messages seen by a subscriber or handler.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Message>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, msg: &Message) {
        self.seen.lock().push(msg.clone());
    }

    pub fn messages(&self) -> Vec<Message> {
        self.seen.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn of_kind(&self, kind: &MessageKind) -> Vec<Message> {
        self.seen
            .lock()
            .iter()
            .filter(|m| m.kind() == kind)
            .cloned()
            .collect()
    }
}

// ── Polling ─────────────────────────────────────────────────────────────────

/// Poll `condition` until it holds or `timeout_ms` elapses.
pub fn wait_for<F>(timeout_ms: u64, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    let timeout = Duration::from_millis(timeout_ms);
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    condition()
}
