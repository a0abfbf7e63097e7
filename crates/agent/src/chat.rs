// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat and task replies backed by a text-generation model.
//!
//! The model sits behind [`TextGenerator`]. Generation failures never leave
//! the handler: the sender gets a degraded reply carrying `error` instead.

use crate::error::HandlerError;
use crate::handler::HandlerRegistry;
use crate::outbox::Outbox;
use chrono::{DateTime, Utc};
use colony_core::{Message, MessageKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

/// Turns kept in the chat history.
pub const MAX_HISTORY: usize = 10;

pub const DEGRADED_REPLY: &str =
    "Sorry, I ran into a problem while generating a reply. Please try again later.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("model unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("generation failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A text-generation model.
pub trait TextGenerator: Send + Sync {
    fn generate_text(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, GenerationError>;

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, GenerationError>;

    fn model_info(&self) -> ModelInfo;
}

/// Answers `chat_message` and `task` messages with generated text.
pub struct ChatResponder {
    outbox: Outbox,
    generator: Arc<dyn TextGenerator>,
    history: Mutex<VecDeque<ChatTurn>>,
}

impl ChatResponder {
    pub fn new(outbox: Outbox, generator: Arc<dyn TextGenerator>) -> Self {
        tracing::info!(
            agent_id = %outbox.agent_id(),
            model = %generator.model_info().model_name,
            "chat responder ready"
        );
        Self {
            outbox,
            generator,
            history: Mutex::new(VecDeque::with_capacity(MAX_HISTORY)),
        }
    }

    /// Replaces the default `chat_message` and `task` handlers.
    pub fn install(self: &Arc<Self>, handlers: &HandlerRegistry) {
        let this = Arc::clone(self);
        handlers.register(MessageKind::Chat, move |msg| this.handle_chat(msg));
        let this = Arc::clone(self);
        handlers.register(MessageKind::Task, move |msg| this.handle_task(msg));
    }

    pub fn model_info(&self) -> ModelInfo {
        self.generator.model_info()
    }

    pub fn history(&self) -> Vec<ChatTurn> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    pub fn send_chat_message(&self, receiver: &str, text: &str) -> Result<bool, HandlerError> {
        self.outbox.send(
            receiver,
            MessageKind::Chat,
            json!({"text": text, "agent_id": self.outbox.agent_id()}),
        )
    }

    fn remember(&self, role: ChatRole, content: &str) {
        if content.is_empty() {
            return;
        }
        let mut history = self.history.lock();
        history.push_back(ChatTurn {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
        while history.len() > MAX_HISTORY {
            history.pop_front();
        }
    }

    /// `chat_message {text}`
    pub fn handle_chat(&self, msg: &Message) -> Result<Value, HandlerError> {
        let me = self.outbox.agent_id();
        if msg.sender() == me {
            tracing::debug!(agent_id = %me, "ignoring self-sent chat message");
            return Ok(json!({"status": "ignored", "message": "Self-sent reply message ignored"}));
        }

        let text = msg.content_str("text").unwrap_or_default();
        if text.is_empty() {
            tracing::warn!(agent_id = %me, from = %msg.sender(), "empty chat message");
            return Ok(json!({"status": "error", "message": "Empty message received"}));
        }

        // Replies are kept for context but not answered, so two responders
        // cannot ping-pong forever.
        if msg.content().contains_key("in_reply_to") {
            self.remember(ChatRole::User, text);
            return Ok(json!({"status": "recorded"}));
        }

        tracing::info!(agent_id = %me, from = %msg.sender(), "chat message");
        self.remember(ChatRole::User, text);
        let prompt = format!("The user says: {text}\nPlease give a suitable reply:");
        let history = self.history();

        let (reply, error) = match self.generator.generate_text(&prompt, &history) {
            Ok(reply) => (reply, None),
            Err(e) => {
                tracing::error!(agent_id = %me, error = %e, "text generation failed");
                (DEGRADED_REPLY.to_string(), Some(e.to_string()))
            }
        };
        self.remember(ChatRole::Assistant, &reply);

        let mut content = json!({
            "text": reply,
            "agent_id": me,
            "timestamp": Utc::now().timestamp_millis() as f64 / 1000.0,
            "in_reply_to": msg.id(),
        });
        if let (Some(error), Some(map)) = (&error, content.as_object_mut()) {
            map.insert("error".into(), json!(error));
        }
        if let Err(e) = self.outbox.reply(msg, MessageKind::Chat, content) {
            tracing::error!(agent_id = %me, error = %e, "failed to send chat reply");
        }

        Ok(match error {
            None => json!({"status": "success", "response": reply}),
            Some(error) => json!({"status": "error", "message": error}),
        })
    }

    /// `task {task_id, description}`, solved by the model.
    pub fn handle_task(&self, msg: &Message) -> Result<Value, HandlerError> {
        let me = self.outbox.agent_id();
        let task_id = msg.content_str("task_id").unwrap_or("unknown");
        let description = msg.content_str("description").unwrap_or_default();
        tracing::info!(agent_id = %me, %task_id, "solving task with model");

        let prompt = format!(
            "Please complete the following task:\n{description}\n\nProvide a detailed solution:"
        );
        match self.generator.generate_text(&prompt, &[]) {
            Ok(solution) => {
                self.outbox.reply(
                    msg,
                    MessageKind::Response,
                    json!({
                        "task_id": task_id,
                        "result": solution,
                        "status": "completed",
                        "processed_by": me,
                    }),
                )?;
                Ok(json!({"status": "success", "solution": solution}))
            }
            Err(e) => {
                tracing::error!(agent_id = %me, %task_id, error = %e, "task generation failed");
                self.outbox.reply(
                    msg,
                    MessageKind::Response,
                    json!({
                        "task_id": task_id,
                        "status": "failed",
                        "error": e.to_string(),
                        "processed_by": me,
                    }),
                )?;
                Ok(json!({"status": "error", "message": e.to_string()}))
            }
        }
    }
}

#[cfg(test)]
#[path = "chat_tests.rs"]
mod tests;
