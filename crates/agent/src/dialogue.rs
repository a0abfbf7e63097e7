// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-party conversations between agents.

use crate::error::HandlerError;
use crate::handler::HandlerRegistry;
use crate::outbox::Outbox;
use chrono::{DateTime, Utc};
use colony_core::{AgentId, ConversationId, Message, MessageKind, Priority};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogueState {
    Active,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DialogueEntry {
    pub sender: AgentId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dialogue {
    pub conversation_id: ConversationId,
    pub topic: String,
    pub participants: Vec<AgentId>,
    pub initiator: AgentId,
    pub state: DialogueState,
    pub messages: Vec<DialogueEntry>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<String>,
}

/// Conversations this agent started or joined.
pub struct DialogueManager {
    outbox: Outbox,
    dialogues: Mutex<IndexMap<ConversationId, Dialogue>>,
}

impl DialogueManager {
    pub fn new(outbox: Outbox) -> Self {
        Self {
            outbox,
            dialogues: Mutex::new(IndexMap::new()),
        }
    }

    pub fn install(self: &Arc<Self>, handlers: &HandlerRegistry) {
        let this = Arc::clone(self);
        handlers.register(MessageKind::DialogueInit, move |msg| this.handle_init(msg));
        let this = Arc::clone(self);
        handlers.register(MessageKind::DialogueMessage, move |msg| this.handle_message(msg));
        let this = Arc::clone(self);
        handlers.register(MessageKind::DialogueEnd, move |msg| this.handle_end(msg));
    }

    fn me(&self) -> &AgentId {
        self.outbox.agent_id()
    }

    /// Start a conversation and invite every other participant.
    pub fn initiate_dialogue(
        &self,
        participants: &[AgentId],
        topic: impl Into<String>,
        initial_message: Option<&str>,
    ) -> ConversationId {
        let conversation_id = ConversationId::random();
        let topic = topic.into();
        let me = self.me().clone();

        let mut messages = Vec::new();
        if let Some(text) = initial_message {
            messages.push(DialogueEntry {
                sender: me.clone(),
                content: text.to_string(),
                timestamp: Utc::now(),
            });
        }
        self.dialogues.lock().insert(
            conversation_id.clone(),
            Dialogue {
                conversation_id: conversation_id.clone(),
                topic: topic.clone(),
                participants: participants.to_vec(),
                initiator: me.clone(),
                state: DialogueState::Active,
                messages,
                created_at: Utc::now(),
                ended_at: None,
                end_reason: None,
            },
        );

        let content = json!({
            "conversation_id": conversation_id,
            "topic": topic,
            "participants": participants,
            "initial_message": initial_message,
        });
        self.fan_out(&conversation_id, participants, MessageKind::DialogueInit, &content);
        tracing::info!(agent_id = %me, %conversation_id, %topic, "initiated dialogue");
        conversation_id
    }

    /// Record and send a line of dialogue. `recipients` defaults to every
    /// participant. Returns false for an unknown or closed conversation.
    pub fn send_dialogue_message(
        &self,
        conversation_id: &ConversationId,
        text: &str,
        recipients: Option<&[AgentId]>,
    ) -> bool {
        let me = self.me().clone();
        let targets = {
            let mut dialogues = self.dialogues.lock();
            let Some(dialogue) = dialogues.get_mut(conversation_id) else {
                tracing::warn!(agent_id = %me, %conversation_id, "conversation not found");
                return false;
            };
            if dialogue.state == DialogueState::Closed {
                tracing::warn!(agent_id = %me, %conversation_id, "conversation is closed");
                return false;
            }
            dialogue.messages.push(DialogueEntry {
                sender: me.clone(),
                content: text.to_string(),
                timestamp: Utc::now(),
            });
            recipients.map_or_else(|| dialogue.participants.clone(), <[AgentId]>::to_vec)
        };

        let content = json!({
            "conversation_id": conversation_id,
            "content": text,
            "sender": me,
        });
        self.fan_out(conversation_id, &targets, MessageKind::DialogueMessage, &content);
        true
    }

    /// Close a conversation and tell the other participants.
    pub fn end_dialogue(&self, conversation_id: &ConversationId, reason: &str) -> bool {
        let participants = {
            let mut dialogues = self.dialogues.lock();
            let Some(dialogue) = dialogues.get_mut(conversation_id) else {
                tracing::warn!(agent_id = %self.me(), %conversation_id, "conversation not found");
                return false;
            };
            dialogue.state = DialogueState::Closed;
            dialogue.ended_at = Some(Utc::now());
            dialogue.end_reason = Some(reason.to_string());
            dialogue.participants.clone()
        };
        let content = json!({"conversation_id": conversation_id, "reason": reason});
        self.fan_out(conversation_id, &participants, MessageKind::DialogueEnd, &content);
        tracing::info!(agent_id = %self.me(), %conversation_id, %reason, "ended dialogue");
        true
    }

    pub fn conversation_history(&self, conversation_id: &str) -> Option<Vec<DialogueEntry>> {
        self.dialogues
            .lock()
            .get(conversation_id)
            .map(|d| d.messages.clone())
    }

    pub fn get_dialogue(&self, conversation_id: &str) -> Option<Dialogue> {
        self.dialogues.lock().get(conversation_id).cloned()
    }

    pub fn active_dialogues(&self) -> Vec<ConversationId> {
        self.dialogues
            .lock()
            .values()
            .filter(|d| d.state == DialogueState::Active)
            .map(|d| d.conversation_id.clone())
            .collect()
    }

    fn fan_out(
        &self,
        conversation_id: &ConversationId,
        participants: &[AgentId],
        kind: MessageKind,
        content: &Value,
    ) {
        let me = self.me();
        for participant in participants.iter().filter(|p| *p != me) {
            let sent = self.outbox.send_in(
                participant.as_str(),
                kind.clone(),
                content.clone(),
                conversation_id,
                Priority::Normal,
            );
            match sent {
                Ok(true) => {}
                Ok(false) => tracing::warn!(%participant, %kind, "dialogue message undeliverable"),
                Err(e) => tracing::warn!(%participant, %kind, error = %e, "failed to send dialogue message"),
            }
        }
    }

    /// `dialogue_init {conversation_id, topic, participants, initial_message}`
    pub fn handle_init(&self, msg: &Message) -> Result<Value, HandlerError> {
        let conversation_id = ConversationId::new(
            msg.content_str("conversation_id")
                .ok_or(HandlerError::MissingField("conversation_id"))?,
        );
        let topic = msg.content_str("topic").unwrap_or_default().to_string();
        let participants: Vec<AgentId> = match msg.content().get("participants") {
            Some(list) => serde_json::from_value(list.clone())?,
            None => Vec::new(),
        };

        let mut messages = Vec::new();
        if let Some(text) = msg.content_str("initial_message") {
            messages.push(DialogueEntry {
                sender: msg.sender().clone(),
                content: text.to_string(),
                timestamp: msg.timestamp(),
            });
        }
        self.dialogues.lock().insert(
            conversation_id.clone(),
            Dialogue {
                conversation_id: conversation_id.clone(),
                topic,
                participants,
                initiator: msg.sender().clone(),
                state: DialogueState::Active,
                messages,
                created_at: Utc::now(),
                ended_at: None,
                end_reason: None,
            },
        );
        tracing::info!(
            agent_id = %self.me(),
            %conversation_id,
            initiator = %msg.sender(),
            "joined dialogue"
        );
        Ok(json!({"status": "accepted", "conversation_id": conversation_id}))
    }

    /// `dialogue_message {conversation_id, content, sender}`
    pub fn handle_message(&self, msg: &Message) -> Result<Value, HandlerError> {
        let conversation_id = msg
            .content_str("conversation_id")
            .ok_or(HandlerError::MissingField("conversation_id"))?;
        let sender = msg
            .content_str("sender")
            .map(AgentId::new)
            .unwrap_or_else(|| msg.sender().clone());
        let content = msg.content_str("content").unwrap_or_default().to_string();

        let mut dialogues = self.dialogues.lock();
        let Some(dialogue) = dialogues.get_mut(conversation_id) else {
            tracing::warn!(%conversation_id, "message for unknown conversation");
            return Ok(json!({"status": "error", "message": "Conversation not found"}));
        };
        dialogue.messages.push(DialogueEntry {
            sender,
            content,
            timestamp: msg.timestamp(),
        });
        tracing::debug!(%conversation_id, from = %msg.sender(), "dialogue message");
        Ok(json!({"status": "acknowledged"}))
    }

    /// `dialogue_end {conversation_id, reason}`
    pub fn handle_end(&self, msg: &Message) -> Result<Value, HandlerError> {
        let conversation_id = msg
            .content_str("conversation_id")
            .ok_or(HandlerError::MissingField("conversation_id"))?;
        let reason = msg.content_str("reason").unwrap_or("completed");
        if let Some(dialogue) = self.dialogues.lock().get_mut(conversation_id) {
            dialogue.state = DialogueState::Closed;
            dialogue.ended_at = Some(Utc::now());
            dialogue.end_reason = Some(reason.to_string());
            tracing::info!(%conversation_id, %reason, "dialogue ended");
        }
        Ok(json!({"status": "acknowledged"}))
    }
}

#[cfg(test)]
#[path = "dialogue_tests.rs"]
mod tests;
