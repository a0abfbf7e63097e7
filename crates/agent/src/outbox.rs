// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outgoing messages on behalf of one agent.

use crate::error::HandlerError;
use colony_bus::MessageRouter;
use colony_core::{AgentId, ConversationId, Message, MessageKind, Priority, BROADCAST};
use serde_json::Value;
use std::sync::Arc;

/// Sends messages through the router with a fixed sender id.
#[derive(Clone)]
pub struct Outbox {
    agent_id: AgentId,
    router: Arc<MessageRouter>,
}

impl Outbox {
    pub fn new(agent_id: AgentId, router: Arc<MessageRouter>) -> Self {
        Self { agent_id, router }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    /// Route a prepared message. Returns whether anything took it.
    pub fn send_message(&self, message: Message) -> Result<bool, HandlerError> {
        let delivered = self.router.route_message(message)?;
        Ok(delivered)
    }

    pub fn send(
        &self,
        receiver: &str,
        kind: impl Into<MessageKind>,
        content: Value,
    ) -> Result<bool, HandlerError> {
        let message = Message::new(self.agent_id.clone(), receiver, kind, content)?;
        self.send_message(message)
    }

    /// Send within an existing conversation.
    pub fn send_in(
        &self,
        receiver: &str,
        kind: impl Into<MessageKind>,
        content: Value,
        conversation_id: &ConversationId,
        priority: Priority,
    ) -> Result<bool, HandlerError> {
        let message = Message::new(self.agent_id.clone(), receiver, kind, content)?
            .with_conversation(conversation_id.clone())
            .with_priority(priority);
        self.send_message(message)
    }

    /// Reply to the sender of `to`, in its conversation.
    pub fn reply(
        &self,
        to: &Message,
        kind: impl Into<MessageKind>,
        content: Value,
    ) -> Result<bool, HandlerError> {
        let message = to.reply(self.agent_id.clone(), kind, content)?;
        self.send_message(message)
    }

    pub fn broadcast(&self, kind: impl Into<MessageKind>, content: Value) -> Result<bool, HandlerError> {
        self.send(BROADCAST, kind, content)
    }
}
