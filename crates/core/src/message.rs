// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message value object and its wire shape.
//!
//! A [`Message`] is immutable once built. Construction and deserialization
//! both validate, so any `Message` in hand already satisfies the schema:
//! non-empty sender/receiver, a non-empty JSON object as content, and a
//! priority in `1..=4`.

use crate::agent::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

crate::define_id! {
    /// Unique identifier for a message, fresh for every constructed message.
    pub struct MessageId;
}

crate::define_id! {
    /// Groups related messages (request, reply, group copies) together.
    pub struct ConversationId;
}

/// Receiver address that fans out to every broadcast subscriber.
pub const BROADCAST: &str = "broadcast";

/// Receiver prefix addressing a registered agent group.
pub const GROUP_PREFIX: &str = "group:";

/// Key/value payload carried by a message.
pub type Content = Map<String, Value>;

/// Errors raised when a message does not satisfy the schema.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("sender_id cannot be empty")]
    EmptySender,
    #[error("receiver_id cannot be empty")]
    EmptyReceiver,
    #[error("message_id cannot be empty")]
    EmptyId,
    #[error("content must be a JSON object, got {0}")]
    ContentNotObject(&'static str),
    #[error("content must not be empty")]
    EmptyContent,
    #[error("priority {0} out of range 1..=4")]
    PriorityOutOfRange(i64),
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Message type tag.
///
/// The set is open: any handler may introduce a new tag at runtime, which
/// round-trips as [`MessageKind::Custom`]. Build kinds from strings with
/// `MessageKind::from` so that known tags always map to their variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    Task,
    Response,
    System,
    Notification,
    Broadcast,
    Chat,
    TaskAssignment,
    TaskCompletion,
    TaskFailure,
    TaskPlanningRequest,
    ConsensusProposal,
    ConsensusVote,
    ConsensusResult,
    DialogueInit,
    DialogueMessage,
    DialogueEnd,
    Custom(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Task => "task",
            MessageKind::Response => "response",
            MessageKind::System => "system",
            MessageKind::Notification => "notification",
            MessageKind::Broadcast => "broadcast",
            MessageKind::Chat => "chat_message",
            MessageKind::TaskAssignment => "task_assignment",
            MessageKind::TaskCompletion => "task_completion",
            MessageKind::TaskFailure => "task_failure",
            MessageKind::TaskPlanningRequest => "task_planning_request",
            MessageKind::ConsensusProposal => "consensus_proposal",
            MessageKind::ConsensusVote => "consensus_vote",
            MessageKind::ConsensusResult => "consensus_result",
            MessageKind::DialogueInit => "dialogue_init",
            MessageKind::DialogueMessage => "dialogue_message",
            MessageKind::DialogueEnd => "dialogue_end",
            MessageKind::Custom(tag) => tag,
        }
    }

    /// Returns true for tags outside the built-in set.
    pub fn is_custom(&self) -> bool {
        matches!(self, MessageKind::Custom(_))
    }
}

impl From<&str> for MessageKind {
    fn from(tag: &str) -> Self {
        match tag {
            "task" => MessageKind::Task,
            "response" => MessageKind::Response,
            "system" => MessageKind::System,
            "notification" => MessageKind::Notification,
            "broadcast" => MessageKind::Broadcast,
            "chat_message" => MessageKind::Chat,
            "task_assignment" => MessageKind::TaskAssignment,
            "task_completion" => MessageKind::TaskCompletion,
            "task_failure" => MessageKind::TaskFailure,
            "task_planning_request" => MessageKind::TaskPlanningRequest,
            "consensus_proposal" => MessageKind::ConsensusProposal,
            "consensus_vote" => MessageKind::ConsensusVote,
            "consensus_result" => MessageKind::ConsensusResult,
            "dialogue_init" => MessageKind::DialogueInit,
            "dialogue_message" => MessageKind::DialogueMessage,
            "dialogue_end" => MessageKind::DialogueEnd,
            other => MessageKind::Custom(other.to_string()),
        }
    }
}

impl From<String> for MessageKind {
    fn from(tag: String) -> Self {
        MessageKind::from(tag.as_str())
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Custom(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery priority, serialized as its integer level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub enum Priority {
    Low = 1,
    #[default]
    Normal = 2,
    High = 3,
    Urgent = 4,
}

impl Priority {
    pub fn level(self) -> u8 {
        self as u8
    }
}

impl TryFrom<i64> for Priority {
    type Error = MessageError;

    fn try_from(level: i64) -> Result<Self, Self::Error> {
        match level {
            1 => Ok(Priority::Low),
            2 => Ok(Priority::Normal),
            3 => Ok(Priority::High),
            4 => Ok(Priority::Urgent),
            other => Err(MessageError::PriorityOutOfRange(other)),
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.level()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level())
    }
}

/// Immutable message exchanged between agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MessageWire")]
pub struct Message {
    message_id: MessageId,
    sender_id: AgentId,
    receiver_id: String,
    msg_type: MessageKind,
    content: Content,
    timestamp: DateTime<Utc>,
    priority: Priority,
    conversation_id: ConversationId,
    metadata: Content,
}

/// Deserialization shape; converted into [`Message`] only after validation.
#[derive(Deserialize)]
struct MessageWire {
    message_id: MessageId,
    sender_id: AgentId,
    receiver_id: String,
    msg_type: MessageKind,
    content: Value,
    timestamp: DateTime<Utc>,
    priority: Priority,
    conversation_id: ConversationId,
    #[serde(default)]
    metadata: Content,
}

impl TryFrom<MessageWire> for Message {
    type Error = MessageError;

    fn try_from(wire: MessageWire) -> Result<Self, Self::Error> {
        if wire.message_id.is_empty() {
            return Err(MessageError::EmptyId);
        }
        let message = Message {
            message_id: wire.message_id,
            sender_id: wire.sender_id,
            receiver_id: wire.receiver_id,
            msg_type: wire.msg_type,
            content: into_content(wire.content)?,
            timestamp: wire.timestamp,
            priority: wire.priority,
            conversation_id: wire.conversation_id,
            metadata: wire.metadata,
        };
        message.validate()?;
        Ok(message)
    }
}

fn into_content(value: Value) -> Result<Content, MessageError> {
    match value {
        Value::Object(map) if map.is_empty() => Err(MessageError::EmptyContent),
        Value::Object(map) => Ok(map),
        Value::Null => Err(MessageError::ContentNotObject("null")),
        Value::Bool(_) => Err(MessageError::ContentNotObject("bool")),
        Value::Number(_) => Err(MessageError::ContentNotObject("number")),
        Value::String(_) => Err(MessageError::ContentNotObject("string")),
        Value::Array(_) => Err(MessageError::ContentNotObject("array")),
    }
}

impl Message {
    /// Build a message with normal priority in a fresh conversation.
    pub fn new(
        sender: impl Into<AgentId>,
        receiver: impl Into<String>,
        kind: impl Into<MessageKind>,
        content: Value,
    ) -> Result<Self, MessageError> {
        let message = Message {
            message_id: MessageId::random(),
            sender_id: sender.into(),
            receiver_id: receiver.into(),
            msg_type: kind.into(),
            content: into_content(content)?,
            timestamp: Utc::now(),
            priority: Priority::Normal,
            conversation_id: ConversationId::random(),
            metadata: Content::new(),
        };
        message.validate()?;
        Ok(message)
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_conversation(mut self, conversation_id: ConversationId) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    pub fn with_metadata(mut self, metadata: Content) -> Self {
        self.metadata = metadata;
        self
    }

    /// Independent copy addressed to `receiver`.
    ///
    /// The copy gets a new id and timestamp but keeps the conversation,
    /// content, priority and metadata of the original.
    pub fn readdressed(&self, receiver: impl Into<String>) -> Self {
        Message {
            message_id: MessageId::random(),
            receiver_id: receiver.into(),
            timestamp: Utc::now(),
            ..self.clone()
        }
    }

    /// Reply from `sender` back to this message's sender, in the same conversation.
    pub fn reply(
        &self,
        sender: impl Into<AgentId>,
        kind: impl Into<MessageKind>,
        content: Value,
    ) -> Result<Self, MessageError> {
        Ok(Message::new(sender, self.sender_id.as_str(), kind, content)?
            .with_conversation(self.conversation_id.clone()))
    }

    pub fn id(&self) -> &MessageId {
        &self.message_id
    }

    pub fn sender(&self) -> &AgentId {
        &self.sender_id
    }

    pub fn receiver(&self) -> &str {
        &self.receiver_id
    }

    pub fn kind(&self) -> &MessageKind {
        &self.msg_type
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn metadata(&self) -> &Content {
        &self.metadata
    }

    /// String field of the content, if present.
    pub fn content_str(&self, key: &str) -> Option<&str> {
        self.content.get(key).and_then(Value::as_str)
    }

    pub fn is_broadcast(&self) -> bool {
        self.receiver_id == BROADCAST
    }

    /// Group id when the receiver is a `group:<gid>` address.
    pub fn group_id(&self) -> Option<&str> {
        self.receiver_id.strip_prefix(GROUP_PREFIX)
    }

    /// Check the schema invariants.
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.sender_id.is_empty() {
            return Err(MessageError::EmptySender);
        }
        if self.receiver_id.is_empty() {
            return Err(MessageError::EmptyReceiver);
        }
        if self.content.is_empty() {
            return Err(MessageError::EmptyContent);
        }
        Ok(())
    }

    /// Dictionary form matching the wire schema.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn serialize(&self) -> Result<String, MessageError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn deserialize(json: &str) -> Result<Self, MessageError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message(id={}, from={}, to={}, type={})",
            self.message_id.short(8),
            self.sender_id,
            self.receiver_id,
            self.msg_type
        )
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
