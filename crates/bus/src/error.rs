// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus and routing errors

use colony_core::MessageError;
use thiserror::Error;

/// Errors from publishing or routing a message
#[derive(Debug, Error)]
pub enum BusError {
    #[error("invalid message: {0}")]
    Invalid(#[from] MessageError),
    #[error("message queue full (capacity {capacity})")]
    QueueFull { capacity: usize },
    #[error("failed to spawn bus worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Failure reported by a subscriber callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DeliveryError(pub String);

impl DeliveryError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl From<String> for DeliveryError {
    fn from(reason: String) -> Self {
        Self(reason)
    }
}

impl From<&str> for DeliveryError {
    fn from(reason: &str) -> Self {
        Self(reason.to_string())
    }
}
