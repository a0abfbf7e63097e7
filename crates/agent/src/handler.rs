// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message-type handler registry

use crate::error::HandlerError;
use colony_core::{Message, MessageKind};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Handler for one message kind. The returned value is the dispatch result.
pub type Handler = Arc<dyn Fn(&Message) -> Result<Value, HandlerError> + Send + Sync>;

/// Handlers keyed by message kind. The last registration for a kind wins.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Mutex<HashMap<MessageKind, Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, kind: impl Into<MessageKind>, handler: F)
    where
        F: Fn(&Message) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if self.handlers.lock().insert(kind.clone(), Arc::new(handler)).is_some() {
            tracing::debug!(%kind, "replaced handler");
        }
    }

    pub fn remove(&self, kind: &MessageKind) -> bool {
        self.handlers.lock().remove(kind).is_some()
    }

    pub fn get(&self, kind: &MessageKind) -> Option<Handler> {
        self.handlers.lock().get(kind).cloned()
    }

    pub fn contains(&self, kind: &MessageKind) -> bool {
        self.handlers.lock().contains_key(kind)
    }

    /// Registered kinds, sorted by tag.
    pub fn kinds(&self) -> Vec<MessageKind> {
        let mut kinds: Vec<MessageKind> = self.handlers.lock().keys().cloned().collect();
        kinds.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        kinds
    }
}
