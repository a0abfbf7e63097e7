// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test doubles for agent capabilities.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::chat::{ChatTurn, GenerationError, ModelInfo, TextGenerator};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Deterministic [`TextGenerator`]: replays scripted outcomes, then echoes
/// the prompt. Every call is recorded.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, GenerationError>>>,
    prompts: Mutex<Vec<(String, usize)>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.script.lock().push_back(Ok(text.to_string()));
        self
    }

    pub fn fail(self, error: GenerationError) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    /// Prompts seen so far, with the history length passed alongside.
    pub fn prompts(&self) -> Vec<(String, usize)> {
        self.prompts.lock().clone()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate_text(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, GenerationError> {
        self.prompts.lock().push((prompt.to_string(), history.len()));
        match self.script.lock().pop_front() {
            Some(outcome) => outcome,
            None => Ok(format!("echo: {prompt}")),
        }
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, GenerationError> {
        Ok(text.bytes().take(8).map(|b| f32::from(b) / 255.0).collect())
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_name: "scripted".to_string(),
            capabilities: vec!["text_generation".to_string(), "embedding".to_string()],
        }
    }
}
