// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task decomposition strategies

use super::PlanningContext;
use colony_core::{Content, Task, TaskId};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;

/// Whole-word `and`, any case.
#[allow(clippy::expect_used)]
static AND_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\band\b").expect("constant regex pattern is valid"));

/// Splits one task into an ordered list of dependent subtasks.
pub trait DecompositionStrategy: Send {
    fn name(&self) -> &'static str;

    fn decompose(&self, task: &Task, context: &PlanningContext) -> Vec<Task>;
}

/// Splits the description on a whole-word conjunction, case-insensitively.
///
/// Each segment becomes a subtask that copies the parent's payload,
/// priority and creator and depends on the parent. A description without
/// the marker yields the parent unchanged.
#[derive(Debug, Clone)]
pub struct KeywordSplit {
    marker: Regex,
}

impl KeywordSplit {
    pub fn new(keyword: &str) -> Result<Self, regex::Error> {
        let marker = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(keyword)))?;
        Ok(Self { marker })
    }
}

impl Default for KeywordSplit {
    fn default() -> Self {
        Self {
            marker: AND_MARKER.clone(),
        }
    }
}

impl DecompositionStrategy for KeywordSplit {
    fn name(&self) -> &'static str {
        "keyword_split"
    }

    fn decompose(&self, task: &Task, _context: &PlanningContext) -> Vec<Task> {
        if !self.marker.is_match(task.description()) {
            return vec![task.clone()];
        }
        self.marker
            .split(task.description())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| child_of(task, part, task.payload().clone(), task.id()))
            .collect()
    }
}

/// Three-stage read → process → write pipeline for `data_processing`
/// tasks; anything else goes to the fallback strategy.
pub struct StructuredDecomposition {
    fallback: KeywordSplit,
}

pub const DATA_PROCESSING: &str = "data_processing";

impl StructuredDecomposition {
    pub fn new(fallback: KeywordSplit) -> Self {
        Self { fallback }
    }
}

impl Default for StructuredDecomposition {
    fn default() -> Self {
        Self::new(KeywordSplit::default())
    }
}

impl DecompositionStrategy for StructuredDecomposition {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn decompose(&self, task: &Task, context: &PlanningContext) -> Vec<Task> {
        if task.task_type() != DATA_PROCESSING {
            return self.fallback.decompose(task, context);
        }
        let field = |key: &str| task.payload().get(key).cloned().unwrap_or(Value::Null);
        let desc = task.description();

        let read = child_of(
            task,
            &format!("Read data for {desc}"),
            payload(json!({"operation": "read", "source": field("source")})),
            task.id(),
        );
        let process = child_of(
            task,
            &format!("Process data for {desc}"),
            payload(json!({"operation": "process", "processor": field("processor")})),
            read.id(),
        );
        let write = child_of(
            task,
            &format!("Write data for {desc}"),
            payload(json!({"operation": "write", "destination": field("destination")})),
            process.id(),
        );
        vec![read, process, write]
    }
}

fn payload(value: Value) -> Content {
    match value {
        Value::Object(map) => map,
        _ => Content::new(),
    }
}

/// New subtask inheriting `parent`'s priority and creator.
fn child_of(parent: &Task, description: &str, payload: Content, depends_on: &TaskId) -> Task {
    let mut child = Task::new(description, payload).with_priority(parent.priority());
    if let Some(creator) = parent.creator() {
        child = child.with_creator(creator.clone());
    }
    child.add_dependency(depends_on.clone());
    child
}

#[cfg(test)]
#[path = "decompose_tests.rs"]
mod tests;
