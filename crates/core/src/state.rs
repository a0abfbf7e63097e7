// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent key/value state.
//!
//! [`AgentState`] keeps values in memory and, when persistent, rewrites a
//! JSON file after every mutation (`<path>.tmp` then rename over `<path>`).
//! A persisted file is loaded at construction; an unreadable or corrupt file
//! is logged and the state starts empty.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::agent::AgentId;

/// Errors from persisting agent state
#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Snapshot of a store's bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateMetadata {
    pub agent_id: AgentId,
    pub key_count: usize,
    pub last_modified: DateTime<Utc>,
    pub persistent: bool,
    pub storage_path: Option<PathBuf>,
}

/// Key/value store owned by one agent.
///
/// Mutations are applied in memory first; an `Err` means the value is held
/// but could not be written to disk.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StateError>;

    /// Returns whether the key existed.
    fn delete(&self, key: &str) -> Result<bool, StateError>;

    fn update(&self, updates: Map<String, Value>) -> Result<(), StateError>;

    fn get_all(&self) -> Map<String, Value>;

    fn clear(&self) -> Result<(), StateError>;

    fn metadata(&self) -> StateMetadata;
}

#[derive(Debug)]
struct Inner {
    values: Map<String, Value>,
    last_modified: DateTime<Utc>,
}

/// In-memory [`StateStore`] with optional JSON persistence.
#[derive(Debug)]
pub struct AgentState {
    agent_id: AgentId,
    storage_path: Option<PathBuf>,
    inner: Mutex<Inner>,
}

impl AgentState {
    pub fn in_memory(agent_id: impl Into<AgentId>) -> Self {
        Self {
            agent_id: agent_id.into(),
            storage_path: None,
            inner: Mutex::new(Inner {
                values: Map::new(),
                last_modified: Utc::now(),
            }),
        }
    }

    /// Persistent store backed by `path`, loading it if present.
    pub fn persistent(agent_id: impl Into<AgentId>, path: impl Into<PathBuf>) -> Self {
        let agent_id = agent_id.into();
        let path = path.into();
        let (values, last_modified) = match load(&path) {
            Ok(Some(loaded)) => loaded,
            Ok(None) => (Map::new(), Utc::now()),
            Err(e) => {
                tracing::warn!(
                    agent_id = %agent_id,
                    path = %path.display(),
                    error = %e,
                    "failed to load persisted state, starting empty"
                );
                (Map::new(), Utc::now())
            }
        };
        Self {
            agent_id,
            storage_path: Some(path),
            inner: Mutex::new(Inner {
                values,
                last_modified,
            }),
        }
    }

    /// Default file location for an agent under `state_dir`.
    pub fn default_path(state_dir: &Path, agent_id: &AgentId) -> PathBuf {
        state_dir.join(format!("{}.json", agent_id))
    }

    pub fn is_persistent(&self) -> bool {
        self.storage_path.is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Map<String, Value>) -> (T, bool)) -> Result<T, StateError> {
        let mut inner = self.inner.lock();
        let (out, changed) = f(&mut inner.values);
        if !changed {
            return Ok(out);
        }
        inner.last_modified = Utc::now();
        if let Some(path) = &self.storage_path {
            save(path, &inner.values)?;
        }
        Ok(out)
    }
}

impl StateStore for AgentState {
    fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().values.get(key).cloned()
    }

    fn contains(&self, key: &str) -> bool {
        self.inner.lock().values.contains_key(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StateError> {
        self.mutate(|values| {
            values.insert(key.to_string(), value);
            ((), true)
        })
    }

    fn delete(&self, key: &str) -> Result<bool, StateError> {
        self.mutate(|values| {
            let existed = values.remove(key).is_some();
            (existed, existed)
        })
    }

    fn update(&self, updates: Map<String, Value>) -> Result<(), StateError> {
        self.mutate(|values| {
            values.extend(updates);
            ((), true)
        })
    }

    fn get_all(&self) -> Map<String, Value> {
        self.inner.lock().values.clone()
    }

    fn clear(&self) -> Result<(), StateError> {
        self.mutate(|values| {
            values.clear();
            ((), true)
        })
    }

    fn metadata(&self) -> StateMetadata {
        let inner = self.inner.lock();
        StateMetadata {
            agent_id: self.agent_id.clone(),
            key_count: inner.values.len(),
            last_modified: inner.last_modified,
            persistent: self.storage_path.is_some(),
            storage_path: self.storage_path.clone(),
        }
    }
}

fn load(path: &Path) -> Result<Option<(Map<String, Value>, DateTime<Utc>)>, StateError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path)?;
    let values: Map<String, Value> = serde_json::from_slice(&bytes)?;
    let modified = std::fs::metadata(path)?
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    Ok(Some((values, modified)))
}

fn save(path: &Path, values: &Map<String, Value>) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    let data = serde_json::to_vec_pretty(values)?;
    let mut file = File::create(&tmp_path)?;
    file.write_all(&data)?;
    file.sync_all()?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
