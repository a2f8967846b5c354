// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Per-run execution context.
//!
//! The [`WorkflowContext`] is the shared store for one engine run: node
//! outputs keyed by node id, a flat global-variable map, and an append-only
//! structured log. Writes during the sequential phase happen on the driving
//! task only; streaming consumers never write outputs directly — they emit
//! chunks.

use crate::error::{FlowKitError, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::SystemTime;

/// Severity of a context log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One structured log entry: `(timestamp, level, message)`.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    pub level: LogLevel,
    pub message: String,
}

/// Shared per-run store of node outputs, globals, and the event log.
#[derive(Debug, Default)]
pub struct WorkflowContext {
    outputs: RwLock<HashMap<String, Value>>,
    globals: RwLock<HashMap<String, Value>>,
    logs: Mutex<Vec<LogEntry>>,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a node's sequential-phase output.
    pub fn set_output(&self, node_id: &str, output: Value) {
        self.outputs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node_id.to_string(), output);
        tracing::debug!(node_id, "node output stored");
    }

    /// Returns a copy of a node's stored output, if any.
    pub fn output(&self, node_id: &str) -> Option<Value> {
        self.outputs.read().unwrap_or_else(PoisonError::into_inner).get(node_id).cloned()
    }

    /// Resolves a dotted/indexed field path against a node's stored output.
    /// Returns `Ok(None)` when the node has produced nothing yet; fails
    /// [`FlowKitError::PathNotFound`] when the path does not resolve.
    pub fn output_path(&self, node_id: &str, path: &str) -> Result<Option<Value>> {
        match self.output(node_id) {
            None => Ok(None),
            Some(output) => lookup_path(&output, path).map(Some),
        }
    }

    /// Returns a copy of every stored node output.
    pub fn all_outputs(&self) -> HashMap<String, Value> {
        self.outputs.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_global(&self, key: &str, value: Value) {
        self.globals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    pub fn global(&self, key: &str) -> Option<Value> {
        self.globals.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warning => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
        self.logs.lock().unwrap_or_else(PoisonError::into_inner).push(LogEntry {
            timestamp: SystemTime::now(),
            level,
            message,
        });
    }

    pub fn log_info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn log_warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn log_error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    /// Snapshot of the log.
    pub fn logs(&self) -> Vec<LogEntry> {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Resolves a dotted/indexed path (`data.items[0].name`) against nested
/// mappings and ordered sequences.
pub fn lookup_path(data: &Value, path: &str) -> Result<Value> {
    let mut current = data;
    for segment in path_segments(path) {
        let next = match current {
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            Value::Object(map) => map.get(segment),
            _ => None,
        };
        current = next.ok_or_else(|| FlowKitError::PathNotFound {
            path: path.to_string(),
            segment: segment.to_string(),
        })?;
    }
    Ok(current.clone())
}

/// Splits `data.items[0].name` into `["data", "items", "0", "name"]`.
fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['.', '[', ']']).filter(|segment| !segment.is_empty())
}
