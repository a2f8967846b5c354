// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for FlowKit.
//!
//! This module provides a hierarchy of error types for better error handling
//! and programmatic error inspection. The variants map onto the three failure
//! classes of the workflow kernel:
//! - [`FlowKitError::Configuration`]: static graph/config problems, fatal at build time
//! - [`FlowKitError::NodeExecution`]: failures raised inside a node during the sequential phase
//! - [`FlowKitError::Workflow`]: engine state misuse (execute before start, etc.)

use thiserror::Error;

/// Validation failure raised while checking a value against a port schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A primitive value did not have the declared type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: &'static str, actual: &'static str },

    /// A struct-shaped schema received a non-mapping value.
    #[error("expected a mapping value, got {actual}")]
    ShapeMismatch { actual: &'static str },

    /// A required field was absent and no default was declared.
    #[error("missing required field '{field}'")]
    MissingField { field: String },
}

/// Main error type for FlowKit operations.
#[derive(Debug, Error)]
pub enum FlowKitError {
    /// Static configuration error: unknown node type, duplicate id,
    /// unresolved port, schema mismatch on a connection, malformed config
    /// shape, missing required config field.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A value failed validation against a port or field schema.
    #[error("schema validation failed: {0}")]
    Schema(#[from] SchemaError),

    /// A dotted/indexed path could not be resolved against stored data.
    #[error("path '{path}' not found: no value at segment '{segment}'")]
    PathNotFound { path: String, segment: String },

    /// Template rendering failed.
    #[error("template rendering failed: {0}")]
    Template(String),

    /// A node failed inside `execute`/`run` during the sequential phase.
    /// Carries the offending node id and the original cause.
    #[error("node '{node_id}' execution failed: {source}")]
    NodeExecution {
        node_id: String,
        #[source]
        source: Box<FlowKitError>,
    },

    /// Engine-state misuse: start when already running, execute before
    /// start, stop when never started.
    #[error("workflow error: {0}")]
    Workflow(String),

    /// Runtime processing error during normal operation. This is the
    /// catch-all node authors reach for when bailing with a message.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// I/O error (config file loading, output writers).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowKitError {
    /// Wraps any kernel error as a sequential-phase node failure.
    pub fn execution(node_id: impl Into<String>, source: FlowKitError) -> Self {
        Self::NodeExecution { node_id: node_id.into(), source: Box::new(source) }
    }
}

/// Convenience type alias for Results using `FlowKitError`.
pub type Result<T> = std::result::Result<T, FlowKitError>;

// Allow node authors to bail with plain string messages.
impl From<String> for FlowKitError {
    fn from(s: String) -> Self {
        Self::Runtime(s)
    }
}

impl From<&str> for FlowKitError {
    fn from(s: &str) -> Self {
        Self::Runtime(s.to_string())
    }
}
