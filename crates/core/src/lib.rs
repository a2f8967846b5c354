// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! flowkit-core: traits and data structures for hybrid streaming/batch
//! workflows.
//!
//! The crate provides the execution kernel's building blocks:
//! - [`schema`]: port schemas and structural validation
//! - [`parameter`]: one-shot value slots and streaming chunk queues
//! - [`connection`]: typed edges and the broadcast router
//! - [`context`]: the per-run store of outputs, globals, and logs
//! - [`node`]: the node base (lifecycle, ports, config, chunk primitives)
//! - [`registry`]: string-keyed node type factories
//! - [`error`]: the structured error hierarchy

pub mod connection;
pub mod context;
pub mod error;
pub mod node;
pub mod parameter;
pub mod registry;
pub mod schema;
pub mod status;

pub use connection::{external_sink, Connection, ConnectionManager, ExternalSink};
pub use context::{lookup_path, LogEntry, LogLevel, WorkflowContext};
pub use error::{FlowKitError, Result, SchemaError};
pub use node::{Node, WorkflowNode};
pub use parameter::{Parameter, StreamChunk, StreamItem};
pub use registry::{global_factory, register_node_type, NodeFactory, NodeRegistry};
pub use schema::{FieldSchema, PortSchema, PrimitiveType, SchemaShape};
pub use status::{ExecutionMode, NodeStatus};

// Re-exported so downstream crates use the same async-trait version when
// implementing WorkflowNode.
pub use async_trait::async_trait;
