// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Typed connections between node ports and the broadcast router.
//!
//! A [`Connection`] joins a source output port to either an internal target
//! port or an external callback. The [`ConnectionManager`] owns every
//! connection for the lifetime of the engine and performs the two routing
//! operations of the kernel:
//! - [`ConnectionManager::route_chunk`]: broadcast a streaming chunk to all
//!   targets of a source port (fan-out), preserving per-target emission order
//! - [`ConnectionManager::propagate_value`]: assign a one-shot value to all
//!   downstream parameter slots
//!
//! Structural schema validation happens at connection construction; the
//! graph is rejected before anything runs if two wired ports disagree.

use crate::error::{FlowKitError, Result};
use crate::parameter::{Parameter, StreamChunk, StreamItem, ValueSlot};
use crate::schema::PortSchema;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;

/// Callback registered as an external sink. Receives the chunk payload for
/// streaming sources, or the propagated value for one-shot sources. Held by
/// strong reference for the engine's lifetime.
pub type ExternalSink = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wraps an async closure into an [`ExternalSink`].
pub fn external_sink<F, Fut>(callback: F) -> ExternalSink
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Arc::new(move |value| Box::pin(callback(value)))
}

/// Where a connection delivers data.
pub enum ConnectionTarget {
    /// Internal streaming edge: a handle onto the target port's queue.
    StreamPort { node: String, port: String, queue: mpsc::UnboundedSender<StreamItem> },
    /// Internal one-shot edge: the target parameter's value slot.
    ValuePort { node: String, port: String, slot: ValueSlot },
    /// External sink: an opaque callback instead of a node.
    External { callback: ExternalSink },
}

/// A typed edge from a source port to a target port or external sink.
pub struct Connection {
    source: (String, String),
    source_schema: PortSchema,
    target: ConnectionTarget,
    is_streaming: bool,
}

impl Connection {
    /// Builds and validates an internal connection between two parameters.
    ///
    /// # Errors
    ///
    /// Fails with [`FlowKitError::Configuration`] when the two schemas are
    /// not structurally equal; the message names both endpoints and prints
    /// both schemas.
    pub fn internal(
        source_node: &str,
        source_param: &Parameter,
        target_node: &str,
        target_param: &Parameter,
    ) -> Result<Self> {
        let source_schema = source_param.schema();
        let target_schema = target_param.schema();
        if !source_schema.matches(target_schema) {
            return Err(FlowKitError::Configuration(format!(
                "connection schema mismatch:\n  source: {}.{} -> {:?}\n  target: {}.{} -> {:?}\nport schemas must be structurally equal to connect",
                source_node,
                source_param.name(),
                source_schema,
                target_node,
                target_param.name(),
                target_schema,
            )));
        }

        let target = if source_schema.is_streaming {
            ConnectionTarget::StreamPort {
                node: target_node.to_string(),
                port: target_param.name().to_string(),
                queue: target_param.sender()?,
            }
        } else {
            ConnectionTarget::ValuePort {
                node: target_node.to_string(),
                port: target_param.name().to_string(),
                slot: target_param.value_slot()?,
            }
        };

        Ok(Self {
            source: (source_node.to_string(), source_param.name().to_string()),
            is_streaming: source_schema.is_streaming,
            source_schema: source_schema.clone(),
            target,
        })
    }

    /// Builds an external connection. External registrations never fail
    /// schema validation because they have no target schema.
    pub fn external(
        source_node: &str,
        source_port: &str,
        source_schema: PortSchema,
        callback: ExternalSink,
    ) -> Self {
        Self {
            source: (source_node.to_string(), source_port.to_string()),
            is_streaming: source_schema.is_streaming,
            source_schema,
            target: ConnectionTarget::External { callback },
        }
    }

    /// Source endpoint as `(node_id, port_name)`.
    pub fn source(&self) -> (&str, &str) {
        (&self.source.0, &self.source.1)
    }

    /// Target endpoint as `(node_id, port_name)`, `None` for external sinks.
    pub fn target_endpoint(&self) -> Option<(&str, &str)> {
        match &self.target {
            ConnectionTarget::StreamPort { node, port, .. }
            | ConnectionTarget::ValuePort { node, port, .. } => Some((node, port)),
            ConnectionTarget::External { .. } => None,
        }
    }

    pub const fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    pub const fn is_external(&self) -> bool {
        matches!(self.target, ConnectionTarget::External { .. })
    }

    pub const fn source_schema(&self) -> &PortSchema {
        &self.source_schema
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.target_endpoint() {
            Some((node, port)) => {
                write!(f, "Connection({}.{} -> {node}.{port})", self.source.0, self.source.1)
            },
            None => write!(f, "ExternalConnection({}.{} -> sink)", self.source.0, self.source.1),
        }
    }
}

#[derive(Default)]
struct ManagerState {
    connections: Vec<Arc<Connection>>,
    streaming: Vec<Arc<Connection>>,
    value: Vec<Arc<Connection>>,
    external: Vec<Arc<Connection>>,
    by_source: HashMap<(String, String), Vec<Arc<Connection>>>,
}

impl ManagerState {
    fn insert(&mut self, conn: Arc<Connection>) {
        self.connections.push(conn.clone());
        if conn.is_external() {
            self.external.push(conn.clone());
        } else if conn.is_streaming() {
            self.streaming.push(conn.clone());
        } else {
            self.value.push(conn.clone());
        }
        let (node, port) = conn.source();
        self.by_source.entry((node.to_string(), port.to_string())).or_default().push(conn);
    }
}

/// Owns every connection and performs chunk/value routing.
///
/// Internal edges are added only at build time; external edges may be
/// registered post-build, before or during start.
#[derive(Default)]
pub struct ConnectionManager {
    state: RwLock<ManagerState>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates, validates, and indexes an internal connection.
    pub fn add_connection(
        &self,
        source_node: &str,
        source_param: &Parameter,
        target_node: &str,
        target_param: &Parameter,
    ) -> Result<Arc<Connection>> {
        let conn = Arc::new(Connection::internal(
            source_node,
            source_param,
            target_node,
            target_param,
        )?);
        self.state.write().unwrap_or_else(PoisonError::into_inner).insert(conn.clone());
        tracing::debug!(connection = ?conn, "connection added");
        Ok(conn)
    }

    /// Registers an external sink on a source port.
    pub fn add_external_connection(
        &self,
        source_node: &str,
        source_port: &str,
        source_schema: PortSchema,
        callback: ExternalSink,
    ) -> Arc<Connection> {
        let conn = Arc::new(Connection::external(source_node, source_port, source_schema, callback));
        self.state.write().unwrap_or_else(PoisonError::into_inner).insert(conn.clone());
        tracing::debug!(connection = ?conn, "external connection added");
        conn
    }

    fn outgoing(&self, source_node: &str, source_port: &str) -> Vec<Arc<Connection>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_source
            .get(&(source_node.to_string(), source_port.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Broadcasts a chunk to every target of the source port. Per-target
    /// queue order matches emission order on the source; across distinct
    /// targets no ordering is guaranteed. Closed target queues are skipped.
    pub async fn route_chunk(&self, source_node: &str, source_port: &str, chunk: &StreamChunk) {
        for conn in self.outgoing(source_node, source_port) {
            match &conn.target {
                ConnectionTarget::StreamPort { node, port, queue } => {
                    if queue.send(StreamItem::Chunk(chunk.clone())).is_err() {
                        // Expected during shutdown, once the consumer is gone.
                        tracing::debug!(
                            target_node = %node,
                            target_port = %port,
                            "target queue closed, chunk dropped"
                        );
                    }
                },
                ConnectionTarget::External { callback } => {
                    callback(chunk.payload().clone()).await;
                },
                ConnectionTarget::ValuePort { .. } => {},
            }
        }
    }

    /// Assigns a one-shot value to every downstream parameter slot and
    /// dispatches external callbacks as fire-and-forget tasks.
    pub fn propagate_value(&self, source_node: &str, source_port: &str, value: &Value) {
        for conn in self.outgoing(source_node, source_port) {
            match &conn.target {
                ConnectionTarget::ValuePort { slot, .. } => {
                    *slot.write().unwrap_or_else(PoisonError::into_inner) = Some(value.clone());
                },
                ConnectionTarget::External { callback } => {
                    tokio::spawn(callback(value.clone()));
                },
                ConnectionTarget::StreamPort { .. } => {},
            }
        }
    }

    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).connections.clone()
    }

    pub fn streaming_connections(&self) -> Vec<Arc<Connection>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).streaming.clone()
    }

    pub fn value_connections(&self) -> Vec<Arc<Connection>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).value.clone()
    }

    pub fn external_connections(&self) -> Vec<Arc<Connection>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).external.clone()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ConnectionManager")
            .field("connections", &state.connections.len())
            .field("streaming", &state.streaming.len())
            .field("value", &state.value.len())
            .field("external", &state.external.len())
            .finish()
    }
}
