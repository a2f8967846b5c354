// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Node base: the declarative surface and lifecycle of a workflow node.
//!
//! Node authors implement [`WorkflowNode`] (the behavior) and declare ports,
//! config fields, and an execution mode. The kernel wraps each behavior in a
//! [`Node`] instance that owns the port parameters, the raw and resolved
//! configuration, the lifecycle status, and the chunk primitives
//! (`emit`/`feed`/`consume_stream`).
//!
//! ## Lifecycle contract
//!
//! - `initialize(ctx)`: one-time setup before any chunk can flow; failures
//!   are fatal to workflow start.
//! - `run(ctx)`: the long-running body for streaming/hybrid nodes; must
//!   return promptly for sequential nodes and block until cancelled for
//!   streaming ones.
//! - `execute(ctx)`: invoked during the ordered batch phase; the default
//!   implementation delegates to `run`.
//! - `shutdown()`: release resources; invoked at engine stop even after
//!   failures.

use crate::connection::ConnectionManager;
use crate::context::WorkflowContext;
use crate::error::{FlowKitError, Result};
use crate::parameter::{Parameter, StreamChunk, StreamItem};
use crate::schema::{FieldSchema, PortSchema};
use crate::status::{ExecutionMode, NodeStatus};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

/// Behavior implemented by every node type.
#[async_trait]
pub trait WorkflowNode: Send + Sync {
    /// Declared input ports. Port names are unique within the set.
    fn input_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::new()
    }

    /// Declared output ports.
    fn output_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::new()
    }

    /// Typed config field declarations; defaults and required-checks are
    /// applied to the raw configuration at node construction.
    fn config_fields(&self) -> IndexMap<String, FieldSchema> {
        IndexMap::new()
    }

    /// The scheduling discipline for this node type. A declaration-level
    /// `execution_mode` override wins over this default.
    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Sequential
    }

    /// Optional one-time setup, called before any chunk can flow.
    async fn initialize(&self, _node: &Node, _ctx: &WorkflowContext) -> Result<()> {
        Ok(())
    }

    /// The node body. Sequential nodes return their result; streaming
    /// nodes block until cancelled (see [`Node::cancelled`]).
    async fn run(&self, node: &Node, ctx: &WorkflowContext) -> Result<Option<Value>>;

    /// Ordered batch-phase entry point; defaults to `run`. Hybrid nodes
    /// must override this, since their `run` body blocks.
    async fn execute(&self, node: &Node, ctx: &WorkflowContext) -> Result<Option<Value>> {
        self.run(node, ctx).await
    }

    /// Handles one chunk from a streaming input port. Invoked sequentially
    /// per port; errors are logged and the consumer loop continues.
    async fn on_chunk(&self, _node: &Node, _port: &str, _chunk: StreamChunk) -> Result<()> {
        Ok(())
    }

    /// Releases resources at engine stop. Failures are logged, not raised.
    async fn shutdown(&self, _node: &Node) -> Result<()> {
        Ok(())
    }
}

/// A node instance: behavior plus kernel-side state (ports, config, status).
pub struct Node {
    id: String,
    display_name: String,
    mode: ExecutionMode,
    behavior: Box<dyn WorkflowNode>,
    status: RwLock<NodeStatus>,
    config: RwLock<Value>,
    resolved_config: RwLock<Option<Value>>,
    inputs: IndexMap<String, Parameter>,
    outputs: IndexMap<String, Parameter>,
    router: Arc<ConnectionManager>,
    shutdown_token: CancellationToken,
}

impl Node {
    /// Builds a node instance: instantiates one [`Parameter`] per declared
    /// port (queues allocated here, before `initialize`) and applies the
    /// behavior's config field declarations to the raw configuration.
    ///
    /// # Errors
    ///
    /// Fails with [`FlowKitError::Configuration`] when the config is not a
    /// mapping, a required config field is missing, or a config field has
    /// the wrong type.
    pub fn new(
        id: impl Into<String>,
        display_name: Option<String>,
        mode_override: Option<ExecutionMode>,
        behavior: Box<dyn WorkflowNode>,
        config: Option<Value>,
        router: Arc<ConnectionManager>,
    ) -> Result<Self> {
        let id = id.into();

        let mut config = match config {
            None => Value::Object(serde_json::Map::new()),
            Some(value @ Value::Object(_)) => value,
            Some(other) => {
                return Err(FlowKitError::Configuration(format!(
                    "node '{id}' config must be a mapping, got {}",
                    crate::schema::value_type_name(&other)
                )))
            },
        };

        // Apply declared defaults and required-checks to the raw config.
        if let Some(map) = config.as_object_mut() {
            for (field, schema) in behavior.config_fields() {
                schema.validate_and_apply(map, &field).map_err(|e| {
                    let mut message = format!("node '{id}' config field '{field}': {e}");
                    if !schema.description.is_empty() {
                        message.push_str(&format!(" ({})", schema.description));
                    }
                    FlowKitError::Configuration(message)
                })?;
            }
        }

        let inputs = behavior
            .input_ports()
            .into_iter()
            .map(|(name, schema)| (name.clone(), Parameter::new(name, schema)))
            .collect();
        let outputs = behavior
            .output_ports()
            .into_iter()
            .map(|(name, schema)| (name.clone(), Parameter::new(name, schema)))
            .collect();

        let mode = mode_override.unwrap_or_else(|| behavior.execution_mode());

        Ok(Self {
            display_name: display_name.unwrap_or_else(|| id.clone()),
            id,
            mode,
            behavior,
            status: RwLock::new(NodeStatus::Pending),
            config: RwLock::new(config),
            resolved_config: RwLock::new(None),
            inputs,
            outputs,
            router,
            shutdown_token: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub const fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn status(&self) -> NodeStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_status(&self, status: NodeStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    pub const fn inputs(&self) -> &IndexMap<String, Parameter> {
        &self.inputs
    }

    pub const fn outputs(&self) -> &IndexMap<String, Parameter> {
        &self.outputs
    }

    /// Looks up an input port by name.
    pub fn input(&self, port: &str) -> Result<&Parameter> {
        self.inputs.get(port).ok_or_else(|| {
            FlowKitError::Runtime(format!(
                "node '{}' has no input port '{port}' (available: {:?})",
                self.id,
                self.inputs.keys().collect::<Vec<_>>()
            ))
        })
    }

    /// Looks up an output port by name.
    pub fn output(&self, port: &str) -> Result<&Parameter> {
        self.outputs.get(port).ok_or_else(|| {
            FlowKitError::Runtime(format!(
                "node '{}' has no output port '{port}' (available: {:?})",
                self.id,
                self.outputs.keys().collect::<Vec<_>>()
            ))
        })
    }

    // ----- chunk primitives -----

    /// Validates a payload, wraps it in a chunk, and broadcasts it to every
    /// target of the given streaming output port.
    pub async fn emit(&self, port: &str, mut payload: Value) -> Result<()> {
        let param = self.output(port)?;
        if !param.is_streaming() {
            return Err(FlowKitError::Runtime(format!(
                "output port '{port}' on node '{}' is not streaming; use set_output_value",
                self.id
            )));
        }
        param.schema().validate(&mut payload)?;
        let chunk = StreamChunk::new(payload);
        self.router.route_chunk(&self.id, port, &chunk).await;
        Ok(())
    }

    /// Injects external data into a streaming input port.
    pub fn feed(&self, port: &str, payload: Value) -> Result<()> {
        self.input(port)?.push_chunk(payload)?;
        Ok(())
    }

    /// Closes a streaming input port by enqueueing the end-of-stream
    /// sentinel.
    pub fn close_input(&self, port: &str) -> Result<()> {
        self.input(port)?.close()
    }

    /// Consumer loop for one streaming input port: dequeues chunks, stops
    /// on the end-of-stream sentinel, and dispatches each chunk to the
    /// behavior's `on_chunk` hook. Hook errors are logged and the loop
    /// continues with the next chunk.
    pub async fn consume_stream(self: Arc<Self>, port: String) {
        let mut rx = match self.input(&port).and_then(Parameter::take_receiver) {
            Ok(rx) => rx,
            Err(e) => {
                tracing::error!(node_id = %self.id, port, error = %e, "cannot consume stream");
                return;
            },
        };

        tracing::debug!(node_id = %self.id, port, "stream consumer started");
        while let Some(item) = rx.recv().await {
            match item {
                StreamItem::End => break,
                StreamItem::Chunk(chunk) => {
                    if let Err(e) = self.behavior.on_chunk(&self, &port, chunk).await {
                        tracing::warn!(
                            node_id = %self.id,
                            port,
                            error = %e,
                            "chunk handler failed, continuing with next chunk"
                        );
                    }
                },
            }
        }
        tracing::debug!(node_id = %self.id, port, "stream consumer finished");
    }

    // ----- one-shot port access -----

    /// Sets a non-streaming input value (external injection).
    pub fn set_input_value(&self, port: &str, value: Value) -> Result<()> {
        self.input(port)?.set_value(value)
    }

    /// Reads a non-streaming input value, if one has been assigned.
    pub fn input_value(&self, port: &str) -> Result<Option<Value>> {
        self.input(port)?.value()
    }

    /// Sets a non-streaming output value; the engine propagates populated
    /// output slots after each sequential-phase invocation.
    pub fn set_output_value(&self, port: &str, value: Value) -> Result<()> {
        self.output(port)?.set_value(value)
    }

    /// Reads a non-streaming output value.
    pub fn output_value(&self, port: &str) -> Result<Option<Value>> {
        self.output(port)?.value()
    }

    // ----- configuration -----

    /// Copy of the raw configuration mapping.
    pub fn raw_config(&self) -> Value {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replaces the raw configuration (engine use: override restore).
    pub fn set_raw_config(&self, config: Value) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Shallow-merges override entries into the raw configuration.
    pub fn merge_config(&self, overrides: &serde_json::Map<String, Value>) {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(map) = config.as_object_mut() {
            for (key, value) in overrides {
                map.insert(key.clone(), value.clone());
            }
        }
    }

    /// Stores the template-resolved configuration for the next invocation.
    pub fn set_resolved_config(&self, resolved: Option<Value>) {
        *self.resolved_config.write().unwrap_or_else(PoisonError::into_inner) = resolved;
    }

    /// The configuration the node should read: resolved if present, raw
    /// otherwise. Resolved config is only guaranteed inside `execute`/`run`
    /// bodies of the sequential phase.
    pub fn config_view(&self) -> Value {
        self.resolved_config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| self.raw_config())
    }

    /// Reads a config value by dotted key from the resolved-else-raw view.
    pub fn get_config(&self, path: &str) -> Option<Value> {
        let config = self.config_view();
        let mut current = &config;
        for key in path.split('.') {
            match current.as_object().and_then(|map| map.get(key)) {
                Some(next) => current = next,
                None => return None,
            }
        }
        if current.is_null() {
            None
        } else {
            Some(current.clone())
        }
    }

    /// Reads a config value by dotted key, falling back to `default`.
    pub fn get_config_or(&self, path: &str, default: Value) -> Value {
        self.get_config(path).unwrap_or(default)
    }

    // ----- lifecycle dispatch (engine use) -----

    pub async fn invoke_initialize(&self, ctx: &WorkflowContext) -> Result<()> {
        self.behavior.initialize(self, ctx).await
    }

    pub async fn invoke_run(&self, ctx: &WorkflowContext) -> Result<Option<Value>> {
        self.behavior.run(self, ctx).await
    }

    pub async fn invoke_execute(&self, ctx: &WorkflowContext) -> Result<Option<Value>> {
        self.behavior.execute(self, ctx).await
    }

    pub async fn invoke_shutdown(&self) -> Result<()> {
        self.behavior.shutdown(self).await
    }

    // ----- cancellation -----

    /// Resolves when the engine requests shutdown. Streaming `run` bodies
    /// await this (possibly inside `tokio::select!`) to exit cleanly.
    pub async fn cancelled(&self) {
        self.shutdown_token.cancelled().await;
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Requests cancellation of this node's long-running bodies.
    pub fn cancel(&self) {
        self.shutdown_token.cancel();
    }

    /// The connection manager routing this node's edges.
    pub fn router(&self) -> &Arc<ConnectionManager> {
        &self.router
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
