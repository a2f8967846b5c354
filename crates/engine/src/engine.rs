// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The workflow engine: graph ownership, the three-mode scheduler, and the
//! run lifecycle.
//!
//! ## State machine
//!
//! ```text
//!   idle ──start──▶ started ──stop──▶ stopped
//!                     │  ▲
//!                  execute (repeatable)
//! ```
//!
//! `start` initializes every node, spawns one long-running task per
//! streaming/hybrid node and one consumer task per streaming input port.
//! `execute` runs sequential and hybrid nodes strictly in declaration
//! order, resolving each node's config through the template resolver and
//! propagating one-shot outputs after every invocation. `stop` posts the
//! end-of-stream sentinel everywhere, cancels and awaits all tasks, and
//! shuts every node down exactly once.

use crate::builder::build_graph;
use crate::config::{
    load_workflow_file, parse_workflow_value, parse_workflow_yaml, WorkflowDecl,
};
use crate::template::TemplateResolver;
use flowkit_core::{
    external_sink, Connection, ConnectionManager, ExecutionMode, FlowKitError, Node, NodeRegistry,
    NodeStatus, Result, WorkflowContext,
};
use indexmap::IndexMap;
use opentelemetry::{global, KeyValue};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnginePhase {
    Idle,
    Started,
    Stopped,
}

/// Per-node entry of the engine status view.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub status: NodeStatus,
    pub kind: String,
    pub mode: ExecutionMode,
}

/// Snapshot of engine and per-node state.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub workflow_name: String,
    pub nodes: IndexMap<String, NodeReport>,
}

/// Workflow metadata summary.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowInfo {
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
    pub node_count: usize,
}

/// The workflow engine. Owns the node graph, the connection manager, and
/// the per-run context/resolver pair.
pub struct WorkflowEngine {
    registry: NodeRegistry,
    workflow: Option<WorkflowDecl>,
    nodes: IndexMap<String, Arc<Node>>,
    router: Arc<ConnectionManager>,
    sequential_nodes: Vec<String>,
    context: Option<Arc<WorkflowContext>>,
    resolver: Option<TemplateResolver>,
    tasks: Vec<JoinHandle<()>>,
    phase: EnginePhase,
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowEngine {
    /// Creates an engine with the built-in node set registered locally.
    pub fn new() -> Self {
        let mut registry = NodeRegistry::new();
        flowkit_nodes::register_nodes(&mut registry);
        Self::with_registry(registry)
    }

    /// Creates an engine with an empty local registry. Node types are then
    /// resolved through [`register_node_type`](Self::register_node_type)
    /// and the process-wide registry only.
    pub fn without_builtin_nodes() -> Self {
        Self::with_registry(NodeRegistry::new())
    }

    fn with_registry(registry: NodeRegistry) -> Self {
        Self {
            registry,
            workflow: None,
            nodes: IndexMap::new(),
            router: Arc::new(ConnectionManager::new()),
            sequential_nodes: Vec::new(),
            context: None,
            resolver: None,
            tasks: Vec::new(),
            phase: EnginePhase::Idle,
        }
    }

    /// Registers a node type in this engine's local registry overlay. The
    /// overlay is consulted before the process-wide registry, so local
    /// registrations shadow global ones.
    pub fn register_node_type<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(Option<&Value>) -> Result<Box<dyn flowkit_core::WorkflowNode>>
            + Send
            + Sync
            + 'static,
    {
        self.registry.register(name, factory);
    }

    // ----- graph loading -----

    /// Loads a workflow from a YAML or JSON file and builds the graph.
    pub fn load_config(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let decl = load_workflow_file(path)?;
        self.install(decl)
    }

    /// Loads a workflow from a YAML string and builds the graph.
    pub fn load_config_str(&mut self, yaml: &str) -> Result<()> {
        let decl = parse_workflow_yaml(yaml)?;
        self.install(decl)
    }

    /// Loads a workflow from a pre-parsed nested mapping and builds the
    /// graph.
    pub fn load_config_value(&mut self, config: Value) -> Result<()> {
        let decl = parse_workflow_value(config)?;
        self.install(decl)
    }

    fn install(&mut self, decl: WorkflowDecl) -> Result<()> {
        if self.phase == EnginePhase::Started {
            return Err(FlowKitError::Workflow(
                "cannot load a workflow while another one is running".to_string(),
            ));
        }

        let (nodes, router) = build_graph(&self.registry, &decl)?;

        self.sequential_nodes = nodes
            .iter()
            .filter(|(_, node)| node.mode().is_sequential_phase())
            .map(|(id, _)| id.clone())
            .collect();
        self.nodes = nodes;
        self.router = router;
        self.workflow = Some(decl);
        self.context = None;
        self.resolver = None;
        self.tasks = Vec::new();
        self.phase = EnginePhase::Idle;
        Ok(())
    }

    // ----- lifecycle -----

    /// Starts the workflow: initializes every node, then spawns the
    /// long-running bodies and stream consumers. Returns the run context.
    ///
    /// # Errors
    ///
    /// Fails with [`FlowKitError::Workflow`] when no workflow is loaded or
    /// the engine is already running, and with
    /// [`FlowKitError::NodeExecution`] when a node's `initialize` fails
    /// (already-initialized nodes receive `shutdown` before the error
    /// propagates).
    pub async fn start(
        &mut self,
        initial_globals: Option<HashMap<String, Value>>,
    ) -> Result<Arc<WorkflowContext>> {
        match self.phase {
            EnginePhase::Started => {
                return Err(FlowKitError::Workflow("workflow is already running".to_string()))
            },
            EnginePhase::Stopped => {
                return Err(FlowKitError::Workflow(
                    "workflow is stopped; reload the config to run it again".to_string(),
                ))
            },
            EnginePhase::Idle => {},
        }
        if self.nodes.is_empty() {
            return Err(FlowKitError::Workflow(
                "no nodes to run; load a workflow config first".to_string(),
            ));
        }

        let ctx = Arc::new(WorkflowContext::new());
        if let Some(globals) = initial_globals {
            for (key, value) in globals {
                ctx.set_global(&key, value);
            }
        }

        let info = self.engine_info(true);
        ctx.set_global("engine", info.clone());
        self.resolver = Some(TemplateResolver::new(ctx.clone(), info));

        let workflow_name =
            self.workflow.as_ref().map_or_else(String::new, |w| w.name.clone());
        ctx.log_info(format!("starting workflow: {workflow_name}"));

        for (id, node) in &self.nodes {
            ctx.log_info(format!("node {id} [{:?} mode]", node.mode()));
        }

        // Initialize every node before any chunk can flow. A failure
        // aborts start; nodes initialized so far are shut down.
        let ids: Vec<String> = self.nodes.keys().cloned().collect();
        for (idx, id) in ids.iter().enumerate() {
            let node = &self.nodes[id];
            if let Err(e) = node.invoke_initialize(&ctx).await {
                ctx.log_error(format!("node '{id}' initialization failed: {e}"));
                for initialized_id in &ids[..idx] {
                    if let Err(shutdown_err) = self.nodes[initialized_id].invoke_shutdown().await {
                        ctx.log_error(format!(
                            "node '{initialized_id}' shutdown failed: {shutdown_err}"
                        ));
                    }
                }
                self.context = None;
                self.resolver = None;
                return Err(FlowKitError::execution(id.clone(), e));
            }
            ctx.log_info(format!("node '{id}' initialized"));
        }

        // Long-running bodies for streaming and hybrid nodes.
        for (id, node) in &self.nodes {
            if node.mode().is_long_running() {
                node.set_status(NodeStatus::Running);
                let node = node.clone();
                let ctx_task = ctx.clone();
                let span =
                    tracing::info_span!("node_run", node.id = %id, node.mode = ?node.mode());
                self.tasks.push(tokio::spawn(
                    async move {
                        match node.invoke_run(&ctx_task).await {
                            Ok(_) => node.set_status(NodeStatus::Success),
                            Err(e) => {
                                // One failed run body does not take the
                                // engine down; other nodes keep running.
                                node.set_status(NodeStatus::Failed);
                                ctx_task.log_error(format!(
                                    "node '{}' run failed: {e}",
                                    node.id()
                                ));
                            },
                        }
                    }
                    .instrument(span),
                ));
            }
        }

        // One consumer task per streaming input port, on every node.
        for node in self.nodes.values() {
            for (port, param) in node.inputs() {
                if param.is_streaming() {
                    ctx.log_info(format!("stream consumer started: {}.{port}", node.id()));
                    self.tasks.push(tokio::spawn(node.clone().consume_stream(port.clone())));
                }
            }
        }

        ctx.log_info(format!(
            "sequential/hybrid nodes: {}",
            self.sequential_nodes.join(", ")
        ));
        ctx.log_info(format!("workflow started: {workflow_name}"));

        self.context = Some(ctx.clone());
        self.phase = EnginePhase::Started;
        Ok(ctx)
    }

    /// Runs the sequential phase: sequential and hybrid nodes strictly in
    /// declaration order. `overrides` are merged into each node's raw
    /// config for the duration of its invocation, then restored.
    ///
    /// # Errors
    ///
    /// Fails with [`FlowKitError::Workflow`] when the engine is not
    /// started. A failing node aborts with [`FlowKitError::NodeExecution`]
    /// unless `continue_on_error` is set in the workflow config.
    pub async fn execute(
        &mut self,
        overrides: Option<serde_json::Map<String, Value>>,
    ) -> Result<()> {
        match self.phase {
            EnginePhase::Idle => {
                return Err(FlowKitError::Workflow(
                    "workflow not started; call start() first".to_string(),
                ))
            },
            EnginePhase::Stopped => {
                return Err(FlowKitError::Workflow("workflow already stopped".to_string()))
            },
            EnginePhase::Started => {},
        }
        let ctx = self
            .context
            .clone()
            .ok_or_else(|| FlowKitError::Workflow("engine has no run context".to_string()))?;
        let Some(resolver) = self.resolver.as_ref() else {
            return Err(FlowKitError::Workflow(
                "template environment not initialized".to_string(),
            ));
        };
        let continue_on_error =
            self.workflow.as_ref().is_some_and(|w| w.config.continue_on_error);

        let meter = global::meter("flowkit_engine");
        let histogram = meter
            .f64_histogram("node.execution.duration")
            .with_description("Sequential-phase node execution duration")
            .build();

        ctx.log_info("executing sequential phase");
        for id in self.sequential_nodes.clone() {
            let Some(node) = self.nodes.get(&id).cloned() else { continue };

            let snapshot = node.raw_config();
            if let Some(overrides) = &overrides {
                node.merge_config(overrides);
            }

            // Resolution failures degrade to a warning: templates may
            // reference outputs the node never actually reads.
            match resolver.resolve_value(&node.raw_config()) {
                Ok(resolved) => node.set_resolved_config(Some(resolved)),
                Err(e) => {
                    ctx.log_warning(format!("node '{id}' config resolution failed: {e}"));
                    node.set_resolved_config(Some(node.raw_config()));
                },
            }

            node.set_status(NodeStatus::Running);
            let started = Instant::now();
            let outcome = node.invoke_execute(&ctx).await;
            let status_label = if outcome.is_ok() { "ok" } else { "error" };
            histogram.record(
                started.elapsed().as_secs_f64(),
                &[KeyValue::new("node.id", id.clone()), KeyValue::new("status", status_label)],
            );
            node.set_raw_config(snapshot);

            match outcome {
                Ok(result) => {
                    if let Some(value) = result {
                        ctx.set_output(&id, value);
                    }
                    for (port, param) in node.outputs() {
                        if !param.is_streaming() {
                            if let Ok(Some(value)) = param.value() {
                                self.router.propagate_value(&id, port, &value);
                            }
                        }
                    }
                    // Hybrid nodes keep their long-running body going, so
                    // they stay in `running` until engine stop.
                    if node.mode() == ExecutionMode::Hybrid {
                        node.set_status(NodeStatus::Running);
                    } else {
                        node.set_status(NodeStatus::Success);
                    }
                    ctx.log_info(format!("node '{id}' executed"));
                },
                Err(e) => {
                    node.set_status(NodeStatus::Failed);
                    let err = FlowKitError::execution(id.clone(), e);
                    ctx.log_error(err.to_string());
                    if !continue_on_error {
                        return Err(err);
                    }
                },
            }
        }
        ctx.log_info("sequential phase complete");
        Ok(())
    }

    /// Stops the workflow: posts end-of-stream on every streaming input
    /// queue, cancels and awaits every spawned task, and shuts every node
    /// down. Idempotent once stopped; `shutdown` runs exactly once per
    /// node.
    ///
    /// # Errors
    ///
    /// Fails with [`FlowKitError::Workflow`] when the engine was never
    /// started.
    pub async fn stop(&mut self) -> Result<()> {
        match self.phase {
            EnginePhase::Idle => {
                return Err(FlowKitError::Workflow("workflow not started".to_string()))
            },
            EnginePhase::Stopped => return Ok(()),
            EnginePhase::Started => {},
        }
        self.phase = EnginePhase::Stopped;

        // A clean exit path first: consumers drain up to the sentinel,
        // run bodies observe cancellation.
        for node in self.nodes.values() {
            for param in node.inputs().values() {
                if param.is_streaming() {
                    let _ = param.close();
                }
            }
            node.cancel();
        }

        let tasks = std::mem::take(&mut self.tasks);
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            // Cancellation surfaces as a JoinError; swallow it.
            let _ = task.await;
        }

        for node in self.nodes.values() {
            if let Err(e) = node.invoke_shutdown().await {
                let message = format!("node '{}' shutdown failed: {e}", node.id());
                match &self.context {
                    Some(ctx) => ctx.log_error(message),
                    None => tracing::error!("{message}"),
                }
            }
        }

        if let Some(ctx) = &self.context {
            ctx.log_info("workflow stopped");
        }
        Ok(())
    }

    // ----- external sinks -----

    /// Registers an external callback on an existing output port. The
    /// callback receives the chunk payload for streaming ports or the
    /// propagated value for one-shot ports. May be called post-build,
    /// before or during start.
    pub fn add_external_connection<F, Fut>(
        &self,
        node_id: &str,
        port: &str,
        callback: F,
    ) -> Result<Arc<Connection>>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let node = self.nodes.get(node_id).ok_or_else(|| {
            FlowKitError::Configuration(format!("node does not exist: {node_id}"))
        })?;
        let param = node.output(port).map_err(|_| {
            FlowKitError::Configuration(format!(
                "node {node_id} has no output port '{port}' (available: {:?})",
                node.outputs().keys().collect::<Vec<_>>()
            ))
        })?;
        Ok(self.router.add_external_connection(
            node_id,
            port,
            param.schema().clone(),
            external_sink(callback),
        ))
    }

    // ----- templates -----

    /// Renders a template string against the current run.
    ///
    /// # Errors
    ///
    /// Fails with [`FlowKitError::Workflow`] before `start`, and with
    /// [`FlowKitError::Template`] when rendering fails.
    pub fn render_template(&self, text: &str) -> Result<String> {
        self.require_resolver()?.render(text)
    }

    /// Like [`render_template`](Self::render_template) with extra local
    /// variables shadowing globals of the same name.
    pub fn render_template_with(
        &self,
        text: &str,
        locals: &HashMap<String, Value>,
    ) -> Result<String> {
        self.require_resolver()?.render_with(text, locals)
    }

    fn require_resolver(&self) -> Result<&TemplateResolver> {
        self.resolver.as_ref().ok_or_else(|| {
            FlowKitError::Workflow(
                "template environment not initialized; call start() first".to_string(),
            )
        })
    }

    // ----- introspection -----

    pub fn get_node(&self, node_id: &str) -> Option<Arc<Node>> {
        self.nodes.get(node_id).cloned()
    }

    pub fn connection_manager(&self) -> Arc<ConnectionManager> {
        self.router.clone()
    }

    /// The run context of the current/last run, if any.
    pub fn context(&self) -> Option<Arc<WorkflowContext>> {
        self.context.clone()
    }

    /// Running flag plus per-node status, type, and mode.
    pub fn get_status(&self) -> EngineStatus {
        let kinds: HashMap<&str, &str> = self.workflow.as_ref().map_or_else(HashMap::new, |w| {
            w.nodes.iter().map(|n| (n.id.as_str(), n.kind.as_str())).collect()
        });
        EngineStatus {
            running: self.phase == EnginePhase::Started,
            workflow_name: self
                .workflow
                .as_ref()
                .map_or_else(|| "unknown".to_string(), |w| w.name.clone()),
            nodes: self
                .nodes
                .iter()
                .map(|(id, node)| {
                    (
                        id.clone(),
                        NodeReport {
                            status: node.status(),
                            kind: kinds.get(id.as_str()).unwrap_or(&"unknown").to_string(),
                            mode: node.mode(),
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn get_workflow_info(&self) -> Option<WorkflowInfo> {
        self.workflow.as_ref().map(|w| WorkflowInfo {
            name: w.name.clone(),
            description: w.description.clone(),
            version: w.version.clone(),
            node_count: self.nodes.len(),
        })
    }

    fn engine_info(&self, running: bool) -> Value {
        self.workflow.as_ref().map_or_else(
            || json!({"running": running}),
            |w| {
                json!({
                    "name": w.name,
                    "description": w.description,
                    "version": w.version,
                    "running": running,
                })
            },
        )
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("phase", &self.phase)
            .field("nodes", &self.nodes.len())
            .finish_non_exhaustive()
    }
}
