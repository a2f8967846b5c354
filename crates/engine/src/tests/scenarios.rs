// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! End-to-end engine scenarios: the arithmetic chain, broadcast fan-out,
//! schema rejection, streaming cycles, continue_on_error, and external
//! sink fan-out.

#![allow(clippy::unwrap_used)]

use crate::WorkflowEngine;
use async_trait::async_trait;
use flowkit_core::{
    ExecutionMode, FieldSchema, FlowKitError, Node, NodeStatus, PortSchema, PrimitiveType, Result,
    StreamChunk, WorkflowContext, WorkflowNode,
};
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn tick_schema() -> PortSchema {
    PortSchema::stream_record([("n", FieldSchema::required(PrimitiveType::Integer))])
}

/// Sequential arithmetic node: `(value + add) * multiply`.
struct CalcBehavior;

#[async_trait]
impl WorkflowNode for CalcBehavior {
    fn config_fields(&self) -> IndexMap<String, FieldSchema> {
        IndexMap::from([
            ("add".to_string(), FieldSchema::with_default(PrimitiveType::Integer, json!(0))),
            ("multiply".to_string(), FieldSchema::with_default(PrimitiveType::Integer, json!(1))),
        ])
    }

    async fn run(&self, node: &Node, _ctx: &WorkflowContext) -> Result<Option<Value>> {
        let value = node
            .get_config("value")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| FlowKitError::Runtime("calc needs an integer 'value'".to_string()))?;
        let add = node.get_config_or("add", json!(0)).as_i64().unwrap_or(0);
        let multiply = node.get_config_or("multiply", json!(1)).as_i64().unwrap_or(1);
        Ok(Some(json!({"result": (value + add) * multiply})))
    }
}

/// Streaming source with a single broadcast output.
struct TickSource;

#[async_trait]
impl WorkflowNode for TickSource {
    fn output_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([("out".to_string(), tick_schema())])
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Streaming
    }

    async fn run(&self, node: &Node, _ctx: &WorkflowContext) -> Result<Option<Value>> {
        node.cancelled().await;
        Ok(None)
    }
}

/// Streaming sink recording received payloads per node id.
struct Collector {
    store: Arc<Mutex<HashMap<String, Vec<Value>>>>,
}

#[async_trait]
impl WorkflowNode for Collector {
    fn input_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([("in".to_string(), tick_schema())])
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Streaming
    }

    async fn run(&self, node: &Node, _ctx: &WorkflowContext) -> Result<Option<Value>> {
        node.cancelled().await;
        Ok(None)
    }

    async fn on_chunk(&self, node: &Node, _port: &str, chunk: StreamChunk) -> Result<()> {
        self.store
            .lock()
            .unwrap()
            .entry(node.id().to_string())
            .or_default()
            .push(chunk.payload().clone());
        Ok(())
    }
}

/// Streaming node with one input and one output of the same shape, for
/// cycle wiring.
struct LoopNode;

#[async_trait]
impl WorkflowNode for LoopNode {
    fn input_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([("in".to_string(), tick_schema())])
    }

    fn output_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([("out".to_string(), tick_schema())])
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Streaming
    }

    async fn run(&self, node: &Node, _ctx: &WorkflowContext) -> Result<Option<Value>> {
        node.cancelled().await;
        Ok(None)
    }
}

/// Sequential node that fails when configured to.
struct Flaky;

#[async_trait]
impl WorkflowNode for Flaky {
    async fn run(&self, node: &Node, _ctx: &WorkflowContext) -> Result<Option<Value>> {
        if node.get_config("fail").and_then(|v| v.as_bool()).unwrap_or(false) {
            return Err(FlowKitError::Runtime("intentional failure".to_string()));
        }
        Ok(Some(json!({"ok": true})))
    }
}

async fn wait_until(mut ready: impl FnMut() -> bool) {
    for _ in 0..250 {
        if ready() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within timeout");
}

// --- S1: arithmetic chain over templates ---

#[tokio::test]
async fn test_arithmetic_chain_resolves_upstream_outputs() {
    let mut engine = WorkflowEngine::new();
    engine.register_node_type("calc", |_config| Ok(Box::new(CalcBehavior)));

    engine
        .load_config_value(json!({
            "workflow": {
                "name": "arithmetic-chain",
                "nodes": [
                    {"id": "start", "type": "start", "config": {"data": {"value": 100}}},
                    {"id": "calc1", "type": "calc", "config": {
                        "value": "{{ nodes['start'].data.value }}",
                        "add": 50
                    }},
                    {"id": "calc2", "type": "calc", "config": {
                        "value": "{{ nodes['calc1'].result }}",
                        "multiply": 2
                    }}
                ]
            }
        }))
        .unwrap();

    let ctx = engine.start(None).await.unwrap();
    engine.execute(None).await.unwrap();

    assert_eq!(ctx.output_path("start", "data.value").unwrap(), Some(json!(100)));
    assert_eq!(ctx.output("calc1").unwrap(), json!({"result": 150}));
    assert_eq!(ctx.output("calc2").unwrap(), json!({"result": 300}));

    engine.stop().await.unwrap();
}

// --- S2: broadcast fan-out ---

#[tokio::test]
async fn test_broadcast_fanout_to_three_targets() {
    let store: Arc<Mutex<HashMap<String, Vec<Value>>>> = Arc::new(Mutex::new(HashMap::new()));

    let mut engine = WorkflowEngine::without_builtin_nodes();
    engine.register_node_type("tick_source", |_config| Ok(Box::new(TickSource)));
    let factory_store = store.clone();
    engine.register_node_type("collector", move |_config| {
        Ok(Box::new(Collector { store: factory_store.clone() }))
    });

    engine
        .load_config_value(json!({
            "workflow": {
                "name": "fanout",
                "nodes": [
                    {"id": "s", "type": "tick_source"},
                    {"id": "a", "type": "collector"},
                    {"id": "b", "type": "collector"},
                    {"id": "c", "type": "collector"}
                ],
                "connections": [
                    {"from": "s.out", "to": "a.in"},
                    {"from": "s.out", "to": "b.in"},
                    {"from": "s.out", "to": "c.in"}
                ]
            }
        }))
        .unwrap();

    engine.start(None).await.unwrap();

    let source = engine.get_node("s").unwrap();
    for n in 1..=3 {
        source.emit("out", json!({"n": n})).await.unwrap();
    }

    {
        let store = store.clone();
        wait_until(move || {
            let store = store.lock().unwrap();
            ["a", "b", "c"].iter().all(|id| store.get(*id).is_some_and(|v| v.len() == 3))
        })
        .await;
    }

    engine.stop().await.unwrap();

    let store = store.lock().unwrap();
    for id in ["a", "b", "c"] {
        let received = store.get(id).unwrap();
        assert_eq!(received.len(), 3, "target '{id}' chunk count");
        for (i, payload) in received.iter().enumerate() {
            assert_eq!(payload["n"], json!(i + 1), "target '{id}' order");
        }
    }
}

// --- S3: schema mismatch rejection at load ---

#[tokio::test]
async fn test_schema_mismatch_rejected_before_start() {
    struct IntRateSource;
    #[async_trait]
    impl WorkflowNode for IntRateSource {
        fn output_ports(&self) -> IndexMap<String, PortSchema> {
            IndexMap::from([(
                "out".to_string(),
                PortSchema::stream_record([
                    ("audio", FieldSchema::of(PrimitiveType::Bytes)),
                    ("rate", FieldSchema::of(PrimitiveType::Integer)),
                ]),
            )])
        }
        fn execution_mode(&self) -> ExecutionMode {
            ExecutionMode::Streaming
        }
        async fn run(&self, node: &Node, _ctx: &WorkflowContext) -> Result<Option<Value>> {
            node.cancelled().await;
            Ok(None)
        }
    }

    struct StringRateSink;
    #[async_trait]
    impl WorkflowNode for StringRateSink {
        fn input_ports(&self) -> IndexMap<String, PortSchema> {
            IndexMap::from([(
                "in".to_string(),
                PortSchema::stream_record([
                    ("audio", FieldSchema::of(PrimitiveType::Bytes)),
                    ("rate", FieldSchema::of(PrimitiveType::String)),
                ]),
            )])
        }
        fn execution_mode(&self) -> ExecutionMode {
            ExecutionMode::Streaming
        }
        async fn run(&self, node: &Node, _ctx: &WorkflowContext) -> Result<Option<Value>> {
            node.cancelled().await;
            Ok(None)
        }
    }

    let mut engine = WorkflowEngine::without_builtin_nodes();
    engine.register_node_type("int_rate", |_config| Ok(Box::new(IntRateSource)));
    engine.register_node_type("string_rate", |_config| Ok(Box::new(StringRateSink)));

    let err = engine
        .load_config_value(json!({
            "workflow": {
                "name": "mismatch",
                "nodes": [
                    {"id": "mic", "type": "int_rate"},
                    {"id": "sink", "type": "string_rate"}
                ],
                "connections": [{"from": "mic.out", "to": "sink.in"}]
            }
        }))
        .unwrap_err();

    assert!(matches!(err, FlowKitError::Configuration(_)));
    let message = err.to_string();
    assert!(message.contains("mic.out"), "missing source endpoint: {message}");
    assert!(message.contains("sink.in"), "missing target endpoint: {message}");

    // The graph never became startable.
    let err = engine.start(None).await.unwrap_err();
    assert!(matches!(err, FlowKitError::Workflow(_)));
}

// --- S4: cycles over streaming edges are legal ---

#[tokio::test]
async fn test_streaming_cycle_starts_and_stops_cleanly() {
    let mut engine = WorkflowEngine::without_builtin_nodes();
    engine.register_node_type("loop", |_config| Ok(Box::new(LoopNode)));

    engine
        .load_config_value(json!({
            "workflow": {
                "name": "cycle",
                "nodes": [
                    {"id": "a", "type": "loop"},
                    {"id": "b", "type": "loop"}
                ],
                "connections": [
                    {"from": "a.out", "to": "b.in"},
                    {"from": "b.out", "to": "a.in"}
                ]
            }
        }))
        .unwrap();

    engine.start(None).await.unwrap();
    // No sequential nodes: execute is a no-op.
    engine.execute(None).await.unwrap();
    engine.stop().await.unwrap();

    assert!(!engine.get_status().running);
}

// --- S5: continue_on_error both ways ---

fn flaky_workflow(continue_on_error: bool) -> Value {
    json!({
        "workflow": {
            "name": "flaky",
            "config": {"continue_on_error": continue_on_error},
            "nodes": [
                {"id": "x", "type": "flaky"},
                {"id": "y", "type": "flaky", "config": {"fail": true}},
                {"id": "z", "type": "flaky"}
            ]
        }
    })
}

#[tokio::test]
async fn test_first_failure_aborts_without_continue_on_error() {
    let mut engine = WorkflowEngine::without_builtin_nodes();
    engine.register_node_type("flaky", |_config| Ok(Box::new(Flaky)));
    engine.load_config_value(flaky_workflow(false)).unwrap();

    engine.start(None).await.unwrap();
    let err = engine.execute(None).await.unwrap_err();

    match &err {
        FlowKitError::NodeExecution { node_id, .. } => assert_eq!(node_id, "y"),
        other => panic!("expected NodeExecution, got {other:?}"),
    }
    assert_eq!(engine.get_node("x").unwrap().status(), NodeStatus::Success);
    assert_eq!(engine.get_node("y").unwrap().status(), NodeStatus::Failed);
    assert_eq!(engine.get_node("z").unwrap().status(), NodeStatus::Pending);

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_continue_on_error_attempts_every_node() {
    let mut engine = WorkflowEngine::without_builtin_nodes();
    engine.register_node_type("flaky", |_config| Ok(Box::new(Flaky)));
    engine.load_config_value(flaky_workflow(true)).unwrap();

    let ctx = engine.start(None).await.unwrap();
    engine.execute(None).await.unwrap();

    assert_eq!(engine.get_node("y").unwrap().status(), NodeStatus::Failed);
    assert_eq!(engine.get_node("z").unwrap().status(), NodeStatus::Success);
    assert!(
        ctx.logs().iter().any(|entry| entry.message.contains("'y'")),
        "log should record y's failure"
    );

    engine.stop().await.unwrap();
}

// --- S6: external sink fan-out ---

#[tokio::test]
async fn test_two_external_sinks_each_see_the_chunk_once() {
    let mut engine = WorkflowEngine::without_builtin_nodes();
    engine.register_node_type("tick_source", |_config| Ok(Box::new(TickSource)));
    engine
        .load_config_value(json!({
            "workflow": {
                "name": "external",
                "nodes": [{"id": "s", "type": "tick_source"}]
            }
        }))
        .unwrap();

    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    for counter in [first.clone(), second.clone()] {
        engine
            .add_external_connection("s", "out", move |payload| {
                let counter = counter.clone();
                async move {
                    assert_eq!(payload["n"], json!(1));
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();
    }

    engine.start(None).await.unwrap();
    engine.get_node("s").unwrap().emit("out", json!({"n": 1})).await.unwrap();
    engine.stop().await.unwrap();

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_external_connection_requires_existing_port() {
    let mut engine = WorkflowEngine::without_builtin_nodes();
    engine.register_node_type("tick_source", |_config| Ok(Box::new(TickSource)));
    engine
        .load_config_value(json!({
            "workflow": {"name": "external", "nodes": [{"id": "s", "type": "tick_source"}]}
        }))
        .unwrap();

    assert!(engine.add_external_connection("ghost", "out", |_| async {}).is_err());
    assert!(engine.add_external_connection("s", "ghost", |_| async {}).is_err());
}

// --- config overrides during execute ---

#[tokio::test]
async fn test_overrides_are_merged_then_restored() {
    let mut engine = WorkflowEngine::without_builtin_nodes();
    engine.register_node_type("calc", |_config| Ok(Box::new(CalcBehavior)));
    engine
        .load_config_value(json!({
            "workflow": {
                "name": "overrides",
                "nodes": [{"id": "calc", "type": "calc", "config": {"value": 1, "add": 1}}]
            }
        }))
        .unwrap();

    let ctx = engine.start(None).await.unwrap();
    let overrides = json!({"value": 5}).as_object().cloned().unwrap();
    engine.execute(Some(overrides)).await.unwrap();

    assert_eq!(ctx.output("calc").unwrap(), json!({"result": 6}));
    // The stored raw config is back to its declared form.
    assert_eq!(engine.get_node("calc").unwrap().raw_config()["value"], json!(1));

    engine.stop().await.unwrap();
}
