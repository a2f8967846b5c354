// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Test utilities for node testing.

#![allow(clippy::unwrap_used)]

use flowkit_core::{external_sink, ConnectionManager, Node, WorkflowNode};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Builds a standalone node instance around a behavior, with a fresh
/// connection manager.
pub(crate) fn make_node(behavior: Box<dyn WorkflowNode>, config: Option<Value>) -> Arc<Node> {
    Arc::new(
        Node::new("test_node", None, None, behavior, config, Arc::new(ConnectionManager::new()))
            .unwrap(),
    )
}

/// Captures everything a node emits on one streaming output port.
pub(crate) fn capture_stream(node: &Arc<Node>, port: &str) -> Arc<Mutex<Vec<Value>>> {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let schema = node.output(port).unwrap().schema().clone();
    let store = captured.clone();
    node.router().add_external_connection(
        node.id(),
        port,
        schema,
        external_sink(move |payload| {
            let store = store.clone();
            async move {
                store.lock().unwrap().push(payload);
            }
        }),
    );
    captured
}
