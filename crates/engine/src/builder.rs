// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Graph construction: node instantiation and connection wiring.
//!
//! Builds [`Node`] instances from a validated [`WorkflowDecl`] and wires
//! their ports through a fresh [`ConnectionManager`]. Every connection is
//! schema-checked at construction, so an invalid graph never reaches
//! `start`.

use crate::config::WorkflowDecl;
use flowkit_core::registry::{global_factory, NodeRegistry};
use flowkit_core::{ConnectionManager, FlowKitError, Node, Result};
use indexmap::IndexMap;
use std::sync::Arc;

/// Instantiates all declared nodes and wires all declared connections.
///
/// Node types are looked up in the local registry first, then in the
/// process-wide registry.
pub fn build_graph(
    registry: &NodeRegistry,
    decl: &WorkflowDecl,
) -> Result<(IndexMap<String, Arc<Node>>, Arc<ConnectionManager>)> {
    let router = Arc::new(ConnectionManager::new());
    let mut nodes: IndexMap<String, Arc<Node>> = IndexMap::new();

    for node_decl in &decl.nodes {
        let factory =
            registry.factory(&node_decl.kind).or_else(|| global_factory(&node_decl.kind));
        let Some(factory) = factory else {
            return Err(FlowKitError::Configuration(format!(
                "unknown node type: '{}' (node id: {})",
                node_decl.kind, node_decl.id
            )));
        };

        let behavior = factory(node_decl.config.as_ref())?;
        let node = Node::new(
            node_decl.id.clone(),
            node_decl.name.clone(),
            node_decl.execution_mode,
            behavior,
            node_decl.config.clone(),
            router.clone(),
        )?;
        tracing::debug!(node_id = %node_decl.id, kind = %node_decl.kind, "node created");
        nodes.insert(node_decl.id.clone(), Arc::new(node));
    }

    for conn_decl in &decl.connections {
        let ((source_node, source_port), (target_node, target_port)) = conn_decl.endpoints()?;

        let source = nodes.get(source_node).ok_or_else(|| {
            FlowKitError::Configuration(format!("connection source node does not exist: {source_node}"))
        })?;
        let target = nodes.get(target_node).ok_or_else(|| {
            FlowKitError::Configuration(format!("connection target node does not exist: {target_node}"))
        })?;

        let source_param = source.outputs().get(source_port).ok_or_else(|| {
            FlowKitError::Configuration(format!(
                "node {source_node} has no output port '{source_port}' (available: {:?})",
                source.outputs().keys().collect::<Vec<_>>()
            ))
        })?;
        let target_param = target.inputs().get(target_port).ok_or_else(|| {
            FlowKitError::Configuration(format!(
                "node {target_node} has no input port '{target_port}' (available: {:?})",
                target.inputs().keys().collect::<Vec<_>>()
            ))
        })?;

        router.add_connection(source_node, source_param, target_node, target_param)?;
    }

    tracing::info!(
        nodes = nodes.len(),
        connections = decl.connections.len(),
        "workflow graph built"
    );
    Ok((nodes, router))
}
