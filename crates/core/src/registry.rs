// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Node type registry and discovery.
//!
//! Node types are string-keyed factories. Two registries cooperate:
//! - a **process-wide registry**, populated by node crates at module init
//!   via [`register_node_type`], and
//! - a per-engine **local registry** overlay, consulted first so embedders
//!   can shadow or extend the built-in set.

use crate::error::{FlowKitError, Result};
use crate::node::WorkflowNode;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// A factory function that creates a new node behavior, accepting the
/// node's raw configuration. Wrapped in an Arc to make it cloneable.
pub type NodeFactory =
    Arc<dyn Fn(Option<&Value>) -> Result<Box<dyn WorkflowNode>> + Send + Sync>;

/// String-keyed map of node type factories.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    factories: HashMap<String, NodeFactory>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node type under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(Option<&Value>) -> Result<Box<dyn WorkflowNode>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Creates a behavior instance by its registered type name.
    pub fn create(&self, name: &str, config: Option<&Value>) -> Result<Box<dyn WorkflowNode>> {
        self.factories.get(name).map_or_else(
            || {
                Err(FlowKitError::Configuration(format!(
                    "node type '{name}' not found in registry"
                )))
            },
            |factory| factory(config),
        )
    }

    pub fn factory(&self, name: &str) -> Option<NodeFactory> {
        self.factories.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Removes a registration; returns whether it was present.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.factories.remove(name).is_some()
    }

    pub fn type_names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry").field("types", &self.factories.len()).finish()
    }
}

static GLOBAL_REGISTRY: OnceLock<RwLock<NodeRegistry>> = OnceLock::new();

/// The process-wide registry shared by every engine.
pub fn global_registry() -> &'static RwLock<NodeRegistry> {
    GLOBAL_REGISTRY.get_or_init(|| RwLock::new(NodeRegistry::new()))
}

/// Registers a node type into the process-wide registry. Node crates call
/// this at module init; later registrations under the same name win.
pub fn register_node_type<F>(name: &str, factory: F)
where
    F: Fn(Option<&Value>) -> Result<Box<dyn WorkflowNode>> + Send + Sync + 'static,
{
    global_registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(name, factory);
}

/// Looks up a factory in the process-wide registry.
pub fn global_factory(name: &str) -> Option<NodeFactory> {
    global_registry().read().unwrap_or_else(PoisonError::into_inner).factory(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::context::WorkflowContext;
    use crate::node::Node;
    use async_trait::async_trait;

    struct NoopBehavior;

    #[async_trait]
    impl WorkflowNode for NoopBehavior {
        async fn run(&self, _node: &Node, _ctx: &WorkflowContext) -> Result<Option<Value>> {
            Ok(None)
        }
    }

    #[test]
    fn test_register_and_create() {
        let mut registry = NodeRegistry::new();
        registry.register("noop", |_config| Ok(Box::new(NoopBehavior)));

        assert!(registry.contains("noop"));
        assert!(registry.create("noop", None).is_ok());
    }

    #[test]
    fn test_unknown_type_is_configuration_error() {
        let registry = NodeRegistry::new();
        let err = match registry.create("ghost", None) {
            Err(err) => err,
            Ok(_) => panic!("expected configuration error for unknown node type"),
        };
        assert!(matches!(err, FlowKitError::Configuration(_)));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_global_registry_roundtrip() {
        register_node_type("test::registry::noop", |_config| Ok(Box::new(NoopBehavior)));
        assert!(global_factory("test::registry::noop").is_some());
        assert!(global_factory("test::registry::missing").is_none());
    }
}
