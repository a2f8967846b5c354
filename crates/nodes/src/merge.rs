// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Merge node: combines the outputs of several upstream nodes.
//!
//! The `sources` config field names the upstream node ids to read from the
//! run context; `strategy` picks how they combine (`merge` dictionaries,
//! `concat` lists, `first`, `last`).

use async_trait::async_trait;
use flowkit_core::{
    FieldSchema, Node, PortSchema, PrimitiveType, Result, WorkflowContext, WorkflowNode,
};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};

pub struct MergeNode;

#[async_trait]
impl WorkflowNode for MergeNode {
    fn output_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([("output".to_string(), PortSchema::value_of(PrimitiveType::Any))])
    }

    fn config_fields(&self) -> IndexMap<String, FieldSchema> {
        IndexMap::from([
            (
                "sources".to_string(),
                FieldSchema::with_default(PrimitiveType::List, json!([]))
                    .describe("upstream node ids to merge"),
            ),
            (
                "strategy".to_string(),
                FieldSchema::with_default(PrimitiveType::String, json!("merge"))
                    .describe("merge | concat | first | last"),
            ),
        ])
    }

    async fn run(&self, node: &Node, ctx: &WorkflowContext) -> Result<Option<Value>> {
        let strategy = node
            .get_config("strategy")
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| "merge".to_string());
        let sources = node.get_config_or("sources", json!([]));

        // (node_id, output) pairs in declared source order.
        let inputs: Vec<(String, Value)> = sources
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|id| ctx.output(id).map(|output| (id.to_string(), output)))
            .collect();

        if inputs.is_empty() {
            ctx.log_info("merge has no upstream outputs, returning an empty mapping");
            let empty = json!({});
            node.set_output_value("output", empty.clone())?;
            return Ok(Some(empty));
        }

        let result = match strategy.as_str() {
            "concat" => concat_lists(&inputs),
            "first" => inputs[0].1.clone(),
            "last" => inputs[inputs.len() - 1].1.clone(),
            _ => merge_dicts(&inputs),
        };

        ctx.log_info(format!("merged {} inputs with strategy '{strategy}'", inputs.len()));
        node.set_output_value("output", result.clone())?;
        Ok(Some(result))
    }
}

/// Dictionary union; non-mapping outputs land under their node id.
fn merge_dicts(inputs: &[(String, Value)]) -> Value {
    let mut result = Map::new();
    for (node_id, output) in inputs {
        match output.as_object() {
            Some(map) => {
                for (key, value) in map {
                    result.insert(key.clone(), value.clone());
                }
            },
            None => {
                result.insert(node_id.clone(), output.clone());
            },
        }
    }
    Value::Object(result)
}

/// List concatenation; non-list outputs are appended as single items.
fn concat_lists(inputs: &[(String, Value)]) -> Value {
    let mut result = Vec::new();
    for (_, output) in inputs {
        match output.as_array() {
            Some(items) => result.extend(items.iter().cloned()),
            None => result.push(output.clone()),
        }
    }
    Value::Array(result)
}

pub(crate) fn register(registry: &mut flowkit_core::NodeRegistry) {
    registry.register("merge", |_config| Ok(Box::new(MergeNode)));
}
