// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Start node: seeds a workflow run with initial data.
//!
//! Data comes from the node config, optionally merged with a named global
//! variable, and may be overridden through the `initial_data` input port.

use async_trait::async_trait;
use flowkit_core::{
    FieldSchema, Node, PortSchema, PrimitiveType, Result, WorkflowContext, WorkflowNode,
};
use indexmap::IndexMap;
use serde_json::{json, Value};

pub struct StartNode;

#[async_trait]
impl WorkflowNode for StartNode {
    fn input_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([(
            "initial_data".to_string(),
            PortSchema::value_record([
                ("data", FieldSchema::of(PrimitiveType::Any)),
                ("global_var", FieldSchema::of(PrimitiveType::String)),
            ]),
        )])
    }

    fn output_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([(
            "output".to_string(),
            PortSchema::value_record([
                ("data", FieldSchema::of(PrimitiveType::Any)),
                ("source", FieldSchema::of(PrimitiveType::String)),
                ("global_var", FieldSchema::of(PrimitiveType::Any)),
            ]),
        )])
    }

    fn config_fields(&self) -> IndexMap<String, FieldSchema> {
        IndexMap::from([
            (
                "data".to_string(),
                FieldSchema::of(PrimitiveType::Any).describe("initial data"),
            ),
            (
                "global_var".to_string(),
                FieldSchema::of(PrimitiveType::String).describe("global variable to merge in"),
            ),
        ])
    }

    async fn run(&self, node: &Node, ctx: &WorkflowContext) -> Result<Option<Value>> {
        let mut data = node.get_config_or("data", json!({}));
        let mut global_var =
            node.get_config("global_var").and_then(|v| v.as_str().map(String::from));

        // Input overrides config when wired.
        if let Ok(Some(input)) = node.input_value("initial_data") {
            if let Some(input_data) = input.get("data") {
                if !input_data.is_null() {
                    data = input_data.clone();
                }
            }
            if let Some(key) = input.get("global_var").and_then(Value::as_str) {
                global_var = Some(key.to_string());
            }
        }

        let mut source = "config";
        if let Some(key) = &global_var {
            if let Some(global) = ctx.global(key) {
                source = "global_var";
                match global {
                    Value::Object(global_map) if data.is_object() => {
                        if let Some(map) = data.as_object_mut() {
                            for (field, value) in global_map {
                                map.insert(field, value);
                            }
                        }
                    },
                    other => data = other,
                }
            }
        }

        let result = json!({
            "data": data,
            "source": source,
            "global_var": global_var,
        });
        node.set_output_value("output", result.clone())?;
        ctx.log_info(format!("start node '{}' produced initial data", node.id()));
        Ok(Some(result))
    }
}

pub(crate) fn register(registry: &mut flowkit_core::NodeRegistry) {
    registry.register("start", |_config| Ok(Box::new(StartNode)));
}
