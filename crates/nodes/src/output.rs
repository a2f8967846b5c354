// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Output node: formats the final result and optionally writes it to a file.

use async_trait::async_trait;
use flowkit_core::{
    FieldSchema, FlowKitError, Node, PortSchema, PrimitiveType, Result, WorkflowContext,
    WorkflowNode,
};
use indexmap::IndexMap;
use serde_json::{json, Value};

pub struct OutputNode;

#[async_trait]
impl WorkflowNode for OutputNode {
    fn input_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([(
            "input_data".to_string(),
            PortSchema::value_record([("data", FieldSchema::of(PrimitiveType::Any))]),
        )])
    }

    fn output_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([("output".to_string(), PortSchema::value_of(PrimitiveType::Any))])
    }

    fn config_fields(&self) -> IndexMap<String, FieldSchema> {
        IndexMap::from([
            ("data".to_string(), FieldSchema::of(PrimitiveType::Any)),
            (
                "format".to_string(),
                FieldSchema::with_default(PrimitiveType::String, json!("raw"))
                    .describe("json | text | raw"),
            ),
            (
                "save_to_file".to_string(),
                FieldSchema::with_default(PrimitiveType::Boolean, json!(false)),
            ),
            ("file_path".to_string(), FieldSchema::of(PrimitiveType::String)),
        ])
    }

    async fn run(&self, node: &Node, ctx: &WorkflowContext) -> Result<Option<Value>> {
        let mut data = node.get_config_or("data", Value::Null);
        if let Ok(Some(input)) = node.input_value("input_data") {
            if let Some(input_data) = input.get("data") {
                if !input_data.is_null() {
                    data = input_data.clone();
                }
            }
        }

        let format = node
            .get_config("format")
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| "raw".to_string());

        let formatted = match format.as_str() {
            "json" => serde_json::to_string_pretty(&data)
                .map_err(|e| FlowKitError::Runtime(format!("cannot serialize output: {e}")))?,
            "text" => match &data {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            },
            _ => data.to_string(),
        };

        ctx.log_info(format!("workflow output:\n{formatted}"));

        if node.get_config("save_to_file").and_then(|v| v.as_bool()).unwrap_or(false) {
            let Some(path) =
                node.get_config("file_path").and_then(|v| v.as_str().map(String::from))
            else {
                return Err(FlowKitError::Runtime(
                    "save_to_file is set but file_path is missing".to_string(),
                ));
            };
            tokio::fs::write(&path, formatted.as_bytes()).await?;
            ctx.log_info(format!("output saved to file: {path}"));
        }

        node.set_output_value("output", data.clone())?;
        Ok(Some(data))
    }
}

pub(crate) fn register(registry: &mut flowkit_core::NodeRegistry) {
    registry.register("output", |_config| Ok(Box::new(OutputNode)));
}
