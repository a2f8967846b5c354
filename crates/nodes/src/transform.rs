// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Transform node: reshapes a data mapping.
//!
//! Operations, selected by the `operation` config field:
//! - `extract`: pick fields (dotted paths supported) into a new mapping
//! - `map`: rename fields via a `mapping` table, optionally keeping the rest
//! - `filter`: drop fields failing simple `{key, operator, value}` checks
//! - `aggregate`: `sum`/`avg`/`count`/`max`/`min` over a list-valued field

use async_trait::async_trait;
use flowkit_core::{
    FieldSchema, FlowKitError, Node, PortSchema, PrimitiveType, Result, WorkflowContext,
    WorkflowNode,
};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};

pub struct TransformNode;

#[async_trait]
impl WorkflowNode for TransformNode {
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
            (
                "operation".to_string(),
                FieldSchema::required(PrimitiveType::String)
                    .describe("extract | map | filter | aggregate"),
            ),
            ("data".to_string(), FieldSchema::of(PrimitiveType::Any)),
            (
                "config".to_string(),
                FieldSchema::with_default(PrimitiveType::Dict, json!({})),
            ),
        ])
    }

    async fn run(&self, node: &Node, ctx: &WorkflowContext) -> Result<Option<Value>> {
        let operation = node
            .get_config("operation")
            .and_then(|v| v.as_str().map(String::from))
            .ok_or_else(|| FlowKitError::Runtime("missing required parameter: operation".into()))?;
        let op_config = node.get_config_or("config", json!({}));

        let mut data = node.get_config_or("data", Value::Null);
        if let Ok(Some(input)) = node.input_value("input_data") {
            if let Some(input_data) = input.get("data") {
                if !input_data.is_null() {
                    data = input_data.clone();
                }
            }
        }
        let data = data.as_object().cloned().ok_or_else(|| {
            FlowKitError::Runtime("transform needs a mapping as input data".to_string())
        })?;

        let result = match operation.as_str() {
            "extract" => Value::Object(extract(&data, &op_config)),
            "map" => Value::Object(map_fields(&data, &op_config)),
            "filter" => Value::Object(filter_data(&data, &op_config)),
            "aggregate" => aggregate(&data, &op_config),
            other => {
                return Err(FlowKitError::Runtime(format!(
                    "unsupported transform operation: {other}"
                )))
            },
        };

        ctx.log_info(format!("transform complete, operation: {operation}"));
        node.set_output_value("output", result.clone())?;
        Ok(Some(result))
    }
}

/// Picks the configured `fields` (dotted paths allowed) into a new mapping.
fn extract(data: &Map<String, Value>, config: &Value) -> Map<String, Value> {
    let mut result = Map::new();
    for field in config["fields"].as_array().map(Vec::as_slice).unwrap_or_default() {
        let Some(field) = field.as_str() else { continue };
        if let Some(value) = data.get(field) {
            result.insert(field.to_string(), value.clone());
        } else if field.contains('.') {
            let mut keys = field.split('.');
            let mut current = keys.next().and_then(|first| data.get(first));
            for key in keys {
                current = current.and_then(|v| v.as_object()).and_then(|m| m.get(key));
            }
            if let Some(value) = current {
                if !value.is_null() {
                    result.insert(field.to_string(), value.clone());
                }
            }
        }
    }
    result
}

/// Renames fields through the `mapping` table; `keep_unmapped` carries the
/// rest over unchanged.
fn map_fields(data: &Map<String, Value>, config: &Value) -> Map<String, Value> {
    let empty = Map::new();
    let mapping = config["mapping"].as_object().unwrap_or(&empty);
    let mut result = Map::new();

    for (old_key, new_key) in mapping {
        if let (Some(value), Some(new_key)) = (data.get(old_key), new_key.as_str()) {
            result.insert(new_key.to_string(), value.clone());
        }
    }
    if config["keep_unmapped"].as_bool().unwrap_or(false) {
        for (key, value) in data {
            if !mapping.contains_key(key) {
                result.insert(key.clone(), value.clone());
            }
        }
    }
    result
}

/// Drops fields failing the configured `{key, operator, value}` checks.
fn filter_data(data: &Map<String, Value>, config: &Value) -> Map<String, Value> {
    let mut result = data.clone();
    for condition in config["conditions"].as_array().map(Vec::as_slice).unwrap_or_default() {
        let Some(key) = condition.get("key").and_then(Value::as_str) else { continue };
        let expected = condition.get("value").unwrap_or(&Value::Null);
        let operator = condition.get("operator").and_then(Value::as_str).unwrap_or("==");

        if let Some(actual) = result.get(key) {
            let drop = match operator {
                "==" => actual != expected,
                "!=" => actual == expected,
                _ => false,
            };
            if drop {
                result.remove(key);
            }
        }
    }
    result
}

/// Aggregates a list-valued `field`; non-list fields pass the data through.
fn aggregate(data: &Map<String, Value>, config: &Value) -> Value {
    let operation = config.get("operation").and_then(Value::as_str).unwrap_or("sum");
    let Some(values) = config
        .get("field")
        .and_then(Value::as_str)
        .and_then(|field| data.get(field))
        .and_then(Value::as_array)
    else {
        return Value::Object(data.clone());
    };

    let numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
    match operation {
        "count" => json!(values.len()),
        "sum" => json!(numbers.iter().sum::<f64>()),
        "avg" => {
            if numbers.is_empty() {
                json!(0)
            } else {
                #[allow(clippy::cast_precision_loss)]
                let avg = numbers.iter().sum::<f64>() / numbers.len() as f64;
                json!(avg)
            }
        },
        "max" => numbers.iter().copied().fold(None::<f64>, |acc, n| {
            Some(acc.map_or(n, |a| a.max(n)))
        }).map_or(Value::Null, |n| json!(n)),
        "min" => numbers.iter().copied().fold(None::<f64>, |acc, n| {
            Some(acc.map_or(n, |a| a.min(n)))
        }).map_or(Value::Null, |n| json!(n)),
        _ => Value::Object(data.clone()),
    }
}

pub(crate) fn register(registry: &mut flowkit_core::NodeRegistry) {
    registry.register("transform", |_config| Ok(Box::new(TransformNode)));
}
