// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Condition node: routes data to a named branch.
//!
//! Evaluates an ordered list of `{branch, expression}` conditions against
//! the input data and reports the first matching branch, falling back to
//! `default_branch`. Expressions are simple comparisons:
//! `score >= 80`, `status == 'active'`, `kind in ["a", "b"]`. The left
//! side is a dotted path into the data; the right side is a literal or
//! another dotted path.

use async_trait::async_trait;
use flowkit_core::{
    FieldSchema, FlowKitError, Node, PortSchema, PrimitiveType, Result, WorkflowContext,
    WorkflowNode,
};
use indexmap::IndexMap;
use serde_json::{json, Value};

// Two-character operators listed first so their one-character prefixes
// never match early.
const OPERATORS: [&str; 6] = [">=", "<=", "==", "!=", ">", "<"];

pub struct ConditionNode;

#[async_trait]
impl WorkflowNode for ConditionNode {
    fn input_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([(
            "input_data".to_string(),
            PortSchema::value_record([
                ("data", FieldSchema::of(PrimitiveType::Any)),
                ("conditions", FieldSchema::of(PrimitiveType::List)),
                ("default_branch", FieldSchema::of(PrimitiveType::String)),
            ]),
        )])
    }

    fn output_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([(
            "output".to_string(),
            PortSchema::value_record([
                ("branch", FieldSchema::of(PrimitiveType::String)),
                ("data", FieldSchema::of(PrimitiveType::Any)),
                ("condition", FieldSchema::of(PrimitiveType::Any)),
                ("matched", FieldSchema::of(PrimitiveType::Boolean)),
            ]),
        )])
    }

    fn config_fields(&self) -> IndexMap<String, FieldSchema> {
        IndexMap::from([
            ("data".to_string(), FieldSchema::of(PrimitiveType::Any)),
            (
                "conditions".to_string(),
                FieldSchema::of(PrimitiveType::List).describe("ordered {branch, expression} list"),
            ),
            (
                "default_branch".to_string(),
                FieldSchema::with_default(PrimitiveType::String, json!("default")),
            ),
        ])
    }

    async fn run(&self, node: &Node, ctx: &WorkflowContext) -> Result<Option<Value>> {
        let mut data = node.get_config_or("data", Value::Null);
        let mut conditions = node.get_config_or("conditions", json!([]));
        let mut default_branch = node
            .get_config("default_branch")
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| "default".to_string());

        if let Ok(Some(input)) = node.input_value("input_data") {
            if let Some(input_data) = input.get("data") {
                if !input_data.is_null() {
                    data = input_data.clone();
                }
            }
            if let Some(list) = input.get("conditions") {
                if list.is_array() {
                    conditions = list.clone();
                }
            }
            if let Some(branch) = input.get("default_branch").and_then(Value::as_str) {
                default_branch = branch.to_string();
            }
        }

        let mut matched = false;
        let mut selected = default_branch.clone();
        let mut matched_condition = Value::Null;

        for condition in conditions.as_array().map(Vec::as_slice).unwrap_or_default() {
            let (Some(branch), Some(expression)) = (
                condition.get("branch").and_then(Value::as_str),
                condition.get("expression").and_then(Value::as_str),
            ) else {
                continue;
            };

            match evaluate(expression, &data) {
                Ok(true) => {
                    ctx.log_info(format!("condition matched, selecting branch: {branch}"));
                    selected = branch.to_string();
                    matched_condition = json!(expression);
                    matched = true;
                    break;
                },
                Ok(false) => {},
                Err(e) => {
                    ctx.log_warning(format!("condition evaluation failed: {expression} - {e}"));
                },
            }
        }

        if !matched {
            ctx.log_info(format!("no condition matched, using default branch: {default_branch}"));
        }

        let result = json!({
            "branch": selected,
            "data": data,
            "condition": matched_condition,
            "matched": matched,
        });
        node.set_output_value("output", result.clone())?;
        Ok(Some(result))
    }
}

/// Evaluates one comparison expression against the data mapping.
pub fn evaluate(expression: &str, data: &Value) -> Result<bool> {
    for op in OPERATORS {
        if let Some((lhs, rhs)) = expression.split_once(op) {
            let left = operand(lhs.trim(), data);
            let right = operand(rhs.trim(), data);
            return compare(op, &left, &right);
        }
    }
    if let Some((lhs, rhs)) = expression.split_once(" in ") {
        let left = operand(lhs.trim(), data);
        let right = operand(rhs.trim(), data);
        return match right {
            Value::Array(items) => Ok(items.contains(&left)),
            other => Err(FlowKitError::Runtime(format!(
                "'in' needs a list on the right side, got {other}"
            ))),
        };
    }
    Err(FlowKitError::Runtime(format!("unsupported condition expression: {expression}")))
}

/// An operand is a literal (`80`, `0.5`, `true`, `'text'`, `[1, 2]`) or a
/// dotted path into the data; unresolvable paths read as null.
fn operand(token: &str, data: &Value) -> Value {
    if let Some(quoted) =
        token.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')).or_else(|| {
            token.strip_prefix('"').and_then(|t| t.strip_suffix('"'))
        })
    {
        return Value::String(quoted.to_string());
    }
    match token {
        "true" | "True" => return Value::Bool(true),
        "false" | "False" => return Value::Bool(false),
        "null" | "None" => return Value::Null,
        _ => {},
    }
    if let Ok(integer) = token.parse::<i64>() {
        return Value::from(integer);
    }
    if let Ok(float) = token.parse::<f64>() {
        return Value::from(float);
    }
    if token.starts_with('[') {
        if let Ok(list) = serde_json::from_str::<Value>(token) {
            return list;
        }
    }

    let mut current = data;
    for key in token.split('.') {
        match current.as_object().and_then(|map| map.get(key)) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn compare(op: &str, left: &Value, right: &Value) -> Result<bool> {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return Ok(match op {
            "==" => (l - r).abs() < f64::EPSILON,
            "!=" => (l - r).abs() >= f64::EPSILON,
            ">" => l > r,
            ">=" => l >= r,
            "<" => l < r,
            "<=" => l <= r,
            _ => false,
        });
    }
    match op {
        "==" => Ok(left == right),
        "!=" => Ok(left != right),
        _ => match (left.as_str(), right.as_str()) {
            (Some(l), Some(r)) => Ok(match op {
                ">" => l > r,
                ">=" => l >= r,
                "<" => l < r,
                "<=" => l <= r,
                _ => false,
            }),
            _ => Err(FlowKitError::Runtime(format!(
                "cannot order {left} {op} {right}"
            ))),
        },
    }
}

pub(crate) fn register(registry: &mut flowkit_core::NodeRegistry) {
    registry.register("condition", |_config| Ok(Box::new(ConditionNode)));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::make_node;

    #[test]
    fn test_numeric_comparisons() {
        let data = json!({"score": 85});
        assert!(evaluate("score >= 80", &data).unwrap());
        assert!(evaluate("score > 80", &data).unwrap());
        assert!(!evaluate("score < 80", &data).unwrap());
        assert!(evaluate("score == 85", &data).unwrap());
        assert!(evaluate("score != 90", &data).unwrap());
    }

    #[test]
    fn test_nested_path_and_string_literal() {
        let data = json!({"user": {"status": "active"}});
        assert!(evaluate("user.status == 'active'", &data).unwrap());
        assert!(!evaluate("user.status == 'blocked'", &data).unwrap());
    }

    #[test]
    fn test_in_operator() {
        let data = json!({"kind": "b"});
        assert!(evaluate("kind in [\"a\", \"b\"]", &data).unwrap());
        assert!(!evaluate("kind in [\"x\"]", &data).unwrap());
    }

    #[test]
    fn test_path_vs_path_comparison() {
        let data = json!({"a": 3, "b": 5});
        assert!(evaluate("a < b", &data).unwrap());
    }

    #[test]
    fn test_unsupported_expression_errors() {
        assert!(evaluate("score", &json!({})).is_err());
    }

    #[tokio::test]
    async fn test_first_matching_branch_wins() {
        let node = make_node(
            Box::new(ConditionNode),
            Some(json!({
                "data": {"score": 85},
                "conditions": [
                    {"branch": "excellent", "expression": "score >= 90"},
                    {"branch": "good", "expression": "score >= 80"},
                    {"branch": "poor", "expression": "score < 80"}
                ]
            })),
        );
        let ctx = flowkit_core::WorkflowContext::new();

        let result = node.invoke_run(&ctx).await.unwrap().unwrap();
        assert_eq!(result["branch"], json!("good"));
        assert_eq!(result["matched"], json!(true));
        assert_eq!(result["condition"], json!("score >= 80"));
    }

    #[tokio::test]
    async fn test_default_branch_when_nothing_matches() {
        let node = make_node(
            Box::new(ConditionNode),
            Some(json!({
                "data": {"score": 10},
                "conditions": [{"branch": "high", "expression": "score >= 90"}],
                "default_branch": "fallback"
            })),
        );
        let ctx = flowkit_core::WorkflowContext::new();

        let result = node.invoke_run(&ctx).await.unwrap().unwrap();
        assert_eq!(result["branch"], json!("fallback"));
        assert_eq!(result["matched"], json!(false));
        assert_eq!(result["condition"], Value::Null);
    }
}
