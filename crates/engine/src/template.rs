// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Lazy template substitution for node configuration.
//!
//! Config values may reference upstream outputs and globals with Jinja
//! syntax (`{{ }}`, `{% %}`, `{# #}`). The names exposed to templates:
//! - `nodes[node_id][.field…]`: upstream node outputs (live view — a node
//!   that has not produced output yet reads as an empty mapping)
//! - `context.field…` / `c.field…`: global variables
//! - `engine`: workflow metadata snapshot
//! - `get_node_output(node_id, field?)`: helper with dotted-path lookup
//!
//! Rendering is iterative: if the rendered text still contains template
//! markers it is rendered again, up to [`MAX_TEMPLATE_ITERATIONS`] passes,
//! after which the partial result is returned with a warning.

use crate::constants::MAX_TEMPLATE_ITERATIONS;
use flowkit_core::{FlowKitError, Result, WorkflowContext};
use minijinja::value::{Object, Value as TemplateValue};
use minijinja::{Environment, UndefinedBehavior};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Live accessor over node outputs stored in the context. Because lookups
/// go to the shared context on every render, later-executing nodes observe
/// freshly-written outputs without an explicit refresh step.
#[derive(Debug)]
struct NodeOutputs {
    ctx: Arc<WorkflowContext>,
}

impl Object for NodeOutputs {
    fn get_value(self: &Arc<Self>, key: &TemplateValue) -> Option<TemplateValue> {
        let node_id = key.as_str()?;
        Some(match self.ctx.output(node_id) {
            Some(output) => TemplateValue::from_serialize(&output),
            // Missing nodes read as an empty mapping so field access on
            // them renders as empty instead of failing the whole config.
            None => TemplateValue::from_serialize(serde_json::Map::new()),
        })
    }
}

/// Live accessor over global variables.
#[derive(Debug)]
struct GlobalVars {
    ctx: Arc<WorkflowContext>,
}

impl Object for GlobalVars {
    fn get_value(self: &Arc<Self>, key: &TemplateValue) -> Option<TemplateValue> {
        let name = key.as_str()?;
        self.ctx.global(name).map(|value| TemplateValue::from_serialize(&value))
    }
}

/// Renders configuration templates against a workflow run.
pub struct TemplateResolver {
    env: Environment<'static>,
}

impl TemplateResolver {
    /// Builds the template environment bound to one run's context.
    /// `engine_info` is the metadata snapshot exposed as `engine`.
    pub fn new(ctx: Arc<WorkflowContext>, engine_info: Value) -> Self {
        let mut env = Environment::new();
        // Chainable lookups keep `nodes['later'].field` renderable before
        // the referenced node has produced output.
        env.set_undefined_behavior(UndefinedBehavior::Chainable);

        env.add_global("nodes", TemplateValue::from_object(NodeOutputs { ctx: ctx.clone() }));
        let globals = TemplateValue::from_object(GlobalVars { ctx: ctx.clone() });
        env.add_global("context", globals.clone());
        env.add_global("c", globals);
        env.add_global("engine", TemplateValue::from_serialize(&engine_info));

        env.add_function(
            "get_node_output",
            move |node_id: String,
                  field: Option<String>|
                  -> std::result::Result<TemplateValue, minijinja::Error> {
                let output = match field {
                    None => ctx.output(&node_id),
                    Some(path) => ctx.output_path(&node_id, &path).ok().flatten(),
                };
                Ok(output.map_or_else(
                    TemplateValue::default,
                    |value| TemplateValue::from_serialize(&value),
                ))
            },
        );

        Self { env }
    }

    /// Renders a template string. Template-free strings are returned
    /// unchanged; otherwise rendering repeats until a fixpoint, bounded by
    /// the iteration cap.
    pub fn render(&self, text: &str) -> Result<String> {
        self.render_with(text, &HashMap::new())
    }

    /// Like [`render`](Self::render) with extra local variables; locals
    /// shadow globals of the same name.
    pub fn render_with(&self, text: &str, locals: &HashMap<String, Value>) -> Result<String> {
        if !has_template_markers(text) {
            return Ok(text.to_string());
        }

        let mut current = text.to_string();
        for _ in 0..MAX_TEMPLATE_ITERATIONS {
            if !has_template_markers(&current) {
                return Ok(current);
            }
            let rendered = self
                .env
                .render_str(&current, locals)
                .map_err(|e| FlowKitError::Template(e.to_string()))?;
            if rendered == current {
                return Ok(rendered);
            }
            current = rendered;
        }

        if has_template_markers(&current) {
            tracing::warn!(
                iterations = MAX_TEMPLATE_ITERATIONS,
                "template recursion hit the iteration cap; unresolved markers remain"
            );
        }
        Ok(current)
    }

    /// Walks a config tree, rendering every string that contains template
    /// markers. Rendered standalone literals (`true`, `false`, `null`,
    /// integer, float) are reparsed into typed values; non-string leaves
    /// pass through untouched.
    pub fn resolve_value(&self, value: &Value) -> Result<Value> {
        match value {
            Value::String(text) if has_template_markers(text) => {
                Ok(coerce_rendered(self.render(text)?))
            },
            Value::Object(map) => map
                .iter()
                .map(|(key, item)| Ok((key.clone(), self.resolve_value(item)?)))
                .collect::<Result<serde_json::Map<String, Value>>>()
                .map(Value::Object),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_value(item))
                .collect::<Result<Vec<Value>>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }
}

impl std::fmt::Debug for TemplateResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateResolver").finish_non_exhaustive()
    }
}

/// Whether a string contains Jinja expression, block, or comment markers.
pub fn has_template_markers(text: &str) -> bool {
    text.contains("{{") || text.contains("{%") || text.contains("{#")
}

/// Reparses a rendered string into a typed value when it is a standalone
/// literal, otherwise keeps it as a (trimmed) string.
fn coerce_rendered(rendered: String) -> Value {
    let trimmed = rendered.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" | "none" => return Value::Null,
        _ => {},
    }
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Value::from(integer);
    }
    if trimmed.contains('.') {
        if let Ok(float) = trimmed.parse::<f64>() {
            return Value::from(float);
        }
    }
    Value::String(trimmed.to_string())
}
