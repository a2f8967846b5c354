// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Declarative workflow configuration model and loaders.
//!
//! Workflows are declared as a nested mapping (YAML or JSON):
//!
//! ```yaml
//! workflow:
//!   name: voice-chain
//!   config:
//!     continue_on_error: false
//!   nodes:
//!     - id: vad
//!       type: vad
//!       config: { threshold: 0.5 }
//!   connections:
//!     - from: vad.audio_stream
//!       to: asr.audio_in
//! ```
//!
//! The node list is ordered; declaration order is the scheduling contract
//! for the sequential phase.

use flowkit_core::{ExecutionMode, FlowKitError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

/// Top-level config file wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowFile {
    pub workflow: WorkflowDecl,
}

/// Engine-level settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowSettings {
    /// When set, a failing sequential node is logged and execution
    /// continues with the next node instead of aborting.
    #[serde(default)]
    pub continue_on_error: bool,
}

/// One node declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeDecl {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Free-form mapping validated by the node type's config fields.
    #[serde(default)]
    pub config: Option<Value>,
    /// Overrides the node type's default execution mode.
    #[serde(default)]
    pub execution_mode: Option<ExecutionMode>,
}

/// One connection declaration, `"<node_id>.<port_name>"` on both ends.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionDecl {
    pub from: String,
    pub to: String,
}

impl ConnectionDecl {
    /// Splits both endpoints into `(node_id, port_name)` pairs.
    pub fn endpoints(&self) -> Result<((&str, &str), (&str, &str))> {
        Ok((split_endpoint(&self.from)?, split_endpoint(&self.to)?))
    }
}

fn split_endpoint(endpoint: &str) -> Result<(&str, &str)> {
    endpoint.split_once('.').filter(|(node, port)| !node.is_empty() && !port.is_empty()).ok_or_else(
        || {
            FlowKitError::Configuration(format!(
                "malformed connection endpoint '{endpoint}': expected 'node_id.port_name'"
            ))
        },
    )
}

/// The declarative description of one workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowDecl {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub config: WorkflowSettings,
    #[serde(default)]
    pub nodes: Vec<NodeDecl>,
    #[serde(default)]
    pub connections: Vec<ConnectionDecl>,
}

impl WorkflowDecl {
    /// Structural validation: non-empty name, non-empty node list with
    /// unique ids, well-formed connection endpoints.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(FlowKitError::Configuration(
                "workflow is missing a 'name'".to_string(),
            ));
        }
        if self.nodes.is_empty() {
            return Err(FlowKitError::Configuration(
                "'workflow.nodes' must be a non-empty list".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(FlowKitError::Configuration(
                    "node declaration is missing an 'id'".to_string(),
                ));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(FlowKitError::Configuration(format!(
                    "duplicate node id: {}",
                    node.id
                )));
            }
        }
        for conn in &self.connections {
            conn.endpoints()?;
        }
        Ok(())
    }
}

/// Parses a workflow declaration from a YAML string.
pub fn parse_workflow_yaml(text: &str) -> Result<WorkflowDecl> {
    let file: WorkflowFile = serde_saphyr::from_str(text)
        .map_err(|e| FlowKitError::Configuration(format!("failed to parse YAML workflow: {e}")))?;
    file.workflow.validate()?;
    Ok(file.workflow)
}

/// Parses a workflow declaration from a pre-parsed nested mapping.
pub fn parse_workflow_value(value: Value) -> Result<WorkflowDecl> {
    let file: WorkflowFile = serde_json::from_value(value)
        .map_err(|e| FlowKitError::Configuration(format!("malformed workflow config: {e}")))?;
    file.workflow.validate()?;
    Ok(file.workflow)
}

/// Loads a workflow declaration from a `.yaml`/`.yml` or `.json` file.
pub fn load_workflow_file(path: impl AsRef<Path>) -> Result<WorkflowDecl> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => parse_workflow_yaml(&text),
        Some("json") => {
            let value: Value = serde_json::from_str(&text).map_err(|e| {
                FlowKitError::Configuration(format!("failed to parse JSON workflow: {e}"))
            })?;
            parse_workflow_value(value)
        },
        other => Err(FlowKitError::Configuration(format!(
            "unsupported workflow config format: {other:?} (expected yaml, yml, or json)"
        ))),
    }
}
