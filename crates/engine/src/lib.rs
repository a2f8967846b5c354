// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! flowkit-engine: the execution engine for FlowKit workflows.
//!
//! This crate turns a declarative workflow config into a running graph:
//! - [`config`]: the config model and YAML/JSON loaders
//! - [`builder`]: node instantiation and connection wiring
//! - [`template`]: lazy config substitution against upstream outputs
//! - [`engine`]: the [`WorkflowEngine`] lifecycle (`start`/`execute`/`stop`)

pub mod builder;
pub mod config;
pub mod constants;
pub mod engine;
pub mod template;

pub use config::{
    load_workflow_file, parse_workflow_value, parse_workflow_yaml, ConnectionDecl, NodeDecl,
    WorkflowDecl, WorkflowSettings,
};
pub use engine::{EngineStatus, NodeReport, WorkflowEngine, WorkflowInfo};
pub use template::TemplateResolver;

#[cfg(test)]
mod tests;
