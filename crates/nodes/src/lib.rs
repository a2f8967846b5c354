// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! flowkit-nodes: built-in workflow nodes.
//!
//! Batch nodes (`start`, `condition`, `transform`, `merge`, `output`,
//! `http_request`), the streaming `timer` source, and the voice-stack
//! stubs (`vad`, `asr`, `agent`, `tts`).

use flowkit_core::NodeRegistry;

pub mod condition;
#[cfg(feature = "http")]
pub mod http;
pub mod merge;
pub mod output;
pub mod start;
pub mod timer;
pub mod transform;
pub(crate) mod util;
pub mod voice;

#[cfg(test)]
pub(crate) mod test_utils;

/// Registers every built-in node into `registry`.
pub fn register_nodes(registry: &mut NodeRegistry) {
    start::register(registry);
    condition::register(registry);
    transform::register(registry);
    merge::register(registry);
    output::register(registry);
    timer::register(registry);
    #[cfg(feature = "http")]
    http::register(registry);
    voice::register_voice_nodes(registry);

    tracing::debug!("finished registering built-in nodes");
}

/// Registers every built-in node into the process-wide registry, for
/// embedders that resolve node types globally instead of per engine.
pub fn register_builtin_nodes() {
    let registry = flowkit_core::registry::global_registry();
    let mut guard = registry.write().unwrap_or_else(std::sync::PoisonError::into_inner);
    register_nodes(&mut guard);
}
