// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Node execution disciplines and lifecycle states.

use serde::{Deserialize, Serialize};

/// How the engine schedules a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Invoked once per `execute()` pass, strictly in declaration order.
    Sequential,
    /// Long-running body spawned at start; runs until engine stop.
    Streaming,
    /// Both: a long-running body *and* participation in the ordered
    /// sequential phase.
    Hybrid,
}

impl ExecutionMode {
    /// Whether the node takes part in the ordered sequential phase.
    pub const fn is_sequential_phase(self) -> bool {
        matches!(self, Self::Sequential | Self::Hybrid)
    }

    /// Whether the engine spawns a long-running task for the node.
    pub const fn is_long_running(self) -> bool {
        matches!(self, Self::Streaming | Self::Hybrid)
    }
}

/// Lifecycle state of a node: `pending → running → {success|failed|skipped}`.
/// Streaming and hybrid nodes remain `running` until engine stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_classification() {
        assert!(ExecutionMode::Sequential.is_sequential_phase());
        assert!(ExecutionMode::Hybrid.is_sequential_phase());
        assert!(!ExecutionMode::Streaming.is_sequential_phase());

        assert!(ExecutionMode::Streaming.is_long_running());
        assert!(ExecutionMode::Hybrid.is_long_running());
        assert!(!ExecutionMode::Sequential.is_long_running());
    }

    #[test]
    fn test_serde_names_are_snake_case() {
        #[allow(clippy::unwrap_used)]
        let mode: ExecutionMode = serde_json::from_value(serde_json::json!("hybrid")).unwrap();
        assert_eq!(mode, ExecutionMode::Hybrid);

        #[allow(clippy::unwrap_used)]
        let status = serde_json::to_value(NodeStatus::Pending).unwrap();
        assert_eq!(status, serde_json::json!("pending"));
    }
}
