// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Timer node: a streaming source emitting ticks on a fixed interval.
//!
//! The `interval` config uses time-unit syntax: `"5s"`, `"2m"`, `"1h"`, or
//! a bare number of seconds. Each tick carries `{timestamp, timer_id, data}`
//! and fans out through the ordinary connection routing, so one timer can
//! drive any number of downstream streaming inputs.

use crate::util::unix_now_secs;
use async_trait::async_trait;
use flowkit_core::{
    FieldSchema, FlowKitError, Node, PortSchema, PrimitiveType, Result, WorkflowContext,
    WorkflowNode,
};
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::time::Duration;

pub struct TimerNode;

#[async_trait]
impl WorkflowNode for TimerNode {
    fn output_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([(
            "trigger".to_string(),
            PortSchema::stream_record([
                ("timestamp", FieldSchema::of(PrimitiveType::Float)),
                ("timer_id", FieldSchema::of(PrimitiveType::String)),
                ("data", FieldSchema::of(PrimitiveType::Dict)),
            ]),
        )])
    }

    fn config_fields(&self) -> IndexMap<String, FieldSchema> {
        IndexMap::from([
            (
                "interval".to_string(),
                FieldSchema::required(PrimitiveType::String)
                    .describe("tick period: '5s', '2m', '1h', or seconds"),
            ),
            (
                "data".to_string(),
                FieldSchema::with_default(PrimitiveType::Dict, json!({}))
                    .describe("payload attached to every tick"),
            ),
        ])
    }

    fn execution_mode(&self) -> flowkit_core::ExecutionMode {
        flowkit_core::ExecutionMode::Streaming
    }

    async fn run(&self, node: &Node, ctx: &WorkflowContext) -> Result<Option<Value>> {
        let interval = node
            .get_config("interval")
            .and_then(|v| v.as_str().map(String::from))
            .ok_or_else(|| FlowKitError::Runtime("timer is missing 'interval'".to_string()))?;
        let period = parse_interval(&interval)?;
        let data = node.get_config_or("data", json!({}));

        ctx.log_info(format!("timer '{}' ticking every {period:?}", node.id()));
        loop {
            tokio::select! {
                () = node.cancelled() => break,
                () = tokio::time::sleep(period) => {
                    let tick = json!({
                        "timestamp": unix_now_secs(),
                        "timer_id": node.id(),
                        "data": data,
                    });
                    if let Err(e) = node.emit("trigger", tick).await {
                        ctx.log_warning(format!("timer '{}' tick dropped: {e}", node.id()));
                    }
                }
            }
        }
        Ok(None)
    }
}

/// Parses `"5s"` / `"2m"` / `"1h"` / `"30"` into a duration.
pub fn parse_interval(interval: &str) -> Result<Duration> {
    let interval = interval.trim();
    let (digits, unit) = match interval.strip_suffix(['s', 'm', 'h']) {
        Some(digits) => (digits, &interval[interval.len() - 1..]),
        None => (interval, "s"),
    };
    let amount: u64 = digits.trim().parse().map_err(|_| {
        FlowKitError::Runtime(format!(
            "invalid interval '{interval}': expected '<number>[s|m|h]'"
        ))
    })?;
    if amount == 0 {
        return Err(FlowKitError::Runtime(format!(
            "invalid interval '{interval}': period must be positive"
        )));
    }
    let seconds = match unit {
        "m" => amount * 60,
        "h" => amount * 3600,
        _ => amount,
    };
    Ok(Duration::from_secs(seconds))
}

pub(crate) fn register(registry: &mut flowkit_core::NodeRegistry) {
    registry.register("timer", |_config| Ok(Box::new(TimerNode)));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_syntax() {
        assert_eq!(parse_interval("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_interval("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_interval("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_interval("30").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_intervals_rejected() {
        assert!(parse_interval("").is_err());
        assert!(parse_interval("fast").is_err());
        assert!(parse_interval("0s").is_err());
        assert!(parse_interval("5d").is_err());
    }

    #[tokio::test]
    async fn test_missing_interval_fails_construction() {
        let err = flowkit_core::Node::new(
            "timer",
            None,
            None,
            Box::new(TimerNode),
            Some(json!({})),
            std::sync::Arc::new(flowkit_core::ConnectionManager::new()),
        )
        .unwrap_err();
        assert!(err.to_string().contains("interval"));
    }

    #[tokio::test]
    async fn test_timer_emits_until_cancelled() {
        use crate::test_utils::{capture_stream, make_node};

        let node = make_node(Box::new(TimerNode), Some(json!({"interval": "1s"})));
        let captured = capture_stream(&node, "trigger");

        let runner = {
            let node = node.clone();
            tokio::spawn(async move {
                let ctx = WorkflowContext::new();
                node.invoke_run(&ctx).await
            })
        };

        tokio::time::sleep(Duration::from_millis(2500)).await;
        node.cancel();
        runner.await.unwrap().unwrap();

        let ticks = captured.lock().unwrap();
        assert!(ticks.len() >= 2, "expected at least two ticks, got {}", ticks.len());
        assert_eq!(ticks[0]["timer_id"], json!("test_node"));
    }
}
