// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Dialogue agent stub (hybrid).
//!
//! The long-running body answers every final transcript with a templated
//! response chunk; the sequential-phase `execute` reports turn statistics
//! into the context. Playback status from TTS arrives on a feedback input,
//! forming a legal streaming cycle.

use crate::util::unix_now_secs;
use crate::voice::{broadcast_status_schema, response_text_schema, transcript_schema};
use async_trait::async_trait;
use flowkit_core::{
    ExecutionMode, FieldSchema, Node, PortSchema, PrimitiveType, Result, StreamChunk,
    WorkflowContext, WorkflowNode,
};
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct AgentNode {
    turns: AtomicU64,
    playbacks: AtomicU64,
}

#[async_trait]
impl WorkflowNode for AgentNode {
    fn input_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([
            ("text_input".to_string(), transcript_schema()),
            ("broadcast_status".to_string(), broadcast_status_schema()),
        ])
    }

    fn output_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([("response_text".to_string(), response_text_schema())])
    }

    fn config_fields(&self) -> IndexMap<String, FieldSchema> {
        IndexMap::from([
            (
                "system_prompt".to_string(),
                FieldSchema::with_default(PrimitiveType::String, json!("You are a helpful assistant.")),
            ),
            (
                "reply_prefix".to_string(),
                FieldSchema::with_default(PrimitiveType::String, json!("echo:")),
            ),
        ])
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Hybrid
    }

    async fn run(&self, node: &Node, _ctx: &WorkflowContext) -> Result<Option<Value>> {
        node.cancelled().await;
        Ok(None)
    }

    /// Sequential-phase invocation: report conversation statistics.
    async fn execute(&self, node: &Node, ctx: &WorkflowContext) -> Result<Option<Value>> {
        let stats = json!({
            "turns": self.turns.load(Ordering::SeqCst),
            "playbacks": self.playbacks.load(Ordering::SeqCst),
        });
        ctx.log_info(format!("agent '{}' stats: {stats}", node.id()));
        Ok(Some(stats))
    }

    async fn on_chunk(&self, node: &Node, port: &str, chunk: StreamChunk) -> Result<()> {
        match port {
            "broadcast_status" => {
                self.playbacks.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(
                    node_id = %node.id(),
                    status = %chunk.payload()["status"],
                    "playback status received"
                );
                Ok(())
            },
            _ => {
                let payload = chunk.payload();
                if !payload["is_final"].as_bool().unwrap_or(false) {
                    return Ok(());
                }
                self.turns.fetch_add(1, Ordering::SeqCst);
                let prefix = node.get_config_or("reply_prefix", json!("echo:"));
                let text = format!(
                    "{} {}",
                    prefix.as_str().unwrap_or("echo:"),
                    payload["text"].as_str().unwrap_or_default()
                );
                node.emit(
                    "response_text",
                    json!({
                        "text": text,
                        "is_final": true,
                        "timestamp": unix_now_secs(),
                    }),
                )
                .await
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::{capture_stream, make_node};

    #[tokio::test]
    async fn test_final_transcripts_get_responses() {
        let node =
            make_node(Box::<AgentNode>::default(), Some(json!({"reply_prefix": "bot:"})));
        let captured = capture_stream(&node, "response_text");

        node.feed("text_input", json!({"text": "hello", "is_final": false})).unwrap();
        node.feed("text_input", json!({"text": "hello there", "is_final": true})).unwrap();
        node.close_input("text_input").unwrap();
        node.clone().consume_stream("text_input".to_string()).await;

        let responses = captured.lock().unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["text"], json!("bot: hello there"));
    }

    #[tokio::test]
    async fn test_execute_reports_turn_statistics() {
        let node = make_node(Box::<AgentNode>::default(), None);
        let ctx = WorkflowContext::new();

        node.feed("text_input", json!({"text": "hi", "is_final": true})).unwrap();
        node.close_input("text_input").unwrap();
        node.clone().consume_stream("text_input".to_string()).await;

        let stats = node.invoke_execute(&ctx).await.unwrap().unwrap();
        assert_eq!(stats["turns"], json!(1));
    }

    #[tokio::test]
    async fn test_playback_status_counted() {
        let node = make_node(Box::<AgentNode>::default(), None);
        let ctx = WorkflowContext::new();

        node.feed("broadcast_status", json!({"status": "played"})).unwrap();
        node.close_input("broadcast_status").unwrap();
        node.clone().consume_stream("broadcast_status".to_string()).await;

        let stats = node.invoke_execute(&ctx).await.unwrap().unwrap();
        assert_eq!(stats["playbacks"], json!(1));
    }
}
