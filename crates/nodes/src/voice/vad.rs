// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Voice-activity detection stub.
//!
//! Passes speech-bearing audio chunks through with a timestamp attached;
//! chunks with empty `audio_data` are treated as silence and dropped.

use crate::util::unix_now_secs;
use crate::voice::{raw_audio_schema, speech_audio_schema};
use async_trait::async_trait;
use flowkit_core::{
    ExecutionMode, FieldSchema, Node, PortSchema, PrimitiveType, Result, StreamChunk,
    WorkflowContext, WorkflowNode,
};
use indexmap::IndexMap;
use serde_json::{json, Value};

pub struct VadNode;

#[async_trait]
impl WorkflowNode for VadNode {
    fn input_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([("raw_audio".to_string(), raw_audio_schema())])
    }

    fn output_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([("audio_stream".to_string(), speech_audio_schema())])
    }

    fn config_fields(&self) -> IndexMap<String, FieldSchema> {
        IndexMap::from([(
            "threshold".to_string(),
            FieldSchema::with_default(PrimitiveType::Float, json!(0.5))
                .describe("speech detection threshold"),
        )])
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Streaming
    }

    async fn run(&self, node: &Node, _ctx: &WorkflowContext) -> Result<Option<Value>> {
        node.cancelled().await;
        Ok(None)
    }

    async fn on_chunk(&self, node: &Node, _port: &str, chunk: StreamChunk) -> Result<()> {
        let payload = chunk.payload();
        let audio_data = payload["audio_data"].as_str().unwrap_or_default();
        if audio_data.is_empty() {
            // Silence gate.
            tracing::debug!(node_id = %node.id(), "silence chunk dropped");
            return Ok(());
        }

        node.emit(
            "audio_stream",
            json!({
                "audio_data": audio_data,
                "audio_type": payload["audio_type"].as_str().unwrap_or("pcm"),
                "sample_rate": payload["sample_rate"].as_i64().unwrap_or(16_000),
                "timestamp": unix_now_secs(),
            }),
        )
        .await
    }
}
