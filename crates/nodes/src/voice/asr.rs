// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Speech-recognition stub.
//!
//! Emits one transcript chunk per incoming audio segment, tagged with the
//! configured model name and a running segment counter.

use crate::util::unix_now_secs;
use crate::voice::{speech_audio_schema, transcript_schema};
use async_trait::async_trait;
use flowkit_core::{
    ExecutionMode, FieldSchema, Node, PortSchema, PrimitiveType, Result, StreamChunk,
    WorkflowContext, WorkflowNode,
};
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct AsrNode {
    segments: AtomicU64,
}

#[async_trait]
impl WorkflowNode for AsrNode {
    fn input_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([("audio_in".to_string(), speech_audio_schema())])
    }

    fn output_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([("text_stream".to_string(), transcript_schema())])
    }

    fn config_fields(&self) -> IndexMap<String, FieldSchema> {
        IndexMap::from([
            (
                "model".to_string(),
                FieldSchema::with_default(PrimitiveType::String, json!("whisper")),
            ),
            (
                "language".to_string(),
                FieldSchema::with_default(PrimitiveType::String, json!("en")),
            ),
        ])
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Streaming
    }

    async fn run(&self, node: &Node, _ctx: &WorkflowContext) -> Result<Option<Value>> {
        node.cancelled().await;
        Ok(None)
    }

    async fn on_chunk(&self, node: &Node, _port: &str, _chunk: StreamChunk) -> Result<()> {
        let segment = self.segments.fetch_add(1, Ordering::SeqCst) + 1;
        let model = node.get_config_or("model", json!("whisper"));
        let text = format!("[{} segment {segment}]", model.as_str().unwrap_or("whisper"));

        node.emit(
            "text_stream",
            json!({
                "text": text,
                "is_final": true,
                "confidence": 1.0,
                "timestamp": unix_now_secs(),
            }),
        )
        .await
    }
}
