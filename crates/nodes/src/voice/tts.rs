// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Speech-synthesis stub.
//!
//! Turns every response-text chunk into an audio chunk and reports a
//! playback status on the feedback port.

use crate::util::unix_now_secs;
use crate::voice::{broadcast_status_schema, response_text_schema, speech_audio_schema};
use async_trait::async_trait;
use flowkit_core::{
    ExecutionMode, FieldSchema, Node, PortSchema, PrimitiveType, Result, StreamChunk,
    WorkflowContext, WorkflowNode,
};
use indexmap::IndexMap;
use serde_json::{json, Value};

pub struct TtsNode;

#[async_trait]
impl WorkflowNode for TtsNode {
    fn input_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([("text_input".to_string(), response_text_schema())])
    }

    fn output_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([
            ("audio_out".to_string(), speech_audio_schema()),
            ("broadcast_status".to_string(), broadcast_status_schema()),
        ])
    }

    fn config_fields(&self) -> IndexMap<String, FieldSchema> {
        IndexMap::from([
            (
                "voice".to_string(),
                FieldSchema::with_default(PrimitiveType::String, json!("neutral")),
            ),
            (
                "sample_rate".to_string(),
                FieldSchema::with_default(PrimitiveType::Integer, json!(16_000)),
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

    async fn on_chunk(&self, node: &Node, _port: &str, chunk: StreamChunk) -> Result<()> {
        let text = chunk.payload()["text"].as_str().unwrap_or_default().to_string();
        let voice = node.get_config_or("voice", json!("neutral"));
        let sample_rate = node.get_config_or("sample_rate", json!(16_000));

        // Stub synthesis: the "audio" is the text tagged with the voice.
        node.emit(
            "audio_out",
            json!({
                "audio_data": format!("{}:{text}", voice.as_str().unwrap_or("neutral")),
                "audio_type": "pcm",
                "sample_rate": sample_rate,
                "timestamp": unix_now_secs(),
            }),
        )
        .await?;

        node.emit(
            "broadcast_status",
            json!({
                "status": "played",
                "timestamp": unix_now_secs(),
            }),
        )
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::{capture_stream, make_node};

    #[tokio::test]
    async fn test_synthesizes_audio_and_reports_playback() {
        let node = make_node(Box::new(TtsNode), Some(json!({"voice": "calm"})));
        let audio = capture_stream(&node, "audio_out");
        let status = capture_stream(&node, "broadcast_status");

        node.feed("text_input", json!({"text": "hello", "is_final": true})).unwrap();
        node.close_input("text_input").unwrap();
        node.clone().consume_stream("text_input".to_string()).await;

        let audio = audio.lock().unwrap();
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0]["audio_data"], json!("calm:hello"));
        assert_eq!(audio[0]["sample_rate"], json!(16_000));

        let status = status.lock().unwrap();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0]["status"], json!("played"));
    }
}
