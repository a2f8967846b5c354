// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! End-to-end runs of the demo workflow files in `demos/`.

#![allow(clippy::unwrap_used)]

use flowkit_engine::WorkflowEngine;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn demo_path(file: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos").join(file)
}

async fn wait_until(mut ready: impl FnMut() -> bool) {
    for _ in 0..250 {
        if ready() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within timeout");
}

#[tokio::test]
async fn test_voice_chain_streams_audio_end_to_end() {
    let mut engine = WorkflowEngine::new();
    engine.load_config(demo_path("voice_chain.yaml")).unwrap();

    // Tap the synthesized audio with an external sink.
    let synthesized: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = synthesized.clone();
    engine
        .add_external_connection("tts", "audio_out", move |payload| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(payload);
            }
        })
        .unwrap();

    engine.start(None).await.unwrap();
    assert!(engine.get_status().running);

    // Simulated microphone: three speech chunks and one silence chunk.
    let vad = engine.get_node("vad").unwrap();
    for segment in ["aGVsbG8=", "aG93", "YXJlIHlvdQ=="] {
        vad.feed(
            "raw_audio",
            json!({"audio_data": segment, "audio_type": "opus", "sample_rate": 16000}),
        )
        .unwrap();
    }
    vad.feed("raw_audio", json!({"audio_data": ""})).unwrap();

    {
        let synthesized = synthesized.clone();
        wait_until(move || synthesized.lock().unwrap().len() >= 3).await;
    }

    // The agent's sequential phase reports the turns it held.
    let ctx = engine.context().unwrap();
    engine.execute(None).await.unwrap();
    let stats = ctx.output("agent").unwrap();
    assert_eq!(stats["turns"], json!(3));

    engine.stop().await.unwrap();
    assert!(!engine.get_status().running);

    let synthesized = synthesized.lock().unwrap();
    assert_eq!(synthesized.len(), 3);
    // Voice config is threaded through: the stub tags audio with the voice.
    assert!(synthesized[0]["audio_data"].as_str().unwrap().starts_with("calm:assistant:"));
}

#[tokio::test]
async fn test_etl_chain_gates_and_publishes() {
    let mut engine = WorkflowEngine::new();
    engine.load_config(demo_path("etl_chain.yaml")).unwrap();

    let ctx = engine.start(None).await.unwrap();
    engine.execute(None).await.unwrap();

    assert_eq!(ctx.output("reshape").unwrap(), json!({"user_name": "ada", "score": 91}));
    assert_eq!(ctx.output_path("gate", "branch").unwrap(), Some(json!("high")));
    assert_eq!(ctx.output_path("gate", "matched").unwrap(), Some(json!(true)));
    assert_eq!(
        ctx.output("publish").unwrap(),
        json!({"branch": "high", "user": "ada"})
    );
    assert!(ctx.logs().iter().any(|entry| entry.message.contains("workflow output")));

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_workflow_info_reflects_loaded_demo() {
    let mut engine = WorkflowEngine::new();
    engine.load_config(demo_path("voice_chain.yaml")).unwrap();

    let info = engine.get_workflow_info().unwrap();
    assert_eq!(info.name, "voice-chain");
    assert_eq!(info.node_count, 4);
    assert_eq!(info.version.as_deref(), Some("1.0"));
}
