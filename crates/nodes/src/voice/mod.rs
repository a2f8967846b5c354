// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Voice-stack stubs: VAD → ASR → agent → TTS.
//!
//! These nodes carry realistic port schemas and streaming behavior without
//! real models behind them, so voice pipelines can be wired, driven, and
//! tested end to end. Audio bytes travel base64-encoded as JSON strings.

use flowkit_core::{FieldSchema, NodeRegistry, PortSchema, PrimitiveType};

pub mod agent;
pub mod asr;
pub mod tts;
pub mod vad;

pub use agent::AgentNode;
pub use asr::AsrNode;
pub use tts::TtsNode;
pub use vad::VadNode;

/// Raw microphone audio: what a capture source feeds into VAD.
pub(crate) fn raw_audio_schema() -> PortSchema {
    PortSchema::stream_record([
        ("audio_data", FieldSchema::of(PrimitiveType::Bytes)),
        ("audio_type", FieldSchema::of(PrimitiveType::String)),
        ("sample_rate", FieldSchema::of(PrimitiveType::Integer)),
    ])
}

/// Speech-bearing audio: VAD output and ASR input.
pub(crate) fn speech_audio_schema() -> PortSchema {
    PortSchema::stream_record([
        ("audio_data", FieldSchema::of(PrimitiveType::Bytes)),
        ("audio_type", FieldSchema::of(PrimitiveType::String)),
        ("sample_rate", FieldSchema::of(PrimitiveType::Integer)),
        ("timestamp", FieldSchema::of(PrimitiveType::Float)),
    ])
}

/// Recognized text: ASR output and agent input.
pub(crate) fn transcript_schema() -> PortSchema {
    PortSchema::stream_record([
        ("text", FieldSchema::of(PrimitiveType::String)),
        ("is_final", FieldSchema::of(PrimitiveType::Boolean)),
        ("confidence", FieldSchema::of(PrimitiveType::Float)),
        ("timestamp", FieldSchema::of(PrimitiveType::Float)),
    ])
}

/// Agent response text: agent output and TTS input.
pub(crate) fn response_text_schema() -> PortSchema {
    PortSchema::stream_record([
        ("text", FieldSchema::of(PrimitiveType::String)),
        ("is_final", FieldSchema::of(PrimitiveType::Boolean)),
        ("timestamp", FieldSchema::of(PrimitiveType::Float)),
    ])
}

/// Playback status: TTS output, fed back to the agent (a legal streaming
/// cycle).
pub(crate) fn broadcast_status_schema() -> PortSchema {
    PortSchema::stream_record([
        ("status", FieldSchema::of(PrimitiveType::String)),
        ("timestamp", FieldSchema::of(PrimitiveType::Float)),
    ])
}

pub(crate) fn register_voice_nodes(registry: &mut NodeRegistry) {
    registry.register("vad", |_config| Ok(Box::new(VadNode)));
    registry.register("asr", |_config| Ok(Box::<AsrNode>::default()));
    registry.register("agent", |_config| Ok(Box::<AgentNode>::default()));
    registry.register("tts", |_config| Ok(Box::new(TtsNode)));
}
