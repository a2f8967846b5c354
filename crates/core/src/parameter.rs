// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Parameters: port instances bound to a schema.
//!
//! A [`Parameter`] is exactly one of:
//! - a **one-shot** slot holding a single validated value, or
//! - a **streaming** queue: an unbounded ordered FIFO of [`StreamChunk`]s
//!   terminated by the [`StreamItem::End`] sentinel.
//!
//! Streaming queues are single-consumer on the receiving side (the consumer
//! takes the receiver exactly once) but accept chunks from many senders
//! (fan-in). Every chunk on a queue has already passed schema validation.

use crate::error::{FlowKitError, Result};
use crate::schema::PortSchema;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::SystemTime;
use tokio::sync::mpsc;

/// One schema-validated, timestamped payload transported along a streaming
/// edge. The payload is Arc-backed so broadcast fan-out clones are cheap.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub payload: Arc<Value>,
    pub timestamp: SystemTime,
}

impl StreamChunk {
    /// Wraps an already-validated payload with the current timestamp.
    pub fn new(payload: Value) -> Self {
        Self { payload: Arc::new(payload), timestamp: SystemTime::now() }
    }

    /// The chunk payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

/// Message carried by a streaming queue.
#[derive(Debug, Clone)]
pub enum StreamItem {
    Chunk(StreamChunk),
    /// End-of-stream sentinel; the consumer loop terminates cleanly on it.
    End,
}

/// Shared one-shot value slot. Connections hold a clone of the Arc so the
/// manager can assign propagated values directly.
pub type ValueSlot = Arc<RwLock<Option<Value>>>;

enum Slot {
    Value(ValueSlot),
    Stream {
        tx: mpsc::UnboundedSender<StreamItem>,
        rx: Mutex<Option<mpsc::UnboundedReceiver<StreamItem>>>,
    },
}

/// A named port instance bound to a schema.
pub struct Parameter {
    name: String,
    schema: PortSchema,
    slot: Slot,
}

impl Parameter {
    /// Creates the parameter, allocating the queue for streaming schemas.
    pub fn new(name: impl Into<String>, schema: PortSchema) -> Self {
        let slot = if schema.is_streaming {
            let (tx, rx) = mpsc::unbounded_channel();
            Slot::Stream { tx, rx: Mutex::new(Some(rx)) }
        } else {
            Slot::Value(Arc::new(RwLock::new(None)))
        };
        Self { name: name.into(), schema, slot }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &PortSchema {
        &self.schema
    }

    pub const fn is_streaming(&self) -> bool {
        self.schema.is_streaming
    }

    /// Validates and stores a one-shot value.
    pub fn set_value(&self, mut value: Value) -> Result<()> {
        let Slot::Value(slot) = &self.slot else {
            return Err(FlowKitError::Runtime(format!(
                "parameter '{}' is streaming; feed chunks instead of setting a value",
                self.name
            )));
        };
        self.schema.validate(&mut value)?;
        *slot.write().unwrap_or_else(PoisonError::into_inner) = Some(value);
        Ok(())
    }

    /// Returns a copy of the stored one-shot value, if any.
    pub fn value(&self) -> Result<Option<Value>> {
        let Slot::Value(slot) = &self.slot else {
            return Err(FlowKitError::Runtime(format!(
                "parameter '{}' is streaming and has no value slot",
                self.name
            )));
        };
        Ok(slot.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    /// The shared slot backing a one-shot port, for connection wiring.
    pub fn value_slot(&self) -> Result<ValueSlot> {
        match &self.slot {
            Slot::Value(slot) => Ok(slot.clone()),
            Slot::Stream { .. } => Err(FlowKitError::Runtime(format!(
                "parameter '{}' is streaming and has no value slot",
                self.name
            ))),
        }
    }

    /// A sender handle onto the streaming queue, for connection wiring
    /// and external injection.
    pub fn sender(&self) -> Result<mpsc::UnboundedSender<StreamItem>> {
        match &self.slot {
            Slot::Stream { tx, .. } => Ok(tx.clone()),
            Slot::Value(_) => Err(FlowKitError::Runtime(format!(
                "parameter '{}' is not streaming and has no queue",
                self.name
            ))),
        }
    }

    /// Takes the queue's receiving half. Streaming queues are
    /// single-consumer: the second take fails.
    pub fn take_receiver(&self) -> Result<mpsc::UnboundedReceiver<StreamItem>> {
        match &self.slot {
            Slot::Stream { rx, .. } => rx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .ok_or_else(|| {
                    FlowKitError::Runtime(format!(
                        "streaming parameter '{}' already has a consumer",
                        self.name
                    ))
                }),
            Slot::Value(_) => Err(FlowKitError::Runtime(format!(
                "parameter '{}' is not streaming and has no queue",
                self.name
            ))),
        }
    }

    /// Validates a payload and enqueues it as a chunk.
    pub fn push_chunk(&self, mut payload: Value) -> Result<StreamChunk> {
        let Slot::Stream { tx, .. } = &self.slot else {
            return Err(FlowKitError::Runtime(format!(
                "parameter '{}' is not streaming; set a value instead of feeding chunks",
                self.name
            )));
        };
        self.schema.validate(&mut payload)?;
        let chunk = StreamChunk::new(payload);
        tx.send(StreamItem::Chunk(chunk.clone()))
            .map_err(|_| FlowKitError::Runtime(format!("stream '{}' is closed", self.name)))?;
        Ok(chunk)
    }

    /// Enqueues the end-of-stream sentinel. Safe to call on an already
    /// drained queue.
    pub fn close(&self) -> Result<()> {
        let Slot::Stream { tx, .. } = &self.slot else {
            return Err(FlowKitError::Runtime(format!(
                "parameter '{}' is not streaming and cannot be closed",
                self.name
            )));
        };
        let _ = tx.send(StreamItem::End);
        Ok(())
    }
}

impl std::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("streaming", &self.is_streaming())
            .finish_non_exhaustive()
    }
}
