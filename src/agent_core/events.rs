//! Progress events pushed to the caller during a turn.
//!
//! Events are emitted in happens-before order relative to the work they
//! describe; a `result` or `error` event is always the last event of a
//! turn, and exactly one of the two is emitted.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use super::types::FinalAnswer;

/// One progress event of a conversational turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Coarse activity marker ("Searching VFB for ...").
    Status { message: String },
    /// Intermediate assistant text produced alongside tool calls.
    Reasoning { text: String },
    /// Terminal success.
    Result { answer: FinalAnswer },
    /// Terminal failure.
    Error { message: String },
}

/// Sending half of the turn's event channel.
///
/// A dropped receiver is not an error: the turn keeps running to completion
/// (cache ingestion still matters) and sends are silently discarded.
#[derive(Clone)]
pub struct EventSink {
    tx: UnboundedSender<ProgressEvent>,
}

impl EventSink {
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }

    pub fn status(&self, message: impl Into<String>) {
        let _ = self.tx.send(ProgressEvent::Status { message: message.into() });
    }

    pub fn reasoning(&self, text: impl Into<String>) {
        let _ = self.tx.send(ProgressEvent::Reasoning { text: text.into() });
    }

    pub fn result(&self, answer: FinalAnswer) {
        let _ = self.tx.send(ProgressEvent::Result { answer });
    }

    pub fn error(&self, message: impl Into<String>) {
        let _ = self.tx.send(ProgressEvent::Error { message: message.into() });
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
