//! Transcript sink — the append-only channel for user-visible output.
//!
//! The agent loop reports what the user should see (streamed answer text,
//! reasoning, tool activity, errors) as [`TranscriptEntry`] values. Rendering
//! and storage happen elsewhere; the loop never reads entries back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Everything the agent loop surfaces to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEntry {
    /// Confirmed safe text for an assistant message.
    TextDelta { message_id: String, text: String },

    /// Reasoning text, with time elapsed since the first reasoning delta.
    Reasoning {
        message_id: String,
        text: String,
        elapsed_ms: u64,
    },

    /// A validated tool call is about to run.
    ToolCall {
        message_id: String,
        tool_name: String,
        params: serde_json::Value,
    },

    /// A tool finished.
    ToolResult {
        message_id: String,
        tool_name: String,
        success: bool,
    },

    /// A nested run took over the conversation.
    HandOff { message_id: String },

    /// The message ended in an error; `message` is user-facing.
    Error { message_id: String, message: String },

    /// The message is complete (finished, forced-final, or aborted).
    MessageDone {
        message_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl TranscriptEntry {
    /// The assistant message this entry belongs to.
    pub fn message_id(&self) -> &str {
        match self {
            Self::TextDelta { message_id, .. }
            | Self::Reasoning { message_id, .. }
            | Self::ToolCall { message_id, .. }
            | Self::ToolResult { message_id, .. }
            | Self::HandOff { message_id }
            | Self::Error { message_id, .. }
            | Self::MessageDone { message_id, .. } => message_id,
        }
    }
}

/// Append-only sink for transcript entries.
pub trait TranscriptSink: Send + Sync {
    fn append(&self, entry: TranscriptEntry);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTranscript;

impl TranscriptSink for NullTranscript {
    fn append(&self, _entry: TranscriptEntry) {}
}

/// A broadcast-based transcript sink.
///
/// Uses `tokio::sync::broadcast` so any number of renderers can follow the
/// same run.
pub struct TranscriptBus {
    sender: broadcast::Sender<Arc<TranscriptEntry>>,
}

impl TranscriptBus {
    /// Create a new bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to receive entries.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<TranscriptEntry>> {
        self.sender.subscribe()
    }
}

impl Default for TranscriptBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl TranscriptSink for TranscriptBus {
    fn append(&self, entry: TranscriptEntry) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(entry));
    }
}
