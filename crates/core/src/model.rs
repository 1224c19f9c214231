//! ModelClient trait — the abstraction over streaming LLM backends.
//!
//! A ModelClient knows how to send a conversation to a model and hand back a
//! stream of deltas. The agent loop never knows which backend it talks to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ModelError;
use crate::message::Message;

/// A tool definition sent to backends with native function calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// One model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The conversation, system prompt first
    pub messages: Vec<Message>,

    /// Tools offered on the native function-calling channel. Empty on the
    /// forced-final iteration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// A tool call delivered through the backend's native function-calling
/// channel rather than embedded in text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeToolCall {
    /// Backend-assigned call ID
    #[serde(default)]
    pub id: String,

    /// Name as emitted by the model, possibly namespaced or a wrapper
    pub name: String,

    /// Arguments; some backends send a JSON object, others a JSON string
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// A single event in a streamed model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelEvent {
    TextDelta { text: String },
    ReasoningDelta { text: String },
    ToolCall { call: NativeToolCall },
    Finish {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// Receiving half of a streamed response. Mid-stream failures arrive as `Err`.
pub type ModelStream = mpsc::Receiver<Result<ModelEvent, ModelError>>;

/// The core ModelClient trait.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Start streaming a response. Implementations should stop producing
    /// events once `cancel` fires.
    async fn stream_response(
        &self,
        request: ModelRequest,
        cancel: CancellationToken,
    ) -> Result<ModelStream, ModelError>;
}

/// Build a stream that yields the given events in order and then closes.
///
/// Handy for backends that only support complete responses, and for tests.
pub fn replay(events: Vec<Result<ModelEvent, ModelError>>) -> ModelStream {
    let (tx, rx) = mpsc::channel(events.len().max(1));
    for event in events {
        // Capacity covers every event, so this cannot fail.
        let _ = tx.try_send(event);
    }
    rx
}
