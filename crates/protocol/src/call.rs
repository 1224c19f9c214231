//! Validated tool calls.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where a call came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallSource {
    /// Embedded in streamed text as a tag
    Text,
    /// The backend's native function-calling channel
    Native,
}

/// A tool call that passed full schema validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedToolCall {
    pub tool_name: String,
    pub params: Map<String, Value>,
    /// The tag text as the model wrote it; for native calls, the canonical
    /// rendering of the call.
    pub raw_tag_text: String,
    pub source: CallSource,
}

impl ParsedToolCall {
    /// Same tool and deep-equal parameters.
    pub fn same_call(&self, other: &ParsedToolCall) -> bool {
        self.tool_name == other.tool_name && self.params == other.params
    }
}

/// Drop later calls that repeat an earlier one, keeping first-seen order.
pub fn dedupe(calls: Vec<ParsedToolCall>) -> Vec<ParsedToolCall> {
    let mut kept: Vec<ParsedToolCall> = Vec::with_capacity(calls.len());
    for call in calls {
        if !kept.iter().any(|k| k.same_call(&call)) {
            kept.push(call);
        }
    }
    kept
}
