//! Error types for the toolstream domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

/// Failures reported by a [`ModelClient`](crate::model::ModelClient), either
/// when opening the stream or mid-stream.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// The backend cannot be reached or is not installed/enabled.
    #[error("Model unavailable: {0}")]
    Unavailable(String),

    /// The backend answered, but with a failure.
    #[error("Model request failed: {message}")]
    RequestFailed {
        status_code: Option<u16>,
        message: String,
    },

    /// A local model could not be loaded into memory.
    #[error("Model failed to load: {0}")]
    LoadFailed(String),

    /// The backend rejected the shape of the request or of its own output
    /// (malformed tool-call JSON, schema mismatch, ...).
    #[error("Model output failed validation: {0}")]
    Validation(String),

    /// The stream ended abnormally.
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    /// The request was cancelled by the caller.
    #[error("Request aborted")]
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool call aborted")]
    Aborted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_error_displays_correctly() {
        let err = ModelError::RequestFailed {
            status_code: Some(503),
            message: "backend overloaded".into(),
        };
        assert!(err.to_string().contains("backend overloaded"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = ToolError::ExecutionFailed {
            tool_name: "fetch_page".into(),
            reason: "connection reset".into(),
        };
        assert!(err.to_string().contains("fetch_page"));
        assert!(err.to_string().contains("connection reset"));
    }
}
