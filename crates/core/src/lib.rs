//! # toolstream Core
//!
//! Domain types, traits, and error definitions shared by the tag protocol and
//! the agent loop. This crate has no knowledge of any particular model
//! backend or tool; those are injected by the embedding application.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the loop is a trait here:
//! - [`ModelClient`] streams model output
//! - [`Tool`] executes one validated call
//! - [`TranscriptSink`] receives user-visible output

pub mod error;
pub mod message;
pub mod model;
pub mod tool;
pub mod transcript;

// Re-export key types at crate root for ergonomics
pub use error::{ModelError, ToolError};
pub use message::{Message, Role};
pub use model::{ModelClient, ModelEvent, ModelRequest, ModelStream, NativeToolCall, ToolDefinition};
pub use tool::{HandOff, ParamKind, ParamSpec, Tool, ToolOutput, ToolRegistry, ToolResult, ToolSpec};
pub use transcript::{NullTranscript, TranscriptBus, TranscriptEntry, TranscriptSink};
