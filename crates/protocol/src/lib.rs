//! # toolstream Protocol
//!
//! How tool calls travel inside a streamed model response:
//!
//! 1. **Match** tag delimiters incrementally as text arrives ([`TagMatcher`])
//! 2. **Parse** each completed tag against the tool specs ([`parse_from_text`])
//! 3. **Extract** validated calls and safe text per delta ([`StreamToolCallExtractor`])
//! 4. **Normalize** calls from the native function-calling channel ([`ToolCallNormalizer`])
//!
//! The wire format for text-embedded calls:
//!
//! ```text
//! canonical:  <tool_name>\n<param_a>value</param_a>\n</tool_name>
//! fenced:     ```tool_name\n<param_a>value</param_a>\n```
//! bundled:    <tool_calls>\n<tool_name>...</tool_name>\n</tool_calls>
//! shorthand:  <tool_name>value</tool_name>
//! ```

pub mod call;
pub mod error;
pub mod extractor;
pub mod markup;
pub mod matcher;
pub mod normalize;
pub mod parse;

pub use call::{CallSource, ParsedToolCall, dedupe};
pub use error::FormatError;
pub use extractor::{DEFAULT_BUNDLE_WRAPPER, ExtractOutput, StreamToolCallExtractor};
pub use markup::{render_call, render_tool_result, tool_instructions};
pub use matcher::{CompletedTag, MatchOutput, TagMatcher, TagPair};
pub use normalize::ToolCallNormalizer;
pub use parse::{ParamError, ParseOutcome, parse_from_text, strip_namespace};
