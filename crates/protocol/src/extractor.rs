//! Tool-call extraction from a streamed model response.
//!
//! One [`StreamToolCallExtractor`] serves one model response. Every tool gets
//! a canonical (`<name>`) and a fenced (```` ```name ````) alias; the bundle
//! wrapper (`<tool_calls>`) is shared by all tools, so it is registered once
//! and its inner tool tags are resolved when the wrapper closes.

use tracing::debug;

use toolstream_core::tool::ToolSpec;

use crate::call::{CallSource, ParsedToolCall};
use crate::error::FormatError;
use crate::matcher::{CompletedTag, TagMatcher, TagPair};
use crate::parse::{find_open_tag, parse_from_text};

/// Default name of the bundle wrapper tag.
pub const DEFAULT_BUNDLE_WRAPPER: &str = "tool_calls";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Alias {
    Canonical,
    Fenced,
    Bundle,
}

/// What one text delta produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractOutput {
    pub tool_calls: Vec<ParsedToolCall>,
    /// Text confirmed to be outside any tool tag
    pub safe_text: String,
    /// Malformed calls. Non-empty means the in-flight response should be
    /// abandoned and corrected.
    pub errors: Vec<FormatError>,
}

impl ExtractOutput {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub struct StreamToolCallExtractor {
    specs: Vec<ToolSpec>,
    matcher: TagMatcher,
    aliases: Vec<Alias>,
    wrapper: String,
}

impl StreamToolCallExtractor {
    pub fn new(specs: Vec<ToolSpec>, wrapper: impl Into<String>) -> Self {
        let wrapper = wrapper.into();
        let mut pairs = Vec::with_capacity(specs.len() * 2 + 1);
        let mut aliases = Vec::with_capacity(specs.len() * 2 + 1);

        for spec in &specs {
            pairs.push(TagPair::new(format!("<{}>", spec.name), format!("</{}>", spec.name)));
            aliases.push(Alias::Canonical);
            pairs.push(TagPair::new(format!("```{}\n", spec.name), "```"));
            aliases.push(Alias::Fenced);
        }
        pairs.push(TagPair::new(format!("<{wrapper}>"), format!("</{wrapper}>")));
        aliases.push(Alias::Bundle);

        Self {
            specs,
            matcher: TagMatcher::new(pairs),
            aliases,
            wrapper,
        }
    }

    /// Process the next text delta.
    pub fn push(&mut self, delta: &str) -> ExtractOutput {
        let matched = self.matcher.push(delta);
        let mut out = ExtractOutput {
            safe_text: matched.safe_text,
            ..ExtractOutput::default()
        };
        for tag in &matched.tags {
            self.resolve(tag, &mut out);
        }
        out
    }

    /// End of the response: release any dangling partial start tag.
    pub fn finish(&mut self) -> ExtractOutput {
        ExtractOutput {
            safe_text: self.matcher.finish(),
            ..ExtractOutput::default()
        }
    }

    /// Whether text is still held back waiting for more input.
    pub fn is_ambiguous(&self) -> bool {
        self.matcher.is_ambiguous()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.name.clone()).collect()
    }

    fn resolve(&self, tag: &CompletedTag, out: &mut ExtractOutput) {
        debug!(offset = tag.start_offset, len = tag.raw.len(), "Completed tool tag");
        match self.aliases.get(tag.pair) {
            Some(Alias::Bundle) => self.resolve_bundle(tag, out),
            Some(Alias::Canonical | Alias::Fenced) => match self.parse_call(&tag.raw) {
                Ok(call) => out.tool_calls.push(call),
                Err(e) => out.errors.push(e),
            },
            None => out.errors.push(FormatError::Unrecognized {
                raw: tag.raw.clone(),
            }),
        }
    }

    /// Try every spec in registration order; the first structural match wins.
    fn parse_call(&self, raw: &str) -> Result<ParsedToolCall, FormatError> {
        for spec in &self.specs {
            let Some(outcome) = parse_from_text(spec, raw) else {
                continue;
            };
            if !outcome.is_valid() {
                return Err(FormatError::InvalidParameters {
                    tool_name: spec.name.clone(),
                    errors: outcome.errors,
                    raw: raw.to_string(),
                });
            }
            return Ok(ParsedToolCall {
                tool_name: spec.name.clone(),
                params: outcome.params,
                raw_tag_text: raw.to_string(),
                source: CallSource::Text,
            });
        }
        Err(FormatError::Unrecognized {
            raw: raw.to_string(),
        })
    }

    /// Split a `<tool_calls>` body into its inner tool tags.
    fn resolve_bundle(&self, tag: &CompletedTag, out: &mut ExtractOutput) {
        let body = tag.body.as_str();
        let mut cursor = 0;
        let mut found_any = false;

        while let Some(open) = find_open_tag(body, cursor, |_| true) {
            found_any = true;
            let close_tag = format!("</{}>", open.full_name);
            let Some(close_rel) = body[open.end..].find(&close_tag) else {
                out.errors.push(FormatError::Unterminated {
                    tag: open.full_name.to_string(),
                    raw: tag.raw.clone(),
                });
                return;
            };
            let close_at = open.end + close_rel;
            cursor = close_at + close_tag.len();

            if !self.specs.iter().any(|s| s.name == open.name) {
                out.errors.push(FormatError::UnknownTool {
                    name: open.name.to_string(),
                    available: self.tool_names(),
                });
                continue;
            }

            let canonical = format!(
                "<{name}>{inner}</{name}>",
                name = open.name,
                inner = &body[open.end..close_at]
            );
            match self.parse_call(&canonical) {
                Ok(mut call) => {
                    call.raw_tag_text = body[open.start..cursor].to_string();
                    out.tool_calls.push(call);
                }
                Err(e) => out.errors.push(e),
            }
        }

        if !found_any {
            out.errors.push(FormatError::EmptyBundle {
                wrapper: self.wrapper.clone(),
                raw: tag.raw.clone(),
            });
        }
    }
}
