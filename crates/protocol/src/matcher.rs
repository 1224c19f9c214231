//! Incremental tag recognition over a chunked text stream.
//!
//! [`TagMatcher`] consumes text one character at a time, so the result never
//! depends on how the stream was chunked. For every character it looks at the
//! unconfirmed window (everything since the last resolved boundary):
//!
//! - the window equals a start tag → the tag opens;
//! - the window is a prefix of some start tag → keep buffering;
//! - otherwise the oldest buffered character is released as safe text and
//!   the shortened window is checked again.
//!
//! An open tag swallows everything up to the first occurrence of its own end
//! tag. There is no nesting: a start tag inside an open tag is plain body text.

use tracing::warn;

/// One syntactic alias: the start and end delimiters of a tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagPair {
    pub start: String,
    pub end: String,
}

impl TagPair {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

/// A tag whose end delimiter has been seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTag {
    /// Index of the matching pair, in registration order
    pub pair: usize,
    /// Text between the start and end delimiters, verbatim
    pub body: String,
    /// Start delimiter + body + end delimiter
    pub raw: String,
    /// Char offset of the start delimiter in the stream
    pub start_offset: usize,
    /// Char offset just past the end delimiter
    pub end_offset: usize,
}

/// Result of one [`TagMatcher::push`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutput {
    /// Text confirmed to be outside any tag. Never revised later.
    pub safe_text: String,
    /// Tags completed during this push, in stream order
    pub tags: Vec<CompletedTag>,
    /// Something is still buffered (a partial start tag or an open tag)
    pub ambiguous: bool,
}

#[derive(Debug)]
struct OpenTag {
    pair: usize,
    body: String,
    start_offset: usize,
}

/// Incremental scanner for a fixed set of tag pairs.
///
/// Owns all of its state; one instance serves exactly one stream.
#[derive(Debug)]
pub struct TagMatcher {
    pairs: Vec<TagPair>,
    window: String,
    open: Option<OpenTag>,
    position: usize,
}

impl TagMatcher {
    /// Create a matcher. Pairs with an empty start or end delimiter can never
    /// be matched meaningfully and are skipped.
    pub fn new(pairs: Vec<TagPair>) -> Self {
        let pairs = pairs
            .into_iter()
            .filter(|p| {
                let usable = !p.start.is_empty() && !p.end.is_empty();
                if !usable {
                    warn!(start = %p.start, end = %p.end, "Ignoring tag pair with empty delimiter");
                }
                usable
            })
            .collect();
        Self {
            pairs,
            window: String::new(),
            open: None,
            position: 0,
        }
    }

    pub fn pairs(&self) -> &[TagPair] {
        &self.pairs
    }

    /// Feed the next chunk of the stream.
    pub fn push(&mut self, chunk: &str) -> MatchOutput {
        let mut out = MatchOutput::default();
        for c in chunk.chars() {
            self.feed(c, &mut out);
        }
        out.ambiguous = self.is_ambiguous();
        out
    }

    /// End of stream: release a dangling partial start tag as safe text.
    ///
    /// An opened tag without its end delimiter is never released.
    pub fn finish(&mut self) -> String {
        if self.open.is_some() {
            return String::new();
        }
        std::mem::take(&mut self.window)
    }

    /// Whether any input is still held back.
    pub fn is_ambiguous(&self) -> bool {
        self.open.is_some() || !self.window.is_empty()
    }

    /// Number of characters consumed so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Drop all buffered state and start over.
    pub fn reset(&mut self) {
        self.window.clear();
        self.open = None;
        self.position = 0;
    }

    fn feed(&mut self, c: char, out: &mut MatchOutput) {
        self.position += 1;

        if let Some(mut open) = self.open.take() {
            open.body.push(c);
            let pair = &self.pairs[open.pair];
            if open.body.ends_with(pair.end.as_str()) {
                let raw = format!("{}{}", pair.start, open.body);
                let body_len = open.body.len() - pair.end.len();
                open.body.truncate(body_len);
                out.tags.push(CompletedTag {
                    pair: open.pair,
                    body: open.body,
                    raw,
                    start_offset: open.start_offset,
                    end_offset: self.position,
                });
            } else {
                self.open = Some(open);
            }
            return;
        }

        self.window.push(c);
        self.resolve_window(out);
    }

    fn resolve_window(&mut self, out: &mut MatchOutput) {
        while !self.window.is_empty() {
            if let Some(pair) = self.pairs.iter().position(|p| p.start == self.window) {
                let start_offset = self.position - self.window.chars().count();
                self.window.clear();
                self.open = Some(OpenTag {
                    pair,
                    body: String::new(),
                    start_offset,
                });
                return;
            }

            if self
                .pairs
                .iter()
                .any(|p| p.start.starts_with(self.window.as_str()))
            {
                return;
            }

            let released = self.window.remove(0);
            out.safe_text.push(released);
        }
    }
}
