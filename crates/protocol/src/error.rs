//! Format errors raised while reading tool calls out of model text.

use thiserror::Error;

use crate::parse::ParamError;

/// A tool call the model attempted but got wrong.
///
/// All variants are recoverable: the loop reports them back to the model as
/// a corrective turn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("Invalid call to `{tool_name}`: {}", join(.errors))]
    InvalidParameters {
        tool_name: String,
        errors: Vec<ParamError>,
        raw: String,
    },

    #[error("Unknown tool `{name}` (available: {})", .available.join(", "))]
    UnknownTool { name: String, available: Vec<String> },

    #[error("`<{wrapper}>` block contains no tool call")]
    EmptyBundle { wrapper: String, raw: String },

    #[error("Tag `<{tag}>` is never closed")]
    Unterminated { tag: String, raw: String },

    #[error("Tool call could not be parsed")]
    Unrecognized { raw: String },
}

impl FormatError {
    /// The offending tag text, when there is one.
    pub fn raw(&self) -> Option<&str> {
        match self {
            Self::InvalidParameters { raw, .. }
            | Self::EmptyBundle { raw, .. }
            | Self::Unterminated { raw, .. }
            | Self::Unrecognized { raw } => Some(raw),
            Self::UnknownTool { .. } => None,
        }
    }
}

fn join(errors: &[ParamError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_parameters_lists_every_error() {
        let err = FormatError::InvalidParameters {
            tool_name: "search".into(),
            errors: vec![
                ParamError {
                    param: "query".into(),
                    reason: "missing required parameter".into(),
                },
                ParamError {
                    param: "limit".into(),
                    reason: "must be <= 10".into(),
                },
            ],
            raw: "<search></search>".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid call to `search`: query: missing required parameter; limit: must be <= 10"
        );
        assert_eq!(err.raw(), Some("<search></search>"));
    }

    #[test]
    fn unknown_tool_lists_available() {
        let err = FormatError::UnknownTool {
            name: "browse".into(),
            available: vec!["search".into(), "fetch_page".into()],
        };
        assert!(err.to_string().contains("available: search, fetch_page"));
        assert!(err.raw().is_none());
    }
}
