//! What the loop does when a model call fails.
//!
//! Recoverable failures become a corrective user turn; there is no separate
//! retry counter, the iteration limit bounds them. Fatal failures end the run
//! with a user-facing message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use toolstream_core::error::ModelError;
use toolstream_protocol::FormatError;

use crate::prompts;

/// Run-ending failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalErrorKind {
    ModelUnavailable,
    ModelRequestFailure,
    ModelLoadFailure,
}

impl FatalErrorKind {
    /// Text shown to the user in place of an answer.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ModelUnavailable => {
                "The model is not available right now. Check that it is installed and enabled, then try again."
            }
            Self::ModelRequestFailure => "The request to the model failed. Please try again later.",
            Self::ModelLoadFailure => "The model could not be loaded. It may need more memory than is available.",
        }
    }
}

/// A run-ending failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .kind.user_message())]
pub struct FatalError {
    pub kind: FatalErrorKind,
    /// Backend detail, for logs only
    pub detail: String,
}

/// The loop's reaction to a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Recovery {
    /// Send this corrective instruction as the next user turn and continue.
    Correct(String),
    /// Stop quietly.
    Abort,
    /// End the run.
    Fatal(FatalError),
}

/// Classify a model failure.
///
/// Validation-class errors mean the model produced something malformed, so
/// they are downgraded to a format problem and corrected like one.
pub fn classify(err: &ModelError) -> Recovery {
    let fatal = |kind| {
        Recovery::Fatal(FatalError {
            kind,
            detail: err.to_string(),
        })
    };
    match err {
        ModelError::Validation(detail) => Recovery::Correct(prompts::format_correction(&[detail.as_str()])),
        ModelError::Aborted => Recovery::Abort,
        ModelError::Unavailable(_) => fatal(FatalErrorKind::ModelUnavailable),
        ModelError::LoadFailed(_) => fatal(FatalErrorKind::ModelLoadFailure),
        ModelError::RequestFailed { .. } | ModelError::StreamInterrupted(_) => {
            fatal(FatalErrorKind::ModelRequestFailure)
        }
    }
}

/// Corrective turn for tool calls that failed to parse.
pub fn correct_format(errors: &[FormatError]) -> String {
    let reasons: Vec<String> = errors.iter().map(ToString::to_string).collect();
    let reasons: Vec<&str> = reasons.iter().map(String::as_str).collect();
    prompts::format_correction(&reasons)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_recoverable() {
        match classify(&ModelError::Validation("bad tool json".into())) {
            Recovery::Correct(text) => assert!(text.contains("bad tool json")),
            other => panic!("unexpected recovery: {other:?}"),
        }
    }

    #[test]
    fn abort_is_silent() {
        assert_eq!(classify(&ModelError::Aborted), Recovery::Abort);
    }

    #[test]
    fn backend_failures_are_fatal() {
        let cases = [
            (ModelError::Unavailable("offline".into()), FatalErrorKind::ModelUnavailable),
            (
                ModelError::RequestFailed {
                    status_code: Some(500),
                    message: "boom".into(),
                },
                FatalErrorKind::ModelRequestFailure,
            ),
            (ModelError::LoadFailed("oom".into()), FatalErrorKind::ModelLoadFailure),
            (
                ModelError::StreamInterrupted("eof".into()),
                FatalErrorKind::ModelRequestFailure,
            ),
        ];
        for (err, expected) in cases {
            match classify(&err) {
                Recovery::Fatal(fatal) => {
                    assert_eq!(fatal.kind, expected);
                    assert_eq!(fatal.detail, err.to_string());
                    assert_eq!(fatal.to_string(), expected.user_message());
                }
                other => panic!("{err:?} classified as {other:?}"),
            }
        }
    }

    #[test]
    fn format_errors_are_listed_in_correction() {
        let text = correct_format(&[
            FormatError::Unrecognized {
                raw: "<search>".into(),
            },
            FormatError::EmptyBundle {
                wrapper: "tool_calls".into(),
                raw: "<tool_calls></tool_calls>".into(),
            },
        ]);
        assert!(text.contains("- Tool call could not be parsed\n"));
        assert!(text.contains("contains no tool call"));
    }
}
