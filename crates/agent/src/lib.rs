//! The agent loop: stream a model response, pull tool calls out of it, run
//! them, fold the results back in, repeat.
//!
//! 1. **Stream** the model response through the tag extractor and the native
//!    call normalizer
//! 2. **Deduplicate** the iteration's calls
//! 3. **Execute** them one at a time
//! 4. **Fold** the results into the next user turn, or hand the conversation
//!    off to a nested run
//!
//! The loop ends when the model answers without calling a tool, or on the
//! last allowed iteration, where tools are withheld and an answer is forced.

pub mod executor;
pub mod loop_runner;
pub mod prompts;
pub mod recovery;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use executor::ToolExecutor;
pub use loop_runner::{AgentLoop, AgentRunResult, AgentSettings, LoopState, RunOutcome};
pub use recovery::{FatalError, FatalErrorKind, Recovery, classify};
