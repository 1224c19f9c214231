//! Synthetic turns the loop writes into the conversation.

use toolstream_core::tool::ToolSpec;
use toolstream_protocol::tool_instructions;

/// Appended to the user's question on the first iteration.
pub const INITIAL_GUIDANCE: &str = "Answer the question above. If a tool would help, call it first; \
     otherwise answer directly.";

/// Follows the tool results on later iterations.
pub const FOLLOW_UP_GUIDANCE: &str = "Use the tool results above. Call another tool only if you \
     still lack information; otherwise write the final answer now.";

/// The last allowed iteration.
pub const FORCED_FINAL: &str = "Stop calling tools. Using only what you already have, write your \
     final answer now.";

/// Sent after a response with no text and no tool calls.
pub const EMPTY_RESPONSE_NUDGE: &str = "Your last response was empty. Please answer the question.";

/// The full system prompt: base instructions followed by the tool section.
pub fn system_prompt(base: &str, specs: &[ToolSpec], wrapper: &str) -> String {
    let tools = tool_instructions(specs, wrapper);
    match (base.trim().is_empty(), tools.is_empty()) {
        (_, true) => base.trim().to_string(),
        (true, false) => tools,
        (false, false) => format!("{}\n\n{tools}", base.trim()),
    }
}

/// First-iteration user turn.
pub fn initial_turn(question: &str) -> String {
    format!("{}\n\n{INITIAL_GUIDANCE}", question.trim_end())
}

/// Later-iteration user turn. `question` is `None` when it must not be
/// echoed back (an image-viewing tool ran this round).
pub fn follow_up_turn(results: &[String], question: Option<&str>) -> String {
    let mut out = results.join("\n\n");
    if !out.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str(FOLLOW_UP_GUIDANCE);
    if let Some(question) = question {
        out.push_str("\n\nOriginal question: ");
        out.push_str(question.trim());
    }
    out
}

/// Corrective turn after malformed tool calls.
pub fn format_correction(reasons: &[&str]) -> String {
    let mut out = String::from("Your tool call was not understood:\n");
    for reason in reasons {
        out.push_str("- ");
        out.push_str(reason);
        out.push('\n');
    }
    out.push_str(
        "\nWrite each call exactly as <tool_name>\n<param>value</param>\n</tool_name>, \
         using only the documented tools and parameters.",
    );
    out
}

/// Error injected for a call to a tool that does not exist.
pub fn tool_not_found(name: &str, available: &[&str]) -> String {
    format!(
        "Tool `{name}` does not exist. Available tools: {}.",
        available.join(", ")
    )
}
