//! Text the model reads: tool instructions, canonical calls and tool results.

use serde_json::{Map, Value};
use toolstream_core::tool::{ParamKind, ToolResult, ToolSpec};

/// Render a call in the canonical wire format:
///
/// ```text
/// <tool_name>
/// <param_a>value</param_a>
/// </tool_name>
/// ```
pub fn render_call(tool_name: &str, params: &Map<String, Value>) -> String {
    let mut out = format!("<{tool_name}>\n");
    for (name, value) in params {
        out.push_str(&format!("<{name}>{}</{name}>\n", scalar_text(value)));
    }
    out.push_str(&format!("</{tool_name}>"));
    out
}

/// Render one tool result for the next user turn.
pub fn render_tool_result(result: &ToolResult) -> String {
    let status = if result.success { "ok" } else { "error" };
    let mut out = format!(
        "<tool_result tool=\"{}\" status=\"{status}\">\n{}\n",
        result.tool_name,
        result.output.trim_end()
    );
    if let Some(data) = &result.data {
        out.push_str(&data.to_string());
        out.push('\n');
    }
    out.push_str("</tool_result>");
    out
}

/// The system-prompt section that teaches the model how to call tools.
pub fn tool_instructions(specs: &[ToolSpec], wrapper: &str) -> String {
    if specs.is_empty() {
        return String::new();
    }

    let mut out = String::from("# Tools\n\n");
    out.push_str("To use a tool, write its tag with one nested tag per parameter:\n\n");
    out.push_str("<tool_name>\n<param_a>value</param_a>\n</tool_name>\n\n");
    out.push_str(&format!(
        "Several calls may be grouped in one <{wrapper}>...</{wrapper}> block. \
         Stop writing after your tool calls and wait for the results.\n\n"
    ));
    out.push_str("## Available tools\n");

    for spec in specs {
        out.push_str(&format!("\n### {}\n{}\n", spec.name, spec.instruction.trim()));
        for param in &spec.params {
            let req = if param.required { "required" } else { "optional" };
            out.push_str(&format!("- `{}` ({}, {req})", param.name, kind_label(&param.kind)));
            if let Some(default) = &param.default {
                out.push_str(&format!(", default {}", scalar_text(default)));
            }
            if !param.description.is_empty() {
                out.push_str(&format!(": {}", param.description));
            }
            out.push('\n');
        }
        let example: Map<String, Value> = spec
            .required_params()
            .map(|p| (p.name.clone(), Value::String("...".into())))
            .collect();
        out.push_str(&format!("Example:\n{}\n", render_call(&spec.name, &example)));
    }

    out
}

fn kind_label(kind: &ParamKind) -> String {
    match kind {
        ParamKind::String { .. } => "string".into(),
        ParamKind::Integer { min, max } => match (min, max) {
            (Some(min), Some(max)) => format!("integer {min}..={max}"),
            (Some(min), None) => format!("integer >= {min}"),
            (None, Some(max)) => format!("integer <= {max}"),
            (None, None) => "integer".into(),
        },
        ParamKind::Number => "number".into(),
        ParamKind::Boolean => "true|false".into(),
        ParamKind::Enum { values } => values.join("|"),
        ParamKind::Url => "URL".into(),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
