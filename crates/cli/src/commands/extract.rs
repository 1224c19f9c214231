//! `toolstream extract` — feed model output through the streaming extractor.
//!
//! The input is cut into fixed-size deltas to mimic a token stream, so the
//! report shows exactly what a live run would have surfaced.

use std::path::PathBuf;

use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::debug;

use toolstream_config::AppConfig;
use toolstream_core::tool::ToolSpec;
use toolstream_protocol::{ParsedToolCall, StreamToolCallExtractor};

/// Everything the extractor produced for one input.
#[derive(Debug, Default, Serialize)]
pub struct ExtractReport {
    pub safe_text: String,
    pub tool_calls: Vec<ParsedToolCall>,
    pub errors: Vec<String>,
}

/// Stream `input` through a fresh extractor in `chunk_size`-character deltas.
pub fn extract(specs: &[ToolSpec], wrapper: &str, input: &str, chunk_size: usize) -> ExtractReport {
    let mut extractor = StreamToolCallExtractor::new(specs.to_vec(), wrapper);
    let mut report = ExtractReport::default();
    let chars: Vec<char> = input.chars().collect();

    for chunk in chars.chunks(chunk_size.max(1)) {
        let delta: String = chunk.iter().collect();
        let out = extractor.push(&delta);
        report.safe_text.push_str(&out.safe_text);
        report.tool_calls.extend(out.tool_calls);
        report.errors.extend(out.errors.iter().map(ToString::to_string));
    }
    report.safe_text.push_str(&extractor.finish().safe_text);

    debug!(
        calls = report.tool_calls.len(),
        errors = report.errors.len(),
        "Extraction finished"
    );
    report
}

pub async fn run(
    config: AppConfig,
    file: Option<PathBuf>,
    chunk_size: usize,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let input = match file {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };

    let report = extract(&config.tools, &config.agent.bundle_wrapper, &input, chunk_size);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("── Text ──");
    println!("{}", report.safe_text);
    println!();
    println!("── Tool calls ({}) ──", report.tool_calls.len());
    for call in &report.tool_calls {
        println!(
            "  {} {}",
            call.tool_name,
            serde_json::Value::Object(call.params.clone())
        );
    }
    if !report.errors.is_empty() {
        println!();
        println!("── Format errors ({}) ──", report.errors.len());
        for error in &report.errors {
            println!("  ⚠️  {error}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolstream_core::tool::{ParamKind, ParamSpec};

    fn specs() -> Vec<ToolSpec> {
        vec![
            ToolSpec::new("search", "Search the web")
                .with_param(ParamSpec::required("query", ParamKind::string())),
        ]
    }

    #[test]
    fn splits_text_and_calls() {
        let input = "Let me look.<search>\n<query>rust</query>\n</search>Done.";
        for chunk_size in [1, 3, 64] {
            let report = extract(&specs(), "tool_calls", input, chunk_size);
            assert_eq!(report.safe_text, "Let me look.Done.");
            assert_eq!(report.tool_calls.len(), 1);
            assert_eq!(report.tool_calls[0].params["query"], "rust");
            assert!(report.errors.is_empty());
        }
    }

    #[test]
    fn zero_chunk_size_is_treated_as_one() {
        let report = extract(&specs(), "tool_calls", "plain <sea", 0);
        assert_eq!(report.safe_text, "plain <sea");
    }

    #[test]
    fn malformed_call_is_reported() {
        let report = extract(&specs(), "tool_calls", "<search>\n<query></query>\n</search>", 8);
        assert!(report.tool_calls.is_empty());
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn report_serializes() {
        let report = extract(&specs(), "tool_calls", "<search><query>x</query></search>", 4);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tool_calls"][0]["tool_name"], "search");
        assert_eq!(json["tool_calls"][0]["source"], "text");
    }
}
