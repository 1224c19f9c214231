//! `toolstream replay` — drive the agent loop with a scripted model.
//!
//! The script is a JSON array with one entry per model call. An entry is
//! either a plain string (the response text) or an object:
//!
//! ```json
//! { "text": "...", "reasoning": "...", "tool_calls": [{ "name": "search", "arguments": {"query": "x"} }] }
//! ```
//!
//! Tools come from the config file and never do anything: each call echoes
//! its validated parameters back as the result.

use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use toolstream_agent::{AgentLoop, AgentSettings, RunOutcome};
use toolstream_config::AppConfig;
use toolstream_core::error::{ModelError, ToolError};
use toolstream_core::message::Message;
use toolstream_core::model::{
    ModelClient, ModelEvent, ModelRequest, ModelStream, NativeToolCall, replay,
};
use toolstream_core::tool::{Tool, ToolOutput, ToolRegistry, ToolResult, ToolSpec};
use toolstream_core::transcript::{TranscriptEntry, TranscriptSink};

/// Characters per streamed delta.
const DELTA_CHARS: usize = 8;

/// One scripted model response.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScriptedResponse {
    Text(String),
    Full {
        #[serde(default)]
        text: String,
        #[serde(default)]
        reasoning: String,
        #[serde(default)]
        tool_calls: Vec<NativeToolCall>,
    },
}

impl ScriptedResponse {
    fn into_events(self) -> Vec<Result<ModelEvent, ModelError>> {
        let (text, reasoning, tool_calls) = match self {
            Self::Text(text) => (text, String::new(), Vec::new()),
            Self::Full {
                text,
                reasoning,
                tool_calls,
            } => (text, reasoning, tool_calls),
        };

        let mut events = Vec::new();
        events.extend(
            deltas(&reasoning)
                .into_iter()
                .map(|text| Ok(ModelEvent::ReasoningDelta { text })),
        );
        events.extend(
            deltas(&text)
                .into_iter()
                .map(|text| Ok(ModelEvent::TextDelta { text })),
        );
        events.extend(
            tool_calls
                .into_iter()
                .map(|call| Ok(ModelEvent::ToolCall { call })),
        );
        events.push(Ok(ModelEvent::Finish {
            reason: Some("stop".into()),
        }));
        events
    }
}

fn deltas(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(DELTA_CHARS).map(|c| c.iter().collect()).collect()
}

/// A model that answers from a script, in order.
pub struct ReplayModel {
    responses: Mutex<VecDeque<ScriptedResponse>>,
}

impl ReplayModel {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }
}

#[async_trait]
impl ModelClient for ReplayModel {
    fn name(&self) -> &str {
        "replay"
    }

    async fn stream_response(
        &self,
        request: ModelRequest,
        _cancel: CancellationToken,
    ) -> Result<ModelStream, ModelError> {
        let next = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some(response) = next else {
            return Err(ModelError::Unavailable("replay script is exhausted".into()));
        };
        debug!(
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Replaying scripted response"
        );
        Ok(replay(response.into_events()))
    }
}

/// A configured tool that only reports what it was called with.
pub struct DryRunTool {
    spec: ToolSpec,
}

impl DryRunTool {
    pub fn new(spec: ToolSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl Tool for DryRunTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(
        &self,
        params: &Map<String, Value>,
        _cancel: CancellationToken,
    ) -> Result<Vec<ToolOutput>, ToolError> {
        let params = Value::Object(params.clone());
        let result = ToolResult::ok(&self.spec.name, format!("(dry run) called with {params}"));
        Ok(vec![ToolOutput::Result(result)])
    }
}

/// Answer text to stdout, everything else to stderr.
pub struct ConsoleTranscript;

impl TranscriptSink for ConsoleTranscript {
    fn append(&self, entry: TranscriptEntry) {
        match entry {
            TranscriptEntry::TextDelta { text, .. } => {
                let mut stdout = std::io::stdout();
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
            TranscriptEntry::Reasoning {
                text, elapsed_ms, ..
            } => eprintln!("💭 [{elapsed_ms}ms] {text}"),
            TranscriptEntry::ToolCall {
                tool_name, params, ..
            } => eprintln!("\n🔧 {tool_name} {params}"),
            TranscriptEntry::ToolResult {
                tool_name, success, ..
            } => eprintln!("   {} {tool_name}", if success { "✅" } else { "❌" }),
            TranscriptEntry::HandOff { .. } => eprintln!("↪️  Handed off to a nested run"),
            TranscriptEntry::Error { message, .. } => eprintln!("\n❌ {message}"),
            TranscriptEntry::MessageDone { .. } => println!(),
        }
    }
}

/// Register a dry-run tool for every configured spec.
pub fn dry_run_registry(specs: &[ToolSpec]) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for spec in specs {
        registry.register(Box::new(DryRunTool::new(spec.clone())));
    }
    registry
}

pub async fn run(
    config: AppConfig,
    script: PathBuf,
    question: String,
    max_iterations: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = tokio::fs::read_to_string(&script)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", script.display()))?;
    let model = ReplayModel::from_json(&json)
        .map_err(|e| format!("Invalid replay script {}: {e}", script.display()))?;

    let mut settings = AgentSettings::from(&config.agent);
    if let Some(max) = max_iterations {
        if max == 0 {
            return Err("--max-iterations must be at least 1".into());
        }
        settings.max_iterations = max;
    }

    let agent = Arc::new(
        AgentLoop::new(
            Arc::new(model),
            Arc::new(dry_run_registry(&config.tools)),
            Arc::new(ConsoleTranscript),
        )
        .with_settings(settings),
    );

    let stopper = agent.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping the run");
            stopper.stop();
        }
    });

    let result = agent.run(&[Message::user(question)]).await;
    ctrl_c.abort();

    info!(
        model_calls = result.model_calls,
        messages = result.messages.len(),
        "Replay finished"
    );

    match result.outcome {
        RunOutcome::Finished(_) => Ok(()),
        RunOutcome::Aborted => {
            eprintln!("⏹  Run stopped");
            Ok(())
        }
        RunOutcome::Failed(err) => Err(err.into()),
    }
}
