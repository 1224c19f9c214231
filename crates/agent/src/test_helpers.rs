//! Shared test utilities: a scripted model, a few mock tools and a recording
//! transcript.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use toolstream_core::error::{ModelError, ToolError};
use toolstream_core::model::{ModelClient, ModelEvent, ModelRequest, ModelStream, NativeToolCall, replay};
use toolstream_core::tool::{HandOff, ParamKind, ParamSpec, Tool, ToolOutput, ToolResult, ToolSpec};
use toolstream_core::transcript::{TranscriptEntry, TranscriptSink};

/// One scripted model response.
#[derive(Debug, Clone)]
pub enum Reply {
    /// The stream opens and yields these events.
    Events(Vec<Result<ModelEvent, ModelError>>),
    /// Opening the stream fails.
    Fail(ModelError),
}

/// Stream `text` in 5-char deltas, then finish.
pub fn text(text: &str) -> Reply {
    let chars: Vec<char> = text.chars().collect();
    let mut events: Vec<_> = chars
        .chunks(5)
        .map(|c| Ok(ModelEvent::TextDelta { text: c.iter().collect() }))
        .collect();
    events.push(Ok(ModelEvent::Finish { reason: None }));
    Reply::Events(events)
}

/// Reasoning first, then the answer text.
pub fn reasoning_then_text(reasoning: &str, answer: &str) -> Reply {
    let Reply::Events(mut events) = text(answer) else {
        unreachable!()
    };
    events.insert(0, Ok(ModelEvent::ReasoningDelta { text: reasoning.into() }));
    Reply::Events(events)
}

/// A single native function call.
pub fn native_call(name: &str, arguments: Value) -> Reply {
    Reply::Events(vec![
        Ok(ModelEvent::ToolCall {
            call: NativeToolCall {
                id: "call_0".into(),
                name: name.into(),
                arguments,
            },
        }),
        Ok(ModelEvent::Finish { reason: None }),
    ])
}

/// A model that plays back replies in order and records every request.
pub struct ScriptedModel {
    replies: Mutex<Vec<Reply>>,
    requests: Mutex<Vec<ModelRequest>>,
    repeat_last: bool,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
            repeat_last: false,
        }
    }

    /// Answers every request with the same reply.
    pub fn repeating(reply: Reply) -> Self {
        Self {
            repeat_last: true,
            ..Self::new(vec![reply])
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Content of the last message of the `n`th request.
    pub fn last_message_of(&self, n: usize) -> String {
        let requests = self.requests.lock().unwrap();
        requests[n].messages.last().unwrap().content.clone()
    }
}

#[async_trait::async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_response(
        &self,
        request: ModelRequest,
        _cancel: CancellationToken,
    ) -> Result<ModelStream, ModelError> {
        let count = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };

        let reply = {
            let replies = self.replies.lock().unwrap();
            match replies.get(count - 1) {
                Some(reply) => reply.clone(),
                None if self.repeat_last && !replies.is_empty() => replies[replies.len() - 1].clone(),
                None => panic!(
                    "ScriptedModel: no more replies (call #{count}, have {})",
                    replies.len()
                ),
            }
        };

        match reply {
            Reply::Events(events) => Ok(replay(events)),
            Reply::Fail(err) => Err(err),
        }
    }
}

fn query_spec(name: &str) -> ToolSpec {
    ToolSpec::new(name, format!("The {name} tool"))
        .with_param(ParamSpec::required("query", ParamKind::string()))
}

/// Echoes its `query` parameter back and counts invocations.
pub struct EchoTool {
    spec: ToolSpec,
    calls: Arc<AtomicUsize>,
}

impl EchoTool {
    pub fn new(name: &str) -> Self {
        Self {
            spec: query_spec(name),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait::async_trait]
impl Tool for EchoTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(
        &self,
        params: &Map<String, Value>,
        _cancel: CancellationToken,
    ) -> Result<Vec<ToolOutput>, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let query = params.get("query").and_then(Value::as_str).unwrap_or_default();
        Ok(vec![ToolOutput::Result(ToolResult::ok(
            &self.spec.name,
            format!("results for {query}"),
        ))])
    }
}

/// Never finishes on its own; signals once it has started.
pub struct BlockingTool {
    spec: ToolSpec,
    started: Arc<Notify>,
}

impl BlockingTool {
    pub fn new(name: &str) -> Self {
        Self {
            spec: query_spec(name),
            started: Arc::new(Notify::new()),
        }
    }

    pub fn started(&self) -> Arc<Notify> {
        self.started.clone()
    }
}

#[async_trait::async_trait]
impl Tool for BlockingTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(
        &self,
        _params: &Map<String, Value>,
        _cancel: CancellationToken,
    ) -> Result<Vec<ToolOutput>, ToolError> {
        self.started.notify_one();
        std::future::pending::<()>().await;
        Ok(Vec::new())
    }
}

/// Delegates the conversation to a nested run.
pub struct HandOffTool {
    spec: ToolSpec,
    hand_off: HandOff,
}

impl HandOffTool {
    pub fn new(name: &str, system_prompt: Option<&str>, user_prompt: &str) -> Self {
        Self {
            spec: query_spec(name),
            hand_off: HandOff {
                system_prompt: system_prompt.map(String::from),
                user_prompt: user_prompt.into(),
            },
        }
    }
}

#[async_trait::async_trait]
impl Tool for HandOffTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(
        &self,
        _params: &Map<String, Value>,
        _cancel: CancellationToken,
    ) -> Result<Vec<ToolOutput>, ToolError> {
        Ok(vec![ToolOutput::HandOff(self.hand_off.clone())])
    }
}

/// An image-viewing tool.
pub struct ImageTool {
    spec: ToolSpec,
}

impl ImageTool {
    pub fn new() -> Self {
        Self {
            spec: ToolSpec::new("view_image", "Look at an image")
                .with_param(ParamSpec::required("url", ParamKind::Url))
                .viewing_images(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for ImageTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(
        &self,
        _params: &Map<String, Value>,
        _cancel: CancellationToken,
    ) -> Result<Vec<ToolOutput>, ToolError> {
        Ok(vec![ToolOutput::Result(ToolResult::ok("view_image", "a cat on a mat"))])
    }
}

/// Fails with an unexpected error.
pub struct FailingTool {
    spec: ToolSpec,
}

impl FailingTool {
    pub fn new(name: &str) -> Self {
        Self { spec: query_spec(name) }
    }
}

#[async_trait::async_trait]
impl Tool for FailingTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(
        &self,
        _params: &Map<String, Value>,
        _cancel: CancellationToken,
    ) -> Result<Vec<ToolOutput>, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: self.spec.name.clone(),
            reason: "socket exploded".into(),
        })
    }
}

/// Keeps every entry for inspection.
#[derive(Default)]
pub struct RecordingTranscript {
    entries: Mutex<Vec<TranscriptEntry>>,
}

impl RecordingTranscript {
    pub fn entries(&self) -> Vec<TranscriptEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// All streamed answer text, concatenated.
    pub fn text(&self) -> String {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                TranscriptEntry::TextDelta { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl TranscriptSink for RecordingTranscript {
    fn append(&self, entry: TranscriptEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}
