//! The agent iteration loop implementation.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use toolstream_config::AgentConfig;
use toolstream_core::error::{ModelError, ToolError};
use toolstream_core::message::{Message, Role, last_user_index};
use toolstream_core::model::{ModelClient, ModelEvent, ModelRequest};
use toolstream_core::tool::{HandOff, ToolOutput, ToolRegistry, ToolSpec};
use toolstream_core::transcript::{TranscriptEntry, TranscriptSink};
use toolstream_protocol::{
    DEFAULT_BUNDLE_WRAPPER, FormatError, ParsedToolCall, StreamToolCallExtractor, ToolCallNormalizer,
    dedupe, render_tool_result,
};

use crate::executor::ToolExecutor;
use crate::prompts;
use crate::recovery::{self, FatalError, FatalErrorKind, Recovery};

/// Nested hand-off runs deeper than this are not started.
const MAX_HANDOFF_DEPTH: usize = 4;

/// Tunables for one [`AgentLoop`].
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Model calls per run, the forced-final one included
    pub max_iterations: usize,
    pub system_prompt: String,
    pub bundle_wrapper: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            system_prompt: String::new(),
            bundle_wrapper: DEFAULT_BUNDLE_WRAPPER.into(),
        }
    }
}

impl From<&AgentConfig> for AgentSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            system_prompt: config.system_prompt.clone(),
            bundle_wrapper: config.bundle_wrapper.clone(),
        }
    }
}

/// Where the loop is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    /// The last run ended in a fatal error. Cleared by `stop()` or the next run.
    Error,
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The final assistant message.
    Finished(Message),
    /// `stop()` was called; there is no final message.
    Aborted,
    Failed(FatalError),
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct AgentRunResult {
    pub outcome: RunOutcome,
    /// The conversation as the loop left it, synthetic turns included
    pub messages: Vec<Message>,
    /// Model calls made, nested hand-off runs included
    pub model_calls: usize,
}

impl AgentRunResult {
    pub fn final_text(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Finished(message) => Some(&message.content),
            _ => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, RunOutcome::Aborted)
    }
}

/// Restores the loop state when a run ends, however it ends.
struct RunGuard<'a> {
    state: &'a Mutex<LoopState>,
    failed: bool,
}

impl<'a> RunGuard<'a> {
    fn enter(state: &'a Mutex<LoopState>) -> Self {
        *lock(state) = LoopState::Running;
        Self {
            state,
            failed: false,
        }
    }

    fn fail(&mut self) {
        self.failed = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *lock(self.state) = if self.failed {
            LoopState::Error
        } else {
            LoopState::Idle
        };
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What one streamed model response produced.
#[derive(Default)]
struct Turn {
    text: String,
    reasoning: String,
    calls: Vec<ParsedToolCall>,
    format_errors: Vec<FormatError>,
}

enum TurnError {
    Aborted,
    Model(ModelError),
}

/// Per-run values that do not change between iterations.
struct RunContext {
    specs: Vec<ToolSpec>,
    normalizer: ToolCallNormalizer,
    message_id: String,
    cancel: CancellationToken,
}

type BoxedRun<'a> = Pin<Box<dyn Future<Output = AgentRunResult> + Send + 'a>>;

/// Drives model calls and tool executions until a final answer.
pub struct AgentLoop {
    model: Arc<dyn ModelClient>,
    executor: ToolExecutor,
    transcript: Arc<dyn TranscriptSink>,
    settings: AgentSettings,
    state: Mutex<LoopState>,
    /// Root token of the current run
    cancel: Mutex<CancellationToken>,
    depth: usize,
}

impl AgentLoop {
    /// Create a new agent loop with default settings.
    pub fn new(
        model: Arc<dyn ModelClient>,
        tools: Arc<ToolRegistry>,
        transcript: Arc<dyn TranscriptSink>,
    ) -> Self {
        Self {
            model,
            executor: ToolExecutor::new(tools),
            transcript,
            settings: AgentSettings::default(),
            state: Mutex::new(LoopState::Idle),
            cancel: Mutex::new(CancellationToken::new()),
            depth: 0,
        }
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the maximum number of model calls per run.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.settings.max_iterations = max;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.settings.system_prompt = prompt.into();
        self
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn state(&self) -> LoopState {
        *lock(&self.state)
    }

    /// Cancel the current run, if any, and return immediately.
    ///
    /// The model stream, the executing tool and any nested hand-off run are
    /// all cancelled; results already produced are kept.
    pub fn stop(&self) {
        lock(&self.cancel).cancel();
        let mut state = lock(&self.state);
        if *state == LoopState::Error {
            *state = LoopState::Idle;
        }
    }

    /// Answer the last user message of `base_messages`.
    ///
    /// The caller's messages are not modified; the loop works on a copy and
    /// returns it in the result.
    pub async fn run(&self, base_messages: &[Message]) -> AgentRunResult {
        self.stop();
        let cancel = CancellationToken::new();
        *lock(&self.cancel) = cancel.clone();

        let mut guard = RunGuard::enter(&self.state);
        let result = self.run_boxed(base_messages.to_vec(), cancel).await;
        if matches!(result.outcome, RunOutcome::Failed(_)) {
            guard.fail();
        }
        result
    }

    fn run_boxed(&self, messages: Vec<Message>, cancel: CancellationToken) -> BoxedRun<'_> {
        Box::pin(self.run_inner(messages, cancel))
    }

    async fn run_inner(&self, mut messages: Vec<Message>, cancel: CancellationToken) -> AgentRunResult {
        let specs = self.executor.registry().specs();
        let definitions = self.executor.registry().definitions();
        let ctx = RunContext {
            normalizer: ToolCallNormalizer::new(specs.clone(), self.settings.bundle_wrapper.as_str()),
            specs,
            message_id: Uuid::new_v4().to_string(),
            cancel,
        };

        self.install_system_prompt(&mut messages, &ctx.specs);
        let question = match last_user_index(&messages) {
            Some(i) => {
                let question = messages[i].content.clone();
                messages[i].content = prompts::initial_turn(&question);
                question
            }
            None => String::new(),
        };

        info!(
            message_id = %ctx.message_id,
            depth = self.depth,
            max_iterations = self.settings.max_iterations,
            tools = ctx.specs.len(),
            "Starting agent run"
        );

        let mut model_calls = 0;

        for iteration in 0..self.settings.max_iterations {
            if ctx.cancel.is_cancelled() {
                return self.aborted(&ctx, messages, model_calls);
            }

            let forced_final = iteration + 1 == self.settings.max_iterations;
            if forced_final {
                messages.push(Message::user(prompts::FORCED_FINAL));
            }
            debug!(
                message_id = %ctx.message_id,
                iteration = iteration + 1,
                forced_final,
                "Agent loop iteration"
            );

            let request = ModelRequest {
                messages: messages.clone(),
                tools: if forced_final { Vec::new() } else { definitions.clone() },
            };
            model_calls += 1;

            let turn = match self.stream_turn(request, &ctx, forced_final).await {
                Ok(turn) => turn,
                Err(TurnError::Aborted) => return self.aborted(&ctx, messages, model_calls),
                Err(TurnError::Model(err)) => match recovery::classify(&err) {
                    Recovery::Correct(prompt) => {
                        warn!(error = %err, "Recoverable model error, sending correction");
                        messages.push(Message::user(prompt));
                        continue;
                    }
                    Recovery::Abort => return self.aborted(&ctx, messages, model_calls),
                    Recovery::Fatal(fatal) => return self.failed(&ctx, fatal, messages, model_calls),
                },
            };

            messages.push(assistant_turn(&turn));
            let Turn {
                text,
                reasoning,
                calls,
                format_errors,
            } = turn;

            if !format_errors.is_empty() {
                warn!(
                    errors = format_errors.len(),
                    first = %format_errors[0],
                    "Malformed tool calls, sending correction"
                );
                messages.push(Message::user(recovery::correct_format(&format_errors)));
                continue;
            }

            let calls = dedupe(calls);
            if calls.is_empty() {
                if forced_final || !text.trim().is_empty() {
                    let answer = Message::assistant(text).with_reasoning(reasoning);
                    return self.finished(&ctx, answer, messages, model_calls);
                }
                debug!("Empty response without tool calls, nudging the model");
                messages.push(Message::user(prompts::EMPTY_RESPONSE_NUDGE));
                continue;
            }

            let mut results = Vec::new();
            let mut hand_off: Option<HandOff> = None;
            let mut viewed_images = false;

            for call in &calls {
                self.transcript.append(TranscriptEntry::ToolCall {
                    message_id: ctx.message_id.clone(),
                    tool_name: call.tool_name.clone(),
                    params: Value::Object(call.params.clone()),
                });

                let started = Instant::now();
                let outcome = self.executor.execute(call, ctx.cancel.child_token()).await;
                let duration_ms = started.elapsed().as_millis() as u64;

                match outcome {
                    Ok(outputs) => {
                        debug!(tool = %call.tool_name, duration_ms, "Tool finished");
                        if ctx.specs.iter().any(|s| s.name == call.tool_name && s.views_images) {
                            viewed_images = true;
                        }
                        for output in outputs {
                            match output {
                                ToolOutput::Result(result) => {
                                    self.transcript.append(TranscriptEntry::ToolResult {
                                        message_id: ctx.message_id.clone(),
                                        tool_name: result.tool_name.clone(),
                                        success: result.success,
                                    });
                                    results.push(render_tool_result(&result));
                                }
                                ToolOutput::HandOff(next) if hand_off.is_none() => hand_off = Some(next),
                                ToolOutput::HandOff(_) => {
                                    debug!(tool = %call.tool_name, "Ignoring additional hand-off");
                                }
                            }
                        }
                    }
                    Err(ToolError::Aborted) => return self.aborted(&ctx, messages, model_calls),
                    Err(ToolError::NotFound(name)) => {
                        warn!(tool = %name, "Model called an unknown tool");
                        let names: Vec<&str> = ctx.specs.iter().map(|s| s.name.as_str()).collect();
                        results.push(prompts::tool_not_found(&name, &names));
                    }
                    Err(e) => {
                        warn!(tool = %call.tool_name, error = %e, duration_ms, "Tool execution failed");
                    }
                }

                if ctx.cancel.is_cancelled() {
                    return self.aborted(&ctx, messages, model_calls);
                }
            }

            if let Some(next) = hand_off {
                if self.depth < MAX_HANDOFF_DEPTH {
                    return self.hand_off(&ctx, next, messages, model_calls).await;
                }
                warn!(depth = self.depth, "Hand-off nested too deep, continuing in place");
            }

            let echo = (!viewed_images).then_some(question.as_str());
            messages.push(Message::user(prompts::follow_up_turn(&results, echo)));
        }

        // Only reachable when the forced-final call itself failed recoverably:
        // there is no answer, and earlier narration is not one.
        let fatal = FatalError {
            kind: FatalErrorKind::ModelRequestFailure,
            detail: "the forced-final model call produced no answer".into(),
        };
        self.failed(&ctx, fatal, messages, model_calls)
    }

    /// Put the system prompt (with tool instructions) first, replacing any
    /// system message already there.
    fn install_system_prompt(&self, messages: &mut Vec<Message>, specs: &[ToolSpec]) {
        let prompt = prompts::system_prompt(&self.settings.system_prompt, specs, &self.settings.bundle_wrapper);
        let has_system = messages.first().is_some_and(|m| m.role == Role::System);
        match (has_system, prompt.is_empty()) {
            (true, _) => messages[0] = Message::system(prompt),
            (false, false) => messages.insert(0, Message::system(prompt)),
            (false, true) => {}
        }
    }

    /// Stream one model response, extracting tool calls as text arrives.
    ///
    /// Stops consuming at the first malformed tool call. On the forced-final
    /// iteration tool tags are still stripped from the text but no calls are
    /// returned.
    async fn stream_turn(
        &self,
        request: ModelRequest,
        ctx: &RunContext,
        forced_final: bool,
    ) -> Result<Turn, TurnError> {
        let stream_cancel = ctx.cancel.child_token();
        let mut stream = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(TurnError::Aborted),
            opened = self.model.stream_response(request, stream_cancel.clone()) => {
                opened.map_err(TurnError::Model)?
            }
        };
        // Leaving early tells the backend to stop producing
        let _stop_stream = stream_cancel.drop_guard();

        let mut extractor = StreamToolCallExtractor::new(ctx.specs.clone(), self.settings.bundle_wrapper.as_str());
        let mut turn = Turn::default();
        let mut reasoning_started: Option<Instant> = None;

        loop {
            let event = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(TurnError::Aborted),
                event = stream.recv() => event,
            };

            match event {
                None | Some(Ok(ModelEvent::Finish { .. })) => break,
                Some(Ok(ModelEvent::TextDelta { text })) => {
                    let out = extractor.push(&text);
                    self.emit_text(ctx, &out.safe_text, &mut turn);
                    turn.calls.extend(out.tool_calls);
                    if !out.errors.is_empty() && !forced_final {
                        turn.format_errors = out.errors;
                        return Ok(turn);
                    }
                }
                Some(Ok(ModelEvent::ReasoningDelta { text })) => {
                    let started = *reasoning_started.get_or_insert_with(Instant::now);
                    turn.reasoning.push_str(&text);
                    self.transcript.append(TranscriptEntry::Reasoning {
                        message_id: ctx.message_id.clone(),
                        text,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    });
                }
                Some(Ok(ModelEvent::ToolCall { call })) => {
                    if forced_final {
                        debug!(tool = %call.name, "Ignoring native tool call on forced-final iteration");
                        continue;
                    }
                    if let Some(parsed) = ctx.normalizer.normalize(&call) {
                        turn.calls.push(parsed);
                    }
                }
                Some(Err(err)) => return Err(TurnError::Model(err)),
            }
        }

        let tail = extractor.finish();
        self.emit_text(ctx, &tail.safe_text, &mut turn);
        if forced_final && !turn.calls.is_empty() {
            debug!(calls = turn.calls.len(), "Dropping tool calls from forced-final response");
            turn.calls.clear();
        }
        Ok(turn)
    }

    fn emit_text(&self, ctx: &RunContext, text: &str, turn: &mut Turn) {
        if text.is_empty() {
            return;
        }
        turn.text.push_str(text);
        self.transcript.append(TranscriptEntry::TextDelta {
            message_id: ctx.message_id.clone(),
            text: text.to_string(),
        });
    }

    /// Continue the conversation in a nested loop and adopt its result.
    async fn hand_off(
        &self,
        ctx: &RunContext,
        hand_off: HandOff,
        mut messages: Vec<Message>,
        model_calls: usize,
    ) -> AgentRunResult {
        info!(
            message_id = %ctx.message_id,
            depth = self.depth + 1,
            overrides_system_prompt = hand_off.system_prompt.is_some(),
            "Handing off to nested run"
        );
        self.transcript.append(TranscriptEntry::HandOff {
            message_id: ctx.message_id.clone(),
        });
        self.mark_done(ctx);

        let mut settings = self.settings.clone();
        if let Some(system_prompt) = hand_off.system_prompt {
            settings.system_prompt = system_prompt;
        }
        let nested_cancel = ctx.cancel.child_token();
        let nested = AgentLoop {
            model: self.model.clone(),
            executor: self.executor.clone(),
            transcript: self.transcript.clone(),
            settings,
            state: Mutex::new(LoopState::Running),
            cancel: Mutex::new(nested_cancel.clone()),
            depth: self.depth + 1,
        };

        messages.push(Message::user(hand_off.user_prompt));
        let mut result = nested.run_boxed(messages.clone(), nested_cancel).await;

        if let RunOutcome::Finished(answer) = &result.outcome {
            messages.push(answer.clone());
        }
        result.messages = messages;
        result.model_calls += model_calls;
        result
    }

    fn mark_done(&self, ctx: &RunContext) {
        self.transcript.append(TranscriptEntry::MessageDone {
            message_id: ctx.message_id.clone(),
            timestamp: Utc::now(),
        });
    }

    fn finished(
        &self,
        ctx: &RunContext,
        answer: Message,
        mut messages: Vec<Message>,
        model_calls: usize,
    ) -> AgentRunResult {
        info!(message_id = %ctx.message_id, model_calls, "Agent run finished");
        self.mark_done(ctx);
        // The assistant turn is already in `messages`; swap in the clean answer
        if messages.last().is_some_and(|m| m.role == Role::Assistant) {
            messages.pop();
        }
        messages.push(answer.clone());
        AgentRunResult {
            outcome: RunOutcome::Finished(answer),
            messages,
            model_calls,
        }
    }

    fn aborted(&self, ctx: &RunContext, messages: Vec<Message>, model_calls: usize) -> AgentRunResult {
        info!(message_id = %ctx.message_id, model_calls, "Agent run aborted");
        self.mark_done(ctx);
        AgentRunResult {
            outcome: RunOutcome::Aborted,
            messages,
            model_calls,
        }
    }

    fn failed(
        &self,
        ctx: &RunContext,
        fatal: FatalError,
        messages: Vec<Message>,
        model_calls: usize,
    ) -> AgentRunResult {
        error!(
            message_id = %ctx.message_id,
            kind = ?fatal.kind,
            detail = %fatal.detail,
            "Agent run failed"
        );
        self.transcript.append(TranscriptEntry::Error {
            message_id: ctx.message_id.clone(),
            message: fatal.to_string(),
        });
        self.mark_done(ctx);
        AgentRunResult {
            outcome: RunOutcome::Failed(fatal),
            messages,
            model_calls,
        }
    }
}

/// The assistant turn as recorded in history: the visible text followed by
/// the tool tags the model wrote, so it can see its own calls next time.
fn assistant_turn(turn: &Turn) -> Message {
    let mut content = turn.text.trim_end().to_string();
    let tags = turn
        .calls
        .iter()
        .map(|c| c.raw_tag_text.as_str())
        .chain(turn.format_errors.iter().filter_map(FormatError::raw));
    for tag in tags {
        if !content.is_empty() {
            content.push_str("\n\n");
        }
        content.push_str(tag);
    }
    Message::assistant(content).with_reasoning(turn.reasoning.clone())
}
