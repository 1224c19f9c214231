//! Dispatch of validated calls to their tool handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use toolstream_core::error::ToolError;
use toolstream_core::tool::{ToolOutput, ToolRegistry};
use toolstream_protocol::ParsedToolCall;

/// Runs one call at a time against the shared registry.
#[derive(Clone)]
pub struct ToolExecutor {
    tools: Arc<ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Execute `call`. Returns [`ToolError::Aborted`] as soon as `cancel`
    /// fires, even if the handler itself ignores the token.
    pub async fn execute(
        &self,
        call: &ParsedToolCall,
        cancel: CancellationToken,
    ) -> Result<Vec<ToolOutput>, ToolError> {
        let tool = self
            .tools
            .get(&call.tool_name)
            .ok_or_else(|| ToolError::NotFound(call.tool_name.clone()))?;

        if cancel.is_cancelled() {
            return Err(ToolError::Aborted);
        }

        debug!(tool = %call.tool_name, "Executing tool");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ToolError::Aborted),
            result = tool.execute(&call.params, cancel.clone()) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{BlockingTool, EchoTool};
    use serde_json::{Map, json};
    use toolstream_protocol::CallSource;

    fn call(name: &str, params: serde_json::Value) -> ParsedToolCall {
        ParsedToolCall {
            tool_name: name.into(),
            params: params.as_object().cloned().unwrap_or_else(Map::new),
            raw_tag_text: String::new(),
            source: CallSource::Text,
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool::new("search")));
        registry.register(Box::new(BlockingTool::new("slow")));
        ToolExecutor::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn dispatches_to_handler() {
        let outputs = executor()
            .execute(&call("search", json!({"query": "cats"})), CancellationToken::new())
            .await
            .unwrap();
        match &outputs[..] {
            [ToolOutput::Result(r)] => {
                assert!(r.success);
                assert!(r.output.contains("cats"));
            }
            other => panic!("unexpected outputs: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let err = executor()
            .execute(&call("browse", json!({})), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::NotFound("browse".into()));
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_blocked_handler() {
        let exec = executor();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            trigger.cancel();
        });
        let err = exec.execute(&call("slow", json!({})), cancel).await.unwrap_err();
        assert_eq!(err, ToolError::Aborted);
    }

    #[tokio::test]
    async fn already_cancelled_token_skips_handler() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = executor()
            .execute(&call("search", json!({"query": "x"})), cancel)
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Aborted);
    }
}
