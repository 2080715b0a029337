// In-memory LLM driver for testing and development
//
// MockLlmDriver replays a scripted list of responses and records every call
// it receives, so tests can assert on exactly what an agent sent.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{AgentError, Result};
use crate::llm::{LlmCallConfig, LlmCompletionMetadata, LlmDriver, LlmMessage, LlmResponse, ModelHandle};
use crate::schema::FINAL_RESULT_TOOL;
use crate::tool_types::ToolCall;

// ============================================================================
// MockLlmDriver - Returns predefined responses
// ============================================================================

/// Mock LLM driver for testing
///
/// Clones share the same script and call log.
#[derive(Clone, Default)]
pub struct MockLlmDriver {
    responses: Arc<RwLock<Vec<MockLlmResponse>>>,
    call_index: Arc<RwLock<usize>>,
    call_log: Arc<RwLock<Vec<MockCall>>>,
}

/// One recorded call
#[derive(Debug, Clone)]
pub struct MockCall {
    pub messages: Vec<LlmMessage>,
    pub config: LlmCallConfig,
}

impl MockCall {
    /// System messages of this call, in order
    pub fn system_prompts(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|m| m.role == crate::llm::LlmMessageRole::System)
            .map(|m| m.content.as_str())
            .collect()
    }

    /// Names of the tools advertised on this call
    pub fn tool_names(&self) -> Vec<&str> {
        self.config.tools.iter().map(|t| t.name.as_str()).collect()
    }
}

/// A mock LLM response
#[derive(Debug, Clone, Default)]
pub struct MockLlmResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub error: Option<String>,
    pub delay: Option<Duration>,
    pub total_tokens: Option<u32>,
}

impl MockLlmResponse {
    /// Create a text-only response
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Create a response with tool calls
    pub fn with_tools(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: text.into(),
            tool_calls,
            ..Default::default()
        }
    }

    /// Create a response with a single tool call
    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        Self::with_tools("", vec![ToolCall::new("", name, arguments)])
    }

    /// Create a response that returns a structured result via `final_result`
    pub fn final_result(arguments: Value) -> Self {
        Self::tool_call(FINAL_RESULT_TOOL, arguments)
    }

    /// Create a response that fails with an LLM error
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Wait before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report token usage
    pub fn with_total_tokens(mut self, tokens: u32) -> Self {
        self.total_tokens = Some(tokens);
        self
    }
}

impl MockLlmDriver {
    /// Create a new mock LLM driver
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a driver with a script of responses
    pub fn with_responses(responses: Vec<MockLlmResponse>) -> Self {
        Self {
            responses: Arc::new(RwLock::new(responses)),
            ..Self::default()
        }
    }

    /// Add a response to the queue
    pub async fn add_response(&self, response: MockLlmResponse) {
        self.responses.write().await.push(response);
    }

    /// Get the call log
    pub async fn calls(&self) -> Vec<MockCall> {
        self.call_log.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.call_log.read().await.len()
    }

    /// Model handle bound to this driver with model id "mock-model"
    pub fn handle(&self) -> ModelHandle {
        ModelHandle::new(self.clone(), "mock-model")
    }
}

#[async_trait]
impl LlmDriver for MockLlmDriver {
    async fn chat_completion(
        &self,
        messages: Vec<LlmMessage>,
        config: &LlmCallConfig,
    ) -> Result<LlmResponse> {
        self.call_log.write().await.push(MockCall {
            messages,
            config: config.clone(),
        });

        let (response, index) = {
            let mut index = self.call_index.write().await;
            let responses = self.responses.read().await;
            let response = responses.get(*index).cloned().unwrap_or_else(|| {
                MockLlmResponse::text("Mock response (no more responses configured)")
            });
            *index += 1;
            (response, *index)
        };

        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = response.error {
            return Err(AgentError::llm(message));
        }

        let tool_calls = response
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(i, mut call)| {
                if call.id.is_empty() {
                    call.id = format!("call_{}_{}", index, i);
                }
                call
            })
            .collect::<Vec<_>>();

        Ok(LlmResponse {
            text: response.text,
            metadata: LlmCompletionMetadata {
                total_tokens: response.total_tokens,
                model: Some(config.model.clone()),
                finish_reason: Some(if tool_calls.is_empty() { "stop" } else { "tool_calls" }.to_string()),
                ..Default::default()
            },
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmMessageRole;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_replays_script_then_default() {
        let driver = MockLlmDriver::with_responses(vec![
            MockLlmResponse::text("first"),
            MockLlmResponse::final_result(json!({"language": "Hindi"})),
        ]);
        let config = LlmCallConfig {
            model: "mock-model".into(),
            ..Default::default()
        };
        let msgs = vec![LlmMessage::text(LlmMessageRole::User, "hi")];

        let first = driver.chat_completion(msgs.clone(), &config).await.unwrap();
        assert_eq!(first.text, "first");

        let second = driver.chat_completion(msgs.clone(), &config).await.unwrap();
        assert_eq!(second.tool_calls[0].name, FINAL_RESULT_TOOL);
        assert_eq!(second.tool_calls[0].id, "call_2_0");

        let third = driver.chat_completion(msgs, &config).await.unwrap();
        assert_eq!(third.text, "Mock response (no more responses configured)");
        assert_eq!(driver.call_count().await, 3);
    }

    #[tokio::test]
    async fn test_mock_error_response() {
        let driver = MockLlmDriver::with_responses(vec![MockLlmResponse::error("rate limited")]);
        let err = driver
            .chat_completion(Vec::new(), &LlmCallConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Llm(ref m) if m == "rate limited"));
    }

    #[tokio::test]
    async fn test_mock_call_log_records_system_prompts() {
        let driver = MockLlmDriver::new();
        driver.add_response(MockLlmResponse::text("ok")).await;
        driver
            .chat_completion(
                vec![
                    LlmMessage::text(LlmMessageRole::System, "A"),
                    LlmMessage::text(LlmMessageRole::System, "B"),
                    LlmMessage::text(LlmMessageRole::User, "go"),
                ],
                &LlmCallConfig::default(),
            )
            .await
            .unwrap();

        let calls = driver.calls().await;
        assert_eq!(calls[0].system_prompts(), vec!["A", "B"]);
        assert!(calls[0].tool_names().is_empty());
    }
}
