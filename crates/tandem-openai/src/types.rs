// OpenAI Protocol Types
//
// Wire format of the chat-completions and model listing endpoints, plus the
// conversions from and to the core LLM types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tandem_core::{
    LlmCallConfig, LlmCompletionMetadata, LlmMessage, LlmMessageRole, LlmResponse, ToolCall,
    ToolDefinition,
};

/// OpenAI chat completion request format
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAiTool>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiTool {
    pub r#type: String,
    pub function: OpenAiFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(default = "function_type")]
    pub r#type: String,
    pub function: OpenAiFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiFunctionCall {
    pub name: String,
    /// JSON-encoded arguments
    #[serde(default)]
    pub arguments: String,
}

// Non-streaming response types
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiResponse {
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<OpenAiChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiChoice {
    pub message: OpenAiMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// `GET /models` response
#[derive(Debug, Clone, Deserialize)]
pub struct ModelList {
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    pub id: String,
}

// ============================================================================
// Conversions
// ============================================================================

impl From<&LlmMessage> for OpenAiMessage {
    fn from(msg: &LlmMessage) -> Self {
        let role = match msg.role {
            LlmMessageRole::System => "system",
            LlmMessageRole::User => "user",
            LlmMessageRole::Assistant => "assistant",
            LlmMessageRole::Tool => "tool",
        };

        let tool_calls = (!msg.tool_calls.is_empty()).then(|| {
            msg.tool_calls
                .iter()
                .map(|tc| OpenAiToolCall {
                    id: tc.id.clone(),
                    r#type: function_type(),
                    function: OpenAiFunctionCall {
                        name: tc.name.clone(),
                        arguments: encode_arguments(&tc.arguments),
                    },
                })
                .collect()
        });

        OpenAiMessage {
            role: role.to_string(),
            content: Some(msg.content.clone()),
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

impl From<&ToolDefinition> for OpenAiTool {
    fn from(tool: &ToolDefinition) -> Self {
        OpenAiTool {
            r#type: function_type(),
            function: OpenAiFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        }
    }
}

impl ChatRequest {
    pub fn new(messages: &[LlmMessage], config: &LlmCallConfig) -> Self {
        let tools = (!config.tools.is_empty())
            .then(|| config.tools.iter().map(OpenAiTool::from).collect());

        ChatRequest {
            model: config.model.clone(),
            messages: messages.iter().map(OpenAiMessage::from).collect(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stream: false,
            tools,
        }
    }
}

impl OpenAiResponse {
    /// First choice as a core response; `None` when the backend sent no choices
    pub fn into_llm_response(self) -> Option<LlmResponse> {
        let choice = self.choices.into_iter().next()?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::new(tc.id, tc.function.name, decode_arguments(&tc.function.arguments)))
            .collect();

        Some(LlmResponse {
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
            metadata: LlmCompletionMetadata {
                total_tokens: self.usage.as_ref().map(|u| u.total_tokens),
                prompt_tokens: self.usage.as_ref().map(|u| u.prompt_tokens),
                completion_tokens: self.usage.as_ref().map(|u| u.completion_tokens),
                model: self.model,
                finish_reason: choice.finish_reason,
            },
        })
    }
}

/// Decode tool call arguments
///
/// Empty arguments become `{}`. Text that is not JSON is kept as a
/// `Value::String` so the tool can report it as invalid arguments.
pub fn decode_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn encode_arguments(arguments: &Value) -> String {
    match arguments {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let messages = vec![
            LlmMessage::text(LlmMessageRole::System, "Be brief."),
            LlmMessage::text(LlmMessageRole::User, "Hi"),
        ];
        let config = LlmCallConfig {
            model: "llama3.2".to_string(),
            temperature: Some(0.2),
            tools: vec![ToolDefinition::new(
                "customer_balance",
                "Returns the balance",
                json!({"type": "object"}),
            )],
            ..Default::default()
        };

        let body = serde_json::to_value(ChatRequest::new(&messages, &config)).unwrap();

        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["stream"], false);
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body["messages"][1].get("tool_calls").is_none());
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "customer_balance");
    }

    #[test]
    fn test_tool_call_history_encoding() {
        let msg = LlmMessage {
            role: LlmMessageRole::Assistant,
            content: String::new(),
            tool_calls: vec![ToolCall::new(
                "call_1",
                "customer_balance",
                json!({"include_pending": true}),
            )],
            tool_call_id: None,
        };

        let wire = OpenAiMessage::from(&msg);
        let calls = wire.tool_calls.unwrap();
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.arguments, r#"{"include_pending":true}"#);
    }

    #[test]
    fn test_response_with_tool_calls() {
        let response: OpenAiResponse = serde_json::from_value(json!({
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "final_result", "arguments": "{\"risk\": 3}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }))
        .unwrap();

        let response = response.into_llm_response().unwrap();
        assert_eq!(response.text, "");
        assert_eq!(response.tool_calls[0].name, "final_result");
        assert_eq!(response.tool_calls[0].arguments, json!({"risk": 3}));
        assert_eq!(response.metadata.total_tokens, Some(15));
        assert_eq!(response.metadata.finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn test_no_choices() {
        let response: OpenAiResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(response.into_llm_response().is_none());
    }

    #[test]
    fn test_decode_arguments() {
        assert_eq!(decode_arguments(""), json!({}));
        assert_eq!(decode_arguments(r#"{"a": 1}"#), json!({"a": 1}));
        assert_eq!(decode_arguments("{broken"), json!("{broken"));
    }
}
