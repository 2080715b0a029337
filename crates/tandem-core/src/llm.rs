// LLM Driver Abstractions
//
// This module encapsulates everything the run loop needs to talk to a model:
// - LlmDriver trait for provider-agnostic chat completions
// - Message, call configuration and response types
// - ModelHandle, the resolved (driver, model id) pair an Agent is bound to
//
// Concrete drivers live outside this crate (see tandem-openai) or in
// `memory` for tests.

use crate::backend::BackendKind;
use crate::error::Result;
use crate::message::{Message, MessageRole};
use crate::tool_types::{ToolCall, ToolDefinition};
use async_trait::async_trait;
use std::sync::Arc;

// ============================================================================
// LlmDriver Trait
// ============================================================================

/// Trait for LLM drivers
///
/// Implementations handle provider-specific API calls and response parsing.
#[async_trait]
pub trait LlmDriver: Send + Sync {
    /// Call the LLM and wait for the complete response
    async fn chat_completion(
        &self,
        messages: Vec<LlmMessage>,
        config: &LlmCallConfig,
    ) -> Result<LlmResponse>;
}

/// Implement LlmDriver for Arc<dyn LlmDriver> to allow shared dynamic dispatch
#[async_trait]
impl LlmDriver for Arc<dyn LlmDriver> {
    async fn chat_completion(
        &self,
        messages: Vec<LlmMessage>,
        config: &LlmCallConfig,
    ) -> Result<LlmResponse> {
        (**self).chat_completion(messages, config).await
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Message format for LLM calls (provider-agnostic)
#[derive(Debug, Clone, PartialEq)]
pub struct LlmMessage {
    pub role: LlmMessageRole,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_call_id: Option<String>,
}

impl LlmMessage {
    /// Create a message with text content
    pub fn text(role: LlmMessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// Message role for LLM calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmMessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl From<&Message> for LlmMessage {
    fn from(msg: &Message) -> Self {
        let role = match msg.role {
            MessageRole::System => LlmMessageRole::System,
            MessageRole::User => LlmMessageRole::User,
            MessageRole::Assistant => LlmMessageRole::Assistant,
            MessageRole::ToolResult => LlmMessageRole::Tool,
        };

        LlmMessage {
            role,
            content: msg.content.clone(),
            tool_calls: msg.tool_calls.clone(),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

// ============================================================================
// Configuration and Response Types
// ============================================================================

/// Configuration for an LLM call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmCallConfig {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub tools: Vec<ToolDefinition>,
}

/// Metadata about LLM completion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmCompletionMetadata {
    /// Total tokens used
    pub total_tokens: Option<u32>,
    /// Prompt tokens
    pub prompt_tokens: Option<u32>,
    /// Completion tokens
    pub completion_tokens: Option<u32>,
    /// Model used
    pub model: Option<String>,
    /// Finish reason
    pub finish_reason: Option<String>,
}

/// Response from an LLM call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub metadata: LlmCompletionMetadata,
}

// ============================================================================
// ModelHandle
// ============================================================================

/// A ready-to-call model: a driver plus the model id to request from it
#[derive(Clone)]
pub struct ModelHandle {
    driver: Arc<dyn LlmDriver>,
    model: String,
    backend: Option<BackendKind>,
}

impl ModelHandle {
    /// Create a handle from a driver and a model id
    pub fn new(driver: impl LlmDriver + 'static, model: impl Into<String>) -> Self {
        Self::from_shared(Arc::new(driver), model)
    }

    /// Create a handle from an already shared driver
    pub fn from_shared(driver: Arc<dyn LlmDriver>, model: impl Into<String>) -> Self {
        Self {
            driver,
            model: model.into(),
            backend: None,
        }
    }

    /// Record which backend kind produced this handle
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Model id sent with every request
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Backend kind, if the handle was produced by a resolver
    pub fn backend(&self) -> Option<BackendKind> {
        self.backend
    }

    /// The underlying driver
    pub fn driver(&self) -> &dyn LlmDriver {
        self.driver.as_ref()
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model", &self.model)
            .field("backend", &self.backend)
            .finish()
    }
}
