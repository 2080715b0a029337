// Tandem Core
//
// This crate provides backend-agnostic building blocks for typed LLM agents
// and the pipelines that chain them.
//
// Key design decisions:
// - Agents are built explicitly with AgentBuilder; no global registration
// - Dependency bundles (D) and results (O) are generic parameters of Agent
// - Dynamic system prompts are an ordered list of generators evaluated per run
// - Tools see the run's dependencies through RunContext and return text to the model,
//   while the typed value stays on the tool-result message
// - Result extraction is pluggable: final_result tool, prompted JSON or plain text
// - Pipelines are typed chains of stages; failures report the stage and prior outputs
// - Model access goes through the LlmDriver trait (HTTP drivers live in tandem-openai)

// Runtime types
pub mod message;
pub mod tool_types;

pub mod agent;
pub mod backend;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod schema;
pub mod tools;

// In-memory driver for examples and testing
pub mod memory;

// Re-exports for convenience
pub use agent::{Agent, AgentBuilder, RunResult, Usage, FINAL_RESULT_PROCESSED, TOOL_NOT_EXECUTED};
pub use backend::{BackendConfig, BackendKind};
pub use config::AgentConfig;
pub use context::{RunContext, RunOptions};
pub use dispatcher::ToolDispatcher;
pub use error::{AgentError, Result};
pub use message::{Message, MessageRole};
pub use pipeline::{
    AgentStage, FnStage, Pipeline, PipelineError, PipelineOutput, Stage, StageInput, StageRecord,
};
pub use prompt::{AssembledPrompt, AsyncPromptFn, PromptAssembler, SyncPromptFn, SystemPromptGenerator};
pub use schema::{Bounded, ResultExtraction, ResultSchema, FINAL_RESULT_TOOL};
pub use tool_types::{ToolCall, ToolDefinition, ToolResult};

// LLM driver types re-exports
pub use llm::{
    LlmCallConfig, LlmCompletionMetadata, LlmDriver, LlmMessage, LlmMessageRole, LlmResponse,
    ModelHandle,
};

// Tool abstraction re-exports
pub use tools::{
    FunctionTool, NoArgs, Tool, ToolError, ToolExecutionResult, ToolInternalError, ToolRegistry,
    ToolRegistryBuilder,
};

// Crates used in public signatures
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
