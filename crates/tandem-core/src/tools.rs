// Tool Abstraction for Agent Runs
//
// Tools are typed functions the model may call mid-conversation. A tool sees
// the run's dependency bundle through RunContext, gets its arguments parsed
// from the model's call, and returns a value that is rendered to text before
// it re-enters the conversation.
//
// Design decisions:
// - Tools are generic over the dependency type D of the agent that owns them
// - FunctionTool adapts async closures over a typed argument struct
// - Errors distinguish recoverable (shown to the model), internal (hidden)
//   and fatal (invalid arguments, aborts the run)

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error};

use crate::context::RunContext;
use crate::error::{AgentError, Result};
use crate::schema::{decode_json_string, json_schema_for};
use crate::tool_types::{ToolCall, ToolDefinition, ToolResult};

/// Text the model sees in place of an internal tool error
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred while executing the tool";

// ============================================================================
// Tool Execution Result - Error Handling Contract
// ============================================================================

/// Result of a tool execution.
///
/// - `Success`: value rendered to text and returned to the model
/// - `ToolError`: expected failure, shown to the model so it can adapt
/// - `InternalError`: system failure, logged and replaced by a generic message
/// - `InvalidArguments`: the call does not fit the tool's parameters; aborts the run
#[derive(Debug)]
pub enum ToolExecutionResult {
    Success { text: String, value: Value },
    ToolError(String),
    InternalError(ToolInternalError),
    InvalidArguments(String),
}

impl ToolExecutionResult {
    /// Create a successful result
    pub fn success(value: impl Into<Value>) -> Self {
        let value = value.into();
        ToolExecutionResult::Success {
            text: render_text(&value),
            value,
        }
    }

    /// Create a tool-level error (safe to show to the model)
    pub fn tool_error(message: impl Into<String>) -> Self {
        ToolExecutionResult::ToolError(message.into())
    }

    /// Create an internal error (hidden from the model)
    pub fn internal_error_msg(message: impl Into<String>) -> Self {
        ToolExecutionResult::InternalError(ToolInternalError::from_message(message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolExecutionResult::Success { .. })
    }

    /// Failure of the tool's own operation, with full details
    ///
    /// `None` for successes and for invalid arguments, which are reported as
    /// `ToolArgumentInvalid` instead.
    pub fn execution_error(&self, tool: &str) -> Option<AgentError> {
        match self {
            ToolExecutionResult::ToolError(message) => {
                Some(AgentError::tool_execution(tool, message))
            }
            ToolExecutionResult::InternalError(err) => {
                Some(AgentError::tool_execution(tool, &err.message))
            }
            _ => None,
        }
    }

    /// Convert to a ToolResult for the conversation
    ///
    /// Invalid arguments become `AgentError::ToolArgumentInvalid`. Internal
    /// errors are logged but replaced with a generic message.
    pub fn into_tool_result(self, call: &ToolCall) -> Result<ToolResult> {
        if let Some(err) = self.execution_error(&call.name) {
            match &self {
                ToolExecutionResult::InternalError(_) => error!(
                    tool_call_id = %call.id,
                    error = %err,
                    "Tool internal error (details hidden from LLM)"
                ),
                _ => debug!(tool_call_id = %call.id, error = %err, "Tool reported an error"),
            }
        }

        match self {
            ToolExecutionResult::Success { text, value } => {
                Ok(ToolResult::success(call, text, Some(value)))
            }
            ToolExecutionResult::ToolError(message) => Ok(ToolResult::error(call, message)),
            ToolExecutionResult::InternalError(_) => Ok(ToolResult::error(call, INTERNAL_ERROR_MESSAGE)),
            ToolExecutionResult::InvalidArguments(message) => {
                Err(AgentError::tool_argument_invalid(&call.name, message))
            }
        }
    }
}

/// Text form of a tool's return value: strings verbatim, everything else as JSON
pub fn render_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Internal error details (logged but not exposed to the model)
#[derive(Debug)]
pub struct ToolInternalError {
    pub message: String,
}

impl ToolInternalError {
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ToolInternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ToolInternalError {}

/// Error returned by tool handlers
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Recoverable failure, reported to the model
    #[error("{0}")]
    Failed(String),

    /// Arguments are semantically invalid; aborts the run
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Unexpected failure, hidden from the model
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ToolError {
    pub fn failed(message: impl Into<String>) -> Self {
        ToolError::Failed(message.into())
    }
}

impl From<ToolError> for ToolExecutionResult {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Failed(message) => ToolExecutionResult::ToolError(message),
            ToolError::InvalidArguments(message) => ToolExecutionResult::InvalidArguments(message),
            ToolError::Internal(err) => {
                ToolExecutionResult::InternalError(ToolInternalError::from_message(format!("{:#}", err)))
            }
        }
    }
}

// ============================================================================
// Tool Trait
// ============================================================================

/// A callable the model may invoke during a run of an agent with dependencies `D`
#[async_trait]
pub trait Tool<D>: Send + Sync {
    /// Unique name within the agent, used by the model to call it
    fn name(&self) -> &str;

    /// What the tool does, shown to the model
    fn description(&self) -> &str;

    /// JSON schema of the tool's arguments
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the raw arguments of one call
    async fn execute(&self, ctx: &RunContext<D>, arguments: Value) -> ToolExecutionResult;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters_schema())
    }
}

/// Argument type for tools that take no parameters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema)]
pub struct NoArgs {}

/// Tool backed by an async closure over a typed argument struct
///
/// ```ignore
/// #[derive(Deserialize, JsonSchema)]
/// struct BalanceArgs { include_pending: bool }
///
/// let tool = FunctionTool::new(
///     "customer_balance",
///     "Returns the customer's current account balance.",
///     |ctx: RunContext<SupportDeps>, args: BalanceArgs| async move {
///         let balance = ctx.deps.db.customer_balance(ctx.deps.customer_id, args.include_pending).await?;
///         Ok(format!("{:.2}", balance))
///     },
/// );
/// ```
pub struct FunctionTool<A, F> {
    name: String,
    description: String,
    parameters: Value,
    handler: F,
    _args: PhantomData<fn(A)>,
}

impl<A, F> FunctionTool<A, F>
where
    A: JsonSchema,
{
    pub fn new<D, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(RunContext<D>, A) -> Fut,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: json_schema_for::<A>(),
            handler,
            _args: PhantomData,
        }
    }
}

#[async_trait]
impl<D, A, F, Fut, T> Tool<D> for FunctionTool<A, F>
where
    D: Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    F: Fn(RunContext<D>, A) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<T, ToolError>> + Send + 'static,
    T: Serialize + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, ctx: &RunContext<D>, arguments: Value) -> ToolExecutionResult {
        let args: A = match serde_json::from_value(decode_json_string(arguments)) {
            Ok(args) => args,
            Err(e) => return ToolExecutionResult::InvalidArguments(e.to_string()),
        };

        match (self.handler)(ctx.clone(), args).await {
            Ok(output) => match serde_json::to_value(&output) {
                Ok(value) => ToolExecutionResult::success(value),
                Err(e) => ToolExecutionResult::internal_error_msg(format!(
                    "failed to serialize tool output: {}",
                    e
                )),
            },
            Err(err) => err.into(),
        }
    }
}

// ============================================================================
// ToolRegistry - Collection of Tools
// ============================================================================

/// Ordered collection of an agent's tools
///
/// Tools are advertised to the model in registration order. Registering a
/// name that already exists replaces the earlier tool in place.
pub struct ToolRegistry<D> {
    tools: Vec<Arc<dyn Tool<D>>>,
}

impl<D> ToolRegistry<D> {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn builder() -> ToolRegistryBuilder<D> {
        ToolRegistryBuilder::new()
    }

    /// Register a tool with the registry
    pub fn register(&mut self, tool: impl Tool<D> + 'static) {
        self.register_arc(Arc::new(tool));
    }

    /// Register an Arc-wrapped tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool<D>>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(index) => self.tools[index] = tool,
            None => self.tools.push(tool),
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool<D>>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Definitions sent to the model
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }
}

impl<D> Default for ToolRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Clone for ToolRegistry<D> {
    fn clone(&self) -> Self {
        Self {
            tools: self.tools.clone(),
        }
    }
}

impl<D> std::fmt::Debug for ToolRegistry<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// Builder for ToolRegistry
pub struct ToolRegistryBuilder<D> {
    registry: ToolRegistry<D>,
}

impl<D> ToolRegistryBuilder<D> {
    pub fn new() -> Self {
        Self {
            registry: ToolRegistry::new(),
        }
    }

    /// Add a tool
    pub fn tool(mut self, tool: impl Tool<D> + 'static) -> Self {
        self.registry.register(tool);
        self
    }

    pub fn build(self) -> ToolRegistry<D> {
        self.registry
    }
}

impl<D> Default for ToolRegistryBuilder<D> {
    fn default() -> Self {
        Self::new()
    }
}
