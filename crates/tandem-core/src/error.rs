// Error types for agent runs

use std::time::Duration;
use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that can occur while resolving a backend or running an agent
#[derive(Debug, Error)]
pub enum AgentError {
    /// Model discovery or connection failed
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Backend kind is not one of the supported values
    #[error("Unknown backend kind: {0}")]
    UnknownBackendKind(String),

    /// Model output never matched the result schema within the retry budget
    #[error("Result validation failed after {attempts} attempt(s): {message}")]
    ResultValidationFailed { attempts: usize, message: String },

    /// Model supplied arguments that do not fit the tool's parameters
    #[error("Invalid arguments for tool '{tool}': {message}")]
    ToolArgumentInvalid { tool: String, message: String },

    /// A tool's own operation failed
    ///
    /// The run itself continues: the model sees the tool's message (or a
    /// generic one for internal errors) and this error is what gets logged.
    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// LLM backend returned an error
    #[error("LLM error: {0}")]
    Llm(String),

    /// A single model call exceeded the request timeout
    #[error("Model call timed out after {0:?}")]
    ModelTimeout(Duration),

    /// The run was cancelled by its caller
    #[error("Run cancelled")]
    Cancelled,

    /// Loop terminated due to max iterations
    #[error("Max iterations ({0}) reached")]
    MaxIterationsReached(usize),

    /// A dynamic system prompt generator failed
    #[error("System prompt generator failed: {0}")]
    PromptGenerator(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AgentError {
    /// Create an LLM error
    pub fn llm(msg: impl Into<String>) -> Self {
        AgentError::Llm(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        AgentError::Configuration(msg.into())
    }

    /// Create a backend unavailable error
    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        AgentError::BackendUnavailable(msg.into())
    }

    /// Create a tool argument error
    pub fn tool_argument_invalid(tool: impl Into<String>, msg: impl Into<String>) -> Self {
        AgentError::ToolArgumentInvalid {
            tool: tool.into(),
            message: msg.into(),
        }
    }

    /// Create a tool execution error
    pub fn tool_execution(tool: impl Into<String>, msg: impl Into<String>) -> Self {
        AgentError::ToolExecution {
            tool: tool.into(),
            message: msg.into(),
        }
    }

    /// Whether the run loop retries this failure locally against the retry budget
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::ModelTimeout(_))
    }

    /// Whether this error comes from configuration rather than from a run
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AgentError::Configuration(_) | AgentError::UnknownBackendKind(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_timeouts_are_retryable() {
        assert!(AgentError::ModelTimeout(Duration::from_secs(1)).is_retryable());
        assert!(!AgentError::llm("boom").is_retryable());
        assert!(!AgentError::tool_argument_invalid("t", "bad").is_retryable());
        assert!(!AgentError::Cancelled.is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let err = AgentError::ResultValidationFailed {
            attempts: 4,
            message: "risk out of range".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Result validation failed after 4 attempt(s): risk out of range"
        );

        let err = AgentError::tool_argument_invalid("customer_balance", "missing field");
        assert_eq!(
            err.to_string(),
            "Invalid arguments for tool 'customer_balance': missing field"
        );
        assert!(AgentError::UnknownBackendKind("x".into()).is_configuration());
    }
}
