// Agent run configuration
//
// AgentConfig holds the static, per-agent settings the run loop reads:
// - the static system prompt
// - retry budget for result validation and model timeouts
// - iteration cap and sampling parameters

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for an agent's run loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Static system prompt, sent before any dynamic prompt
    #[serde(default)]
    pub system_prompt: String,

    /// Corrective re-asks allowed after the first attempt
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Maximum number of model calls per run (prevents infinite tool loops)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Temperature for LLM sampling (0.0 - 2.0)
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate per response
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Timeout for a single model call, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_retries() -> usize {
    1
}

fn default_max_iterations() -> usize {
    10
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

impl AgentConfig {
    /// Create a configuration with the given static prompt
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            ..Self::default()
        }
    }

    /// Set the retry budget
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    /// Set maximum iterations
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the per-call model timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            retries: default_retries(),
            max_iterations: default_max_iterations(),
            temperature: None,
            max_tokens: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}
