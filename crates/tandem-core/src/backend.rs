// Backend configuration
//
// BackendKind enumerates the LLM serving mechanisms a model handle can be
// resolved from. BackendConfig carries the connection parameters; resolving
// it into a ModelHandle happens in tandem-openai.

use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};

/// Default timeout for the model discovery probe
pub const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 10;

/// Supported LLM backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum BackendKind {
    /// Local LM Studio server (model discovered via /models)
    LmStudio,
    /// Any OpenAI-compatible endpoint (model discovered via /models)
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
    /// Local Ollama daemon (named model)
    Ollama,
    /// Groq hosted API (named model)
    Groq,
    /// OpenAI hosted API (named model)
    #[serde(rename = "openai")]
    OpenAi,
}

impl BackendKind {
    /// Whether the model id is discovered by listing the backend's models
    pub fn uses_discovery(&self) -> bool {
        matches!(self, BackendKind::LmStudio | BackendKind::OpenAiCompatible)
    }

    /// Base URL used when none is configured
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            BackendKind::LmStudio => Some("http://localhost:1234/v1"),
            BackendKind::OpenAiCompatible => None,
            BackendKind::Ollama => Some("http://localhost:11434/v1"),
            BackendKind::Groq => Some("https://api.groq.com/openai/v1"),
            BackendKind::OpenAi => Some("https://api.openai.com/v1"),
        }
    }

    /// Provider environment variable holding the API key
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            BackendKind::Groq => Some("GROQ_API_KEY"),
            BackendKind::OpenAi => Some("OPENAI_API_KEY"),
            _ => None,
        }
    }

    /// Placeholder key local servers accept
    pub fn default_api_key(&self) -> Option<&'static str> {
        match self {
            BackendKind::LmStudio => Some("lm_studio"),
            BackendKind::Ollama => Some("ollama"),
            _ => None,
        }
    }

    /// Hosted backends refuse requests without a key
    pub fn requires_api_key(&self) -> bool {
        matches!(self, BackendKind::Groq | BackendKind::OpenAi)
    }
}

impl std::str::FromStr for BackendKind {
    type Err = AgentError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "lm_studio" | "lmstudio" => Ok(BackendKind::LmStudio),
            "openai_compatible" => Ok(BackendKind::OpenAiCompatible),
            "ollama" => Ok(BackendKind::Ollama),
            "groq" => Ok(BackendKind::Groq),
            "openai" => Ok(BackendKind::OpenAi),
            _ => Err(AgentError::UnknownBackendKind(s.to_string())),
        }
    }
}

impl TryFrom<String> for BackendKind {
    type Error = AgentError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::LmStudio => write!(f, "lm_studio"),
            BackendKind::OpenAiCompatible => write!(f, "openai_compatible"),
            BackendKind::Ollama => write!(f, "ollama"),
            BackendKind::Groq => write!(f, "groq"),
            BackendKind::OpenAi => write!(f, "openai"),
        }
    }
}

fn default_discovery_timeout_secs() -> u64 {
    DEFAULT_DISCOVERY_TIMEOUT_SECS
}

/// Which backend to use and how to reach it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,

    /// Base URL override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// API key override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model id (required for named backends, pins the model for discovery backends)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Timeout for the discovery probe
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,
}

impl BackendConfig {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            base_url: None,
            api_key: None,
            model: None,
            discovery_timeout_secs: DEFAULT_DISCOVERY_TIMEOUT_SECS,
        }
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the model id
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the discovery probe timeout
    pub fn with_discovery_timeout_secs(mut self, secs: u64) -> Self {
        self.discovery_timeout_secs = secs;
        self
    }

    /// Load from environment variables
    ///
    /// - TANDEM_BACKEND: backend kind (default: ollama)
    /// - TANDEM_MODEL: model id
    /// - TANDEM_BASE_URL: base URL override
    /// - TANDEM_API_KEY: API key override
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Load using a custom variable lookup
    pub fn from_env_with(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let kind = match non_empty("TANDEM_BACKEND") {
            Some(value) => value.parse()?,
            None => BackendKind::Ollama,
        };

        Ok(Self {
            kind,
            base_url: non_empty("TANDEM_BASE_URL"),
            api_key: non_empty("TANDEM_API_KEY")
                .or_else(|| kind.api_key_env().and_then(non_empty)),
            model: non_empty("TANDEM_MODEL"),
            discovery_timeout_secs: DEFAULT_DISCOVERY_TIMEOUT_SECS,
        })
    }

    /// Effective base URL without a trailing slash
    pub fn base_url(&self) -> Result<String> {
        let url = self
            .base_url
            .as_deref()
            .or_else(|| self.kind.default_base_url())
            .ok_or_else(|| {
                AgentError::config(format!("Backend '{}' requires a base URL", self.kind))
            })?;
        Ok(url.trim_end_matches('/').to_string())
    }

    /// Effective API key: explicit, then provider environment variable, then local placeholder
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| {
                self.kind
                    .api_key_env()
                    .and_then(|key| std::env::var(key).ok())
                    .filter(|v| !v.is_empty())
            })
            .or_else(|| self.kind.default_api_key().map(String::from))
    }

    /// Configured model id, if any non-empty one was supplied
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }

    pub fn discovery_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.discovery_timeout_secs)
    }
}
