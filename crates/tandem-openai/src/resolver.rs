// Model Provider Resolver
//
// Turns a BackendConfig into a ModelHandle. Discovery backends are probed once
// here; named backends are only validated and see no traffic until the first
// model call.

use crate::discovery::list_models;
use crate::driver::OpenAiCompatibleDriver;
use reqwest::Client;
use tandem_core::{AgentError, BackendConfig, ModelHandle, Result};
use tracing::{info, warn};

/// Resolves backend configurations into model handles
///
/// Handles created by one resolver share its HTTP client.
#[derive(Debug, Clone, Default)]
pub struct ModelResolver {
    client: Client,
}

impl ModelResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Resolve `config` into a handle usable by agents
    pub async fn resolve(&self, config: &BackendConfig) -> Result<ModelHandle> {
        let kind = config.kind;
        let base_url = config.base_url()?;
        let api_key = config.api_key().filter(|k| !k.trim().is_empty());

        let model = if kind.uses_discovery() {
            let listed = list_models(
                &self.client,
                &base_url,
                api_key.as_deref(),
                config.discovery_timeout(),
            )
            .await?;

            match config.model() {
                Some(pinned) => {
                    if !listed.iter().any(|id| id == pinned) {
                        warn!(
                            backend = %kind,
                            model = %pinned,
                            available = %listed.join(", "),
                            "Pinned model is not listed by the backend"
                        );
                    }
                    pinned.to_string()
                }
                // list_models never returns an empty listing
                None => listed.into_iter().next().unwrap_or_default(),
            }
        } else {
            let model = config.model().ok_or_else(|| {
                AgentError::config(format!("Backend '{}' requires a model name", kind))
            })?;
            if kind.requires_api_key() && api_key.is_none() {
                let hint = kind
                    .api_key_env()
                    .map(|env| format!(" (set {} or TANDEM_API_KEY)", env))
                    .unwrap_or_default();
                return Err(AgentError::config(format!(
                    "Backend '{}' requires an API key{}",
                    kind, hint
                )));
            }
            model.to_string()
        };

        info!(backend = %kind, base_url = %base_url, model = %model, "Model resolved");

        let driver = OpenAiCompatibleDriver::with_client(self.client.clone(), base_url, api_key);
        Ok(ModelHandle::new(driver, model).with_backend(kind))
    }
}

/// Resolve with a fresh resolver
pub async fn resolve(config: &BackendConfig) -> Result<ModelHandle> {
    ModelResolver::new().resolve(config).await
}
