// Model discovery
//
// Local OpenAI-compatible servers (LM Studio and friends) serve whatever model
// is loaded; GET /models tells us which ids they accept.

use crate::driver::HttpError;
use crate::types::ModelList;
use reqwest::Client;
use std::time::Duration;
use tandem_core::{AgentError, Result};
use tracing::debug;

/// List the model ids served at `base_url`
///
/// Any failure (transport, status, body) or an empty listing is
/// `BackendUnavailable`.
pub async fn list_models(
    client: &Client,
    base_url: &str,
    api_key: Option<&str>,
    timeout: Duration,
) -> Result<Vec<String>> {
    let url = format!("{}/models", base_url.trim_end_matches('/'));
    debug!(url = %url, timeout_secs = timeout.as_secs(), "Probing backend for models");

    let models = fetch(client, &url, api_key, timeout)
        .await
        .map_err(|e| AgentError::backend_unavailable(e.to_string()))?;

    if models.is_empty() {
        return Err(AgentError::backend_unavailable(format!(
            "{} lists no models; load a model in the backend first",
            url
        )));
    }

    debug!(count = models.len(), "Backend models discovered");
    Ok(models)
}

async fn fetch(
    client: &Client,
    url: &str,
    api_key: Option<&str>,
    timeout: Duration,
) -> std::result::Result<Vec<String>, HttpError> {
    let mut builder = client.get(url).timeout(timeout);
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        builder = builder.bearer_auth(key);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| HttpError::from_send(url, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(HttpError::Status {
            url: url.to_string(),
            status,
            body,
        });
    }

    let list: ModelList = response.json().await.map_err(|e| HttpError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    Ok(list.data.into_iter().map(|m| m.id).collect())
}
