//! Anthropic Messages API backend
//!
//! One instance per capability tier; the gateway owns an advanced and a
//! standard instance differing only in model. An unconfigured API key is
//! reported as `ProviderError::NotConfigured` so the gateway degrades to
//! its fallback instead of refusing to start.

use crate::services::gateway::{ChatBackend, ProviderError};
use crate::services::prompt::PromptRequest;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const USER_AGENT: &str = "pim-enrich/0.1.0";
const HTTP_TIMEOUT_SECS: u64 = 30;
const MAX_TOKENS: u32 = 1024;
const TEMPERATURE: f64 = 0.7;

/// Messages API response (relevant subset)
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

/// Chat backend over the Anthropic Messages API
pub struct AnthropicBackend {
    http_client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    id: String,
}

impl AnthropicBackend {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        let model = model.into();
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            id: format!("anthropic/{}", model),
            model,
            base_url: ANTHROPIC_BASE_URL.to_string(),
        })
    }
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(&self, prompt: &PromptRequest) -> Result<String, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured(self.id.clone()))?;

        let url = format!("{}/v1/messages", self.base_url);
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
            "system": prompt.system,
            "messages": [
                { "role": "user", "content": prompt.user }
            ],
        });

        tracing::debug!(backend = %self.id, "Calling Anthropic Messages API");

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(status.as_u16(), error_text));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        parsed
            .content
            .iter()
            .find(|block| block.block_type == "text")
            .and_then(|block| block.text.clone())
            .ok_or_else(|| ProviderError::Parse("no text content block".to_string()))
    }
}
