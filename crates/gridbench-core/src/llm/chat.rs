//! OpenAI-compatible chat completions provider

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::instrument;

use super::messages::ChatMessage;
use super::provider::{ModelProvider, ProviderSettings};
use crate::error::ProviderError;

/// Provider for `/chat/completions` endpoints (OpenRouter, OpenAI, vLLM)
pub struct ChatCompletionsProvider {
    settings: ProviderSettings,
    api_key: Option<String>,
    http_client: Client,
}

impl ChatCompletionsProvider {
    pub fn new(settings: ProviderSettings, api_key: Option<String>, http_client: Client) -> Self {
        Self {
            settings,
            api_key,
            http_client,
        }
    }

    fn request_body(&self, messages: &[ChatMessage]) -> Value {
        let mut body = json!({
            "model": self.settings.model,
            "messages": messages,
            "temperature": self.settings.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = self.settings.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }
}

/// Pull the assistant text out of a chat completion response
pub(crate) fn parse_chat_response(response: &Value) -> Result<String, ProviderError> {
    let choice = response["choices"]
        .as_array()
        .and_then(|choices| choices.first())
        .ok_or_else(|| ProviderError::protocol(format!("response has no choices: {}", response)))?;

    Ok(choice["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string())
}

#[async_trait]
impl ModelProvider for ChatCompletionsProvider {
    #[instrument(skip(self, messages), fields(model = %self.settings.model), level = "debug")]
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.settings.base_url());
        let mut request = self
            .http_client
            .post(&url)
            .json(&self.request_body(messages));

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Chat endpoint error (status {}): {}", status, body);
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response_json: Value = response.json().await?;
        let content = parse_chat_response(&response_json)?;
        tracing::debug!("Received {} characters", content.len());
        Ok(content)
    }

    fn identifier(&self) -> String {
        self.settings.identifier()
    }
}
