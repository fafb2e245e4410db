//! Model provider abstraction and settings

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::chat::ChatCompletionsProvider;
use super::completion::{ChatTemplate, TemplatedCompletionProvider};
use super::messages::ChatMessage;
use crate::error::{EvalResult, ProviderError};

/// An external text generation service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Produce a completion for the conversation
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;

    /// Identifier recorded in run metadata
    fn identifier(&self) -> String;
}

/// Supported endpoint flavours
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenRouter chat completions
    #[default]
    OpenRouter,
    /// OpenAI chat completions
    OpenAi,
    /// Any OpenAI-compatible chat endpoint, such as a local vLLM server
    Local,
    /// Raw `/completions` endpoint with a chat template applied client-side
    LocalTemplate,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenRouter => "openrouter",
            Self::OpenAi => "openai",
            Self::Local => "local",
            Self::LocalTemplate => "local_template",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Local | Self::LocalTemplate => "http://localhost:8000/v1",
        }
    }

    fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenRouter => Some("OPENROUTER_API_KEY"),
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Local | Self::LocalTemplate => None,
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "openrouter" => Ok(Self::OpenRouter),
            "openai" => Ok(Self::OpenAi),
            "local" => Ok(Self::Local),
            "local_template" => Ok(Self::LocalTemplate),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

/// How to reach the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub kind: ProviderKind,

    #[serde(default = "default_model")]
    pub model: String,

    /// Override of the endpoint base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Template for `local_template` endpoints
    #[serde(default)]
    pub chat_template: ChatTemplate,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            model: default_model(),
            base_url: None,
            api_key_env: None,
            temperature: 0.0,
            max_tokens: None,
            chat_template: ChatTemplate::default(),
        }
    }
}

impl ProviderSettings {
    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.kind.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    fn api_key_env(&self) -> Option<&str> {
        self.api_key_env
            .as_deref()
            .or_else(|| self.kind.default_api_key_env())
    }

    /// Resolve the API key from the environment
    pub fn api_key(&self) -> Result<Option<String>, ProviderError> {
        let Some(var) = self.api_key_env() else {
            return Ok(None);
        };
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(Some(key)),
            _ if self.api_key_env.is_none() && self.kind.default_api_key_env().is_some() => Err(
                ProviderError::MissingCredentials(format!("{} is not set", var)),
            ),
            _ => Ok(None),
        }
    }

    /// Identifier echoed into run metadata
    pub fn identifier(&self) -> String {
        format!("{}/{}", self.kind.as_str(), self.model)
    }
}

/// Build the provider described by `settings`
pub fn build_provider(settings: &ProviderSettings) -> EvalResult<Arc<dyn ModelProvider>> {
    let api_key = settings.api_key()?;
    let client = reqwest::Client::builder()
        .build()
        .map_err(ProviderError::from)?;

    let provider: Arc<dyn ModelProvider> = match settings.kind {
        ProviderKind::LocalTemplate => Arc::new(TemplatedCompletionProvider::new(
            settings.clone(),
            api_key,
            client,
        )),
        _ => Arc::new(ChatCompletionsProvider::new(settings.clone(), api_key, client)),
    };

    tracing::info!(
        provider = settings.kind.as_str(),
        model = %settings.model,
        base_url = %settings.base_url(),
        "Model provider ready"
    );
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("openrouter".parse::<ProviderKind>(), Ok(ProviderKind::OpenRouter));
        assert_eq!("OpenAI".parse::<ProviderKind>(), Ok(ProviderKind::OpenAi));
        assert_eq!(
            "local-template".parse::<ProviderKind>(),
            Ok(ProviderKind::LocalTemplate)
        );
        assert!("bogus".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_base_url_defaults_and_override() {
        let settings = ProviderSettings::default();
        assert_eq!(settings.base_url(), "https://openrouter.ai/api/v1");

        let settings = ProviderSettings::default()
            .with_kind(ProviderKind::Local)
            .with_base_url("http://gpu-box:9000/v1/");
        assert_eq!(settings.base_url(), "http://gpu-box:9000/v1");
    }

    #[test]
    fn test_local_needs_no_key() {
        let settings = ProviderSettings::default().with_kind(ProviderKind::Local);
        assert_eq!(settings.api_key().unwrap(), None);
        assert!(build_provider(&settings).is_ok());
    }

    #[test]
    fn test_custom_key_env_is_optional() {
        let settings = ProviderSettings {
            api_key_env: Some("GRIDBENCH_TEST_UNSET_KEY_VAR".to_string()),
            ..ProviderSettings::default()
        };
        assert_eq!(settings.api_key().unwrap(), None);
    }

    #[test]
    fn test_identifier() {
        let settings = ProviderSettings::default()
            .with_kind(ProviderKind::OpenAi)
            .with_model("gpt-4o");
        assert_eq!(settings.identifier(), "openai/gpt-4o");
    }
}
