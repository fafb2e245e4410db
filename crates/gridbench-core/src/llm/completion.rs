//! Raw completions provider with client-side chat templates
//!
//! Some locally served models expose only `/completions`. The conversation is
//! rendered into a single prompt with the model's chat template and generation
//! stops at the end-of-turn marker.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::messages::{ChatMessage, MessageRole};
use super::provider::{ModelProvider, ProviderSettings};
use crate::error::ProviderError;

const END_OF_TURN: &str = "<|im_end|>";

/// Prompt template for raw completion endpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatTemplate {
    /// `<|im_start|>role\n...<|im_end|>`, system folded into user turns
    #[default]
    ImStart,
    /// `<|im_start|>role<|im_sep|>...<|im_end|>`
    ImSep,
}

impl ChatTemplate {
    /// Render the conversation and open an assistant turn
    pub fn format_prompt(&self, messages: &[ChatMessage]) -> String {
        let mut prompt = String::new();
        for message in messages {
            match self {
                Self::ImStart => match message.role {
                    MessageRole::System | MessageRole::User => {
                        prompt.push_str(&format!("<|im_start|>user\n{}{}\n", message.content, END_OF_TURN));
                    }
                    MessageRole::Assistant => {
                        prompt.push_str(&format!("<|im_start|>assistant\n{}{}", message.content, END_OF_TURN));
                    }
                },
                Self::ImSep => {
                    prompt.push_str(&format!(
                        "<|im_start|>{}<|im_sep|>{}{}",
                        message.role, message.content, END_OF_TURN
                    ));
                }
            }
        }
        prompt.push_str(self.assistant_prefix());
        prompt
    }

    fn assistant_prefix(&self) -> &'static str {
        match self {
            Self::ImStart => "<|im_start|>assistant\n",
            Self::ImSep => "<|im_start|>assistant<|im_sep|>",
        }
    }
}

impl std::str::FromStr for ChatTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "im_start" | "chatml" | "1" => Ok(Self::ImStart),
            "im_sep" | "2" => Ok(Self::ImSep),
            other => Err(format!("unknown chat template '{}'", other)),
        }
    }
}

/// Provider for `/completions` endpoints
pub struct TemplatedCompletionProvider {
    settings: ProviderSettings,
    api_key: Option<String>,
    http_client: Client,
}

impl TemplatedCompletionProvider {
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
            "prompt": self.settings.chat_template.format_prompt(messages),
            "temperature": self.settings.temperature,
            "stop": [END_OF_TURN],
        });
        if let Some(max_tokens) = self.settings.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }
}

#[async_trait]
impl ModelProvider for TemplatedCompletionProvider {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let url = format!("{}/completions", self.settings.base_url());
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
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response_json: Value = response.json().await?;
        response_json["choices"]
            .as_array()
            .and_then(|choices| choices.first())
            .map(|choice| choice["text"].as_str().unwrap_or_default().to_string())
            .ok_or_else(|| ProviderError::protocol(format!("response has no choices: {}", response_json)))
    }

    fn identifier(&self) -> String {
        self.settings.identifier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("rules"),
            ChatMessage::user("question"),
            ChatMessage::assistant("draft"),
        ]
    }

    #[test]
    fn test_im_start_template() {
        let prompt = ChatTemplate::ImStart.format_prompt(&conversation());
        assert_eq!(
            prompt,
            "<|im_start|>user\nrules<|im_end|>\n\
             <|im_start|>user\nquestion<|im_end|>\n\
             <|im_start|>assistant\ndraft<|im_end|>\
             <|im_start|>assistant\n"
        );
    }

    #[test]
    fn test_im_sep_template() {
        let prompt = ChatTemplate::ImSep.format_prompt(&[ChatMessage::user("q")]);
        assert_eq!(
            prompt,
            "<|im_start|>user<|im_sep|>q<|im_end|><|im_start|>assistant<|im_sep|>"
        );
    }

    #[test]
    fn test_template_parsing() {
        assert_eq!("chatml".parse::<ChatTemplate>(), Ok(ChatTemplate::ImStart));
        assert_eq!("im-sep".parse::<ChatTemplate>(), Ok(ChatTemplate::ImSep));
        assert!("jinja".parse::<ChatTemplate>().is_err());
    }

    #[test]
    fn test_request_body_has_stop_marker() {
        let provider = TemplatedCompletionProvider::new(
            ProviderSettings::default().with_model("phi"),
            None,
            Client::new(),
        );
        let body = provider.request_body(&[ChatMessage::user("q")]);
        assert_eq!(body["stop"][0], END_OF_TURN);
        assert!(body["prompt"].as_str().unwrap().ends_with("<|im_start|>assistant\n"));
        assert!(body.get("max_tokens").is_none());
    }
}
