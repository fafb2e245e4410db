//! Model providers
//!
//! The engine only depends on [`ModelProvider`]; the concrete providers here
//! cover OpenAI-compatible chat endpoints and raw completion endpoints.

mod chat;
mod completion;
mod messages;
mod provider;

pub use chat::ChatCompletionsProvider;
pub use completion::{ChatTemplate, TemplatedCompletionProvider};
pub use messages::{ChatMessage, MessageRole};
pub use provider::{ModelProvider, ProviderKind, ProviderSettings, build_provider};

#[cfg(test)]
pub use provider::MockModelProvider;
